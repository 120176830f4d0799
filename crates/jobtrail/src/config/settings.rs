use serde::{Deserialize, Serialize};

/// User-facing settings, loaded from YAML. Every field has a default so a
/// missing or partial file still yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Phrases the mailbox query and the per-message re-check look for.
    /// Expanded with close variants before use.
    #[serde(default = "default_focus_phrases")]
    pub focus_phrases: Vec<String>,

    /// How far back the sync looks, and how long rows are retained.
    #[serde(default = "default_sync_lookback_days")]
    pub sync_lookback_days: i64,

    /// Days after the last activity before a follow-up task comes due.
    #[serde(default = "default_followup_after_days")]
    pub followup_after_days: i64,

    /// Pause between full-message fetches, to stay under provider quotas.
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,

    #[serde(default)]
    pub ai: AiSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    #[serde(default = "default_ai_enabled")]
    pub enabled: bool,

    /// Base URL of the local Ollama-compatible endpoint.
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Extractions below this confidence fall back to the rule pipeline.
    #[serde(default = "default_ai_min_confidence")]
    pub min_confidence: f32,

    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_focus_phrases() -> Vec<String> {
    vec!["thanks for applying".to_string()]
}

fn default_sync_lookback_days() -> i64 {
    60
}

fn default_followup_after_days() -> i64 {
    5
}

fn default_fetch_delay_ms() -> u64 {
    250
}

fn default_ai_enabled() -> bool {
    true
}

fn default_ai_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_ai_model() -> String {
    "llama3.1".to_string()
}

fn default_ai_min_confidence() -> f32 {
    0.6
}

fn default_ai_timeout_secs() -> u64 {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            focus_phrases: default_focus_phrases(),
            sync_lookback_days: default_sync_lookback_days(),
            followup_after_days: default_followup_after_days(),
            fetch_delay_ms: default_fetch_delay_ms(),
            ai: AiSettings::default(),
        }
    }
}

impl Default for AiSettings {
    fn default() -> Self {
        AiSettings {
            enabled: default_ai_enabled(),
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            min_confidence: default_ai_min_confidence(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.focus_phrases, vec!["thanks for applying"]);
        assert_eq!(settings.followup_after_days, 5);
        assert!(settings.ai.enabled);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "followupAfterDays: 7\nai:\n  enabled: false\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.followup_after_days, 7);
        assert!(!settings.ai.enabled);
        assert_eq!(settings.ai.endpoint, "http://127.0.0.1:11434");
        assert_eq!(settings.sync_lookback_days, 60);
    }
}
