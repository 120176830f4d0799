//! Mailbox access: the provider seam, the Gmail REST implementation and
//! the payload parser that turns provider JSON into a usable message.

pub mod error;
pub mod gmail;
pub mod message;
pub mod provider;

pub use error::MailError;
pub use gmail::GmailClient;
pub use message::{MessageParser, ParsedMessage};
pub use provider::{ChangeSet, Header, MailboxProvider, MessagePart, PartBody, RawMessage};
