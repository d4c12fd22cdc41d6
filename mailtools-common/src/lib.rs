pub mod address;
pub mod error;
pub mod input;
pub mod logging;
pub mod message;
pub mod recipient;
pub mod recipients;

pub use tracing;

pub use self::{
    error::{RecipientError, Result},
    input::RecipientInput,
    message::{Message, MessageBuilder},
    recipient::{MergeData, Recipient},
    recipients::Recipients,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
