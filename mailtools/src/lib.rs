pub mod config;
pub mod controller;
pub mod handlers;

pub use config::MailTools;
pub use controller::{Controller, FlushReport};
pub use handlers::SpoolHandler;
