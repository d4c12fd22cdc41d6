pub mod client;
pub mod error;
pub mod handler;
pub mod netstring;
pub mod server;

pub use client::{Client, ClientConfig, Delivery, Response, Status};
pub use error::{ClientError, NetstringError, ServerError};
pub use handler::MessageHandler;
pub use server::{Server, ServerConfig};
