//! QMQP client.
//!
//! Delivers one message per connection to the first configured server that
//! accepts a connection. Failover only happens while connecting: once a
//! server is chosen, the result of that transfer is final. Callers wanting
//! retries re-run [`Client::deliver`], usually through a spool's deferral.
//!
//! ```no_run
//! use mailtools_common::Message;
//! use mailtools_qmqp::client::{Client, ClientConfig};
//!
//! # async fn example(message: Message) {
//! let client = Client::new(ClientConfig {
//!     servers: vec!["10.0.0.5".to_string(), "10.0.0.6:6280".to_string()],
//!     ..ClientConfig::default()
//! });
//!
//! let delivery = client.deliver(&message).await;
//! if !delivery.is_success() {
//!     eprintln!("{delivery}");
//! }
//! # }
//! ```

mod config;
mod response;

use std::fmt;

use mailtools_common::{Message, incoming, internal, logging::Wire, outgoing};
use rand::seq::SliceRandom;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

pub use self::{
    config::{ClientConfig, Target},
    response::{Response, Status},
};
use crate::{error::ClientError, netstring};

/// The outcome of [`Client::deliver`].
#[derive(Debug)]
pub enum Delivery {
    /// The message was handed to `server`, which replied with `response`.
    /// The reply may still be a refusal; see [`Response::status`].
    Sent { server: String, response: Response },
    /// Nothing was accepted for transfer. One error per server tried.
    Failed { errors: Vec<ClientError> },
}

impl Delivery {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::Sent { response, .. } => Some(response),
            Self::Failed { .. } => None,
        }
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            Self::Sent { server, .. } => Some(server.as_str()),
            Self::Failed { .. } => None,
        }
    }

    pub fn errors(&self) -> &[ClientError] {
        match self {
            Self::Sent { .. } => &[],
            Self::Failed { errors } => errors,
        }
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent { server, response } => write!(f, "{server}: {response}"),
            Self::Failed { errors } => {
                f.write_str("delivery failed")?;
                for error in errors {
                    write!(f, "; {error}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub const fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The configured servers in the order they will be tried.
    pub fn candidates(&self) -> Vec<String> {
        let mut servers = self.config.servers.clone();
        if self.config.shuffle {
            servers.shuffle(&mut rand::rng());
        }
        servers
    }

    /// Connect to the first reachable candidate.
    async fn connect(&self, errors: &mut Vec<ClientError>) -> Option<(TcpStream, String)> {
        for server in self.candidates() {
            let target = match Target::parse(&server, self.config.port) {
                Ok(target) => target,
                Err(err) => {
                    internal!(level = WARN, "Skipping server: {err}");
                    errors.push(err);
                    continue;
                }
            };

            let name = target.to_string();
            match TcpStream::connect((target.host.as_str(), target.port)).await {
                Ok(stream) => return Some((stream, name)),
                Err(source) => {
                    internal!(level = WARN, "Unable to connect to {name}: {source}");
                    errors.push(ClientError::ConnectFailure {
                        server: name,
                        source,
                    });
                }
            }
        }

        None
    }

    /// Deliver `message` to the first server that accepts a connection.
    ///
    /// Never fails outright: every problem is reported in
    /// [`Delivery::Failed`].
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn deliver(&self, message: &Message) -> Delivery {
        let payload = match netstring::encode_message(message) {
            Ok(payload) => payload,
            Err(err) => {
                return Delivery::Failed {
                    errors: vec![err.into()],
                };
            }
        };

        let mut errors = Vec::new();
        let Some((stream, server)) = self.connect(&mut errors).await else {
            if errors.is_empty() {
                errors.push(ClientError::NoServers);
            }
            return Delivery::Failed { errors };
        };

        match self.transfer(stream, &payload).await {
            Ok(reply) => {
                let response = Response::parse(&reply);
                internal!(level = DEBUG, "Delivered to {server}: {response}");
                Delivery::Sent { server, response }
            }
            Err(source) => Delivery::Failed {
                errors: vec![ClientError::Transfer { server, source }],
            },
        }
    }

    async fn transfer(&self, mut stream: TcpStream, payload: &[u8]) -> std::io::Result<Vec<u8>> {
        let peer = stream.peer_addr()?;
        outgoing!(peer = peer, "{} bytes: {}", payload.len(), Wire(payload));
        stream.write_all(payload).await?;
        stream.shutdown().await?;

        let mut reply = Vec::with_capacity(self.config.max_response.min(4096));
        (&mut stream)
            .take(u64::try_from(self.config.max_response).unwrap_or(u64::MAX))
            .read_to_end(&mut reply)
            .await?;

        incoming!(peer = peer, "{}", Wire(&reply));
        Ok(reply)
    }
}
