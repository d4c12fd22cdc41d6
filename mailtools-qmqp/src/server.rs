//! QMQP server.
//!
//! Each accepted connection carries one netstring-packed message. The
//! session replies `Kok <time> qp <pid>` when the message decodes and
//! `DError in message` when it does not, then hands the decoded message to
//! the [`MessageHandler`] and closes.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use futures_util::future::join_all;
use mailtools_common::{Message, Signal, incoming, internal, logging::Wire, outgoing};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::{error::ServerError, handler::MessageHandler, netstring};

/// More length digits than any `usize` needs.
const MAX_LENGTH_DIGITS: usize = 20;

/// Reply sent for anything that does not decode.
pub const REJECTED: &str = "DError in message";

/// Pause after a failed accept before listening again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    ///
    /// Default: 127.0.0.1:628
    #[serde(default = "defaults::listen")]
    pub listen: SocketAddr,

    /// Largest declared message length accepted, in bytes.
    ///
    /// Default: 64 MiB
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,

    /// Stop after accepting this many connections. Unlimited when unset.
    #[serde(default)]
    pub accept_limit: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            max_message_size: defaults::max_message_size(),
            accept_limit: None,
        }
    }
}

mod defaults {
    use std::net::{Ipv4Addr, SocketAddr};

    pub const fn listen() -> SocketAddr {
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 628)
    }

    pub const fn max_message_size() -> usize {
        64 * 1024 * 1024
    }
}

pub struct Server<H: MessageHandler> {
    listener: TcpListener,
    handler: Arc<H>,
    max_message_size: usize,
    accept_limit: Option<usize>,
}

impl<H: MessageHandler> std::fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listener", &self.listener)
            .field("max_message_size", &self.max_message_size)
            .field("accept_limit", &self.accept_limit)
            .finish_non_exhaustive()
    }
}

impl<H: MessageHandler> Server<H> {
    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(config: &ServerConfig, handler: H) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                address: config.listen,
                source,
            })?;

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            max_message_size: config.max_message_size,
            accept_limit: config.accept_limit,
        })
    }

    /// The bound address; useful when listening on port 0.
    ///
    /// # Errors
    ///
    /// If the socket's address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections, one task per connection, until `shutdown`
    /// delivers [`Signal::Shutdown`] or the accept limit is reached. Live
    /// sessions are finished before returning. A failed accept is logged
    /// and the server keeps listening.
    ///
    /// # Errors
    ///
    /// If the listening socket's address cannot be read.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ServerError> {
        let address = self.local_addr()?;
        internal!(level = INFO, "QMQP server listening on {address}");

        let mut sessions = Vec::default();
        let mut accepted = 0;
        let mut signals_open = true;

        while self.accept_limit.is_none_or(|limit| accepted < limit) {
            tokio::select! {
                sig = shutdown.recv(), if signals_open => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!(level = INFO, "QMQP server {address} received Shutdown signal, finishing sessions ...");
                            break;
                        }
                        Err(RecvError::Closed) => signals_open = false,
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                    }
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(connection) => connection,
                        Err(err) => {
                            let err = ServerError::Accept(err);
                            internal!(level = ERROR, "QMQP server {address}: {err}");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    internal!(level = DEBUG, "Connection received on {address} from {peer}");
                    accepted += 1;
                    reap(&mut sessions);

                    let handler = Arc::clone(&self.handler);
                    let max_message_size = self.max_message_size;
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = handle(stream, peer, handler.as_ref(), max_message_size).await {
                            internal!(level = ERROR, "Session with {peer} failed: {err}");
                        }
                    }));
                }
            }
        }

        join_all(sessions).await;
        internal!(level = INFO, "QMQP server {address} stopped after {accepted} connections");
        Ok(())
    }
}

/// Drop the handles of sessions that have already finished.
fn reap(sessions: &mut Vec<JoinHandle<()>>) {
    sessions.retain(|session| !session.is_finished());
}

/// The accepted status text: `Kok <unix-time> qp <pid>`.
pub fn accepted_status() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    format!("Kok {now} qp {}", std::process::id())
}

/// Read the length digits, the byte after them (normally `:`), the
/// payload and its trailing byte, and rebuild the netstring from exactly
/// what arrived.
async fn read_netstring<R>(reader: &mut R, max_message_size: usize) -> Option<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut wire = Vec::new();
    loop {
        let byte = reader.read_u8().await.ok()?;
        wire.push(byte);
        if !byte.is_ascii_digit() {
            break;
        }
        if wire.len() > MAX_LENGTH_DIGITS {
            return None;
        }
    }

    let digits = &wire[..wire.len() - 1];
    let length: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    if length > max_message_size {
        internal!(level = WARN, "Declared length {length} exceeds limit {max_message_size}");
        return None;
    }

    let start = wire.len();
    wire.resize(start + length + 1, 0);
    reader.read_exact(&mut wire[start..]).await.ok()?;
    Some(wire)
}

/// Serve one connection.
async fn handle<H: MessageHandler + ?Sized>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: &H,
    max_message_size: usize,
) -> Result<(), ServerError> {
    let mut stream = BufReader::new(stream);

    let message: Option<Message> = match read_netstring(&mut stream, max_message_size).await {
        Some(wire) => {
            incoming!(peer = peer, "{} bytes: {}", wire.len(), Wire(&wire));
            netstring::decode_message(&wire)
                .inspect_err(|err| internal!(level = WARN, "Rejecting message from {peer}: {err}"))
                .ok()
        }
        None => None,
    };

    let status = if message.is_some() {
        accepted_status()
    } else {
        REJECTED.to_string()
    };

    outgoing!(peer = peer, "{status}");
    stream.write_all(&netstring::encode(status.as_bytes())).await?;
    stream.shutdown().await?;

    let Some(message) = message else {
        // Discard unread input so closing does not reset the connection
        // before the peer has read the rejection.
        let limit = u64::try_from(max_message_size).unwrap_or(u64::MAX);
        tokio::io::copy(&mut (&mut stream).take(limit), &mut tokio::io::sink()).await?;
        return Ok(());
    };

    if let Err(err) = handler.handle(message).await {
        internal!(level = ERROR, "Handler failed for message from {peer}: {err}");
    }

    Ok(())
}
