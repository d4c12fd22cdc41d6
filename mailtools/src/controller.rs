use std::{
    fmt,
    path::Path,
    sync::{
        LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Context;
use mailtools_common::{Message, Signal, internal};
use mailtools_qmqp::{Client, Response, Server, ServerConfig};
use mailtools_spool::{Spool, SpoolEntryName, SpoolError, queue_file};
use tokio::sync::broadcast;

use crate::{
    config::MailTools,
    handlers::{self, SpoolHandler},
};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// What a [`Controller::flush`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Entries accepted by a server and removed from the spool.
    pub delivered: usize,
    /// Entries whose delivery failed; each was deferred or, once out of
    /// retries, dead-lettered.
    pub failed: usize,
    /// Unreadable entries moved to the dead-letter directory.
    pub malformed: usize,
}

impl fmt::Display for FlushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} delivered, {} failed, {} malformed",
            self.delivered, self.failed, self.malformed
        )
    }
}

/// Owns the spool, the client and the server configuration, and runs the
/// operations the command line exposes.
#[derive(Debug, Clone)]
pub struct Controller {
    spool: Spool,
    client: Client,
    server: ServerConfig,
}

impl From<MailTools> for Controller {
    fn from(config: MailTools) -> Self {
        Self {
            spool: Spool::new(config.spool),
            client: Client::new(config.client),
            server: config.server,
        }
    }
}

impl Controller {
    pub const fn spool(&self) -> &Spool {
        &self.spool
    }

    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Prepare the spool and bind a server that spools what it receives.
    ///
    /// # Errors
    ///
    /// If the spool cannot be initialised or the address cannot be bound.
    pub async fn bind(&self) -> anyhow::Result<Server<SpoolHandler>> {
        self.spool.init().await?;
        Ok(Server::bind(&self.server, SpoolHandler::new(self.spool.clone())).await?)
    }

    /// Receive messages into the spool until interrupted.
    ///
    /// # Errors
    ///
    /// If the server cannot start, or accepting connections fails.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn serve(self) -> anyhow::Result<()> {
        let server = self.bind().await?;
        internal!("Controller running");

        let ret = tokio::select! {
            r = server.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }

    /// Write `message` into the spool.
    ///
    /// # Errors
    ///
    /// If the spool cannot be initialised or written.
    pub async fn enqueue(&self, message: &Message) -> anyhow::Result<SpoolEntryName> {
        self.spool.init().await?;
        Ok(self.spool.enqueue(message).await?)
    }

    /// Deliver the queue file at `path` straight through the client,
    /// leaving the spool untouched.
    ///
    /// # Errors
    ///
    /// If the file is unreadable or malformed, or delivery is not accepted.
    pub async fn send(&self, path: &Path) -> anyhow::Result<Response> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read queue file {}", path.display()))?;
        let message = queue_file::deserialize(&text)
            .with_context(|| format!("Failed to parse queue file {}", path.display()))?;

        handlers::deliver(&self.client, &message).await
    }

    /// Deliver every due spool entry through the client. Failed deliveries
    /// are deferred and the pass carries on with the rest.
    ///
    /// # Errors
    ///
    /// If the spool cannot be read or an entry cannot be moved.
    pub async fn flush(&self) -> anyhow::Result<FlushReport> {
        self.spool.init().await?;

        let mut report = FlushReport::default();
        let delivered = AtomicUsize::new(0);

        loop {
            let client = &self.client;
            let counter = &delivered;

            let pass = self
                .spool
                .process(move |message| async move {
                    handlers::deliver(client, &message).await?;
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok::<(), anyhow::Error>(())
                })
                .await;

            match pass {
                Ok(_) => break,
                Err(SpoolError::Handler { entry, source }) => {
                    internal!(level = WARN, "Delivery of {entry} failed: {source}");
                    report.failed += 1;
                }
                Err(err @ SpoolError::MalformedQueueFile { .. }) => {
                    internal!(level = WARN, "Skipped malformed spool entry: {err}");
                    report.malformed += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        report.delivered = delivered.into_inner();
        internal!(level = INFO, "Flushed spool: {report}");
        Ok(report)
    }
}
