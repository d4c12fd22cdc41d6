//! Glue between the spool and the QMQP client and server.

use async_trait::async_trait;
use mailtools_common::{Message, internal};
use mailtools_qmqp::{Client, Delivery, MessageHandler, Response, Status};
use mailtools_spool::Spool;

/// Enqueues every message the server receives.
#[derive(Debug, Clone)]
pub struct SpoolHandler {
    spool: Spool,
}

impl SpoolHandler {
    pub const fn new(spool: Spool) -> Self {
        Self { spool }
    }
}

#[async_trait]
impl MessageHandler for SpoolHandler {
    async fn handle(&self, message: Message) -> anyhow::Result<()> {
        let name = self.spool.enqueue(&message).await?;
        internal!(level = DEBUG, "Spooled received message as {name}");
        Ok(())
    }
}

/// Deliver `message` and insist on a `K` reply.
///
/// # Errors
///
/// If no server took the message, or the reply was a temporary or
/// permanent failure, unknown, or not a netstring at all.
pub async fn deliver(client: &Client, message: &Message) -> anyhow::Result<Response> {
    match client.deliver(message).await {
        Delivery::Sent { server, response } => match response.status {
            Status::Accepted => Ok(response),
            Status::TemporaryFailure => {
                anyhow::bail!("{server} deferred the message: {}", response.message())
            }
            Status::PermanentFailure => {
                anyhow::bail!("{server} refused the message: {}", response.message())
            }
            Status::Unknown | Status::Raw => {
                anyhow::bail!("{server} sent an unrecognised reply: {response}")
            }
        },
        failed @ Delivery::Failed { .. } => Err(anyhow::anyhow!("{failed}")),
    }
}
