use std::future::Future;

use async_trait::async_trait;
use mailtools_common::Message;

/// Receives every message a [`Server`](crate::server::Server) decodes.
///
/// Sessions run concurrently, so one handler may be running several
/// messages at once.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> anyhow::Result<()> {
        self(message).await
    }
}
