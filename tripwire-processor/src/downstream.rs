use async_trait::async_trait;
use tripwire_common::tracing::info;
use tripwire_queue::Message;

/// Work performed on a message once the dependency is healthy
///
/// Failures are logged by the controller and do not change the outcome of
/// the message.
#[async_trait]
pub trait Downstream: Send + Sync + std::fmt::Debug {
    /// # Errors
    ///
    /// Any failure of the downstream work.
    async fn process(&self, message: &Message) -> anyhow::Result<()>;
}

/// Downstream that only logs what it received
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDownstream;

#[async_trait]
impl Downstream for LogDownstream {
    async fn process(&self, message: &Message) -> anyhow::Result<()> {
        info!(
            sequence_number = ?message.sequence_number(),
            body_len = message.body().len(),
            "Processed message"
        );
        Ok(())
    }
}
