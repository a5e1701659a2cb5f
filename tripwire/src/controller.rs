use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};

use serde::Deserialize;
use tokio::sync::broadcast;
use tripwire_common::{Signal, internal, logging, tracing};
use tripwire_processor::{Collaborators, HealthChecker, LogDownstream, MessageProcessor};
use tripwire_queue::{Message, MemoryQueue, MessageScheduler, PropertyValue, QueueConfig};

/// Static health verdict for the downstream dependency
///
/// Defaults to unhealthy, so every delivered message walks the retry chain
/// until the circuit opens.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub healthy: bool,
}

/// A message placed on the queue before the processor starts
#[derive(Debug, Clone, Deserialize)]
pub struct SeedMessage {
    pub body: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl From<SeedMessage> for Message {
    fn from(seed: SeedMessage) -> Self {
        seed.properties
            .into_iter()
            .fold(Self::new(seed.body), |message, (key, value)| {
                message.with_property(key, value)
            })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Tripwire {
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    processor: MessageProcessor,
    #[serde(default)]
    health: HealthConfig,
    #[serde(alias = "seeds", default)]
    seed: Vec<SeedMessage>,
}

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

impl Tripwire {
    pub const fn processor(&self) -> &MessageProcessor {
        &self.processor
    }

    /// Build the queue, wire the processor to it, and enqueue any seed messages
    ///
    /// # Errors
    ///
    /// Fails if the processor configuration is invalid or a seed message
    /// cannot be sent.
    pub async fn prepare(&mut self) -> anyhow::Result<Arc<MemoryQueue>> {
        let queue = Arc::new(self.queue.clone().into_memory_queue());

        self.processor.init(Collaborators {
            receiver: queue.clone(),
            scheduler: queue.clone(),
            admin: queue.clone(),
            health: Arc::new(HealthChecker::new(self.health.healthy)),
            downstream: Arc::new(LogDownstream),
        })?;

        for seed in self.seed.drain(..) {
            let sequence_number = queue.send(seed.into()).await?;
            internal!("Seeded message {sequence_number} on {}", queue.entity());
        }

        Ok(queue)
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if the processor fails to
    /// initialise, or if it cannot reach its queue entity at startup.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init()?;

        internal!("Controller running");

        self.prepare().await?;

        let ret = tokio::select! {
            r = self.processor.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down... {:?}", self.processor.stats());

        ret
    }
}
