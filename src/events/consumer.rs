use std::collections::HashMap;

use tokio::sync::watch;

use super::Backoff;
use crate::{
    api::{Delivery, DynEventSource, Handler},
    config::ConsumerConfig,
    error::{Error, MALFORMED_EVENT},
};

/// What happened to a single delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Handled and its offset committed.
    Committed,
    /// Handled, but the commit failed; it may be delivered again.
    CommitFailed,
    /// Handler failed; left uncommitted for redelivery on the next poll.
    Released,
    /// Payload kept failing validation; parked on the dead-letter topic and committed.
    DeadLettered,
}

type PartitionId = (String, i32);

/// Sequential pull, handle, acknowledge loop over an [`EventSource`].
///
/// Only malformed payloads count towards `max_deliveries`. Any other handler
/// failure (store or broker trouble) is retried without limit, with backoff.
///
/// [`EventSource`]: crate::api::EventSource
pub struct EventConsumer {
    source: DynEventSource,
    config: ConsumerConfig,
    // a failing message blocks its partition, so one counter per partition is enough
    attempts: HashMap<PartitionId, (i64, u32)>,
}

impl EventConsumer {
    pub fn new(source: DynEventSource, config: ConsumerConfig) -> Self {
        Self {
            source,
            config,
            attempts: HashMap::new(),
        }
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped. The
    /// signal is observed between deliveries; a handler that is already
    /// running is allowed to finish.
    pub async fn run<H>(&mut self, handler: &H, mut shutdown: watch::Receiver<bool>)
    where
        H: Handler + Send + Sync,
    {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);

        tracing::info!("consumer loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.source.poll() => result,
            };

            let delay = match result {
                Ok(delivery) => match self.dispatch(handler, delivery).await {
                    Step::Released => {
                        let delay = backoff.next_delay();
                        tracing::debug!("redelivering in {:?}", delay);
                        delay
                    }
                    _ => {
                        backoff.reset();
                        continue;
                    }
                },
                Err(err) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("failed to read message, retrying in {:?}: {}", delay, err);
                    delay
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("consumer loop stopped");
    }

    /// Polls a single message and processes it.
    pub async fn step<H>(&mut self, handler: &H) -> Result<Step, Error>
    where
        H: Handler + Send + Sync,
    {
        let delivery = self.source.poll().await?;

        Ok(self.dispatch(handler, delivery).await)
    }

    #[tracing::instrument(
        skip_all,
        fields(topic = %delivery.topic, partition = delivery.partition, offset = delivery.offset)
    )]
    async fn dispatch<H>(&mut self, handler: &H, delivery: Delivery) -> Step
    where
        H: Handler + Send + Sync,
    {
        tracing::debug!("received message");

        let err = match handler.handle(&delivery).await {
            Ok(()) => {
                let step = self.acknowledge(&delivery).await;
                if step == Step::Committed {
                    handler.acknowledged(&delivery);
                }
                return step;
            }
            Err(err) => err,
        };

        if err.code != MALFORMED_EVENT {
            tracing::warn!("handler failed, will retry: {}", err);
            return self.release(&delivery).await;
        }

        let attempts = self.record_attempt(&delivery);
        tracing::warn!("malformed message (attempt {}): {}", attempts, err);

        if self.config.max_deliveries > 0 && attempts >= self.config.max_deliveries {
            match self.dead_letter(&delivery).await {
                Ok(()) => {
                    return match self.acknowledge(&delivery).await {
                        Step::Committed => Step::DeadLettered,
                        step => step,
                    };
                }
                Err(err) => tracing::error!("failed to dead-letter message: {}", err),
            }
        }

        self.release(&delivery).await
    }

    async fn acknowledge(&mut self, delivery: &Delivery) -> Step {
        self.attempts.remove(&partition_id(delivery));

        match self.source.commit(delivery).await {
            Ok(()) => {
                tracing::debug!("acknowledged");
                Step::Committed
            }
            Err(err) => {
                tracing::error!("failed to commit offset: {}", err);
                Step::CommitFailed
            }
        }
    }

    async fn release(&self, delivery: &Delivery) -> Step {
        if let Err(err) = self.source.release(delivery).await {
            tracing::error!("failed to rewind for redelivery: {}", err);
        }

        Step::Released
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<(), Error> {
        self.source
            .publish(
                &self.config.dead_letter_topic,
                delivery.key.as_deref(),
                &delivery.payload,
            )
            .await?;

        tracing::warn!(
            "moved message to {} after {} attempts",
            self.config.dead_letter_topic,
            self.config.max_deliveries
        );

        Ok(())
    }

    fn record_attempt(&mut self, delivery: &Delivery) -> u32 {
        let entry = self
            .attempts
            .entry(partition_id(delivery))
            .or_insert((delivery.offset, 0));

        // a different offset means the partition moved on (or was reassigned)
        if entry.0 != delivery.offset {
            *entry = (delivery.offset, 0);
        }

        entry.1 += 1;
        entry.1
    }
}

fn partition_id(delivery: &Delivery) -> PartitionId {
    (delivery.topic.clone(), delivery.partition)
}
