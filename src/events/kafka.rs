use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use crate::{
    api::{Delivery, EventSource},
    error::{broker_read_error, publish_error, Error},
};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka-backed event source: a group consumer subscribed to one topic, with
/// manual offset commits, plus a producer for outgoing events. Commits and
/// seeks block, so it needs the multi-threaded runtime.
pub struct KafkaEventSource {
    consumer: StreamConsumer,
    producer: FutureProducer,
}

impl KafkaEventSource {
    #[tracing::instrument(name = "KafkaEventSource::new")]
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, Error> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("fetch.min.bytes", "10000")
            .set("fetch.message.max.bytes", "10000000")
            .create()?;

        consumer.subscribe(&[topic])?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()
            .map_err(publish_error)?;

        tracing::info!("subscribed to {} as group {}", topic, group_id);

        Ok(Self {
            consumer,
            producer,
        })
    }
}

#[async_trait]
impl EventSource for KafkaEventSource {
    async fn poll(&self) -> Result<Delivery, Error> {
        let message = self.consumer.recv().await.map_err(broker_read_error)?;

        Ok(Delivery {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), Error> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &delivery.topic,
            delivery.partition,
            Offset::Offset(delivery.offset + 1),
        )?;

        // librdkafka blocks until the broker answers
        tokio::task::block_in_place(|| self.consumer.commit(&offsets, CommitMode::Sync))?;

        Ok(())
    }

    // Rewinding the partition makes the next poll return the same message.
    async fn release(&self, delivery: &Delivery) -> Result<(), Error> {
        tokio::task::block_in_place(|| {
            self.consumer.seek(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset),
                SEEK_TIMEOUT,
            )
        })?;

        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<(), Error> {
        let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(err, _)| publish_error(err))?;

        tracing::debug!(
            "published to {} partition={} offset={}",
            topic,
            partition,
            offset
        );

        Ok(())
    }
}
