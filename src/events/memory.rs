use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::{
    api::{Delivery, EventSource},
    error::{broker_read_error, Error},
};

#[derive(Clone, Debug)]
struct Record {
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct State {
    logs: HashMap<String, Vec<Vec<Record>>>,
    positions: Vec<i64>,
    committed: Vec<i64>,
    next_partition: usize,
}

/// Partitioned in-process log subscribed to a single topic on behalf of one
/// consumer-group member. Offsets behave like Kafka's: the committed offset of
/// a partition is the offset of the next message to process.
#[derive(Debug)]
pub struct MemoryEventSource {
    topic: String,
    partitions: usize,
    state: Mutex<State>,
    notify: Notify,
    failing_polls: AtomicU32,
    failing_commits: AtomicU32,
}

impl MemoryEventSource {
    pub fn new(topic: &str, partitions: usize) -> Self {
        let partitions = partitions.max(1);

        Self {
            topic: topic.into(),
            partitions,
            state: Mutex::new(State {
                logs: HashMap::new(),
                positions: vec![0; partitions],
                committed: vec![0; partitions],
                next_partition: 0,
            }),
            notify: Notify::new(),
            failing_polls: AtomicU32::new(0),
            failing_commits: AtomicU32::new(0),
        }
    }

    /// Makes the next `count` polls fail as if the broker were unreachable.
    pub fn fail_next_polls(&self, count: u32) {
        self.failing_polls.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` commits fail without moving the committed offset.
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub async fn committed_offset(&self, partition: i32) -> i64 {
        self.state.lock().await.committed[partition as usize]
    }

    /// All payloads published to `topic`, partition by partition.
    pub async fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        let state = self.state.lock().await;

        state
            .logs
            .get(topic)
            .map(|partitions| {
                partitions
                    .iter()
                    .flatten()
                    .map(|record| record.payload.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn partition_for(&self, key: Option<&[u8]>, fallback: usize) -> usize {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.partitions as u64) as usize
            }
            None => fallback % self.partitions,
        }
    }

    fn next_delivery(&self, state: &mut State) -> Option<Delivery> {
        let partitions = state.logs.get(&self.topic)?;

        for step in 0..self.partitions {
            let partition = (state.next_partition + step) % self.partitions;
            let position = state.positions[partition];

            if let Some(record) = partitions[partition].get(position as usize) {
                let delivery = Delivery {
                    topic: self.topic.clone(),
                    partition: partition as i32,
                    offset: position,
                    key: record.key.clone(),
                    payload: record.payload.clone(),
                };

                state.positions[partition] = position + 1;
                state.next_partition = (partition + 1) % self.partitions;

                return Some(delivery);
            }
        }

        None
    }
}

fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn poll(&self) -> Result<Delivery, Error> {
        loop {
            if take_failure(&self.failing_polls) {
                return Err(broker_read_error("broker transport failure"));
            }

            if let Some(delivery) = self.next_delivery(&mut *self.state.lock().await) {
                return Ok(delivery);
            }

            self.notify.notified().await;
        }
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), Error> {
        if take_failure(&self.failing_commits) {
            return Err(broker_read_error("offset commit failed"));
        }

        let mut state = self.state.lock().await;
        let committed = &mut state.committed[delivery.partition as usize];
        *committed = (*committed).max(delivery.offset + 1);

        Ok(())
    }

    async fn release(&self, delivery: &Delivery) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let position = &mut state.positions[delivery.partition as usize];
        *position = (*position).min(delivery.offset);
        drop(state);

        self.notify.notify_one();

        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let fallback = state.logs.get(topic).map_or(0, |p| p.iter().map(Vec::len).sum());
        let partition = self.partition_for(key, fallback);

        state
            .logs
            .entry(topic.to_string())
            .or_insert_with(|| vec![vec![]; self.partitions])[partition]
            .push(Record {
                key: key.map(<[u8]>::to_vec),
                payload: payload.to_vec(),
            });
        drop(state);

        if topic == self.topic {
            self.notify.notify_one();
        }

        Ok(())
    }
}
