use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{api::AssignmentStore, entities::AssignmentOutcome, error::Error};

/// Process-local assignment record. Survives redelivery but not restarts.
#[derive(Debug, Default)]
pub struct MemoryAssignmentStore {
    assignments: Mutex<HashMap<String, AssignmentOutcome>>,
}

impl MemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssignmentStore for MemoryAssignmentStore {
    async fn find_assignment(&self, ride_id: &str) -> Result<Option<AssignmentOutcome>, Error> {
        Ok(self.assignments.lock().await.get(ride_id).cloned())
    }

    async fn record_assignment(
        &self,
        outcome: AssignmentOutcome,
    ) -> Result<AssignmentOutcome, Error> {
        let mut assignments = self.assignments.lock().await;

        Ok(assignments
            .entry(outcome.ride_id.clone())
            .or_insert(outcome)
            .clone())
    }
}
