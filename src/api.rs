use std::sync::Arc;

use async_trait::async_trait;

use crate::entities::{AssignmentOutcome, Coordinates, DriverLocation};
use crate::error::Error;

#[async_trait]
pub trait GeoIndex {
    async fn report(&self, driver_id: &str, coordinates: Coordinates) -> Result<(), Error>;
    async fn remove(&self, driver_id: &str) -> Result<bool, Error>;
    async fn find_nearby(
        &self,
        coordinates: Coordinates,
        radius_km: f64,
    ) -> Result<Vec<DriverLocation>, Error>;
}

/// A message read from a partitioned topic.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait EventSource {
    async fn poll(&self) -> Result<Delivery, Error>;
    async fn commit(&self, delivery: &Delivery) -> Result<(), Error>;
    async fn release(&self, delivery: &Delivery) -> Result<(), Error>;
    async fn publish(&self, topic: &str, key: Option<&[u8]>, payload: &[u8])
        -> Result<(), Error>;
}

#[async_trait]
pub trait AssignmentStore {
    async fn find_assignment(&self, ride_id: &str) -> Result<Option<AssignmentOutcome>, Error>;

    /// Stores the outcome unless one already exists for the ride, returning
    /// whichever outcome is on record afterwards.
    async fn record_assignment(
        &self,
        outcome: AssignmentOutcome,
    ) -> Result<AssignmentOutcome, Error>;
}

#[async_trait]
pub trait Handler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), Error>;

    /// Called once the offset of a successfully handled delivery is committed.
    fn acknowledged(&self, _delivery: &Delivery) {}
}

pub type DynGeoIndex = Arc<dyn GeoIndex + Send + Sync>;
pub type DynEventSource = Arc<dyn EventSource + Send + Sync>;
pub type DynAssignmentStore = Arc<dyn AssignmentStore + Send + Sync>;
