use async_trait::async_trait;

use super::Engine;
use crate::{
    api::{Delivery, Handler},
    entities::{AssignmentOutcome, DriverLocation, RideRequestEvent},
    error::{store_unavailable_error, unexpected_error, Error},
};

/// Progress of a single ride request through the matcher. The last step,
/// `Acknowledged`, is reached when the consumer commits the event's offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchState {
    Received,
    Validated,
    Queried,
    Selected,
    NoneAvailable,
    Malformed,
    Acknowledged,
}

impl Engine {
    /// Runs one ride-request payload through validation, proximity search and
    /// driver selection, then records and publishes the outcome.
    #[tracing::instrument(skip_all)]
    pub async fn match_ride(&self, payload: &[u8]) -> Result<AssignmentOutcome, Error> {
        let mut state = MatchState::Received;

        let event = match RideRequestEvent::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                transition(&mut state, MatchState::Malformed);
                return Err(err);
            }
        };
        transition(&mut state, MatchState::Validated);

        tracing::info!(
            "new ride {} for user {}, pickup: {}, {}",
            event.ride_id,
            event.user_id,
            event.pickup_latitude,
            event.pickup_longitude
        );

        // a redelivered ride keeps the driver it was given the first time
        if let Some(existing) = self.store.find_assignment(&event.ride_id).await? {
            tracing::info!("ride {} was already matched, republishing", event.ride_id);
            self.publish(&existing).await?;
            return Ok(existing);
        }

        let candidates = self.find_candidates(&event).await?;
        transition(&mut state, MatchState::Queried);

        let outcome = match self.policy.select(&candidates) {
            None => {
                transition(&mut state, MatchState::NoneAvailable);
                tracing::info!("no drivers near ride {}", event.ride_id);
                AssignmentOutcome::none_available(&event)
            }
            Some(driver) => {
                transition(&mut state, MatchState::Selected);
                tracing::info!(
                    "assigned driver {} ({:.3} km away) to ride {}",
                    driver.driver_id,
                    driver.distance_km,
                    event.ride_id
                );
                self.store
                    .record_assignment(AssignmentOutcome::assigned(&event, driver))
                    .await?
            }
        };

        self.publish(&outcome).await?;

        Ok(outcome)
    }

    async fn find_candidates(&self, event: &RideRequestEvent) -> Result<Vec<DriverLocation>, Error> {
        let query = self
            .geo
            .find_nearby(event.pickup(), self.config.search_radius_km);

        tokio::time::timeout(self.config.query_timeout, query)
            .await
            .map_err(|_| {
                store_unavailable_error(format!(
                    "query timed out after {:?}",
                    self.config.query_timeout
                ))
            })?
    }

    async fn publish(&self, outcome: &AssignmentOutcome) -> Result<(), Error> {
        let payload = serde_json::to_vec(outcome).map_err(unexpected_error)?;

        self.events
            .publish(
                &self.assignments_topic,
                Some(outcome.ride_id.as_bytes()),
                &payload,
            )
            .await
    }
}

fn transition(state: &mut MatchState, next: MatchState) {
    tracing::debug!("{:?} -> {:?}", state, next);
    *state = next;
}

#[async_trait]
impl Handler for Engine {
    async fn handle(&self, delivery: &Delivery) -> Result<(), Error> {
        self.match_ride(&delivery.payload)
            .await
            .map(|_| ())
            .map_err(|err| {
                tracing::error!(
                    "failed to match message at {}/{}@{}: {}",
                    delivery.topic,
                    delivery.partition,
                    delivery.offset,
                    err
                );
                err
            })
    }

    fn acknowledged(&self, delivery: &Delivery) {
        tracing::info!(
            "message at {}/{}@{} is {:?}",
            delivery.topic,
            delivery.partition,
            delivery.offset,
            MatchState::Acknowledged
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AssignmentStore, EventSource, GeoIndex};
    use crate::config::{ConsumerConfig, MatchingConfig};
    use crate::engine::{Nearest, PolicyKind};
    use crate::entities::{Coordinates, Outcome};
    use crate::error::{MALFORMED_EVENT, STORE_UNAVAILABLE};
    use crate::events::{EventConsumer, MemoryEventSource, Step};
    use crate::geo::MemoryGeoIndex;
    use crate::store::MemoryAssignmentStore;
    use std::sync::Arc;
    use std::time::Duration;

    const RIDES: &str = "rides.created";
    const ASSIGNED: &str = "rides.assigned";
    const RIDE_R1: &[u8] =
        br#"{"ride_id":"r1","user_id":"u1","pickup_latitude":55.751,"pickup_longitude":37.611}"#;

    struct Harness {
        geo: Arc<MemoryGeoIndex>,
        source: Arc<MemoryEventSource>,
        store: Arc<MemoryAssignmentStore>,
        engine: Engine,
        consumer: EventConsumer,
    }

    fn harness(config: MatchingConfig) -> Harness {
        let geo = Arc::new(MemoryGeoIndex::new());
        let source = Arc::new(MemoryEventSource::new(RIDES, 1));
        let store = Arc::new(MemoryAssignmentStore::new());

        let engine = Engine::new(geo.clone(), source.clone(), store.clone(), config, ASSIGNED);
        let consumer = EventConsumer::new(source.clone(), ConsumerConfig::default());

        Harness {
            geo,
            source,
            store,
            engine,
            consumer,
        }
    }

    async fn published(source: &MemoryEventSource) -> Vec<AssignmentOutcome> {
        source
            .messages(ASSIGNED)
            .await
            .iter()
            .map(|payload| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn matches_nearby_driver_end_to_end() {
        let mut h = harness(MatchingConfig::default());
        h.geo
            .report("d1", Coordinates::new(55.75, 37.61))
            .await
            .unwrap();
        h.source.publish(RIDES, Some(&b"r1"[..]), RIDE_R1).await.unwrap();

        let step = h.consumer.step(&h.engine).await.unwrap();

        assert_eq!(step, Step::Committed);
        assert_eq!(h.source.committed_offset(0).await, 1);

        let outcomes = published(&h.source).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].ride_id, "r1");
        assert_eq!(outcomes[0].user_id, "u1");
        assert_eq!(outcomes[0].driver_id(), Some("d1"));
    }

    #[tokio::test]
    async fn no_drivers_is_acknowledged_without_selection() {
        let mut h = harness(MatchingConfig::default());
        h.geo
            .report("far", Coordinates::new(59.93, 30.33))
            .await
            .unwrap();
        h.source.publish(RIDES, None, RIDE_R1).await.unwrap();

        let step = h.consumer.step(&h.engine).await.unwrap();

        assert_eq!(step, Step::Committed);
        assert_eq!(h.source.committed_offset(0).await, 1);

        let outcomes = published(&h.source).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, Outcome::NoneAvailable);
        assert_eq!(outcomes[0].driver_id(), None);
        assert!(h.store.find_assignment("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_event_is_not_committed_and_redelivered() {
        let mut h = harness(MatchingConfig::default());
        let missing_ride_id =
            br#"{"user_id":"u1","pickup_latitude":55.751,"pickup_longitude":37.611}"#;
        h.source.publish(RIDES, None, missing_ride_id).await.unwrap();

        let err = h.engine.match_ride(missing_ride_id).await.unwrap_err();
        assert_eq!(err.code, MALFORMED_EVENT);

        assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::Released);
        assert_eq!(h.source.committed_offset(0).await, 0);

        // the same offset comes back on the next poll
        assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::Released);
        assert_eq!(h.source.committed_offset(0).await, 0);
        assert!(published(&h.source).await.is_empty());
    }

    #[tokio::test]
    async fn store_outage_is_retried_until_it_recovers() {
        let mut h = harness(MatchingConfig::default());
        h.geo
            .report("d1", Coordinates::new(55.75, 37.61))
            .await
            .unwrap();
        h.source.publish(RIDES, None, RIDE_R1).await.unwrap();

        h.geo.set_available(false);
        let err = h.engine.match_ride(RIDE_R1).await.unwrap_err();
        assert_eq!(err.code, STORE_UNAVAILABLE);
        assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::Released);

        h.geo.set_available(true);
        assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::Committed);
        assert_eq!(published(&h.source).await[0].driver_id(), Some("d1"));
    }

    #[tokio::test]
    async fn long_store_outage_does_not_drop_the_ride() {
        let mut h = harness(MatchingConfig::default());
        h.geo
            .report("d1", Coordinates::new(55.75, 37.61))
            .await
            .unwrap();
        h.source.publish(RIDES, None, RIDE_R1).await.unwrap();

        h.geo.set_available(false);
        for _ in 0..ConsumerConfig::default().max_deliveries * 2 {
            assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::Released);
        }

        h.geo.set_available(true);
        assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::Committed);

        assert!(h.source.messages("rides.created.dlq").await.is_empty());
        assert_eq!(published(&h.source).await[0].driver_id(), Some("d1"));
        assert!(h.store.find_assignment("r1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_event_is_dead_lettered_after_max_deliveries() {
        let mut h = harness(MatchingConfig::default());
        h.source.publish(RIDES, None, b"not json").await.unwrap();

        let max = ConsumerConfig::default().max_deliveries;
        for _ in 1..max {
            assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::Released);
        }
        assert_eq!(h.consumer.step(&h.engine).await.unwrap(), Step::DeadLettered);

        assert_eq!(
            h.source.messages("rides.created.dlq").await,
            vec![b"not json".to_vec()]
        );
        assert_eq!(h.source.committed_offset(0).await, 1);
    }

    #[tokio::test]
    async fn redelivered_ride_keeps_its_driver() {
        let h = harness(MatchingConfig::default());
        for (id, lon) in [("d1", 37.610), ("d2", 37.612), ("d3", 37.614)] {
            h.geo
                .report(id, Coordinates::new(55.751, lon))
                .await
                .unwrap();
        }

        let first = h.engine.match_ride(RIDE_R1).await.unwrap();
        for _ in 0..10 {
            let again = h.engine.match_ride(RIDE_R1).await.unwrap();
            assert_eq!(again.driver_id(), first.driver_id());
            assert_eq!(again.id, first.id);
        }

        let outcomes = published(&h.source).await;
        assert_eq!(outcomes.len(), 11);
        assert!(outcomes.iter().all(|o| o.driver_id() == first.driver_id()));
    }

    #[tokio::test]
    async fn nearest_policy_picks_closest_driver() {
        let config = MatchingConfig {
            policy: PolicyKind::Nearest,
            ..MatchingConfig::default()
        };
        let h = harness(config);
        h.geo
            .report("close", Coordinates::new(55.7511, 37.6111))
            .await
            .unwrap();
        h.geo
            .report("further", Coordinates::new(55.76, 37.611))
            .await
            .unwrap();

        let outcome = h.engine.match_ride(RIDE_R1).await.unwrap();
        assert_eq!(outcome.driver_id(), Some("close"));

        let engine = h.engine.with_policy(Box::new(Nearest));
        let outcome = engine.match_ride(RIDE_R1).await.unwrap();
        assert_eq!(outcome.driver_id(), Some("close"));
    }

    #[tokio::test]
    async fn search_radius_is_configurable() {
        let config = MatchingConfig {
            search_radius_km: 0.05,
            ..MatchingConfig::default()
        };
        let h = harness(config);
        h.geo
            .report("d1", Coordinates::new(55.75, 37.61))
            .await
            .unwrap();

        let outcome = h.engine.match_ride(RIDE_R1).await.unwrap();
        assert_eq!(outcome.outcome, Outcome::NoneAvailable);
    }

    struct StuckGeo;

    #[async_trait]
    impl GeoIndex for StuckGeo {
        async fn report(&self, _: &str, _: Coordinates) -> Result<(), Error> {
            Ok(())
        }

        async fn remove(&self, _: &str) -> Result<bool, Error> {
            Ok(false)
        }

        async fn find_nearby(&self, _: Coordinates, _: f64) -> Result<Vec<DriverLocation>, Error> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn slow_geo_query_times_out() {
        let source = Arc::new(MemoryEventSource::new(RIDES, 1));
        let config = MatchingConfig {
            query_timeout: Duration::from_millis(20),
            ..MatchingConfig::default()
        };
        let engine = Engine::new(
            Arc::new(StuckGeo),
            source.clone(),
            Arc::new(MemoryAssignmentStore::new()),
            config,
            ASSIGNED,
        );

        let err = engine.match_ride(RIDE_R1).await.unwrap_err();
        assert_eq!(err.code, STORE_UNAVAILABLE);
        assert!(source.messages(ASSIGNED).await.is_empty());
    }
}
