use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{DriverLocation, RideRequestEvent};

/// Result of matching a single ride, published on `rides.assigned`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub id: Uuid,
    pub ride_id: String,
    pub user_id: String,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Outcome {
    Assigned { driver_id: String, distance_km: f64 },
    NoneAvailable,
}

impl Outcome {
    pub fn name(&self) -> String {
        match self {
            Self::Assigned { .. } => "assigned".into(),
            Self::NoneAvailable => "none_available".into(),
        }
    }
}

impl AssignmentOutcome {
    pub fn assigned(event: &RideRequestEvent, driver: &DriverLocation) -> Self {
        Self::new(
            event,
            Outcome::Assigned {
                driver_id: driver.driver_id.clone(),
                distance_km: driver.distance_km,
            },
        )
    }

    pub fn none_available(event: &RideRequestEvent) -> Self {
        Self::new(event, Outcome::NoneAvailable)
    }

    fn new(event: &RideRequestEvent, outcome: Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id: event.ride_id.clone(),
            user_id: event.user_id.clone(),
            outcome,
            timestamp: Utc::now(),
        }
    }

    pub fn driver_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Assigned { driver_id, .. } => Some(driver_id),
            Outcome::NoneAvailable => None,
        }
    }
}

#[test]
fn none_available_has_no_driver() {
    let event = RideRequestEvent {
        ride_id: "r1".into(),
        user_id: "u1".into(),
        pickup_latitude: 55.751,
        pickup_longitude: 37.611,
    };

    let outcome = AssignmentOutcome::none_available(&event);
    assert_eq!(outcome.driver_id(), None);

    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["outcome"], serde_json::json!({"name": "none_available"}));
    assert_eq!(value["ride_id"], "r1");
}
