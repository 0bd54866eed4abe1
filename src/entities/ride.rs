use serde::{Deserialize, Serialize};

use crate::entities::Coordinates;
use crate::error::{malformed_event_error, Error};

/// Payload published on `rides.created` when a passenger orders a ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RideRequestEvent {
    pub ride_id: String,
    pub user_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
}

impl RideRequestEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(payload).map_err(malformed_event_error)
    }

    pub fn pickup(&self) -> Coordinates {
        Coordinates::new(self.pickup_latitude, self.pickup_longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MALFORMED_EVENT;

    #[test]
    fn parses_wire_payload() {
        let event = RideRequestEvent::from_slice(
            br#"{"ride_id":"r1","user_id":"u1","pickup_latitude":55.751,"pickup_longitude":37.611}"#,
        )
        .unwrap();

        assert_eq!(event.ride_id, "r1");
        assert_eq!(event.user_id, "u1");
        assert_eq!(event.pickup(), Coordinates::new(55.751, 37.611));
    }

    #[test]
    fn rejects_missing_ride_id() {
        let err = RideRequestEvent::from_slice(
            br#"{"user_id":"u1","pickup_latitude":55.751,"pickup_longitude":37.611}"#,
        )
        .unwrap_err();

        assert_eq!(err.code, MALFORMED_EVENT);
        assert!(err.message.contains("ride_id"));
    }

    #[test]
    fn rejects_other_shapes() {
        for payload in [
            &b"not json"[..],
            br#"{"ride_id":"r1","user_id":"u1","pickup_latitude":"north","pickup_longitude":37.6}"#,
            br#"{"ride_id":"r1","user_id":"u1","pickup_latitude":55.7,"pickup_longitude":37.6,"fare":10}"#,
        ] {
            assert_eq!(
                RideRequestEvent::from_slice(payload).unwrap_err().code,
                MALFORMED_EVENT
            );
        }
    }
}
