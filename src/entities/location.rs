use geo_types::Point;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<Coordinates> for Point<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Point::new(coordinates.longitude, coordinates.latitude)
    }
}

/// A driver's last reported position, as returned by a proximity query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
    pub driver_id: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

#[test]
fn point_uses_longitude_as_x() {
    let point: Point<f64> = Coordinates::new(55.75, 37.61).into();
    assert_eq!(point.x(), 37.61);
    assert_eq!(point.y(), 55.75);
}

#[test]
fn driver_location_wire_format() {
    let location = DriverLocation {
        driver_id: "d1".into(),
        lat: 55.75,
        lon: 37.61,
        distance_km: 0.13,
    };

    let value = serde_json::to_value(&location).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"driver_id": "d1", "lat": 55.75, "lon": 37.61, "distance_km": 0.13})
    );
}
