use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::geo::{Coord, RadiusOptions, RadiusOrder, RadiusSearchResult, Unit};
use redis::AsyncCommands;

use super::DRIVERS_KEY;
use crate::{
    api::GeoIndex,
    entities::{Coordinates, DriverLocation},
    error::{invalid_parameters_error, Error},
};

/// Geo index backed by a Redis sorted set and the GEO command family.
///
/// The connection is re-established in the background after it drops; the
/// command that observed the failure still returns `StoreUnavailable`.
#[derive(Clone)]
pub struct RedisGeoIndex {
    conn: ConnectionManager,
    key: String,
}

impl RedisGeoIndex {
    #[tracing::instrument(name = "RedisGeoIndex::connect", skip_all)]
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!("connected to redis: {}", pong);

        Ok(Self {
            conn,
            key: DRIVERS_KEY.into(),
        })
    }

    fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl GeoIndex for RedisGeoIndex {
    #[tracing::instrument(skip(self))]
    async fn report(&self, driver_id: &str, coordinates: Coordinates) -> Result<(), Error> {
        let mut conn = self.connection();

        let _: i64 = conn
            .geo_add(
                &self.key,
                (
                    Coord::lon_lat(coordinates.longitude, coordinates.latitude),
                    driver_id,
                ),
            )
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, driver_id: &str) -> Result<bool, Error> {
        let mut conn = self.connection();

        let removed: i64 = conn.zrem(&self.key, driver_id).await?;

        Ok(removed > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn find_nearby(
        &self,
        coordinates: Coordinates,
        radius_km: f64,
    ) -> Result<Vec<DriverLocation>, Error> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(invalid_parameters_error("radius must be a non-negative number"));
        }

        let mut conn = self.connection();

        let options = RadiusOptions::default()
            .with_dist()
            .with_coord()
            .order(RadiusOrder::Asc);

        let results: Vec<RadiusSearchResult> = conn
            .geo_radius(
                &self.key,
                coordinates.longitude,
                coordinates.latitude,
                radius_km,
                Unit::Kilometers,
                options,
            )
            .await?;

        let drivers: Vec<DriverLocation> = results.into_iter().filter_map(to_location).collect();

        tracing::info!(
            "found {} drivers within {:.1} km",
            drivers.len(),
            radius_km
        );

        Ok(drivers)
    }
}

// The query asks for kilometers, so the distance is already in the unit we
// return and must not be rescaled.
fn to_location(result: RadiusSearchResult) -> Option<DriverLocation> {
    let coord = result.coord?;

    Some(DriverLocation {
        driver_id: result.name,
        lat: coord.latitude,
        lon: coord.longitude,
        distance_km: result.dist?,
    })
}

#[test]
fn search_result_distance_is_passed_through() {
    let result = RadiusSearchResult {
        name: "d1".into(),
        coord: Some(Coord::lon_lat(37.61, 55.75)),
        dist: Some(0.1276),
    };

    let location = to_location(result).unwrap();

    assert_eq!(location.driver_id, "d1");
    assert_eq!(location.lat, 55.75);
    assert_eq!(location.lon, 37.61);
    assert_eq!(location.distance_km, 0.1276);
}

#[test]
fn search_result_without_coordinates_is_skipped() {
    let result = RadiusSearchResult {
        name: "d1".into(),
        coord: None,
        dist: Some(1.0),
    };

    assert!(to_location(result).is_none());
}
