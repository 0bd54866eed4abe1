use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use geo_types::Point;
use tokio::sync::RwLock;

use super::haversine_km;
use crate::{
    api::GeoIndex,
    entities::{Coordinates, DriverLocation},
    error::{invalid_parameters_error, store_unavailable_error, Error},
};

/// In-process geo index with the same distance metric and ordering as the
/// Redis implementation.
#[derive(Debug, Default)]
pub struct MemoryGeoIndex {
    drivers: RwLock<HashMap<String, Point<f64>>>,
    unavailable: AtomicBool,
}

impl MemoryGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing (or regaining) the connection to the store.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.drivers.read().await.len()
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(store_unavailable_error("connection refused"));
        }

        Ok(())
    }
}

#[async_trait]
impl GeoIndex for MemoryGeoIndex {
    #[tracing::instrument(skip(self))]
    async fn report(&self, driver_id: &str, coordinates: Coordinates) -> Result<(), Error> {
        self.check_available()?;

        self.drivers
            .write()
            .await
            .insert(driver_id.to_string(), coordinates.into());

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, driver_id: &str) -> Result<bool, Error> {
        self.check_available()?;

        Ok(self.drivers.write().await.remove(driver_id).is_some())
    }

    #[tracing::instrument(skip(self))]
    async fn find_nearby(
        &self,
        coordinates: Coordinates,
        radius_km: f64,
    ) -> Result<Vec<DriverLocation>, Error> {
        self.check_available()?;

        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(invalid_parameters_error("radius must be a non-negative number"));
        }

        let origin: Point<f64> = coordinates.into();
        let drivers = self.drivers.read().await;
        let mut nearby: Vec<DriverLocation> = drivers
            .iter()
            .filter_map(|(driver_id, position)| {
                let distance_km = haversine_km(origin, *position);

                (distance_km <= radius_km).then(|| DriverLocation {
                    driver_id: driver_id.clone(),
                    lat: position.y(),
                    lon: position.x(),
                    distance_km,
                })
            })
            .collect();

        nearby.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });

        tracing::debug!("found {} drivers within {:.1} km", nearby.len(), radius_km);

        Ok(nearby)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::STORE_UNAVAILABLE;

    const PICKUP: Coordinates = Coordinates {
        latitude: 55.751,
        longitude: 37.611,
    };

    async fn seeded() -> MemoryGeoIndex {
        let index = MemoryGeoIndex::new();
        // roughly 0.13 km, 1.1 km, 2.2 km and 11 km north of the pickup
        index.report("near", Coordinates::new(55.75, 37.61)).await.unwrap();
        index.report("mid", Coordinates::new(55.761, 37.611)).await.unwrap();
        index.report("edge", Coordinates::new(55.771, 37.611)).await.unwrap();
        index.report("far", Coordinates::new(55.851, 37.611)).await.unwrap();
        index
    }

    #[tokio::test]
    async fn returns_subset_within_radius_sorted_ascending() {
        let index = seeded().await;

        let nearby = index.find_nearby(PICKUP, 3.0).await.unwrap();
        let ids: Vec<&str> = nearby.iter().map(|d| d.driver_id.as_str()).collect();

        assert_eq!(ids, vec!["near", "mid", "edge"]);
        assert!(nearby.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[tokio::test]
    async fn distances_are_in_kilometers() {
        let index = seeded().await;

        let nearby = index.find_nearby(PICKUP, 3.0).await.unwrap();

        assert!((nearby[0].distance_km - 0.1276).abs() < 0.005);
        assert!((nearby[1].distance_km - 1.1123).abs() < 0.005);
        assert!((nearby[2].distance_km - 2.2245).abs() < 0.005);
        assert_eq!((nearby[0].lat, nearby[0].lon), (55.75, 37.61));
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let index = seeded().await;

        let nearby = index
            .find_nearby(Coordinates::new(-33.86, 151.21), 3.0)
            .await
            .unwrap();

        assert!(nearby.is_empty());
    }

    #[tokio::test]
    async fn zero_radius_matches_exact_position_only() {
        let index = seeded().await;

        let nearby = index
            .find_nearby(Coordinates::new(55.75, 37.61), 0.0)
            .await
            .unwrap();

        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].driver_id, "near");
        assert_eq!(nearby[0].distance_km, 0.0);
    }

    #[tokio::test]
    async fn reporting_twice_keeps_one_entry() {
        let index = MemoryGeoIndex::new();

        index.report("d1", Coordinates::new(55.75, 37.61)).await.unwrap();
        index.report("d1", Coordinates::new(55.75, 37.61)).await.unwrap();
        assert_eq!(index.len().await, 1);

        // last write wins
        index.report("d1", Coordinates::new(55.80, 37.61)).await.unwrap();
        let nearby = index.find_nearby(PICKUP, 3.0).await.unwrap();
        assert!(nearby.is_empty());
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn removed_drivers_are_not_found() {
        let index = seeded().await;

        assert!(index.remove("near").await.unwrap());
        assert!(!index.remove("near").await.unwrap());

        let nearby = index.find_nearby(PICKUP, 3.0).await.unwrap();
        assert!(nearby.iter().all(|d| d.driver_id != "near"));
    }

    #[tokio::test]
    async fn unavailable_store_fails_queries() {
        let index = seeded().await;
        index.set_available(false);

        let err = index.find_nearby(PICKUP, 3.0).await.unwrap_err();
        assert_eq!(err.code, STORE_UNAVAILABLE);

        index.set_available(true);
        assert_eq!(index.find_nearby(PICKUP, 3.0).await.unwrap().len(), 3);
    }
}
