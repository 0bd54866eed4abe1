use axum::extract::{Extension, Json, Query};
use serde::Deserialize;

use crate::entities::{Coordinates, DriverLocation};
use crate::error::{invalid_parameters_error, unexpected_error, Error};
use crate::server::{DynGeoIndex, SearchDefaults};

/// Raw query string. Everything is optional text so that validation, not the
/// extractor, decides which problems are client errors.
#[derive(Debug, Default, Deserialize)]
pub struct NearbyParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub radius_km: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NearbyQuery {
    pub coordinates: Coordinates,
    pub radius_km: f64,
}

impl NearbyParams {
    pub fn parse(&self, default_radius_km: f64) -> Result<NearbyQuery, Error> {
        let (lat, lon) = match (&self.lat, &self.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(invalid_parameters_error("lat and lon are required")),
        };

        let latitude = parse_number(lat).ok_or_else(|| invalid_parameters_error("invalid lat"))?;
        let longitude =
            parse_number(lon).ok_or_else(|| invalid_parameters_error("invalid lon"))?;

        // an unusable radius is not an error, it just means "use the default"
        let radius_km = self
            .radius_km
            .as_deref()
            .and_then(parse_number)
            .filter(|radius| *radius >= 0.0)
            .unwrap_or(default_radius_km);

        Ok(NearbyQuery {
            coordinates: Coordinates::new(latitude, longitude),
            radius_km,
        })
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

pub async fn find(
    Extension(geo): Extension<DynGeoIndex>,
    Extension(defaults): Extension<SearchDefaults>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<DriverLocation>>, Error> {
    let query = params.parse(defaults.radius_km)?;

    let drivers = geo
        .find_nearby(query.coordinates, query.radius_km)
        .await
        .map_err(|err| {
            tracing::error!(
                "nearby search at {}, {} within {} km failed: {}",
                query.coordinates.latitude,
                query.coordinates.longitude,
                query.radius_km,
                err
            );
            if err.is_internal() {
                err
            } else {
                unexpected_error(err)
            }
        })?;

    Ok(drivers.into())
}
