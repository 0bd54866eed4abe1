mod memory;
mod redis_geo;

pub use memory::MemoryGeoIndex;
pub use redis_geo::RedisGeoIndex;

use geo_types::Point;

/// Key of the sorted set holding every online driver.
pub const DRIVERS_KEY: &str = "drivers:online";

/// Earth radius used by Redis GEO commands, in meters.
pub const EARTH_RADIUS_M: f64 = 6372797.560856;

pub const METERS_PER_KM: f64 = 1000.0;

/// Great-circle distance in kilometers between two lon/lat points, computed
/// the same way the Redis GEO commands do.
pub fn haversine_km(from: Point<f64>, to: Point<f64>) -> f64 {
    let lat1 = from.y().to_radians();
    let lat2 = to.y().to_radians();
    let u = ((lat2 - lat1) / 2.0).sin();
    let v = ((to.x() - from.x()).to_radians() / 2.0).sin();

    let a = u * u + lat1.cos() * lat2.cos() * v * v;
    let meters = 2.0 * EARTH_RADIUS_M * a.sqrt().asin();

    meters / METERS_PER_KM
}
