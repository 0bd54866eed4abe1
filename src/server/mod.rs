mod handlers;

use std::future::Future;
use std::net::SocketAddr;

use axum::{extract::Extension, routing::get, Router};
use tokio::sync::watch;

use crate::error::{unexpected_error, Error};
use crate::server::handlers::{health, nearby};

pub use crate::api::DynGeoIndex;
pub use handlers::nearby::{NearbyParams, NearbyQuery};

/// Radius applied when a nearby query does not carry a usable one.
#[derive(Clone, Copy, Debug)]
pub struct SearchDefaults {
    pub radius_km: f64,
}

pub fn router(geo: DynGeoIndex, defaults: SearchDefaults) -> Router {
    Router::new()
        .route("/health", get(health::check))
        .route("/api/v1/geo/health", get(health::check_geo))
        .route("/api/v1/geo/drivers/nearby", get(nearby::find))
        .layer(Extension(geo))
        .layer(Extension(defaults))
}

/// Binds the listener up front so a taken port fails startup, then returns
/// the server future. It resolves once `shutdown` flips to `true`.
pub fn bind(
    geo: DynGeoIndex,
    defaults: SearchDefaults,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<impl Future<Output = Result<(), Error>>, Error> {
    let app = router(geo, defaults);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let builder = axum::Server::try_bind(&addr)
        .map_err(|err| unexpected_error(format!("failed to bind {}: {}", addr, err)))?;

    tracing::info!("listening on {}", addr);

    let server = builder
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        });

    Ok(async move {
        server.await.map_err(unexpected_error)?;
        tracing::info!("http server stopped");

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::MemoryGeoIndex;
    use std::sync::Arc;

    fn defaults() -> SearchDefaults {
        SearchDefaults { radius_km: 3.0 }
    }

    #[tokio::test]
    async fn taken_port_fails_to_bind() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let (_tx, rx) = watch::channel(false);

        let result = bind(Arc::new(MemoryGeoIndex::new()), defaults(), port, rx);

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn server_stops_on_shutdown() {
        let port = std::net::TcpListener::bind("0.0.0.0:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let (tx, rx) = watch::channel(false);

        let server = bind(Arc::new(MemoryGeoIndex::new()), defaults(), port, rx).unwrap();
        let task = tokio::spawn(server);

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}
