use std::sync::Arc;

use dispatch::api::{DynAssignmentStore, DynEventSource, DynGeoIndex};
use dispatch::config::Config;
use dispatch::db::PgPool;
use dispatch::engine::Engine;
use dispatch::error::{unexpected_error, Error};
use dispatch::events::{EventConsumer, KafkaEventSource};
use dispatch::geo::RedisGeoIndex;
use dispatch::server::{self, SearchDefaults};
use dispatch::store::{MemoryAssignmentStore, PgAssignmentStore};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        tracing::error!("dispatch failed: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    let geo: DynGeoIndex = Arc::new(RedisGeoIndex::connect(&config.redis_url()).await?);

    let events: DynEventSource = Arc::new(KafkaEventSource::new(
        &config.kafka_bootstrap_servers,
        &config.group_id,
        &config.rides_topic,
    )?);

    let store: DynAssignmentStore = match &config.database_url {
        Some(url) => {
            let PgPool(pool) = PgPool::new(url, 5).await?;
            Arc::new(PgAssignmentStore::new(pool).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, assignments will not survive a restart");
            Arc::new(MemoryAssignmentStore::new())
        }
    };

    let engine = Engine::new(
        geo.clone(),
        events.clone(),
        store,
        config.matching.clone(),
        &config.assignments_topic,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http = server::bind(
        geo,
        SearchDefaults {
            radius_km: config.matching.search_radius_km,
        },
        config.http_port,
        shutdown_rx.clone(),
    )?;
    let mut http = tokio::spawn(http);

    let mut consumer = EventConsumer::new(events, config.consumer.clone());
    let mut matcher = tokio::spawn(async move {
        consumer.run(&engine, shutdown_rx).await;
    });

    // both tasks only finish on their own if something went wrong
    let exit = tokio::select! {
        _ = shutdown_signal() => Exit::Signal,
        result = &mut http => Exit::Http(result),
        result = &mut matcher => Exit::Matcher(result),
    };

    // receivers may already be gone if a task exited early
    let _ = shutdown_tx.send(true);

    match exit {
        Exit::Signal => {
            tracing::info!("shutting down, waiting for the current ride to finish");

            let (http, matcher) = futures::future::join(http, matcher).await;
            http.map_err(unexpected_error)??;
            matcher.map_err(unexpected_error)?;

            tracing::info!("dispatch stopped");

            Ok(())
        }
        Exit::Http(result) => {
            let _ = matcher.await;
            result.map_err(unexpected_error)??;

            Err(unexpected_error("http server exited unexpectedly"))
        }
        Exit::Matcher(result) => {
            let _ = http.await;
            result.map_err(unexpected_error)?;

            Err(unexpected_error("consumer exited unexpectedly"))
        }
    }
}

enum Exit {
    Signal,
    Http(Result<Result<(), Error>, JoinError>),
    Matcher(Result<(), JoinError>),
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
