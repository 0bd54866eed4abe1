mod matcher;
mod policy;

pub use matcher::MatchState;
pub use policy::{Nearest, PolicyKind, SelectionPolicy, UniformRandom};

use crate::{
    api::{DynAssignmentStore, DynEventSource, DynGeoIndex},
    config::MatchingConfig,
};

/// Matches ride requests to nearby drivers and publishes the outcome.
pub struct Engine {
    geo: DynGeoIndex,
    events: DynEventSource,
    store: DynAssignmentStore,
    policy: Box<dyn SelectionPolicy + Send + Sync>,
    config: MatchingConfig,
    assignments_topic: String,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(
        geo: DynGeoIndex,
        events: DynEventSource,
        store: DynAssignmentStore,
        config: MatchingConfig,
        assignments_topic: &str,
    ) -> Self {
        tracing::info!(
            "matching within {} km using the {} policy",
            config.search_radius_km,
            config.policy
        );

        Self {
            geo,
            events,
            store,
            policy: config.policy.build(),
            config,
            assignments_topic: assignments_topic.into(),
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn SelectionPolicy + Send + Sync>) -> Self {
        self.policy = policy;
        self
    }
}
