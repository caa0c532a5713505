pub mod authorization; // Care-team access cascade
pub mod care_team;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod models;
pub mod recommendation;
pub mod registry;
pub mod router;
pub mod store;

pub use care_team::CareTeamAssignmentStore;
pub use config::CoordinationConfig;
pub use coordinator::CareCoordinator;
pub use error::CoordinationError;
pub use identity::MultiRoleIdentity;
pub use recommendation::ProviderRecommendationEngine;
pub use registry::ProviderIdentityRegistry;
pub use router::CommunicationRouter;
pub use store::{KeyValueStore, MemoryStore, SqliteStore};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the default filter. Later calls are no-ops, so
/// embedding applications and tests may call this freely.
pub fn init_logging() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{} logging initialized", config::APP_NAME, config::APP_VERSION);
    }
}
