//! Service bundle over one store.
//!
//! Owns one instance of each coordination service, all sharing the same
//! `KeyValueStore` and config. Construct one per process (or per test).

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::care_team::CareTeamAssignmentStore;
use crate::config::CoordinationConfig;
use crate::error::CoordinationError;
use crate::identity::{MultiRoleIdentity, NewRole};
use crate::models::{
    MultiRoleUser, ProviderDetails, ProviderId, ProviderIdentity, RoleStatus, RoleType,
};
use crate::recommendation::ProviderRecommendationEngine;
use crate::registry::ProviderIdentityRegistry;
use crate::router::CommunicationRouter;
use crate::store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRegistration {
    pub user: MultiRoleUser,
    pub identity: ProviderIdentity,
    pub needs_approval: bool,
}

pub struct CareCoordinator {
    registry: ProviderIdentityRegistry,
    care_team: CareTeamAssignmentStore,
    recommendations: ProviderRecommendationEngine,
    router: CommunicationRouter,
    identity: MultiRoleIdentity,
}

impl CareCoordinator {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CoordinationConfig) -> Self {
        Self {
            registry: ProviderIdentityRegistry::new(Arc::clone(&store), config.clone()),
            care_team: CareTeamAssignmentStore::new(Arc::clone(&store), config.clone()),
            recommendations: ProviderRecommendationEngine::new(Arc::clone(&store), config.clone()),
            router: CommunicationRouter::new(Arc::clone(&store), config.clone()),
            identity: MultiRoleIdentity::new(store, config),
        }
    }

    /// Coordinator over a SQLite file, creating it if needed.
    pub fn open(path: &Path, config: CoordinationConfig) -> Result<Self, StoreError> {
        let store = SqliteStore::open(path)?;
        tracing::info!(path = %path.display(), "Coordination store opened");
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn in_memory(config: CoordinationConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    pub fn registry(&self) -> &ProviderIdentityRegistry {
        &self.registry
    }

    pub fn care_team(&self) -> &CareTeamAssignmentStore {
        &self.care_team
    }

    pub fn recommendations(&self) -> &ProviderRecommendationEngine {
        &self.recommendations
    }

    pub fn router(&self) -> &CommunicationRouter {
        &self.router
    }

    pub fn identity(&self) -> &MultiRoleIdentity {
        &self.identity
    }

    /// Grant a professional role to the person behind `email` and mint the
    /// matching provider identity. Both start pending.
    pub fn register_provider(
        &self,
        email: &str,
        name: &str,
        role: RoleType,
        details: ProviderDetails,
    ) -> Result<ProviderRegistration, CoordinationError> {
        if !role.is_care_service() && role != RoleType::Admin {
            return Err(CoordinationError::Validation(format!(
                "{role} is not a professional role"
            )));
        }
        crate::error::require("display_name", &details.display_name)?;

        let grant = self.identity.create_or_add_role(
            email,
            NewRole {
                name: name.to_string(),
                role,
                phone: None,
            },
        )?;
        let identity = self.registry.create_profile(&grant.user.id, role, details)?;

        tracing::info!(
            user_id = %grant.user.id,
            provider_id = %identity.id,
            "Provider registered"
        );
        Ok(ProviderRegistration {
            user: grant.user,
            identity,
            needs_approval: grant.needs_approval,
        })
    }

    /// Verify the identity and activate the owner's matching role entry.
    pub fn approve_provider(
        &self,
        id: &ProviderId,
        approved_by: &str,
    ) -> Result<ProviderIdentity, CoordinationError> {
        let identity = self.registry.approve(id, approved_by)?;
        let owner = self
            .identity
            .get_user_by_id(&identity.owner_user_id)?
            .ok_or_else(|| CoordinationError::not_found("user", &identity.owner_user_id))?;
        let pending = owner
            .role(identity.role_type)
            .is_some_and(|r| r.status == RoleStatus::Pending);
        if pending {
            self.identity.approve_role(&owner.email, identity.role_type)?;
        }
        Ok(identity)
    }
}
