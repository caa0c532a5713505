//! Multi-role user accounts.
//!
//! One person (keyed by email) may hold several roles, e.g. a doctor who is
//! also a patient. Professional roles start `pending` and need approval;
//! `current_role` selects which hat the user is wearing.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CoordinationConfig;
use crate::error::{require, CoordinationError};
use crate::models::{MultiRoleUser, RoleEntry, RoleStatus, RoleType};
use crate::store::{keys, load_collection, save_collection, KeyValueStore};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// Trim, lower-case and validate an email address.
pub fn normalize_email(raw: &str) -> Result<String, CoordinationError> {
    let email = raw.trim().to_lowercase();
    require("email", &email)?;
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(CoordinationError::Validation(format!(
            "{email} is not a valid email address"
        )));
    }
    Ok(email)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub role: RoleType,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleGrant {
    pub user: MultiRoleUser,
    pub is_new_user: bool,
    pub needs_approval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRoleRequest {
    pub role: RoleType,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddRoleOutcome {
    pub user: MultiRoleUser,
    pub needs_approval: bool,
}

pub struct MultiRoleIdentity {
    store: Arc<dyn KeyValueStore>,
    config: CoordinationConfig,
}

impl MultiRoleIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CoordinationConfig) -> Self {
        Self { store, config }
    }

    fn load(&self) -> Result<Vec<MultiRoleUser>, CoordinationError> {
        Ok(load_collection(self.store.as_ref(), keys::MULTI_ROLE_USERS)?)
    }

    fn save(&self, users: &[MultiRoleUser]) -> Result<(), CoordinationError> {
        Ok(save_collection(
            self.store.as_ref(),
            keys::MULTI_ROLE_USERS,
            &users,
        )?)
    }

    fn entry(&self, role: RoleType) -> (RoleEntry, bool) {
        let needs_approval = self.config.needs_approval(role);
        let entry = RoleEntry {
            role,
            status: if needs_approval {
                RoleStatus::Pending
            } else {
                RoleStatus::Active
            },
            added_at: Utc::now(),
            specialization: None,
            license_number: None,
            reason: None,
        };
        (entry, needs_approval)
    }

    /// Create the user with `role`, or grant `role` to the existing user.
    ///
    /// Either way `current_role` moves to the granted role.
    pub fn create_or_add_role(
        &self,
        email: &str,
        new_role: NewRole,
    ) -> Result<RoleGrant, CoordinationError> {
        let email = normalize_email(email)?;
        let mut users = self.load()?;
        let (entry, needs_approval) = self.entry(new_role.role);

        let (user, is_new_user) = match users.iter_mut().find(|u| u.email == email) {
            Some(user) => {
                if user.role(new_role.role).is_some() {
                    return Err(CoordinationError::DuplicateRole {
                        email,
                        role: new_role.role,
                    });
                }
                user.roles.push(entry);
                user.current_role = new_role.role;
                (user.clone(), false)
            }
            None => {
                require("name", &new_role.name)?;
                let user = MultiRoleUser {
                    id: Uuid::new_v4().to_string(),
                    email: email.clone(),
                    name: new_role.name.trim().to_string(),
                    phone: new_role.phone,
                    roles: vec![entry],
                    current_role: new_role.role,
                    created_at: Utc::now(),
                };
                users.push(user.clone());
                (user, true)
            }
        };

        self.save(&users)?;
        tracing::info!(
            user_id = %user.id,
            role = new_role.role.as_str(),
            is_new_user,
            needs_approval,
            "Role granted"
        );
        Ok(RoleGrant {
            user,
            is_new_user,
            needs_approval,
        })
    }

    /// Make an active role the user's current one.
    pub fn switch_role(
        &self,
        email: &str,
        role: RoleType,
    ) -> Result<MultiRoleUser, CoordinationError> {
        self.update_user(email, |user| {
            let entry = user
                .role(role)
                .ok_or_else(|| CoordinationError::not_found("role", role))?;
            if entry.status != RoleStatus::Active {
                return Err(CoordinationError::Validation(format!(
                    "role {role} is {}",
                    entry.status
                )));
            }
            user.current_role = role;
            Ok(())
        })
    }

    /// Apply for an additional role. Unlike `create_or_add_role`, the
    /// current role is left unchanged.
    pub fn add_role(
        &self,
        email: &str,
        request: AddRoleRequest,
    ) -> Result<AddRoleOutcome, CoordinationError> {
        require("reason", &request.reason)?;
        let (mut entry, needs_approval) = self.entry(request.role);
        entry.specialization = request.specialization;
        entry.license_number = request.license_number;
        entry.reason = Some(request.reason);

        let user = self.update_user(email, |user| {
            if user.role(request.role).is_some() {
                return Err(CoordinationError::DuplicateRole {
                    email: user.email.clone(),
                    role: request.role,
                });
            }
            user.roles.push(entry);
            Ok(())
        })?;
        Ok(AddRoleOutcome {
            user,
            needs_approval,
        })
    }

    /// Role present with status active. Unknown users hold no roles.
    pub fn can_access_role(&self, email: &str, role: RoleType) -> Result<bool, CoordinationError> {
        Ok(self
            .get_user(email)?
            .is_some_and(|u| u.has_active_role(role)))
    }

    pub fn get_user_active_roles(&self, email: &str) -> Result<Vec<RoleType>, CoordinationError> {
        Ok(self
            .get_user(email)?
            .map(|u| u.active_roles())
            .unwrap_or_default())
    }

    /// pending → active.
    pub fn approve_role(
        &self,
        email: &str,
        role: RoleType,
    ) -> Result<MultiRoleUser, CoordinationError> {
        self.update_user(email, |user| {
            let entry = pending_entry(user, role)?;
            entry.status = RoleStatus::Active;
            Ok(())
        })
    }

    /// pending → rejected. A user whose current role is rejected falls back
    /// to their first active role, if any.
    pub fn reject_role(
        &self,
        email: &str,
        role: RoleType,
        reason: &str,
    ) -> Result<MultiRoleUser, CoordinationError> {
        require("reason", reason)?;
        self.update_user(email, |user| {
            let entry = pending_entry(user, role)?;
            entry.status = RoleStatus::Rejected;
            entry.reason = Some(reason.to_string());
            if user.current_role == role {
                if let Some(fallback) = user.active_roles().first() {
                    user.current_role = *fallback;
                }
            }
            Ok(())
        })
    }

    pub fn get_user(&self, email: &str) -> Result<Option<MultiRoleUser>, CoordinationError> {
        let email = normalize_email(email)?;
        Ok(self.load()?.into_iter().find(|u| u.email == email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<MultiRoleUser>, CoordinationError> {
        Ok(self.load()?.into_iter().find(|u| u.id == id))
    }

    fn update_user(
        &self,
        email: &str,
        apply: impl FnOnce(&mut MultiRoleUser) -> Result<(), CoordinationError>,
    ) -> Result<MultiRoleUser, CoordinationError> {
        let email = normalize_email(email)?;
        let mut users = self.load()?;
        let user = users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| CoordinationError::not_found("user", &email))?;
        apply(user)?;
        let updated = user.clone();
        self.save(&users)?;
        tracing::info!(
            user_id = %updated.id,
            current_role = updated.current_role.as_str(),
            "User roles updated"
        );
        Ok(updated)
    }
}

fn pending_entry(user: &mut MultiRoleUser, role: RoleType) -> Result<&mut RoleEntry, CoordinationError> {
    let entry = user
        .role_mut(role)
        .ok_or_else(|| CoordinationError::not_found("role", role))?;
    if entry.status != RoleStatus::Pending {
        return Err(CoordinationError::Validation(format!(
            "role {role} is {}, not pending",
            entry.status
        )));
    }
    Ok(entry)
}
