use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{RoleStatus, RoleType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub role: RoleType,
    pub status: RoleStatus,
    pub added_at: DateTime<Utc>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub reason: Option<String>,
}

/// A person holding one or more roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiRoleUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub roles: Vec<RoleEntry>,
    pub current_role: RoleType,
    pub created_at: DateTime<Utc>,
}

impl MultiRoleUser {
    pub fn role(&self, role: RoleType) -> Option<&RoleEntry> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn role_mut(&mut self, role: RoleType) -> Option<&mut RoleEntry> {
        self.roles.iter_mut().find(|r| r.role == role)
    }

    pub fn has_active_role(&self, role: RoleType) -> bool {
        self.role(role).is_some_and(|r| r.status == RoleStatus::Active)
    }

    pub fn active_roles(&self) -> Vec<RoleType> {
        self.roles
            .iter()
            .filter(|r| r.status == RoleStatus::Active)
            .map(|r| r.role)
            .collect()
    }
}
