use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{RoleType, VerificationStatus};
use crate::store::StoreError;

/// Minimum width of the zero-padded sequence in the string form.
const SEQUENCE_WIDTH: usize = 3;

/// Role-scoped provider identifier.
///
/// Structured as `{role, sequence}`; the `<role>_<sequence>` string form
/// exists only at the persistence boundary. Ordering is by role, then by
/// numeric sequence, so `doctor_999 < doctor_1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId {
    pub role: RoleType,
    pub sequence: u32,
}

impl ProviderId {
    pub fn new(role: RoleType, sequence: u32) -> Self {
        Self { role, sequence }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:0width$}",
            self.role.as_str(),
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

impl FromStr for ProviderId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidEnum {
            field: "ProviderId".into(),
            value: s.into(),
        };
        let (role, sequence) = s.rsplit_once('_').ok_or_else(invalid)?;
        if sequence.len() < SEQUENCE_WIDTH || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        Ok(Self {
            role: role.parse()?,
            sequence: sequence.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for ProviderId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.to_string()
    }
}

/// Caller-supplied profile fields for a new provider identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderDetails {
    pub display_name: String,
    pub service_title: String,
    pub specializations: Vec<String>,
    pub consultation_fee: f64,
    pub max_patients: Option<u32>,
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub id: ProviderId,
    pub owner_user_id: String,
    pub role_type: RoleType,
    pub display_name: String,
    pub service_title: String,
    pub specializations: Vec<String>,
    pub license_number: Option<String>,
    pub verification_status: VerificationStatus,
    pub is_active: bool,
    pub accepting_patients: bool,
    pub max_patients: u32,
    pub consultation_fee: f64,
    pub rating: f64,
    #[serde(default)]
    pub rating_count: u32,
    pub total_consultations: u32,
    pub join_date: DateTime<Utc>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub status_changed_by: Option<String>,
    pub status_reason: Option<String>,
}

impl ProviderIdentity {
    pub fn has_specialization(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.specializations
            .iter()
            .any(|s| s.to_lowercase().contains(&needle))
    }
}

/// Filter for `ProviderIdentityRegistry::search_by`. Unset fields match all.
#[derive(Debug, Clone, Default)]
pub struct ProviderSearch {
    pub role_type: Option<RoleType>,
    pub specialization: Option<String>,
    pub is_active: Option<bool>,
    pub min_rating: Option<f64>,
}

impl ProviderSearch {
    pub fn matches(&self, identity: &ProviderIdentity) -> bool {
        self.role_type.map_or(true, |r| identity.role_type == r)
            && self
                .specialization
                .as_deref()
                .map_or(true, |s| identity.has_specialization(s))
            && self.is_active.map_or(true, |a| identity.is_active == a)
            && self.min_rating.map_or(true, |m| identity.rating >= m)
    }
}
