use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AssignmentStatus, RoleType, SharedDataType};
use super::provider::ProviderId;

/// One occupancy of a care-team slot.
///
/// Records are appended, never replaced. Ending an occupancy (removal or
/// replacement) only fills the `ended_*` fields and flips the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: String,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_by: Option<String>,
    pub end_reason: Option<String>,
}

impl AssignmentRecord {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

/// Append-only history for one (patient, service type) with a pointer to
/// the current record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentSlot {
    pub history: Vec<AssignmentRecord>,
    pub current: Option<usize>,
}

impl AssignmentSlot {
    pub fn current(&self) -> Option<&AssignmentRecord> {
        self.current.and_then(|i| self.history.get(i))
    }

    pub fn current_mut(&mut self) -> Option<&mut AssignmentRecord> {
        let index = self.current?;
        self.history.get_mut(index)
    }

    /// The current record, only when it is active.
    pub fn active(&self) -> Option<&AssignmentRecord> {
        self.current().filter(|r| r.is_active())
    }

    pub(crate) fn push(&mut self, record: AssignmentRecord) {
        self.history.push(record);
        self.current = Some(self.history.len() - 1);
    }
}

/// Care team of one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareTeamAssignment {
    pub patient_id: String,
    pub patient_name: String,
    pub assignments: BTreeMap<RoleType, AssignmentSlot>,
    #[serde(default)]
    pub shared_data: BTreeMap<SharedDataType, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CareTeamAssignment {
    pub fn new(patient_id: &str, patient_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            patient_name: patient_name.to_string(),
            assignments: BTreeMap::new(),
            shared_data: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Current record for a service type, whatever its status.
    pub fn current(&self, service_type: RoleType) -> Option<&AssignmentRecord> {
        self.assignments.get(&service_type).and_then(|s| s.current())
    }

    /// Active provider for a service type.
    pub fn active(&self, service_type: RoleType) -> Option<&AssignmentRecord> {
        self.assignments.get(&service_type).and_then(|s| s.active())
    }

    /// (service type, provider) pairs for every active slot.
    pub fn active_members(&self) -> Vec<(RoleType, ProviderId)> {
        self.assignments
            .iter()
            .filter_map(|(service, slot)| slot.active().map(|r| (*service, r.provider_id)))
            .collect()
    }

    pub fn has_active_member(&self, provider_id: &ProviderId) -> bool {
        self.assignments
            .values()
            .filter_map(|slot| slot.active())
            .any(|r| &r.provider_id == provider_id)
    }
}
