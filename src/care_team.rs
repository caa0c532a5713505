//! Care-team assignment store.
//!
//! Per patient, per service type, an append-only history of assignment
//! records with a pointer to the current one. Replacing a provider ends the
//! previous record instead of overwriting it, so live lookups and audit
//! queries read the same data.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authorization::is_active_team_member;
use crate::config::CoordinationConfig;
use crate::error::{require, CoordinationError};
use crate::models::{
    AssignmentRecord, AssignmentStatus, CareTeamAssignment, ProviderId, RoleType, SharedDataType,
};
use crate::registry::ProviderIdentityRegistry;
use crate::store::{keys, load_collection, save_collection, KeyValueStore};

type AssignmentCollection = BTreeMap<String, CareTeamAssignment>;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// One assignment to make; also the unit of `bulk_assign`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub patient_id: String,
    pub patient_name: String,
    pub service_type: RoleType,
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderPatient {
    pub service_type: RoleType,
    pub patient_id: String,
    pub patient_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderWorkload {
    pub total_patients: usize,
    pub service_types: Vec<RoleType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverloadedProvider {
    pub provider_id: ProviderId,
    pub current_patients: usize,
    pub max_patients: u32,
    pub load_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentAssignment {
    pub patient_id: String,
    pub patient_name: String,
    pub service_type: RoleType,
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentReport {
    pub total_patients: usize,
    pub total_providers: usize,
    pub assignments_by_service: BTreeMap<RoleType, usize>,
    pub unassigned_patients: Vec<String>,
    pub overloaded_providers: Vec<OverloadedProvider>,
    pub recent_assignments: Vec<RecentAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkAssignError {
    pub index: usize,
    pub patient_id: String,
    pub service_type: RoleType,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAssignResult {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<BulkAssignError>,
}

// ═══════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════

pub struct CareTeamAssignmentStore {
    store: Arc<dyn KeyValueStore>,
    config: CoordinationConfig,
}

impl CareTeamAssignmentStore {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CoordinationConfig) -> Self {
        Self { store, config }
    }

    fn load(&self) -> Result<AssignmentCollection, CoordinationError> {
        Ok(load_collection(self.store.as_ref(), keys::CARE_TEAM_ASSIGNMENTS)?)
    }

    fn save(&self, teams: &AssignmentCollection) -> Result<(), CoordinationError> {
        Ok(save_collection(
            self.store.as_ref(),
            keys::CARE_TEAM_ASSIGNMENTS,
            teams,
        )?)
    }

    /// Make `provider_id` the active provider for one service slot.
    ///
    /// An existing active occupant is ended (status inactive, reason noted)
    /// and kept in the slot history. Re-assigning the provider who already
    /// holds the slot returns the existing record unchanged.
    pub fn assign(
        &self,
        request: &AssignRequest,
        actor_id: &str,
    ) -> Result<AssignmentRecord, CoordinationError> {
        validate_request(request)?;
        require("actor_id", actor_id)?;

        let now = Utc::now();
        let mut teams = self.load()?;
        let team = teams
            .entry(request.patient_id.clone())
            .or_insert_with(|| CareTeamAssignment::new(&request.patient_id, &request.patient_name, now));
        team.patient_name = request.patient_name.clone();

        let slot = team.assignments.entry(request.service_type).or_default();
        if let Some(existing) = slot.active() {
            if existing.provider_id == request.provider_id {
                return Ok(existing.clone());
            }
        }

        let mut replaced = None;
        if let Some(previous) = slot.current_mut().filter(|r| r.is_active()) {
            previous.status = AssignmentStatus::Inactive;
            previous.ended_at = Some(now);
            previous.ended_by = Some(actor_id.to_string());
            previous.end_reason = Some(format!("Replaced by {}", request.provider_id));
            replaced = Some(previous.provider_id);
        }

        let record = AssignmentRecord {
            provider_id: request.provider_id,
            provider_name: request.provider_name.clone(),
            assigned_at: now,
            assigned_by: actor_id.to_string(),
            status: AssignmentStatus::Active,
            notes: request.notes.clone(),
            ended_at: None,
            ended_by: None,
            end_reason: None,
        };
        slot.push(record.clone());
        team.updated_at = now;

        self.save(&teams)?;
        tracing::info!(
            patient_id = %request.patient_id,
            service_type = request.service_type.as_str(),
            provider_id = %request.provider_id,
            replaced = ?replaced.map(|p| p.to_string()),
            actor_id,
            "Provider assigned"
        );
        Ok(record)
    }

    /// End the active assignment of one service slot.
    pub fn remove(
        &self,
        patient_id: &str,
        service_type: RoleType,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<AssignmentRecord, CoordinationError> {
        require("actor_id", actor_id)?;
        let now = Utc::now();
        let mut teams = self.load()?;
        let slot_id = format!("{patient_id}/{service_type}");

        let team = teams
            .get_mut(patient_id)
            .ok_or_else(|| CoordinationError::not_found("care team", patient_id))?;
        let record = team
            .assignments
            .get_mut(&service_type)
            .and_then(|slot| slot.current_mut())
            .filter(|r| r.is_active())
            .ok_or_else(|| CoordinationError::not_found("assignment", &slot_id))?;

        record.status = AssignmentStatus::Inactive;
        record.ended_at = Some(now);
        record.ended_by = Some(actor_id.to_string());
        record.end_reason = reason.map(str::to_string);
        let removed = record.clone();
        team.updated_at = now;

        self.save(&teams)?;
        tracing::info!(
            patient_id,
            service_type = service_type.as_str(),
            provider_id = %removed.provider_id,
            actor_id,
            "Provider assignment ended"
        );
        Ok(removed)
    }

    pub fn get_assignment(
        &self,
        patient_id: &str,
    ) -> Result<Option<CareTeamAssignment>, CoordinationError> {
        Ok(self.load()?.remove(patient_id))
    }

    /// Every record ever held in one slot, oldest first.
    pub fn history(
        &self,
        patient_id: &str,
        service_type: RoleType,
    ) -> Result<Vec<AssignmentRecord>, CoordinationError> {
        Ok(self
            .get_assignment(patient_id)?
            .and_then(|mut team| team.assignments.remove(&service_type))
            .map(|slot| slot.history)
            .unwrap_or_default())
    }

    /// Active (service type, provider) pairs for a patient.
    pub fn care_team(
        &self,
        patient_id: &str,
    ) -> Result<Vec<(RoleType, ProviderId)>, CoordinationError> {
        Ok(self
            .get_assignment(patient_id)?
            .map(|team| team.active_members())
            .unwrap_or_default())
    }

    pub fn is_active_member(
        &self,
        patient_id: &str,
        provider_id: &ProviderId,
    ) -> Result<bool, CoordinationError> {
        let team = self.get_assignment(patient_id)?;
        Ok(is_active_team_member(team.as_ref(), provider_id))
    }

    pub fn get_provider_patients(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Vec<ProviderPatient>, CoordinationError> {
        let teams = self.load()?;
        Ok(provider_patients(&teams, provider_id))
    }

    pub fn workload(&self, provider_id: &ProviderId) -> Result<ProviderWorkload, CoordinationError> {
        let teams = self.load()?;
        Ok(workload_of(&teams, provider_id))
    }

    /// Distinct active patients per provider, from a single load.
    pub fn patient_counts(&self) -> Result<BTreeMap<ProviderId, usize>, CoordinationError> {
        let teams = self.load()?;
        Ok(patients_per_provider(&teams)
            .into_iter()
            .map(|(provider, patients)| (provider, patients.len()))
            .collect())
    }

    /// Add `data_id` to the patient's shared list for `data_type`.
    ///
    /// Returns `false` when the item was already shared.
    pub fn record_shared_data(
        &self,
        patient_id: &str,
        data_type: SharedDataType,
        data_id: &str,
    ) -> Result<bool, CoordinationError> {
        require("data_id", data_id)?;
        let mut teams = self.load()?;
        let team = teams
            .get_mut(patient_id)
            .ok_or_else(|| CoordinationError::not_found("care team", patient_id))?;
        let items = team.shared_data.entry(data_type).or_default();
        if items.iter().any(|existing| existing == data_id) {
            return Ok(false);
        }
        items.push(data_id.to_string());
        team.updated_at = Utc::now();
        self.save(&teams)?;
        Ok(true)
    }

    pub fn shared_data(
        &self,
        patient_id: &str,
        data_type: SharedDataType,
    ) -> Result<Vec<String>, CoordinationError> {
        Ok(self
            .get_assignment(patient_id)?
            .and_then(|mut team| team.shared_data.remove(&data_type))
            .unwrap_or_default())
    }

    /// Aggregate view of all care teams.
    ///
    /// Capacity comes from each provider's identity; providers with no
    /// identity on record use the configured default.
    pub fn report(&self) -> Result<AssignmentReport, CoordinationError> {
        let teams = self.load()?;
        let registry = ProviderIdentityRegistry::new(Arc::clone(&self.store), self.config.clone());
        let capacities: BTreeMap<ProviderId, u32> = registry
            .all()?
            .into_iter()
            .map(|p| (p.id, p.max_patients))
            .collect();

        let patients_by_provider = patients_per_provider(&teams);
        let mut assignments_by_service: BTreeMap<RoleType, usize> = BTreeMap::new();
        let mut unassigned_patients = Vec::new();
        let mut recent = Vec::new();

        for team in teams.values() {
            let members = team.active_members();
            if members.is_empty() {
                unassigned_patients.push(team.patient_id.clone());
            }
            for (service, _) in &members {
                *assignments_by_service.entry(*service).or_default() += 1;
            }
            for (service, slot) in &team.assignments {
                for record in &slot.history {
                    recent.push(RecentAssignment {
                        patient_id: team.patient_id.clone(),
                        patient_name: team.patient_name.clone(),
                        service_type: *service,
                        provider_id: record.provider_id,
                        provider_name: record.provider_name.clone(),
                        assigned_at: record.assigned_at,
                        assigned_by: record.assigned_by.clone(),
                    });
                }
            }
        }

        let overloaded_providers = patients_by_provider
            .iter()
            .filter_map(|(provider, patients)| {
                let max_patients = capacities
                    .get(provider)
                    .copied()
                    .unwrap_or(self.config.default_max_patients)
                    .max(1);
                let load_ratio = patients.len() as f64 / f64::from(max_patients);
                (load_ratio > self.config.overload_threshold).then(|| OverloadedProvider {
                    provider_id: *provider,
                    current_patients: patients.len(),
                    max_patients,
                    load_ratio,
                })
            })
            .collect();

        recent.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
        recent.truncate(self.config.recent_assignments_limit);

        Ok(AssignmentReport {
            total_patients: teams.len(),
            total_providers: patients_by_provider.len(),
            assignments_by_service,
            unassigned_patients,
            overloaded_providers,
            recent_assignments: recent,
        })
    }

    /// Apply many assignments, continuing past per-item failures.
    pub fn bulk_assign(&self, requests: &[AssignRequest], actor_id: &str) -> BulkAssignResult {
        let mut result = BulkAssignResult::default();
        for (index, request) in requests.iter().enumerate() {
            match self.assign(request, actor_id) {
                Ok(_) => result.success += 1,
                Err(e) => {
                    tracing::warn!(
                        index,
                        patient_id = %request.patient_id,
                        "Bulk assignment item failed: {e}"
                    );
                    result.failed += 1;
                    result.errors.push(BulkAssignError {
                        index,
                        patient_id: request.patient_id.clone(),
                        service_type: request.service_type,
                        message: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            success = result.success,
            failed = result.failed,
            actor_id,
            "Bulk assignment finished"
        );
        result
    }
}

fn validate_request(request: &AssignRequest) -> Result<(), CoordinationError> {
    require("patient_id", &request.patient_id)?;
    require("patient_name", &request.patient_name)?;
    require("provider_name", &request.provider_name)?;
    if !request.service_type.is_care_service() {
        return Err(CoordinationError::Validation(format!(
            "{} is not a care service",
            request.service_type
        )));
    }
    if request.provider_id.role != request.service_type {
        return Err(CoordinationError::Validation(format!(
            "provider {} cannot fill a {} slot",
            request.provider_id, request.service_type
        )));
    }
    Ok(())
}

fn patients_per_provider(teams: &AssignmentCollection) -> BTreeMap<ProviderId, BTreeSet<&str>> {
    let mut map: BTreeMap<ProviderId, BTreeSet<&str>> = BTreeMap::new();
    for team in teams.values() {
        for (_, provider) in team.active_members() {
            map.entry(provider).or_default().insert(team.patient_id.as_str());
        }
    }
    map
}

fn provider_patients(teams: &AssignmentCollection, provider_id: &ProviderId) -> Vec<ProviderPatient> {
    teams
        .values()
        .flat_map(|team| {
            team.active_members()
                .into_iter()
                .filter(|(_, p)| p == provider_id)
                .map(|(service_type, _)| ProviderPatient {
                    service_type,
                    patient_id: team.patient_id.clone(),
                    patient_name: team.patient_name.clone(),
                })
        })
        .collect()
}

fn workload_of(teams: &AssignmentCollection, provider_id: &ProviderId) -> ProviderWorkload {
    let pairs = provider_patients(teams, provider_id);
    let patients: BTreeSet<&str> = pairs.iter().map(|p| p.patient_id.as_str()).collect();
    let service_types: BTreeSet<RoleType> = pairs.iter().map(|p| p.service_type).collect();
    ProviderWorkload {
        total_patients: patients.len(),
        service_types: service_types.into_iter().collect(),
    }
}
