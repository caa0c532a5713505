//! Communication routing between care-team members.
//!
//! A sender names a patient and a target *service type*; the router resolves
//! the provider currently holding that slot. Senders never address a
//! provider directly, so reassignments take effect for the next message.
//!
//! Responding and reading a patient's thread go through the care-team
//! access cascade in `authorization`.

pub mod outbox;
pub mod templates;

pub use outbox::{DeliveryReport, NotificationOutbox, Notifier, NotifyError, TracingNotifier};
pub use templates::{quick_message_templates, templates_for, MessageTemplate};

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::authorization::{check_team_access, is_active_team_member};
use crate::care_team::CareTeamAssignmentStore;
use crate::config::CoordinationConfig;
use crate::error::{require, CoordinationError};
use crate::models::{
    CommunicationRecord, CommunicationResponse, MessageType, ProviderId, RoleType, SharedDataType,
};
use crate::store::{keys, load_collection, save_collection, KeyValueStore};

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub patient_id: String,
    pub from_provider_id: ProviderId,
    pub to_service_type: RoleType,
    pub message_type: MessageType,
    pub subject: String,
    pub content: String,
    pub related_data: Option<serde_json::Value>,
    pub is_urgent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub communication_id: String,
    pub target_provider: ProviderId,
    /// False when an urgent message was stored but its outbox entry could
    /// not be written; `requeue_notification` retries it.
    pub notification_queued: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShareOutcome {
    /// False when the item had already been shared under this type.
    pub newly_shared: bool,
    pub notified_providers: Vec<ProviderId>,
    pub failures: Vec<ShareFailure>,
}

/// A team member whose `data_update` message could not be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareFailure {
    pub provider_id: ProviderId,
    pub message: String,
}

pub struct CommunicationRouter {
    store: Arc<dyn KeyValueStore>,
    care_team: CareTeamAssignmentStore,
    outbox: NotificationOutbox,
}

impl CommunicationRouter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CoordinationConfig) -> Self {
        Self {
            care_team: CareTeamAssignmentStore::new(Arc::clone(&store), config.clone()),
            outbox: NotificationOutbox::new(Arc::clone(&store), config.max_delivery_attempts),
            store,
        }
    }

    fn load(&self) -> Result<Vec<CommunicationRecord>, CoordinationError> {
        Ok(load_collection(self.store.as_ref(), keys::COMMUNICATIONS)?)
    }

    fn save(&self, records: &[CommunicationRecord]) -> Result<(), CoordinationError> {
        Ok(save_collection(
            self.store.as_ref(),
            keys::COMMUNICATIONS,
            &records,
        )?)
    }

    pub fn outbox(&self) -> &NotificationOutbox {
        &self.outbox
    }

    /// Route a message to whoever holds `to_service_type` for the patient.
    ///
    /// Nothing is stored when the slot has no active provider. Urgent
    /// messages also queue an outbox entry.
    pub fn send(&self, request: SendRequest) -> Result<SendOutcome, CoordinationError> {
        require("patient_id", &request.patient_id)?;
        require("subject", &request.subject)?;
        require("content", &request.content)?;

        let team = self.care_team.get_assignment(&request.patient_id)?;
        let target = team
            .as_ref()
            .and_then(|t| t.active(request.to_service_type))
            .map(|r| r.provider_id)
            .ok_or_else(|| CoordinationError::TargetNotAssigned {
                patient_id: request.patient_id.clone(),
                service_type: request.to_service_type,
            })?;

        let record = CommunicationRecord {
            id: Uuid::new_v4().to_string(),
            patient_id: request.patient_id,
            from_provider_id: request.from_provider_id,
            from_provider_type: request.from_provider_id.role,
            to_provider_id: target,
            to_provider_type: target.role,
            requires_response: request.message_type.requires_response(),
            message_type: request.message_type,
            subject: request.subject,
            content: request.content,
            related_data: request.related_data,
            is_urgent: request.is_urgent,
            created_at: Utc::now(),
            responses: Vec::new(),
        };

        let mut records = self.load()?;
        records.push(record.clone());
        self.save(&records)?;

        // The record is committed at this point; an enqueue failure is
        // reported through `notification_queued`.
        let mut notification_queued = !record.is_urgent;
        if record.is_urgent {
            match self.outbox.enqueue(&record) {
                Ok(_) => notification_queued = true,
                Err(e) => tracing::error!(
                    communication_id = %record.id,
                    "Urgent notification not queued: {e}"
                ),
            }
        }

        tracing::info!(
            communication_id = %record.id,
            patient_id = %record.patient_id,
            from = %record.from_provider_id,
            to = %target,
            message_type = record.message_type.as_str(),
            urgent = record.is_urgent,
            "Communication routed"
        );
        Ok(SendOutcome {
            communication_id: record.id,
            target_provider: target,
            notification_queued,
        })
    }

    /// Queue the urgent notification of a stored message again.
    pub fn requeue_notification(&self, communication_id: &str) -> Result<(), CoordinationError> {
        let record = self
            .get(communication_id)?
            .ok_or_else(|| CoordinationError::not_found("communication", communication_id))?;
        if !record.is_urgent {
            return Err(CoordinationError::Validation(format!(
                "communication {communication_id} is not urgent"
            )));
        }
        self.outbox.enqueue(&record)?;
        Ok(())
    }

    /// Append a response from the recipient or another active team member.
    pub fn respond(
        &self,
        communication_id: &str,
        provider_id: &ProviderId,
        response_text: &str,
    ) -> Result<CommunicationRecord, CoordinationError> {
        require("response", response_text)?;
        let mut records = self.load()?;
        let record = records
            .iter_mut()
            .find(|r| r.id == communication_id)
            .ok_or_else(|| CoordinationError::not_found("communication", communication_id))?;

        let team = self.care_team.get_assignment(&record.patient_id)?;
        let decision = check_team_access(team.as_ref(), provider_id, Some(&record.to_provider_id));
        if !decision.allowed {
            tracing::warn!(
                communication_id,
                provider_id = %provider_id,
                reason = decision.reason.as_str(),
                "Response rejected"
            );
            return Err(CoordinationError::Unauthorized {
                provider_id: *provider_id,
                patient_id: record.patient_id.clone(),
            });
        }

        // Keep responses ordered even if the clock steps backwards.
        let now = Utc::now();
        let timestamp = record
            .responses
            .last()
            .map_or(now, |last| last.timestamp.max(now));
        record.responses.push(CommunicationResponse {
            provider_id: *provider_id,
            provider_type: provider_id.role,
            response: response_text.to_string(),
            timestamp,
        });
        let updated = record.clone();

        self.save(&records)?;
        tracing::info!(
            communication_id,
            provider_id = %provider_id,
            reason = decision.reason.as_str(),
            responses = updated.responses.len(),
            "Response recorded"
        );
        Ok(updated)
    }

    pub fn get(&self, communication_id: &str) -> Result<Option<CommunicationRecord>, CoordinationError> {
        Ok(self.load()?.into_iter().find(|r| r.id == communication_id))
    }

    /// Messages the provider sent or received, newest first.
    pub fn list_for_provider(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Vec<CommunicationRecord>, CoordinationError> {
        let mut records: Vec<_> = self
            .load()?
            .into_iter()
            .filter(|r| r.involves(provider_id))
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    /// A patient's messages, newest first. Empty unless the requester is an
    /// active member of the patient's care team.
    pub fn list_for_patient(
        &self,
        patient_id: &str,
        requesting_provider_id: &ProviderId,
    ) -> Result<Vec<CommunicationRecord>, CoordinationError> {
        let team = self.care_team.get_assignment(patient_id)?;
        if !is_active_team_member(team.as_ref(), requesting_provider_id) {
            tracing::warn!(
                patient_id,
                provider_id = %requesting_provider_id,
                "Patient thread read denied"
            );
            return Ok(Vec::new());
        }
        let mut records: Vec<_> = self
            .load()?
            .into_iter()
            .filter(|r| r.patient_id == patient_id)
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    /// Messages addressed to the provider that still need a response.
    pub fn unanswered_for(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Vec<CommunicationRecord>, CoordinationError> {
        let mut records: Vec<_> = self
            .load()?
            .into_iter()
            .filter(|r| &r.to_provider_id == provider_id && r.is_awaiting_response())
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    /// Share a data item with the patient's care team.
    ///
    /// With `notify_team`, every other active member gets a `data_update`
    /// message; lab reports go out urgent.
    pub fn share_data(
        &self,
        patient_id: &str,
        from_provider_id: &ProviderId,
        data_type: SharedDataType,
        data_id: &str,
        notify_team: bool,
    ) -> Result<ShareOutcome, CoordinationError> {
        require("data_id", data_id)?;
        let team = self
            .care_team
            .get_assignment(patient_id)?
            .ok_or_else(|| CoordinationError::not_found("care team", patient_id))?;
        if !team.has_active_member(from_provider_id) {
            tracing::warn!(
                patient_id,
                provider_id = %from_provider_id,
                "Data share rejected"
            );
            return Err(CoordinationError::Unauthorized {
                provider_id: *from_provider_id,
                patient_id: patient_id.to_string(),
            });
        }

        let newly_shared = self
            .care_team
            .record_shared_data(patient_id, data_type, data_id)?;

        let mut notified_providers = Vec::new();
        let mut failures = Vec::new();
        if notify_team {
            for (service_type, provider) in team.active_members() {
                if &provider == from_provider_id {
                    continue;
                }
                let sent = self.send(SendRequest {
                    patient_id: patient_id.to_string(),
                    from_provider_id: *from_provider_id,
                    to_service_type: service_type,
                    message_type: MessageType::DataUpdate,
                    subject: format!("New {} shared", data_type.label()),
                    content: format!(
                        "{} shared {} {}",
                        from_provider_id,
                        data_type.label(),
                        data_id
                    ),
                    related_data: Some(serde_json::json!({
                        "dataType": data_type,
                        "dataId": data_id,
                    })),
                    is_urgent: data_type.escalates_on_share(),
                });
                match sent {
                    Ok(outcome) => notified_providers.push(outcome.target_provider),
                    Err(e) => {
                        tracing::warn!(
                            patient_id,
                            provider_id = %provider,
                            "Data update not sent: {e}"
                        );
                        failures.push(ShareFailure {
                            provider_id: provider,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            patient_id,
            provider_id = %from_provider_id,
            data_type = data_type.as_str(),
            newly_shared,
            notified = notified_providers.len(),
            failed = failures.len(),
            "Data shared with care team"
        );
        Ok(ShareOutcome {
            newly_shared,
            notified_providers,
            failures,
        })
    }
}

fn newest_first(records: &mut [CommunicationRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
