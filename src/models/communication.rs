use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{MessageType, RoleType};
use super::provider::ProviderId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationResponse {
    pub provider_id: ProviderId,
    pub provider_type: RoleType,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// A routed message between two providers about one patient.
///
/// Everything except `responses` is fixed at send time; `responses` is
/// append-only and ordered by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationRecord {
    pub id: String,
    pub patient_id: String,
    pub from_provider_id: ProviderId,
    pub from_provider_type: RoleType,
    pub to_provider_id: ProviderId,
    pub to_provider_type: RoleType,
    pub message_type: MessageType,
    pub subject: String,
    pub content: String,
    pub related_data: Option<serde_json::Value>,
    pub is_urgent: bool,
    pub requires_response: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responses: Vec<CommunicationResponse>,
}

impl CommunicationRecord {
    pub fn involves(&self, provider_id: &ProviderId) -> bool {
        &self.from_provider_id == provider_id || &self.to_provider_id == provider_id
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.requires_response && self.responses.is_empty()
    }
}

/// Urgent notification waiting for delivery to the external notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub communication_id: String,
    pub patient_id: String,
    pub to_provider_id: ProviderId,
    pub message_type: MessageType,
    pub subject: String,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}
