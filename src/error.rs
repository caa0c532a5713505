//! Error taxonomy shared by every coordination service.

use thiserror::Error;

use crate::models::{ProviderId, RoleType, VerificationStatus};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("User {email} already holds role {role}")]
    DuplicateRole { email: String, role: RoleType },

    #[error("No active {service_type} assigned to patient {patient_id}")]
    TargetNotAssigned {
        patient_id: String,
        service_type: RoleType,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provider {provider_id} is not on the care team of patient {patient_id}")]
    Unauthorized {
        provider_id: ProviderId,
        patient_id: String,
    },

    #[error("Provider {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ProviderId,
        from: VerificationStatus,
        to: VerificationStatus,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CoordinationError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Reject blank required fields.
pub(crate) fn require(field: &str, value: &str) -> Result<(), CoordinationError> {
    if value.trim().is_empty() {
        return Err(CoordinationError::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_field_is_validation_error() {
        let err = require("patient_id", "   ").unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(ref m) if m == "patient_id is required"));
        assert!(require("patient_id", "patient_001").is_ok());
    }

    #[test]
    fn messages_name_the_offending_ids() {
        let err = CoordinationError::TargetNotAssigned {
            patient_id: "patient_001".into(),
            service_type: RoleType::Doctor,
        };
        assert_eq!(err.to_string(), "No active doctor assigned to patient patient_001");

        let err = CoordinationError::not_found("communication", "c-1");
        assert_eq!(err.to_string(), "Entity not found: communication with id c-1");
    }
}
