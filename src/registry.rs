//! Provider identity registry.
//!
//! Mints one `<role>_<sequence>` identifier per (person, professional role)
//! and tracks each identity's verification lifecycle:
//!
//! ```text
//! pending ──► verified ──► suspended
//!    │
//!    └──────► rejected
//! ```
//!
//! Identities are never deleted, so sequence gaps are preserved and
//! numbers are never reused.

use std::sync::Arc;

use chrono::Utc;

use crate::config::CoordinationConfig;
use crate::error::{require, CoordinationError};
use crate::models::{
    ProviderDetails, ProviderId, ProviderIdentity, ProviderSearch, RoleType, VerificationStatus,
};
use crate::store::{keys, load_collection, save_collection, KeyValueStore};

pub struct ProviderIdentityRegistry {
    store: Arc<dyn KeyValueStore>,
    config: CoordinationConfig,
}

impl ProviderIdentityRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CoordinationConfig) -> Self {
        Self { store, config }
    }

    fn load(&self) -> Result<Vec<ProviderIdentity>, CoordinationError> {
        Ok(load_collection(self.store.as_ref(), keys::PROVIDER_IDENTITIES)?)
    }

    fn save(&self, identities: &[ProviderIdentity]) -> Result<(), CoordinationError> {
        Ok(save_collection(
            self.store.as_ref(),
            keys::PROVIDER_IDENTITIES,
            &identities,
        )?)
    }

    /// Mint a new identity for `owner_user_id` holding `role_type`.
    ///
    /// The sequence is one above the highest sequence ever minted for the
    /// role. New identities start `pending` and inactive.
    pub fn create_profile(
        &self,
        owner_user_id: &str,
        role_type: RoleType,
        details: ProviderDetails,
    ) -> Result<ProviderIdentity, CoordinationError> {
        require("owner_user_id", owner_user_id)?;
        require("display_name", &details.display_name)?;
        if !role_type.is_care_service() && role_type != RoleType::Admin {
            return Err(CoordinationError::Validation(format!(
                "{role_type} is not a professional role"
            )));
        }
        if details.consultation_fee < 0.0 {
            return Err(CoordinationError::Validation(
                "consultation_fee must not be negative".into(),
            ));
        }
        if details.max_patients == Some(0) {
            return Err(CoordinationError::Validation(
                "max_patients must be at least 1".into(),
            ));
        }

        let mut identities = self.load()?;
        let next_sequence = identities
            .iter()
            .filter(|p| p.id.role == role_type)
            .map(|p| p.id.sequence)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| {
                CoordinationError::Validation(format!("{role_type} identifier sequence exhausted"))
            })?;

        let identity = ProviderIdentity {
            id: ProviderId::new(role_type, next_sequence),
            owner_user_id: owner_user_id.to_string(),
            role_type,
            display_name: details.display_name,
            service_title: details.service_title,
            specializations: details.specializations,
            license_number: details.license_number,
            verification_status: VerificationStatus::Pending,
            is_active: false,
            accepting_patients: true,
            max_patients: details
                .max_patients
                .unwrap_or(self.config.default_max_patients),
            consultation_fee: details.consultation_fee,
            rating: 0.0,
            rating_count: 0,
            total_consultations: 0,
            join_date: Utc::now(),
            status_changed_at: None,
            status_changed_by: None,
            status_reason: None,
        };

        identities.push(identity.clone());
        self.save(&identities)?;

        tracing::info!(
            provider_id = %identity.id,
            owner_user_id,
            "Provider identity created"
        );
        Ok(identity)
    }

    /// pending → verified; the identity becomes active.
    pub fn approve(
        &self,
        id: &ProviderId,
        approved_by: &str,
    ) -> Result<ProviderIdentity, CoordinationError> {
        self.transition(id, VerificationStatus::Verified, approved_by, None)
    }

    /// pending → rejected.
    pub fn reject(
        &self,
        id: &ProviderId,
        rejected_by: &str,
        reason: &str,
    ) -> Result<ProviderIdentity, CoordinationError> {
        self.transition(id, VerificationStatus::Rejected, rejected_by, Some(reason))
    }

    /// verified → suspended; the identity becomes inactive.
    pub fn suspend(
        &self,
        id: &ProviderId,
        suspended_by: &str,
        reason: &str,
    ) -> Result<ProviderIdentity, CoordinationError> {
        self.transition(id, VerificationStatus::Suspended, suspended_by, Some(reason))
    }

    fn transition(
        &self,
        id: &ProviderId,
        to: VerificationStatus,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<ProviderIdentity, CoordinationError> {
        require("actor", actor)?;
        let mut identities = self.load()?;
        let identity = identities
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| CoordinationError::not_found("provider identity", id))?;

        let from = identity.verification_status;
        if !is_allowed_transition(from, to) {
            return Err(CoordinationError::InvalidTransition { id: *id, from, to });
        }

        identity.verification_status = to;
        identity.is_active = to == VerificationStatus::Verified;
        identity.status_changed_at = Some(Utc::now());
        identity.status_changed_by = Some(actor.to_string());
        identity.status_reason = reason.map(str::to_string);
        let updated = identity.clone();

        self.save(&identities)?;
        tracing::info!(
            provider_id = %id,
            from = from.as_str(),
            to = to.as_str(),
            actor,
            "Provider verification status changed"
        );
        Ok(updated)
    }

    pub fn get_profile(&self, id: &ProviderId) -> Result<Option<ProviderIdentity>, CoordinationError> {
        Ok(self.load()?.into_iter().find(|p| &p.id == id))
    }

    pub fn get_profiles_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ProviderIdentity>, CoordinationError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|p| p.owner_user_id == user_id)
            .collect())
    }

    pub fn search_by(
        &self,
        filter: &ProviderSearch,
    ) -> Result<Vec<ProviderIdentity>, CoordinationError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect())
    }

    pub fn all(&self) -> Result<Vec<ProviderIdentity>, CoordinationError> {
        self.load()
    }

    pub fn set_accepting_patients(
        &self,
        id: &ProviderId,
        accepting: bool,
    ) -> Result<ProviderIdentity, CoordinationError> {
        self.update(id, |p| p.accepting_patients = accepting)
    }

    /// Count a completed consultation, folding an optional 0-5 rating into
    /// the running mean.
    pub fn record_consultation(
        &self,
        id: &ProviderId,
        rating: Option<f64>,
    ) -> Result<ProviderIdentity, CoordinationError> {
        if let Some(r) = rating {
            if !(0.0..=5.0).contains(&r) {
                return Err(CoordinationError::Validation(format!(
                    "rating {r} is outside 0-5"
                )));
            }
        }
        self.update(id, |p| {
            p.total_consultations += 1;
            if let Some(r) = rating {
                let n = f64::from(p.rating_count);
                p.rating = (p.rating * n + r) / (n + 1.0);
                p.rating_count += 1;
            }
        })
    }

    fn update(
        &self,
        id: &ProviderId,
        apply: impl FnOnce(&mut ProviderIdentity),
    ) -> Result<ProviderIdentity, CoordinationError> {
        let mut identities = self.load()?;
        let identity = identities
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| CoordinationError::not_found("provider identity", id))?;
        apply(identity);
        let updated = identity.clone();
        self.save(&identities)?;
        Ok(updated)
    }
}

fn is_allowed_transition(from: VerificationStatus, to: VerificationStatus) -> bool {
    use VerificationStatus::*;
    matches!(
        (from, to),
        (Pending, Verified) | (Pending, Rejected) | (Verified, Suspended)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> ProviderIdentityRegistry {
        ProviderIdentityRegistry::new(Arc::new(MemoryStore::new()), CoordinationConfig::default())
    }

    fn details(name: &str) -> ProviderDetails {
        ProviderDetails {
            display_name: name.to_string(),
            service_title: "Obstetrician".into(),
            specializations: vec!["prenatal care".into()],
            consultation_fee: 50.0,
            max_patients: Some(10),
            license_number: Some("LIC-1".into()),
        }
    }

    #[test]
    fn sequences_increase_per_role() {
        let registry = registry();
        let a = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        let b = registry.create_profile("u2", RoleType::Doctor, details("B")).unwrap();
        let n = registry
            .create_profile("u3", RoleType::Nutritionist, details("N"))
            .unwrap();

        assert_eq!(a.id.to_string(), "doctor_001");
        assert_eq!(b.id.to_string(), "doctor_002");
        assert_eq!(n.id.to_string(), "nutritionist_001");
    }

    #[test]
    fn repeated_creation_yields_strictly_increasing_unique_ids() {
        let registry = registry();
        let mut previous = 0;
        for i in 0..12 {
            let p = registry
                .create_profile(&format!("u{i}"), RoleType::Yoga, details("Y"))
                .unwrap();
            assert!(p.id.sequence > previous);
            previous = p.id.sequence;
        }
        assert_eq!(previous, 12);
    }

    #[test]
    fn sequence_follows_max_not_count() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let registry = ProviderIdentityRegistry::new(store.clone(), CoordinationConfig::default());
        let seeded = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();

        // Simulate a gap left by an identity minted elsewhere.
        let mut identities = registry.all().unwrap();
        let mut far = seeded.clone();
        far.id = ProviderId::new(RoleType::Doctor, 7);
        identities.push(far);
        save_collection(store.as_ref(), keys::PROVIDER_IDENTITIES, &identities).unwrap();

        let next = registry.create_profile("u2", RoleType::Doctor, details("B")).unwrap();
        assert_eq!(next.id.sequence, 8);
    }

    #[test]
    fn exhausted_sequence_is_validation_error() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let registry = ProviderIdentityRegistry::new(store.clone(), CoordinationConfig::default());
        let mut last = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        last.id = ProviderId::new(RoleType::Doctor, u32::MAX);
        save_collection(store.as_ref(), keys::PROVIDER_IDENTITIES, &vec![last]).unwrap();

        assert!(matches!(
            registry.create_profile("u2", RoleType::Doctor, details("B")),
            Err(CoordinationError::Validation(_))
        ));
        let other = registry.create_profile("u3", RoleType::Yoga, details("Y")).unwrap();
        assert_eq!(other.id.sequence, 1);
    }

    #[test]
    fn new_identity_is_pending_and_inactive() {
        let registry = registry();
        let p = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        assert_eq!(p.verification_status, VerificationStatus::Pending);
        assert!(!p.is_active);
        assert_eq!(p.max_patients, 10);
    }

    #[test]
    fn approve_activates() {
        let registry = registry();
        let p = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        let approved = registry.approve(&p.id, "admin_001").unwrap();
        assert_eq!(approved.verification_status, VerificationStatus::Verified);
        assert!(approved.is_active);
        assert_eq!(approved.status_changed_by.as_deref(), Some("admin_001"));
    }

    #[test]
    fn approve_unknown_is_not_found() {
        let registry = registry();
        let err = registry
            .approve(&ProviderId::new(RoleType::Doctor, 99), "admin_001")
            .unwrap_err();
        assert!(matches!(err, CoordinationError::NotFound { .. }));
    }

    #[test]
    fn rejected_and_suspended_are_terminal() {
        let registry = registry();
        let a = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        registry.reject(&a.id, "admin_001", "license expired").unwrap();
        assert!(matches!(
            registry.approve(&a.id, "admin_001"),
            Err(CoordinationError::InvalidTransition { .. })
        ));

        let b = registry.create_profile("u2", RoleType::Doctor, details("B")).unwrap();
        registry.approve(&b.id, "admin_001").unwrap();
        let suspended = registry.suspend(&b.id, "admin_001", "complaint").unwrap();
        assert!(!suspended.is_active);
        assert_eq!(suspended.status_reason.as_deref(), Some("complaint"));
        assert!(registry.approve(&b.id, "admin_001").is_err());
    }

    #[test]
    fn cannot_suspend_pending_identity() {
        let registry = registry();
        let p = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        let err = registry.suspend(&p.id, "admin_001", "x").unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::InvalidTransition {
                from: VerificationStatus::Pending,
                to: VerificationStatus::Suspended,
                ..
            }
        ));
    }

    #[test]
    fn patient_role_cannot_hold_identity() {
        let registry = registry();
        let err = registry
            .create_profile("u1", RoleType::Patient, details("P"))
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));
    }

    #[test]
    fn blank_display_name_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.create_profile("u1", RoleType::Doctor, details(" ")),
            Err(CoordinationError::Validation(_))
        ));
    }

    #[test]
    fn search_filters_combine() {
        let registry = registry();
        let a = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        registry.create_profile("u2", RoleType::Doctor, details("B")).unwrap();
        registry
            .create_profile("u3", RoleType::Nutritionist, details("N"))
            .unwrap();
        registry.approve(&a.id, "admin_001").unwrap();

        let active_doctors = registry
            .search_by(&ProviderSearch {
                role_type: Some(RoleType::Doctor),
                is_active: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(active_doctors.len(), 1);
        assert_eq!(active_doctors[0].id, a.id);

        let prenatal = registry
            .search_by(&ProviderSearch {
                specialization: Some("PRENATAL".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(prenatal.len(), 3);

        let rated = registry
            .search_by(&ProviderSearch {
                min_rating: Some(4.0),
                ..Default::default()
            })
            .unwrap();
        assert!(rated.is_empty());
    }

    #[test]
    fn profiles_for_user_spans_roles() {
        let registry = registry();
        registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        registry.create_profile("u1", RoleType::Yoga, details("A")).unwrap();
        registry.create_profile("u2", RoleType::Yoga, details("B")).unwrap();

        let mine = registry.get_profiles_for_user("u1").unwrap();
        assert_eq!(mine.len(), 2);
        assert!(registry.get_profiles_for_user("u9").unwrap().is_empty());
    }

    #[test]
    fn consultations_fold_ratings_into_mean() {
        let registry = registry();
        let p = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        registry.record_consultation(&p.id, Some(4.0)).unwrap();
        registry.record_consultation(&p.id, None).unwrap();
        let updated = registry.record_consultation(&p.id, Some(5.0)).unwrap();

        assert_eq!(updated.total_consultations, 3);
        assert_eq!(updated.rating_count, 2);
        assert!((updated.rating - 4.5).abs() < 1e-9);
        assert!(registry.record_consultation(&p.id, Some(7.0)).is_err());
    }

    #[test]
    fn accepting_flag_is_persisted() {
        let registry = registry();
        let p = registry.create_profile("u1", RoleType::Doctor, details("A")).unwrap();
        registry.set_accepting_patients(&p.id, false).unwrap();
        let stored = registry.get_profile(&p.id).unwrap().unwrap();
        assert!(!stored.accepting_patients);
    }
}
