//! Care-team access checks for routed communications.
//!
//! Cascade, checked in order, default-deny:
//! 1. Original recipient of the message → ALLOW
//! 2. Active member of the patient's care team → ALLOW
//! 3. Default → DENY
//!
//! Membership is decided purely from the patient's current assignments;
//! a provider whose slot was ended or replaced loses access immediately.

use crate::models::{CareTeamAssignment, ProviderId};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Why access was granted or denied, for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    /// The provider the message was routed to.
    Recipient,
    /// Currently holds an active slot on the patient's care team.
    ActiveTeamMember,
    /// No matching rule.
    Denied,
}

impl AccessReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recipient => "recipient",
            Self::ActiveTeamMember => "active_team_member",
            Self::Denied => "denied",
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::Denied,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Checks
// ═══════════════════════════════════════════════════════════

/// Is `provider_id` an active member of this care team?
pub fn is_active_team_member(team: Option<&CareTeamAssignment>, provider_id: &ProviderId) -> bool {
    team.is_some_and(|t| t.has_active_member(provider_id))
}

/// Check whether `provider_id` may act on a patient's communications.
///
/// `recipient` is the provider a specific message was routed to, when the
/// check concerns one message (responding); `None` for patient-wide reads.
pub fn check_team_access(
    team: Option<&CareTeamAssignment>,
    provider_id: &ProviderId,
    recipient: Option<&ProviderId>,
) -> AccessDecision {
    // Rule 1: Original recipient
    if recipient == Some(provider_id) {
        return AccessDecision::allow(AccessReason::Recipient);
    }

    // Rule 2: Active team member
    if is_active_team_member(team, provider_id) {
        return AccessDecision::allow(AccessReason::ActiveTeamMember);
    }

    // Rule 3: Default deny
    AccessDecision::deny()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignmentRecord, AssignmentStatus, RoleType};
    use chrono::Utc;

    fn doctor() -> ProviderId {
        ProviderId::new(RoleType::Doctor, 1)
    }
    fn nutritionist() -> ProviderId {
        ProviderId::new(RoleType::Nutritionist, 1)
    }
    fn outsider() -> ProviderId {
        ProviderId::new(RoleType::Yoga, 9)
    }

    fn team_with(members: &[(ProviderId, AssignmentStatus)]) -> CareTeamAssignment {
        let mut team = CareTeamAssignment::new("patient_001", "Asha", Utc::now());
        for (provider, status) in members {
            team.assignments
                .entry(provider.role)
                .or_default()
                .push(AssignmentRecord {
                    provider_id: *provider,
                    provider_name: provider.to_string(),
                    assigned_at: Utc::now(),
                    assigned_by: "admin_001".into(),
                    status: *status,
                    notes: None,
                    ended_at: None,
                    ended_by: None,
                    end_reason: None,
                });
        }
        team
    }

    // ── Rule 1: Recipient ────────────────────────────────

    #[test]
    fn recipient_allowed_even_after_leaving_team() {
        let team = team_with(&[(doctor(), AssignmentStatus::Inactive)]);
        let decision = check_team_access(Some(&team), &doctor(), Some(&doctor()));
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::Recipient);
    }

    // ── Rule 2: Active member ────────────────────────────

    #[test]
    fn active_member_allowed() {
        let team = team_with(&[
            (doctor(), AssignmentStatus::Active),
            (nutritionist(), AssignmentStatus::Active),
        ]);
        let decision = check_team_access(Some(&team), &nutritionist(), Some(&doctor()));
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::ActiveTeamMember);
    }

    #[test]
    fn inactive_member_denied() {
        let team = team_with(&[(nutritionist(), AssignmentStatus::Inactive)]);
        let decision = check_team_access(Some(&team), &nutritionist(), None);
        assert!(!decision.allowed);
    }

    // ── Rule 3: Default deny ─────────────────────────────

    #[test]
    fn outsider_denied() {
        let team = team_with(&[(doctor(), AssignmentStatus::Active)]);
        let decision = check_team_access(Some(&team), &outsider(), Some(&doctor()));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::Denied);
    }

    #[test]
    fn no_team_denies_everyone_but_recipient() {
        assert!(!check_team_access(None, &doctor(), None).allowed);
        assert!(check_team_access(None, &doctor(), Some(&doctor())).allowed);
        assert!(!is_active_team_member(None, &doctor()));
    }
}
