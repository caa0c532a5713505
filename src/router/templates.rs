//! Suggested subject lines for provider-to-provider messages.

use crate::models::RoleType;

/// Subject suggestions for one (sender role, recipient role) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTemplate {
    pub from: RoleType,
    pub to: RoleType,
    pub subjects: &'static [&'static str],
}

const TEMPLATES: &[MessageTemplate] = &[
    MessageTemplate {
        from: RoleType::Nutritionist,
        to: RoleType::Doctor,
        subjects: &[
            "Request lab review for dietary adjustment",
            "Weight gain concern",
            "Supplement recommendation approval",
            "Gestational diabetes meal plan review",
        ],
    },
    MessageTemplate {
        from: RoleType::Doctor,
        to: RoleType::Nutritionist,
        subjects: &[
            "Updated lab results available",
            "Dietary restrictions required",
            "Iron deficiency noted",
            "Blood sugar management needed",
        ],
    },
    MessageTemplate {
        from: RoleType::Yoga,
        to: RoleType::Doctor,
        subjects: &[
            "Exercise clearance request",
            "Physical discomfort reported",
            "Blood pressure concern during session",
        ],
    },
    MessageTemplate {
        from: RoleType::Doctor,
        to: RoleType::Yoga,
        subjects: &[
            "Activity restrictions update",
            "Cleared for prenatal yoga",
            "Modify routine for current trimester",
        ],
    },
    MessageTemplate {
        from: RoleType::Therapist,
        to: RoleType::Doctor,
        subjects: &[
            "Mood assessment follow-up",
            "Sleep disturbance reported",
            "Referral for medication review",
        ],
    },
    MessageTemplate {
        from: RoleType::Doctor,
        to: RoleType::Therapist,
        subjects: &[
            "Anxiety screening requested",
            "Postpartum support referral",
        ],
    },
    MessageTemplate {
        from: RoleType::Nutritionist,
        to: RoleType::Yoga,
        subjects: &["Energy levels and meal timing", "Hydration plan for sessions"],
    },
    MessageTemplate {
        from: RoleType::Yoga,
        to: RoleType::Nutritionist,
        subjects: &["Fatigue during sessions", "Pre-session nutrition question"],
    },
];

/// The full template table.
pub fn quick_message_templates() -> &'static [MessageTemplate] {
    TEMPLATES
}

/// Subjects for one sender/recipient pair; empty when none are defined.
pub fn templates_for(from: RoleType, to: RoleType) -> &'static [&'static str] {
    TEMPLATES
        .iter()
        .find(|t| t.from == from && t.to == to)
        .map(|t| t.subjects)
        .unwrap_or(&[])
}
