use crate::store::StoreError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(StoreError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(RoleType {
    Patient => "patient",
    Doctor => "doctor",
    Nutritionist => "nutritionist",
    Yoga => "yoga",
    Therapist => "therapist",
    Admin => "admin",
});

impl RoleType {
    /// Roles that can fill a care-team slot.
    pub fn is_care_service(&self) -> bool {
        matches!(
            self,
            Self::Doctor | Self::Nutritionist | Self::Yoga | Self::Therapist
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Doctor => "Doctor",
            Self::Nutritionist => "Nutritionist",
            Self::Yoga => "Yoga Instructor",
            Self::Therapist => "Therapist",
            Self::Admin => "Administrator",
        }
    }
}

str_enum!(VerificationStatus {
    Pending => "pending",
    Verified => "verified",
    Rejected => "rejected",
    Suspended => "suspended",
});

str_enum!(AssignmentStatus {
    Active => "active",
    Inactive => "inactive",
    Pending => "pending",
});

str_enum!(RoleStatus {
    Active => "active",
    Pending => "pending",
    Rejected => "rejected",
});

str_enum!(MessageType {
    ConsultationRequest => "consultation_request",
    LabReview => "lab_review",
    PrescriptionUpdate => "prescription_update",
    ProgressNote => "progress_note",
    EmergencyAlert => "emergency_alert",
    DataUpdate => "data_update",
});

impl MessageType {
    pub fn requires_response(&self) -> bool {
        matches!(self, Self::ConsultationRequest | Self::EmergencyAlert)
    }
}

str_enum!(SharedDataType {
    LabReport => "lab_report",
    MealPlan => "meal_plan",
    Prescription => "prescription",
    ProgressNote => "progress_note",
    ExercisePlan => "exercise_plan",
});

impl SharedDataType {
    /// Sharing these escalates the team notification to urgent.
    pub fn escalates_on_share(&self) -> bool {
        *self == Self::LabReport
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::LabReport => "lab report",
            Self::MealPlan => "meal plan",
            Self::Prescription => "prescription",
            Self::ProgressNote => "progress note",
            Self::ExercisePlan => "exercise plan",
        }
    }
}
