//! Provider recommendation scoring.
//!
//! Ranks active, accepting providers of one service type by a weighted
//! score. Reads only; nothing is persisted.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::care_team::CareTeamAssignmentStore;
use crate::config::CoordinationConfig;
use crate::error::{require, CoordinationError};
use crate::models::{ProviderIdentity, ProviderSearch, RoleType};
use crate::registry::ProviderIdentityRegistry;
use crate::store::KeyValueStore;

// ─── Weights ─────────────────────────────────────────────────────────────────

const AVAILABILITY_WEIGHT: f64 = 30.0;
const RATING_WEIGHT: f64 = 40.0;
const SPECIALIZATION_WEIGHT: f64 = 20.0;
const ACCEPTING_WEIGHT: f64 = 10.0;
const MAX_RATING: f64 = 5.0;

const EXCELLENT_RATING: f64 = 4.8;
const GOOD_AVAILABILITY: f64 = 0.2;

// ─── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RecommendationPreferences {
    /// Substring matched case-insensitively against each specialization.
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProvider {
    pub provider: ProviderIdentity,
    pub current_patients: usize,
    pub availability_ratio: f64,
    pub specialization_match: bool,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub recommended: Option<ScoredProvider>,
    pub alternatives: Vec<ScoredProvider>,
    pub reasoning: String,
}

// ─── Scoring primitives ──────────────────────────────────────────────────────

/// Spare capacity in [0, 1]. Full or over-full providers score 0.
pub fn availability_ratio(current: usize, max: u32) -> f64 {
    if max == 0 {
        return 0.0;
    }
    let max = f64::from(max);
    ((max - current as f64) / max).clamp(0.0, 1.0)
}

pub fn score(
    availability: f64,
    rating: f64,
    specialization_match: bool,
    accepting: bool,
) -> f64 {
    availability * AVAILABILITY_WEIGHT
        + (rating / MAX_RATING) * RATING_WEIGHT
        + if specialization_match { SPECIALIZATION_WEIGHT } else { 0.0 }
        + if accepting { ACCEPTING_WEIGHT } else { 0.0 }
}

fn reasoning_for(top: &ScoredProvider) -> String {
    let mut reasons = Vec::new();
    if top.provider.rating >= EXCELLENT_RATING {
        reasons.push("Excellent rating");
    }
    if top.availability_ratio > GOOD_AVAILABILITY {
        reasons.push("Good availability");
    }
    if top.provider.specializations.len() > 1 {
        reasons.push("Multiple specializations");
    }
    if reasons.is_empty() {
        return "Best match among available providers".to_string();
    }
    reasons.join(", ")
}

/// Score descending, then identity id ascending.
fn rank(a: &ScoredProvider, b: &ScoredProvider) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.provider.id.cmp(&b.provider.id))
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct ProviderRecommendationEngine {
    registry: ProviderIdentityRegistry,
    care_team: CareTeamAssignmentStore,
    config: CoordinationConfig,
}

impl ProviderRecommendationEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CoordinationConfig) -> Self {
        Self {
            registry: ProviderIdentityRegistry::new(Arc::clone(&store), config.clone()),
            care_team: CareTeamAssignmentStore::new(store, config.clone()),
            config,
        }
    }

    /// Pick the best provider of `service_type` for a patient, plus runners-up.
    pub fn suggest(
        &self,
        patient_id: &str,
        service_type: RoleType,
        preferences: &RecommendationPreferences,
    ) -> Result<Recommendation, CoordinationError> {
        require("patient_id", patient_id)?;
        let span = tracing::info_span!(
            "suggest_provider",
            patient_id,
            service_type = service_type.as_str()
        );
        let _guard = span.enter();

        let mut ranked = self.ranked(service_type, preferences)?.into_iter();
        let recommended = ranked.next();
        let alternatives: Vec<ScoredProvider> =
            ranked.take(self.config.alternative_provider_count).collect();

        let reasoning = match &recommended {
            Some(top) => reasoning_for(top),
            None => format!("No active {} is accepting patients", service_type.label()),
        };

        tracing::debug!(
            recommended = ?recommended.as_ref().map(|p| p.provider.id.to_string()),
            alternatives = alternatives.len(),
            "Provider recommendation computed"
        );
        Ok(Recommendation {
            recommended,
            alternatives,
            reasoning,
        })
    }

    /// Active, accepting providers of `service_type`, best first.
    ///
    /// Current patient counts come from one load of the assignments.
    fn ranked(
        &self,
        service_type: RoleType,
        preferences: &RecommendationPreferences,
    ) -> Result<Vec<ScoredProvider>, CoordinationError> {
        let candidates = self.registry.search_by(&ProviderSearch {
            role_type: Some(service_type),
            is_active: Some(true),
            ..Default::default()
        })?;
        let counts = self.care_team.patient_counts()?;

        let mut scored: Vec<ScoredProvider> = candidates
            .into_iter()
            .filter(|p| p.accepting_patients)
            .map(|provider| {
                let current = counts.get(&provider.id).copied().unwrap_or(0);
                score_provider(provider, current, preferences)
            })
            .collect();
        scored.sort_by(rank);
        Ok(scored)
    }

    /// Scores for every candidate, keyed by id. Diagnostic view of `suggest`.
    pub fn scoreboard(
        &self,
        service_type: RoleType,
        preferences: &RecommendationPreferences,
    ) -> Result<BTreeMap<String, f64>, CoordinationError> {
        Ok(self
            .ranked(service_type, preferences)?
            .into_iter()
            .map(|p| (p.provider.id.to_string(), p.score))
            .collect())
    }
}

fn score_provider(
    provider: ProviderIdentity,
    current_patients: usize,
    preferences: &RecommendationPreferences,
) -> ScoredProvider {
    let availability = availability_ratio(current_patients, provider.max_patients);
    let specialization_match = preferences
        .specialization
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty() && provider.has_specialization(s.trim()));
    let total = score(
        availability,
        provider.rating,
        specialization_match,
        provider.accepting_patients,
    );
    ScoredProvider {
        provider,
        current_patients,
        availability_ratio: availability,
        specialization_match,
        score: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::care_team::AssignRequest;
    use crate::models::{ProviderDetails, ProviderId};
    use crate::store::{keys, load_collection, save_collection, MemoryStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct Fixture {
        store: Arc<dyn KeyValueStore>,
        registry: ProviderIdentityRegistry,
        engine: ProviderRecommendationEngine,
    }

    fn fixture() -> Fixture {
        fixture_on(Arc::new(MemoryStore::new()))
    }

    fn fixture_on(store: Arc<dyn KeyValueStore>) -> Fixture {
        let config = CoordinationConfig::default();
        Fixture {
            registry: ProviderIdentityRegistry::new(Arc::clone(&store), config.clone()),
            engine: ProviderRecommendationEngine::new(Arc::clone(&store), config),
            store,
        }
    }

    impl Fixture {
        fn provider(&self, name: &str, specs: &[&str], rating: f64, max: u32) -> ProviderId {
            let p = self
                .registry
                .create_profile(
                    name,
                    RoleType::Nutritionist,
                    ProviderDetails {
                        display_name: name.into(),
                        specializations: specs.iter().map(|s| s.to_string()).collect(),
                        max_patients: Some(max),
                        ..Default::default()
                    },
                )
                .unwrap();
            self.registry.approve(&p.id, "admin_001").unwrap();
            self.set_rating(&p.id, rating);
            p.id
        }

        fn set_rating(&self, id: &ProviderId, rating: f64) {
            let mut all: Vec<ProviderIdentity> =
                load_collection(self.store.as_ref(), keys::PROVIDER_IDENTITIES).unwrap();
            for p in all.iter_mut().filter(|p| &p.id == id) {
                p.rating = rating;
            }
            save_collection(self.store.as_ref(), keys::PROVIDER_IDENTITIES, &all).unwrap();
        }
    }

    #[test]
    fn availability_is_clamped() {
        assert_eq!(availability_ratio(0, 10), 1.0);
        assert!((availability_ratio(5, 10) - 0.5).abs() < 1e-9);
        assert_eq!(availability_ratio(12, 10), 0.0);
        assert_eq!(availability_ratio(0, 0), 0.0);
    }

    #[test]
    fn score_uses_documented_weights() {
        assert!((score(1.0, 5.0, true, true) - 100.0).abs() < 1e-9);
        assert!((score(0.5, 2.5, false, true) - 45.0).abs() < 1e-9);
        assert_eq!(score(0.0, 0.0, false, false), 0.0);
    }

    #[test]
    fn highest_score_wins_and_alternatives_are_capped() {
        let f = fixture();
        let low = f.provider("Low", &["diabetes"], 3.0, 10);
        let top = f.provider("Top", &["gestational diabetes", "anemia"], 4.9, 10);
        for name in ["C", "D", "E"] {
            f.provider(name, &[], 2.0, 10);
        }

        let rec = f
            .engine
            .suggest("patient_001", RoleType::Nutritionist, &Default::default())
            .unwrap();
        let best = rec.recommended.unwrap();
        assert_eq!(best.provider.id, top);
        assert_eq!(rec.alternatives.len(), 3);
        assert_eq!(rec.alternatives[0].provider.id, low);
        assert_eq!(
            rec.reasoning,
            "Excellent rating, Good availability, Multiple specializations"
        );
    }

    #[test]
    fn specialization_preference_adds_weight() {
        let f = fixture();
        let plain = f.provider("Plain", &["sports"], 4.0, 10);
        let matched = f.provider("Matched", &["Gestational Diabetes"], 4.0, 10);

        let prefs = RecommendationPreferences {
            specialization: Some("diabetes".into()),
        };
        let rec = f.engine.suggest("patient_001", RoleType::Nutritionist, &prefs).unwrap();
        let best = rec.recommended.unwrap();
        assert_eq!(best.provider.id, matched);
        assert!(best.specialization_match);
        assert_eq!(rec.alternatives[0].provider.id, plain);
        assert!((best.score - rec.alternatives[0].score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn workload_lowers_availability() {
        let f = fixture();
        let busy = f.provider("Busy", &[], 4.0, 2);
        let idle = f.provider("Idle", &[], 4.0, 2);
        let care = CareTeamAssignmentStore::new(Arc::clone(&f.store), CoordinationConfig::default());
        care.assign(
            &AssignRequest {
                patient_id: "patient_009".into(),
                patient_name: "Meera".into(),
                service_type: RoleType::Nutritionist,
                provider_id: busy,
                provider_name: "Busy".into(),
                notes: None,
            },
            "admin_001",
        )
        .unwrap();

        let rec = f
            .engine
            .suggest("patient_001", RoleType::Nutritionist, &Default::default())
            .unwrap();
        let best = rec.recommended.unwrap();
        assert_eq!(best.provider.id, idle);
        assert_eq!(rec.alternatives[0].current_patients, 1);
        assert!((rec.alternatives[0].availability_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ties_break_by_id_and_repeat_identically() {
        let f = fixture();
        let first = f.provider("A", &[], 4.0, 10);
        let second = f.provider("B", &[], 4.0, 10);

        let one = f
            .engine
            .suggest("patient_001", RoleType::Nutritionist, &Default::default())
            .unwrap();
        let two = f
            .engine
            .suggest("patient_001", RoleType::Nutritionist, &Default::default())
            .unwrap();
        assert_eq!(one.recommended.as_ref().unwrap().provider.id, first);
        assert_eq!(one.alternatives[0].provider.id, second);
        assert_eq!(one, two);
    }

    #[test]
    fn inactive_and_closed_providers_are_skipped() {
        let f = fixture();
        let closed = f.provider("Closed", &[], 5.0, 10);
        f.registry.set_accepting_patients(&closed, false).unwrap();
        f.registry
            .create_profile(
                "pending",
                RoleType::Nutritionist,
                ProviderDetails {
                    display_name: "Pending".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let rec = f
            .engine
            .suggest("patient_001", RoleType::Nutritionist, &Default::default())
            .unwrap();
        assert!(rec.recommended.is_none());
        assert!(rec.alternatives.is_empty());
        assert_eq!(rec.reasoning, "No active Nutritionist is accepting patients");
    }

    #[test]
    fn suggest_does_not_write() {
        let f = fixture();
        f.provider("A", &[], 4.0, 10);
        let before: Vec<ProviderIdentity> =
            load_collection(f.store.as_ref(), keys::PROVIDER_IDENTITIES).unwrap();
        f.engine
            .suggest("patient_001", RoleType::Nutritionist, &Default::default())
            .unwrap();
        let after: Vec<ProviderIdentity> =
            load_collection(f.store.as_ref(), keys::PROVIDER_IDENTITIES).unwrap();
        assert_eq!(before, after);
        assert!(f.engine.scoreboard(RoleType::Nutritionist, &Default::default()).unwrap().len() == 1);
    }

    /// Counts reads of the assignment collection.
    struct CountingStore {
        inner: MemoryStore,
        assignment_reads: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
            if key == keys::CARE_TEAM_ASSIGNMENTS {
                self.assignment_reads.fetch_add(1, AtomicOrdering::SeqCst);
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
            self.inner.set(key, value)
        }
    }

    #[test]
    fn assignments_are_read_once_per_request() {
        let counting = Arc::new(CountingStore {
            inner: MemoryStore::new(),
            assignment_reads: AtomicUsize::new(0),
        });
        let f = fixture_on(Arc::clone(&counting) as Arc<dyn KeyValueStore>);
        for name in ["A", "B", "C", "D", "E"] {
            f.provider(name, &[], 4.0, 10);
        }

        counting.assignment_reads.store(0, AtomicOrdering::SeqCst);
        f.engine
            .suggest("patient_001", RoleType::Nutritionist, &Default::default())
            .unwrap();
        assert_eq!(counting.assignment_reads.load(AtomicOrdering::SeqCst), 1);

        counting.assignment_reads.store(0, AtomicOrdering::SeqCst);
        f.engine
            .scoreboard(RoleType::Nutritionist, &Default::default())
            .unwrap();
        assert_eq!(counting.assignment_reads.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn scoreboard_agrees_with_suggest() {
        let f = fixture();
        let busy = f.provider("Busy", &["anemia"], 4.5, 4);
        f.provider("Idle", &[], 4.0, 4);
        f.provider("Other", &["anemia"], 3.0, 4);
        let care = CareTeamAssignmentStore::new(Arc::clone(&f.store), CoordinationConfig::default());
        care.assign(
            &AssignRequest {
                patient_id: "patient_002".into(),
                patient_name: "Lata".into(),
                service_type: RoleType::Nutritionist,
                provider_id: busy,
                provider_name: "Busy".into(),
                notes: None,
            },
            "admin_001",
        )
        .unwrap();

        let prefs = RecommendationPreferences {
            specialization: Some("anemia".into()),
        };
        let rec = f.engine.suggest("patient_001", RoleType::Nutritionist, &prefs).unwrap();
        let board = f.engine.scoreboard(RoleType::Nutritionist, &prefs).unwrap();

        let from_suggest: BTreeMap<String, f64> = rec
            .recommended
            .iter()
            .chain(rec.alternatives.iter())
            .map(|p| (p.provider.id.to_string(), p.score))
            .collect();
        assert_eq!(board, from_suggest);
        let busy_entry = rec
            .recommended
            .iter()
            .chain(rec.alternatives.iter())
            .find(|p| p.provider.id == busy)
            .unwrap();
        assert_eq!(busy_entry.current_patients, 1);
    }
}
