//! Language code resolution
//!
//! Produces one `LanguageAssignment` per spot from its raw language code.
//! Rules apply in order, first match wins: missing spot, COM/BB override,
//! missing code, the undetermined sentinel `L`, direct mapping, invalid
//! code. The review category generalizes leftover review cases to a
//! defaulted-English business-review assignment.

use crate::models::{
    AssignmentMethod, LanguageAssignment, LanguageBatchOutcome, LanguageStatus, Spot,
};
use crate::reference::ReferenceData;
use crate::store::SpotStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

/// Spots between progress log lines during batch processing.
const PROGRESS_INTERVAL: usize = 1000;

pub struct LanguageResolver {
    store: Arc<SpotStore>,
    reference: ReferenceData,
}

impl LanguageResolver {
    pub fn new(store: Arc<SpotStore>, reference: ReferenceData) -> Self {
        Self { store, reference }
    }

    fn english(&self) -> String {
        self.reference.english_code().to_string()
    }

    /// Resolve the language assignment for a single spot.
    pub fn resolve(&self, spot_id: i64) -> Result<LanguageAssignment> {
        let spot = self.store.get_spot_excluding_trade(spot_id)?;
        Ok(self.resolve_spot(spot_id, spot.as_ref()))
    }

    /// Apply the resolution rules to an already-fetched spot.
    pub fn resolve_spot(&self, spot_id: i64, spot: Option<&Spot>) -> LanguageAssignment {
        let Some(spot) = spot else {
            return LanguageAssignment::new(
                spot_id,
                self.english(),
                LanguageStatus::Invalid,
                AssignmentMethod::ErrorFallback,
            )
            .with_confidence(0.0)
            .with_review(true)
            .with_notes("Spot data not found");
        };

        let code = spot.language_hint();
        let spot_type = spot
            .spot_type
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_uppercase();

        // COM/BB: missing or undetermined code auto-defaults to English, no review
        if matches!(spot_type.as_str(), "COM" | "BB")
            && code.as_deref().map_or(true, |c| c == "L")
        {
            return LanguageAssignment::new(
                spot_id,
                self.english(),
                LanguageStatus::Determined,
                AssignmentMethod::AutoDefaultComBb,
            )
            .with_notes("COM/BB auto-default to English");
        }

        let Some(code) = code else {
            return LanguageAssignment::new(
                spot_id,
                self.english(),
                LanguageStatus::Default,
                AssignmentMethod::DefaultEnglish,
            )
            .with_confidence(0.5)
            .with_notes("No language code provided, defaulted to English");
        };

        if code == "L" {
            return LanguageAssignment::new(
                spot_id,
                "L",
                LanguageStatus::Undetermined,
                AssignmentMethod::UndeterminedFlagged,
            )
            .with_confidence(0.0)
            .with_review(true)
            .with_notes("Language not determined - requires manual review");
        }

        if self.reference.is_valid_code(&code) {
            return LanguageAssignment::new(
                spot_id,
                code,
                LanguageStatus::Determined,
                AssignmentMethod::DirectMapping,
            );
        }

        // Raw form is preserved so the bad value round-trips into review
        let raw = spot.language_code.clone().unwrap_or_default();
        LanguageAssignment::new(
            spot_id,
            raw.clone(),
            LanguageStatus::Invalid,
            AssignmentMethod::InvalidCodeFlagged,
        )
        .with_confidence(0.0)
        .with_review(true)
        .with_notes(format!(
            "Language code \"{}\" not found in languages table - requires manual review",
            raw
        ))
    }

    /// Process the language-assignment-required category.
    pub async fn process_language_required(&self, spot_ids: &[i64]) -> LanguageBatchOutcome {
        info!(
            "Processing {} language assignment required spots...",
            spot_ids.len()
        );
        let mut outcome = LanguageBatchOutcome::default();

        for (i, &spot_id) in spot_ids.iter().enumerate() {
            match self.assign_and_save(spot_id).await {
                Ok(requires_review) => {
                    outcome.processed += 1;
                    if requires_review {
                        outcome.review_flagged += 1;
                    } else {
                        outcome.assigned += 1;
                    }
                }
                Err(e) => {
                    error!("Error processing language required spot {}: {}", spot_id, e);
                    outcome.errors += 1;
                }
            }
            if (i + 1) % PROGRESS_INTERVAL == 0 {
                info!(
                    "Processed {}/{} language required spots...",
                    i + 1,
                    spot_ids.len()
                );
            }
        }
        outcome
    }

    /// Process the review category.
    ///
    /// Undetermined and invalid codes keep their specific reasons; any
    /// other review case generalizes to a defaulted-English assignment
    /// flagged for business review.
    pub async fn process_review(&self, spot_ids: &[i64]) -> LanguageBatchOutcome {
        info!("Processing {} review category spots...", spot_ids.len());
        let mut outcome = LanguageBatchOutcome::default();

        for &spot_id in spot_ids {
            let mut assignment = match self.resolve(spot_id) {
                Ok(a) => a,
                Err(e) => {
                    error!("Error resolving review spot {}: {}", spot_id, e);
                    outcome.errors += 1;
                    continue;
                }
            };

            if assignment.requires_review
                && !matches!(
                    assignment.status,
                    LanguageStatus::Undetermined | LanguageStatus::Invalid
                )
            {
                assignment = LanguageAssignment::new(
                    spot_id,
                    self.english(),
                    LanguageStatus::Default,
                    AssignmentMethod::BusinessReviewRequired,
                )
                .with_confidence(0.5)
                .with_review(true)
                .with_notes(
                    "Spot requires business review - revenue type/spot type combination \
                     needs manual evaluation",
                );
            }

            let requires_review = assignment.requires_review;
            match self.store.upsert_language_assignment(&assignment).await {
                Ok(()) => {
                    outcome.processed += 1;
                    if requires_review {
                        outcome.review_flagged += 1;
                    } else {
                        outcome.assigned += 1;
                    }
                }
                Err(e) => {
                    error!("Error saving review assignment for spot {}: {}", spot_id, e);
                    outcome.errors += 1;
                }
            }
        }
        outcome
    }

    /// Process the default-English category: the resolver is bypassed and a
    /// fixed determined-English assignment is written.
    pub async fn process_default_english(&self, spot_ids: &[i64]) -> LanguageBatchOutcome {
        info!("Processing {} default English spots...", spot_ids.len());
        let mut outcome = LanguageBatchOutcome::default();
        let english = self.english();

        for (i, &spot_id) in spot_ids.iter().enumerate() {
            let assignment = LanguageAssignment::new(
                spot_id,
                english.clone(),
                LanguageStatus::Determined,
                AssignmentMethod::BusinessRuleDefaultEnglish,
            )
            .with_notes("Default English by business rule - no language assignment required");

            match self.store.upsert_language_assignment(&assignment).await {
                Ok(()) => {
                    outcome.processed += 1;
                    outcome.assigned += 1;
                }
                Err(e) => {
                    error!(
                        "Error saving default English assignment for spot {}: {}",
                        spot_id, e
                    );
                    outcome.errors += 1;
                }
            }
            if (i + 1) % PROGRESS_INTERVAL == 0 {
                info!(
                    "Processed {}/{} default English spots...",
                    i + 1,
                    spot_ids.len()
                );
            }
        }
        outcome
    }

    /// Assignments that still require review after rules are applied.
    pub fn review_required_assignments(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<LanguageAssignment>> {
        let ids = self.store.list_review_required(limit)?;
        let mut out = Vec::new();
        for spot_id in ids {
            let assignment = self.resolve(spot_id)?;
            if assignment.requires_review {
                out.push(assignment);
            }
        }
        Ok(out)
    }

    async fn assign_and_save(&self, spot_id: i64) -> Result<bool> {
        let assignment = self.resolve(spot_id)?;
        let requires_review = assignment.requires_review;
        self.store.upsert_language_assignment(&assignment).await?;
        Ok(requires_review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpotCategory;

    fn fixture() -> (Arc<SpotStore>, LanguageResolver) {
        let store = Arc::new(SpotStore::in_memory().unwrap());
        store.insert_language(1, "E", "English").unwrap();
        store.insert_language(2, "M", "Mandarin").unwrap();
        store.insert_language(3, "C", "Cantonese").unwrap();
        store.insert_language(4, "T", "Tagalog").unwrap();

        let reference = ReferenceData::from_rows(&store.languages().unwrap());
        let resolver = LanguageResolver::new(store.clone(), reference);
        (store, resolver)
    }

    fn seed_spot(store: &SpotStore, spot_id: i64, spot_type: &str, code: Option<&str>) {
        let spot = Spot {
            spot_id,
            bill_code: "Acme".to_string(),
            agency_name: None,
            revenue_type: Some("Internal Ad Sales".to_string()),
            spot_type: Some(spot_type.to_string()),
            market_id: Some(1),
            air_date: Some("2024-01-15".to_string()),
            day_of_week: Some("Monday".to_string()),
            time_in: Some("10:00:00".to_string()),
            time_out: Some("10:30:00".to_string()),
            language_code: code.map(|c| c.to_string()),
            language_id: None,
            gross_rate: Some(100.0),
            broadcast_month: Some("Jan-24".to_string()),
            spot_category: None,
            import_batch_id: None,
        };
        store.insert_spot(&spot, None).unwrap();
    }

    #[test]
    fn missing_spot_is_an_error_fallback() {
        let (_store, resolver) = fixture();
        let a = resolver.resolve(404).unwrap();
        assert_eq!(a.status, LanguageStatus::Invalid);
        assert_eq!(a.method, AssignmentMethod::ErrorFallback);
        assert!(a.requires_review);
        assert_eq!(a.language_code, "E");
    }

    #[test]
    fn com_with_l_auto_defaults_to_english() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "COM", Some("L"));

        let a = resolver.resolve(1).unwrap();
        assert_eq!(a.language_code, "E");
        assert_eq!(a.status, LanguageStatus::Determined);
        assert_eq!(a.method, AssignmentMethod::AutoDefaultComBb);
        assert!(!a.requires_review);
    }

    #[test]
    fn bb_with_missing_code_auto_defaults() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "BB", None);

        let a = resolver.resolve(1).unwrap();
        assert_eq!(a.method, AssignmentMethod::AutoDefaultComBb);
        assert!(!a.requires_review);
    }

    #[test]
    fn missing_code_defaults_to_english_with_half_confidence() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "PKG", None);

        let a = resolver.resolve(1).unwrap();
        assert_eq!(a.status, LanguageStatus::Default);
        assert_eq!(a.method, AssignmentMethod::DefaultEnglish);
        assert_eq!(a.confidence, 0.5);
        assert!(!a.requires_review);
    }

    #[test]
    fn undetermined_l_on_non_com_is_flagged() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "PKG", Some("L"));

        let a = resolver.resolve(1).unwrap();
        assert_eq!(a.language_code, "L");
        assert_eq!(a.status, LanguageStatus::Undetermined);
        assert_eq!(a.method, AssignmentMethod::UndeterminedFlagged);
        assert!(a.requires_review);
    }

    #[test]
    fn valid_code_maps_directly_and_canonicalizes_case() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "COM", Some("m"));

        let a = resolver.resolve(1).unwrap();
        assert_eq!(a.language_code, "M");
        assert_eq!(a.status, LanguageStatus::Determined);
        assert_eq!(a.method, AssignmentMethod::DirectMapping);
        assert_eq!(a.confidence, 1.0);
    }

    #[test]
    fn invalid_code_round_trips_raw_value() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "PKG", Some("zz9"));

        let a = resolver.resolve(1).unwrap();
        assert_eq!(a.language_code, "zz9");
        assert_eq!(a.status, LanguageStatus::Invalid);
        assert_eq!(a.method, AssignmentMethod::InvalidCodeFlagged);
        assert!(a.requires_review);
    }

    #[test]
    fn trade_spot_resolves_as_missing() {
        let (store, resolver) = fixture();
        let mut spot = Spot {
            spot_id: 1,
            bill_code: "Acme".to_string(),
            agency_name: None,
            revenue_type: Some("Trade".to_string()),
            spot_type: Some("COM".to_string()),
            market_id: None,
            air_date: None,
            day_of_week: None,
            time_in: None,
            time_out: None,
            language_code: Some("M".to_string()),
            language_id: None,
            gross_rate: None,
            broadcast_month: None,
            spot_category: None,
            import_batch_id: None,
        };
        spot.spot_category = Some(SpotCategory::LanguageAssignmentRequired);
        store.insert_spot(&spot, None).unwrap();

        let a = resolver.resolve(1).unwrap();
        assert_eq!(a.method, AssignmentMethod::ErrorFallback);
    }

    #[tokio::test]
    async fn review_category_generalizes_non_specific_cases() {
        let (store, resolver) = fixture();
        // Undetermined keeps its specific reason
        seed_spot(&store, 1, "PKG", Some("L"));
        // Invalid keeps its specific reason
        seed_spot(&store, 2, "PKG", Some("XX"));

        let outcome = resolver.process_review(&[1, 2]).await;
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.review_flagged, 2);

        let a1 = store.get_language_assignment(1).unwrap().unwrap();
        assert_eq!(a1.method, AssignmentMethod::UndeterminedFlagged);
        let a2 = store.get_language_assignment(2).unwrap().unwrap();
        assert_eq!(a2.method, AssignmentMethod::InvalidCodeFlagged);
    }

    #[tokio::test]
    async fn default_english_category_bypasses_resolution() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "COM", Some("M"));

        let outcome = resolver.process_default_english(&[1]).await;
        assert_eq!(outcome.assigned, 1);

        let a = store.get_language_assignment(1).unwrap().unwrap();
        assert_eq!(a.language_code, "E");
        assert_eq!(a.method, AssignmentMethod::BusinessRuleDefaultEnglish);
        assert_eq!(a.status, LanguageStatus::Determined);
        assert!(!a.requires_review);
    }

    #[tokio::test]
    async fn language_required_outcome_counts_review_flags() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "COM", Some("M"));
        seed_spot(&store, 2, "PKG", Some("L"));
        seed_spot(&store, 3, "BNS", None);

        let outcome = resolver.process_language_required(&[1, 2, 3]).await;
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.assigned, 2);
        assert_eq!(outcome.review_flagged, 1);
        assert_eq!(outcome.errors, 0);
    }

    #[test]
    fn review_status_implies_review_flag() {
        let (store, resolver) = fixture();
        seed_spot(&store, 1, "PKG", Some("L"));
        seed_spot(&store, 2, "PKG", Some("??"));

        for spot_id in [1, 2] {
            let a = resolver.resolve(spot_id).unwrap();
            if matches!(
                a.status,
                LanguageStatus::Undetermined | LanguageStatus::Invalid
            ) {
                assert!(a.requires_review);
            }
        }
    }
}
