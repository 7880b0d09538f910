//! Pipeline orchestration
//!
//! Thin driver over the categorizer and the language resolver: tags
//! uncategorized spots, fans each category through its processor, and
//! aggregates batch outcomes. Force-recategorize clears the category tags
//! and both assignment tables, then re-tags from scratch.

use crate::engine::categorizer::categorize_spot;
use crate::engine::language::LanguageResolver;
use crate::models::{LanguageBatchOutcome, SpotCategory};
use crate::reference::ReferenceData;
use crate::store::SpotStore;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Result of a categorization pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategorizeOutcome {
    pub processed: usize,
    pub categorized: usize,
}

/// Aggregate of a full pipeline run across all categories
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub language_required: LanguageBatchOutcome,
    pub review_category: LanguageBatchOutcome,
    pub default_english: LanguageBatchOutcome,
    pub total_processed: usize,
    pub flagged_for_review: usize,
    pub total_errors: usize,
}

/// Tags spots with their processing category.
pub struct CategorizationService {
    store: Arc<SpotStore>,
    batch_size: usize,
}

impl CategorizationService {
    pub fn new(store: Arc<SpotStore>) -> Self {
        Self {
            store,
            batch_size: 5000,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Categorize every uncategorized spot (Trade rows are never listed).
    pub fn categorize_uncategorized(&self) -> Result<CategorizeOutcome> {
        let spot_ids = self.store.list_uncategorized(None)?;
        if spot_ids.is_empty() {
            info!("No uncategorized spots found");
            return Ok(CategorizeOutcome::default());
        }
        info!("Categorizing {} uncategorized spots...", spot_ids.len());

        let mut outcome = CategorizeOutcome::default();
        for chunk in spot_ids.chunks(self.batch_size) {
            let mut tagged = Vec::with_capacity(chunk.len());
            for &spot_id in chunk {
                let Some(spot) = self.store.get_spot(spot_id)? else {
                    continue;
                };
                if spot.is_trade() {
                    continue;
                }
                let category =
                    categorize_spot(spot.revenue_type.as_deref(), spot.spot_type.as_deref());
                tagged.push((spot_id, category));
            }
            outcome.processed += chunk.len();
            outcome.categorized += self.store.set_categories(&tagged)?;
            info!(
                "Categorized {}/{} spots...",
                outcome.processed,
                spot_ids.len()
            );
        }

        info!(
            "Categorization complete: {} spots categorized",
            outcome.categorized
        );
        Ok(outcome)
    }

    /// Clear all category tags and both assignment tables, then re-tag.
    pub fn force_recategorize(&self) -> Result<CategorizeOutcome> {
        let cleared = self.store.clear_categories()?;
        self.store.clear_assignments()?;
        info!("Cleared {} spot categories, recategorizing...", cleared);
        self.categorize_uncategorized()
    }
}

/// Drives the per-category language processors.
pub struct PipelineOrchestrator {
    store: Arc<SpotStore>,
    resolver: LanguageResolver,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<SpotStore>) -> Result<Self> {
        let reference = ReferenceData::from_rows(&store.languages()?);
        let resolver = LanguageResolver::new(store.clone(), reference);
        Ok(Self { store, resolver })
    }

    /// Abort early when the reference configuration cannot support a run.
    pub fn preflight(&self) -> Result<()> {
        if self.store.language_count()? == 0 {
            bail!("no valid languages configured - populate the languages table first");
        }
        if self.store.schedule_count()? == 0 {
            bail!("no active programming schedules configured");
        }
        Ok(())
    }

    pub fn resolver(&self) -> &LanguageResolver {
        &self.resolver
    }

    pub async fn process_language_required_category(
        &self,
        batch_id: Option<&str>,
    ) -> Result<LanguageBatchOutcome> {
        let spot_ids = self.store.list_by_category(
            SpotCategory::LanguageAssignmentRequired,
            batch_id,
            None,
        )?;
        if spot_ids.is_empty() {
            info!("No language assignment required spots found");
            return Ok(LanguageBatchOutcome::default());
        }
        Ok(self.resolver.process_language_required(&spot_ids).await)
    }

    pub async fn process_review_category(
        &self,
        batch_id: Option<&str>,
    ) -> Result<LanguageBatchOutcome> {
        let spot_ids =
            self.store
                .list_by_category(SpotCategory::ReviewCategory, batch_id, None)?;
        if spot_ids.is_empty() {
            info!("No review category spots found");
            return Ok(LanguageBatchOutcome::default());
        }
        Ok(self.resolver.process_review(&spot_ids).await)
    }

    pub async fn process_default_english_category(
        &self,
        batch_id: Option<&str>,
    ) -> Result<LanguageBatchOutcome> {
        let spot_ids =
            self.store
                .list_by_category(SpotCategory::DefaultEnglish, batch_id, None)?;
        if spot_ids.is_empty() {
            info!("No default English spots found");
            return Ok(LanguageBatchOutcome::default());
        }
        Ok(self.resolver.process_default_english(&spot_ids).await)
    }

    /// Process every category and aggregate the outcomes.
    pub async fn process_all_categories(&self, batch_id: Option<&str>) -> Result<PipelineSummary> {
        info!("Starting processing of all categories...");
        self.preflight()?;

        info!("Processing Language Assignment Required category...");
        let language_required = self.process_language_required_category(batch_id).await?;

        info!("Processing Review Category...");
        let review_category = self.process_review_category(batch_id).await?;

        info!("Processing Default English category...");
        let default_english = self.process_default_english_category(batch_id).await?;

        let summary = PipelineSummary {
            language_required,
            review_category,
            default_english,
            total_processed: language_required.processed
                + review_category.processed
                + default_english.processed,
            flagged_for_review: language_required.review_flagged
                + review_category.review_flagged,
            total_errors: language_required.errors
                + review_category.errors
                + default_english.errors,
        };

        info!(
            "All categories processing complete: processed={} flagged={} errors={}",
            summary.total_processed, summary.flagged_for_review, summary.total_errors
        );
        Ok(summary)
    }
}
