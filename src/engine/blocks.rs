//! Language block assignment engine
//!
//! Resolves each spot to a language block (or a set of spanned blocks, or a
//! schedule-wide campaign shape) through an ordered rule cascade:
//!
//! 1. WorldLink direct response
//! 2. Paid Programming revenue type
//! 3. Operational time-based Chinese windows (06-08, 19-24)
//! 4. Enhanced Chinese evening pattern
//! 5. ROS by duration (> 6 hours)
//! 6. ROS by time pattern
//! 7. Grid overlap analysis: Chinese family span, Tagalog pattern, single
//!    block, multi-block language-family reasoning
//!
//! First match wins. The operational Chinese rule suppresses itself when no
//! Chinese block overlaps the spot and the cascade drops straight to grid
//! analysis; this keeps non-Chinese evening programming out of the Chinese
//! buckets.

use crate::engine::timeutil;
use crate::models::{
    BlockAssignment, BlockStats, BusinessRule, CampaignType, CustomerIntent, LanguageBlock, Spot,
};
use crate::reference::{self, ReferenceData};
use crate::store::{AssignmentDetails, SpotStore};
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Spots longer than this are ROS, not language-targeted.
const ROS_DURATION_MINUTES: u32 = 360;

/// Multi-family spans at least this long (or this wide) are ROS rather than
/// true multi-language buys.
const ROS_SPAN_MINUTES: u32 = 1020;
const ROS_SPAN_BLOCKS: usize = 15;

/// Outcome of a test-assignment run over a small sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub spots_tested: usize,
    pub stats: BlockStats,
    pub success_rate: f64,
    pub details: Vec<AssignmentDetails>,
}

/// Time-window language decision from the operational (master control) rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationalLanguage {
    Chinese,
    /// Weekend Hmong exception: resolved by the grid path, not here
    Hmong,
}

pub struct BlockAssignmentEngine {
    store: Arc<SpotStore>,
    reference: ReferenceData,
    stats: BlockStats,
    progress_interval: usize,
}

impl BlockAssignmentEngine {
    pub fn new(store: Arc<SpotStore>, reference: ReferenceData) -> Self {
        Self {
            store,
            reference,
            stats: BlockStats::default(),
            progress_interval: 100,
        }
    }

    pub fn stats(&self) -> BlockStats {
        self.stats
    }

    /// Assign a single spot. Every reachable outcome persists an assignment;
    /// only a missing spot row produces an unpersisted result.
    pub async fn assign_single_spot(&mut self, spot_id: i64) -> Result<BlockAssignment> {
        let result = self.assign_inner(spot_id).await;
        self.stats.processed += 1;
        if result.is_err() {
            self.stats.errors += 1;
        }
        result
    }

    async fn assign_inner(&mut self, spot_id: i64) -> Result<BlockAssignment> {
        let Some(spot) = self.store.get_spot(spot_id)? else {
            warn!(spot_id, "spot not found, skipping block assignment");
            let mut a = BlockAssignment::new(spot_id);
            a.error_message = Some("Spot not found or invalid".to_string());
            a.requires_attention = true;
            return Ok(a);
        };

        if spot.market_id.is_none() {
            let a = BlockAssignment::no_grid(spot_id, None, "Spot has no market assignment");
            self.store.upsert_block_assignment(&a).await?;
            self.stats.no_coverage += 1;
            return Ok(a);
        }

        if spot.time_in.is_none() || spot.time_out.is_none() || spot.day_of_week.is_none() {
            let a = BlockAssignment::no_grid(spot_id, None, "Spot has no airing time fields");
            self.store.upsert_block_assignment(&a).await?;
            self.stats.no_coverage += 1;
            return Ok(a);
        }

        // Precedence rules first
        if let Some(result) = self.apply_precedence_rules(&spot)? {
            debug!(
                spot_id,
                rule = ?result.business_rule_applied,
                "precedence rule applied"
            );
            self.store.upsert_block_assignment(&result).await?;
            self.record(&result);
            return Ok(result);
        }

        // Grid analysis
        let market_id = spot.market_id.unwrap_or_default();
        let air_date = spot.air_date.clone().unwrap_or_default();
        let Some(schedule_id) = self.store.active_schedule_for(market_id, &air_date)? else {
            let a = BlockAssignment::no_grid(spot_id, None, "No programming grid for market");
            self.store.upsert_block_assignment(&a).await?;
            self.stats.no_coverage += 1;
            return Ok(a);
        };

        let blocks = self.overlapping_blocks(schedule_id, &spot)?;
        if blocks.is_empty() {
            let a = BlockAssignment::no_grid(
                spot_id,
                Some(schedule_id),
                "No language blocks cover spot time",
            );
            self.store.upsert_block_assignment(&a).await?;
            self.stats.no_coverage += 1;
            return Ok(a);
        }

        let result = self
            .analyze_base_assignment(&spot, schedule_id, &blocks)
            .unwrap_or_else(|| {
                error!(spot_id, "block analysis returned no result, using fallback");
                Self::fallback_assignment(spot_id, schedule_id, &blocks)
            });

        self.store.upsert_block_assignment(&result).await?;
        self.record(&result);
        Ok(result)
    }

    /// Assign a batch of spots. When `spot_ids` is empty, unassigned spots
    /// are pulled from the store (optionally year-scoped).
    pub async fn assign_spots_batch(
        &mut self,
        spot_ids: Option<Vec<i64>>,
        year: Option<i32>,
        limit: Option<usize>,
    ) -> Result<BlockStats> {
        info!("Starting batch spot assignment");
        self.stats = BlockStats::default();

        let spots_to_process = match spot_ids {
            Some(ids) => ids,
            None => self.store.list_unassigned_blocks(year, limit)?,
        };
        info!("Processing {} spots", spots_to_process.len());

        for (i, spot_id) in spots_to_process.iter().enumerate() {
            if let Err(e) = self.assign_single_spot(*spot_id).await {
                error!("Failed to process spot {}: {}", spot_id, e);
            }
            if (i + 1) % self.progress_interval == 0 {
                info!("Processed {}/{} spots...", i + 1, spots_to_process.len());
            }
        }

        info!("Batch assignment completed: {:?}", self.stats);
        Ok(self.stats)
    }

    /// Assign a small sample and report per-spot details.
    pub async fn test_assignment(&mut self, limit: usize) -> Result<TestOutcome> {
        info!("Running test assignment with {} spots", limit);
        let test_ids = self.store.list_unassigned_blocks(None, Some(limit))?;
        if test_ids.is_empty() {
            return Ok(TestOutcome {
                spots_tested: 0,
                stats: BlockStats::default(),
                success_rate: 0.0,
                details: Vec::new(),
            });
        }

        let stats = self.assign_spots_batch(Some(test_ids.clone()), None, None).await?;

        let mut details = Vec::new();
        for spot_id in &test_ids {
            if let Some(d) = self.store.assignment_details(*spot_id)? {
                details.push(d);
            }
        }

        let resolved = stats.assigned + stats.no_coverage + stats.multi_block;
        let success_rate = if stats.processed > 0 {
            resolved as f64 / stats.processed as f64
        } else {
            0.0
        };

        Ok(TestOutcome {
            spots_tested: test_ids.len(),
            stats,
            success_rate,
            details,
        })
    }

    fn record(&mut self, result: &BlockAssignment) {
        match result.campaign_type {
            CampaignType::Ros | CampaignType::MultiLanguage => self.stats.multi_block += 1,
            _ => self.stats.assigned += 1,
        }
    }

    // ---- precedence rules ----

    fn apply_precedence_rules(&self, spot: &Spot) -> Result<Option<BlockAssignment>> {
        // Rule 1: WorldLink direct response (highest priority)
        if Self::is_worldlink_spot(spot) {
            return Ok(Some(BlockAssignment::schedule_wide(
                spot.spot_id,
                1,
                CustomerIntent::Indifferent,
                CampaignType::DirectResponse,
                BusinessRule::WorldlinkDirectResponse,
            )));
        }

        // Rule 2: Paid Programming
        if spot.revenue_type.as_deref() == Some("Paid Programming") {
            return Ok(Some(BlockAssignment::schedule_wide(
                spot.spot_id,
                1,
                CustomerIntent::Indifferent,
                CampaignType::PaidProgramming,
                BusinessRule::RevenueTypePaidProgramming,
            )));
        }

        // Rule 3: operational time-based language windows
        match self.operational_language(spot) {
            Some(OperationalLanguage::Chinese) => {
                // Suppresses itself (and the remaining precedence rules)
                // when no Chinese block actually overlaps the spot.
                return self.operational_chinese_assignment(spot);
            }
            Some(OperationalLanguage::Hmong) => {
                // Resolved by grid overlap against the Hmong block
            }
            None => {}
        }

        // Rule 4: enhanced Chinese evening pattern
        if self.is_chinese_pattern_enhanced(spot) {
            let market_id = spot.market_id.unwrap_or_default();
            let air_date = spot.air_date.as_deref().unwrap_or_default();
            let schedule_id = self
                .store
                .active_schedule_for(market_id, air_date)?
                .unwrap_or(1);
            return Ok(Some(BlockAssignment::schedule_wide(
                spot.spot_id,
                schedule_id,
                CustomerIntent::LanguageSpecific,
                CampaignType::LanguageSpecific,
                BusinessRule::ChinesePattern,
            )));
        }

        // Rule 5: ROS by duration, unless the Tagalog pattern claims it
        if !self.is_tagalog_pattern(spot) {
            let duration = Self::spot_duration(spot);
            if duration > ROS_DURATION_MINUTES {
                return Ok(Some(BlockAssignment::schedule_wide(
                    spot.spot_id,
                    1,
                    CustomerIntent::Indifferent,
                    CampaignType::Ros,
                    BusinessRule::RosDuration,
                )));
            }
        }

        // Rule 6: ROS by time pattern
        if self.is_ros_by_time(spot) {
            return Ok(Some(BlockAssignment::schedule_wide(
                spot.spot_id,
                1,
                CustomerIntent::Indifferent,
                CampaignType::Ros,
                BusinessRule::RosTime,
            )));
        }

        Ok(None)
    }

    /// Emit an operational Chinese assignment, or nothing when the grid has
    /// no Chinese coverage for the spot (the cascade then falls through to
    /// plain grid analysis).
    fn operational_chinese_assignment(&self, spot: &Spot) -> Result<Option<BlockAssignment>> {
        let market_id = spot.market_id.unwrap_or_default();
        let air_date = spot.air_date.as_deref().unwrap_or_default();

        let Some(schedule_id) = self.store.active_schedule_for(market_id, air_date)? else {
            warn!(
                spot_id = spot.spot_id,
                "no schedule for operational Chinese rule, deferring to grid analysis"
            );
            return Ok(None);
        };

        let blocks = self.overlapping_blocks(schedule_id, spot)?;
        let chinese_blocks: Vec<&LanguageBlock> = blocks
            .iter()
            .filter(|b| reference::is_chinese(b.language_id))
            .collect();

        if chinese_blocks.is_empty() {
            warn!(
                spot_id = spot.spot_id,
                "no Chinese blocks found for operational rule, deferring to grid analysis"
            );
            return Ok(None);
        }

        // The classic 19:00-to-midnight shape spans the whole Chinese
        // evening and is labeled as a family span; the literal 23:59:00 end
        // is treated as equivalent to the normalized rollover midnight.
        if Self::is_chinese_family_time(spot) {
            let primary = Self::primary_chinese_block(&blocks.iter().collect::<Vec<_>>());
            let mut a = BlockAssignment::new(spot.spot_id);
            a.schedule_id = Some(schedule_id);
            a.customer_intent = Some(CustomerIntent::LanguageSpecific);
            a.spans_multiple_blocks = blocks.len() > 1;
            a.blocks_spanned = blocks.iter().map(|b| b.block_id).collect();
            a.block_id = if blocks.len() == 1 {
                Some(blocks[0].block_id)
            } else {
                None
            };
            a.primary_block_id = primary.map(|b| b.block_id).or(Some(blocks[0].block_id));
            a.campaign_type = CampaignType::LanguageSpecific;
            a.business_rule_applied = Some(BusinessRule::ChineseFamilySpan);
            a.auto_resolved_date = Some(Utc::now());
            return Ok(Some(a));
        }

        let primary = Self::primary_chinese_block(&chinese_blocks);
        let mut a = BlockAssignment::new(spot.spot_id);
        a.schedule_id = Some(schedule_id);
        a.customer_intent = Some(CustomerIntent::LanguageSpecific);
        a.campaign_type = CampaignType::LanguageSpecific;
        a.business_rule_applied = Some(BusinessRule::OperationalChineseTime);
        a.auto_resolved_date = Some(Utc::now());
        a.blocks_spanned = chinese_blocks.iter().map(|b| b.block_id).collect();

        if chinese_blocks.len() == 1 {
            a.block_id = Some(chinese_blocks[0].block_id);
            a.primary_block_id = Some(chinese_blocks[0].block_id);
        } else {
            a.spans_multiple_blocks = true;
            a.primary_block_id = primary
                .map(|b| b.block_id)
                .or(Some(chinese_blocks[0].block_id));
        }
        Ok(Some(a))
    }

    /// Operational time-window decision.
    ///
    /// Long spots and the 13:00 full-afternoon ROS shape are exempt so that
    /// all-day and overnight buys stay out of the language buckets.
    fn operational_language(&self, spot: &Spot) -> Option<OperationalLanguage> {
        let time_in = spot.time_in.as_deref()?;
        let time_out = spot.time_out.as_deref()?;

        if Self::spot_duration(spot) > ROS_DURATION_MINUTES {
            return None;
        }
        if time_in == "13:00:00" && time_out == "23:59:00" {
            return None;
        }

        let hour = timeutil::start_hour(time_in)?;

        // Morning Chinese window: 06:00-08:00
        if (6..8).contains(&hour) {
            return Some(OperationalLanguage::Chinese);
        }

        // Evening Chinese window: 19:00-23:59
        if (19..24).contains(&hour) {
            // Weekend Hmong exception before 20:00
            if matches!(spot.day_of_week.as_deref(), Some("Saturday") | Some("Sunday"))
                && hour < 20
                && spot.language_hint().as_deref() == Some("H")
            {
                return Some(OperationalLanguage::Hmong);
            }
            return Some(OperationalLanguage::Chinese);
        }

        None
    }

    // ---- pattern matchers ----

    fn is_worldlink_spot(spot: &Spot) -> bool {
        spot.agency_name
            .as_deref()
            .map_or(false, |a| a.contains("WorldLink"))
            || spot.bill_code.contains("WorldLink")
    }

    /// Exact Chinese evening pattern: 19:00 or 20:00 start, end-of-day end,
    /// Chinese language hint.
    fn is_chinese_pattern(&self, spot: &Spot) -> bool {
        let (Some(time_in), Some(time_out)) = (spot.time_in.as_deref(), spot.time_out.as_deref())
        else {
            return false;
        };
        if !matches!(time_in, "19:00:00" | "20:00:00") {
            return false;
        }
        if !timeutil::is_end_of_day(time_out) {
            return false;
        }
        Self::has_chinese_hint(spot)
    }

    /// Enhanced Chinese pattern: the exact shape above, or any start from
    /// 19:00 through 23:30 with a Chinese hint.
    fn is_chinese_pattern_enhanced(&self, spot: &Spot) -> bool {
        if self.is_chinese_pattern(spot) {
            return true;
        }

        let Some(time_in) = spot.time_in.as_deref() else {
            return false;
        };
        let (Some(hour), Some(minute)) =
            (timeutil::start_hour(time_in), timeutil::start_minute(time_in))
        else {
            return false;
        };

        if (19..24).contains(&hour) {
            if hour == 23 && minute > 30 {
                return false;
            }
            return Self::has_chinese_hint(spot);
        }
        false
    }

    fn has_chinese_hint(spot: &Spot) -> bool {
        matches!(
            spot.language_hint().as_deref(),
            Some("M") | Some("C") | Some("M/C")
        )
    }

    /// Chinese family span time shape: 19:00 to midnight (rollover or the
    /// literal 23:59:00 end).
    fn is_chinese_family_time(spot: &Spot) -> bool {
        let (Some(time_in), Some(time_out)) = (spot.time_in.as_deref(), spot.time_out.as_deref())
        else {
            return false;
        };
        time_in == "19:00:00"
            && (timeutil::end_minutes(time_out) == timeutil::DAY_MINUTES
                || time_out == "23:59:00")
    }

    fn is_chinese_family_span(&self, spot: &Spot, blocks: &[LanguageBlock]) -> bool {
        if !Self::is_chinese_family_time(spot) {
            return false;
        }
        blocks.iter().any(|b| reference::is_chinese(b.language_id))
    }

    /// Tagalog pattern: 16:00 or 17:00 start, 19:00 end, hint `T`.
    fn is_tagalog_pattern(&self, spot: &Spot) -> bool {
        let (Some(time_in), Some(time_out)) = (spot.time_in.as_deref(), spot.time_out.as_deref())
        else {
            return false;
        };
        let time_match =
            matches!(time_in, "16:00:00" | "17:00:00") && time_out == "19:00:00";
        time_match && spot.language_hint().as_deref() == Some("T")
    }

    /// ROS time shapes, excluding anything the Chinese or Tagalog patterns claim.
    fn is_ros_by_time(&self, spot: &Spot) -> bool {
        if self.is_chinese_pattern(spot) || self.is_tagalog_pattern(spot) {
            return false;
        }

        let (Some(time_in), Some(time_out)) = (spot.time_in.as_deref(), spot.time_out.as_deref())
        else {
            return false;
        };

        // Standard afternoon-to-signoff ROS
        if time_in == "13:00:00" && time_out == "23:59:00" {
            return true;
        }

        // Next-day ends: late-night starts (19-20 belong to the Chinese
        // pattern) and early-morning starts
        if timeutil::is_next_day_midnight(time_out) {
            if let Some(hour) = timeutil::start_hour(time_in) {
                if hour >= 21 || hour <= 6 {
                    return true;
                }
            }
        }

        // Full broadcast day
        time_in == "06:00:00" && time_out == "23:59:00"
    }

    fn spot_duration(spot: &Spot) -> u32 {
        match (spot.time_in.as_deref(), spot.time_out.as_deref()) {
            (Some(time_in), Some(time_out)) => timeutil::duration_minutes(time_in, time_out),
            _ => 0,
        }
    }

    // ---- grid analysis ----

    fn overlapping_blocks(&self, schedule_id: i64, spot: &Spot) -> Result<Vec<LanguageBlock>> {
        let day_of_week = spot.day_of_week.as_deref().unwrap_or_default();
        let time_in = spot.time_in.as_deref().unwrap_or_default();
        let time_out = spot.time_out.as_deref().unwrap_or_default();

        let spot_start = timeutil::time_to_minutes(time_in);
        let spot_end = timeutil::end_minutes(time_out);

        let blocks = self.store.blocks_for(schedule_id, day_of_week)?;
        Ok(blocks
            .into_iter()
            .filter(|b| {
                let block_start = timeutil::time_to_minutes(&b.time_start);
                let block_end = timeutil::end_minutes(&b.time_end);
                timeutil::times_overlap_with_midnight(spot_start, spot_end, block_start, block_end)
            })
            .collect())
    }

    fn analyze_base_assignment(
        &self,
        spot: &Spot,
        schedule_id: i64,
        blocks: &[LanguageBlock],
    ) -> Option<BlockAssignment> {
        // Chinese family span reached through plain grid analysis
        if self.is_chinese_family_span(spot, blocks) {
            let refs: Vec<&LanguageBlock> = blocks.iter().collect();
            let primary = Self::primary_chinese_block(&refs);
            let mut a = BlockAssignment::new(spot.spot_id);
            a.schedule_id = Some(schedule_id);
            a.customer_intent = Some(CustomerIntent::LanguageSpecific);
            a.spans_multiple_blocks = blocks.len() > 1;
            a.blocks_spanned = blocks.iter().map(|b| b.block_id).collect();
            a.block_id = if blocks.len() == 1 {
                Some(blocks[0].block_id)
            } else {
                None
            };
            a.primary_block_id = primary.map(|b| b.block_id).or(Some(blocks[0].block_id));
            a.campaign_type = CampaignType::LanguageSpecific;
            a.business_rule_applied = Some(BusinessRule::ChineseFamilySpan);
            a.auto_resolved_date = Some(Utc::now());
            return Some(a);
        }

        // Tagalog pattern picks its block from the grid
        if self.is_tagalog_pattern(spot) {
            let tagalog_block = blocks
                .iter()
                .find(|b| self.reference.code_for(b.language_id) == Some("T"))
                .unwrap_or(&blocks[0]);
            let mut a = BlockAssignment::new(spot.spot_id);
            a.schedule_id = Some(schedule_id);
            a.block_id = Some(tagalog_block.block_id);
            a.customer_intent = Some(CustomerIntent::LanguageSpecific);
            a.blocks_spanned = vec![tagalog_block.block_id];
            a.primary_block_id = Some(tagalog_block.block_id);
            a.campaign_type = CampaignType::LanguageSpecific;
            a.business_rule_applied = Some(BusinessRule::TagalogPattern);
            a.auto_resolved_date = Some(Utc::now());
            return Some(a);
        }

        if blocks.len() == 1 {
            let block = &blocks[0];
            let mut a = BlockAssignment::new(spot.spot_id);
            a.schedule_id = Some(schedule_id);
            a.block_id = Some(block.block_id);
            a.customer_intent = Some(CustomerIntent::LanguageSpecific);
            a.blocks_spanned = vec![block.block_id];
            a.primary_block_id = Some(block.block_id);
            a.campaign_type = CampaignType::LanguageSpecific;
            return Some(a);
        }

        self.analyze_multi_block(spot, schedule_id, blocks)
    }

    fn analyze_multi_block(
        &self,
        spot: &Spot,
        schedule_id: i64,
        blocks: &[LanguageBlock],
    ) -> Option<BlockAssignment> {
        let unique_languages: HashSet<i64> = blocks.iter().map(|b| b.language_id).collect();
        let primary = Self::select_primary_block(spot, blocks);
        let duration = Self::spot_duration(spot);

        let mut a = BlockAssignment::new(spot.spot_id);
        a.schedule_id = Some(schedule_id);
        a.spans_multiple_blocks = true;
        a.blocks_spanned = blocks.iter().map(|b| b.block_id).collect();
        a.primary_block_id = primary.map(|b| b.block_id);

        if unique_languages.len() == 1 {
            let language = self
                .reference
                .language_name(*unique_languages.iter().next().unwrap());
            a.customer_intent = Some(CustomerIntent::LanguageSpecific);
            a.campaign_type = CampaignType::LanguageSpecific;
            a.alert_reason = Some(format!("Multi-block same language: {}", language));
            return Some(a);
        }

        if let Some(family) = reference::family_containing(&unique_languages) {
            a.customer_intent = Some(CustomerIntent::LanguageSpecific);
            a.campaign_type = CampaignType::LanguageSpecific;
            a.alert_reason = Some(format!("Multi-block same family: {}", family));
            return Some(a);
        }

        // Different families: very long or very wide spans are ROS
        a.customer_intent = Some(CustomerIntent::Indifferent);
        if duration >= ROS_SPAN_MINUTES || blocks.len() >= ROS_SPAN_BLOCKS {
            a.campaign_type = CampaignType::Ros;
            a.alert_reason = Some(format!(
                "ROS assignment: {}min across {} blocks",
                duration,
                blocks.len()
            ));
        } else {
            let mut names: Vec<String> = unique_languages
                .iter()
                .map(|id| self.reference.language_name(*id))
                .collect();
            names.sort();
            a.campaign_type = CampaignType::MultiLanguage;
            a.requires_attention = true;
            a.alert_reason = Some(format!("True multi-language: {}", names.join(", ")));
        }
        Some(a)
    }

    /// Primary block for a multi-block span: the block matching the spot's
    /// own language if any, otherwise the first block in schedule order.
    fn select_primary_block<'a>(spot: &Spot, blocks: &'a [LanguageBlock]) -> Option<&'a LanguageBlock> {
        if blocks.is_empty() {
            return None;
        }
        if let Some(language_id) = spot.language_id {
            if let Some(matching) = blocks.iter().find(|b| b.language_id == language_id) {
                return Some(matching);
            }
        }
        Some(&blocks[0])
    }

    /// Primary Chinese block: Mandarin Prime, then any Mandarin, then any
    /// Cantonese, then the first block.
    fn primary_chinese_block<'a>(blocks: &[&'a LanguageBlock]) -> Option<&'a LanguageBlock> {
        if let Some(block) = blocks
            .iter()
            .copied()
            .find(|b| b.language_id == reference::MANDARIN && b.block_name.contains("Prime"))
        {
            return Some(block);
        }
        if let Some(block) = blocks
            .iter()
            .copied()
            .find(|b| b.language_id == reference::MANDARIN)
        {
            return Some(block);
        }
        if let Some(block) = blocks
            .iter()
            .copied()
            .find(|b| b.language_id == reference::CANTONESE)
        {
            return Some(block);
        }
        blocks.first().copied()
    }

    /// Constraint-satisfying shape for the defensive path: single blocks
    /// assign directly, multiple blocks span.
    fn fallback_assignment(
        spot_id: i64,
        schedule_id: i64,
        blocks: &[LanguageBlock],
    ) -> BlockAssignment {
        let mut a = BlockAssignment::new(spot_id);
        a.schedule_id = Some(schedule_id);
        a.requires_attention = true;
        a.alert_reason = Some("Fallback assignment - block analysis returned no result".to_string());
        a.error_message = Some("Assignment analysis returned no result".to_string());
        a.blocks_spanned = blocks.iter().map(|b| b.block_id).collect();
        a.primary_block_id = blocks.first().map(|b| b.block_id);

        if blocks.len() == 1 {
            a.block_id = Some(blocks[0].block_id);
            a.customer_intent = Some(CustomerIntent::LanguageSpecific);
            a.campaign_type = CampaignType::LanguageSpecific;
        } else {
            a.spans_multiple_blocks = true;
            a.customer_intent = Some(CustomerIntent::Indifferent);
            a.campaign_type = CampaignType::MultiLanguage;
        }
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceData;

    fn store_with_grid() -> Arc<SpotStore> {
        let store = Arc::new(SpotStore::in_memory().unwrap());
        store.insert_language(1, "E", "English").unwrap();
        store.insert_language(2, "M", "Mandarin").unwrap();
        store.insert_language(3, "C", "Cantonese").unwrap();
        store.insert_language(4, "T", "Tagalog").unwrap();
        store.insert_language(5, "H", "Hmong").unwrap();
        store.insert_language(7, "V", "Vietnamese").unwrap();
        store.insert_language(8, "K", "Korean").unwrap();

        store.insert_market(1, "SFO").unwrap();
        store.insert_schedule(10, "Standard Grid", true).unwrap();
        store
            .assign_schedule_to_market(10, 1, "2020-01-01", None, 1)
            .unwrap();

        // Monday grid
        store
            .insert_language_block(101, 10, "Monday", "06:00:00", "09:00:00", 2, "Mandarin Morning", Some("Morning"))
            .unwrap();
        store
            .insert_language_block(102, 10, "Monday", "09:00:00", "13:00:00", 1, "English Midday", Some("Midday"))
            .unwrap();
        store
            .insert_language_block(103, 10, "Monday", "13:00:00", "16:00:00", 7, "Vietnamese Afternoon", Some("Afternoon"))
            .unwrap();
        store
            .insert_language_block(104, 10, "Monday", "16:00:00", "19:00:00", 4, "Tagalog Early Evening", Some("Early Evening"))
            .unwrap();
        store
            .insert_language_block(105, 10, "Monday", "19:00:00", "23:00:00", 2, "Mandarin Prime", Some("Prime"))
            .unwrap();
        store
            .insert_language_block(106, 10, "Monday", "23:00:00", "24:00:00", 3, "Cantonese Late Night", Some("Late Night"))
            .unwrap();

        // Saturday grid with a Hmong block
        store
            .insert_language_block(201, 10, "Saturday", "18:00:00", "20:00:00", 5, "Hmong Weekend", Some("Evening"))
            .unwrap();
        store
            .insert_language_block(202, 10, "Saturday", "20:00:00", "24:00:00", 2, "Mandarin Weekend Prime", Some("Prime"))
            .unwrap();

        store
    }

    fn engine(store: &Arc<SpotStore>) -> BlockAssignmentEngine {
        let reference = ReferenceData::from_rows(&store.languages().unwrap());
        BlockAssignmentEngine::new(store.clone(), reference)
    }

    fn base_spot(spot_id: i64) -> Spot {
        Spot {
            spot_id,
            bill_code: "Acme:Widgets".to_string(),
            agency_name: None,
            revenue_type: Some("Internal Ad Sales".to_string()),
            spot_type: Some("COM".to_string()),
            market_id: Some(1),
            air_date: Some("2024-01-15".to_string()),
            day_of_week: Some("Monday".to_string()),
            time_in: Some("10:00:00".to_string()),
            time_out: Some("10:30:00".to_string()),
            language_code: None,
            language_id: None,
            gross_rate: Some(100.0),
            broadcast_month: Some("Jan-24".to_string()),
            spot_category: None,
            import_batch_id: None,
        }
    }

    #[tokio::test]
    async fn worldlink_wins_over_ros_duration() {
        let store = store_with_grid();
        store.insert_agency(5, "WorldLink Media").unwrap();
        let mut spot = base_spot(1);
        spot.revenue_type = Some("Direct Response Sales".to_string());
        spot.time_in = Some("06:00:00".to_string());
        spot.time_out = Some("23:59:00".to_string());
        store.insert_spot(&spot, Some(5)).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.campaign_type, CampaignType::DirectResponse);
        assert_eq!(
            a.business_rule_applied,
            Some(BusinessRule::WorldlinkDirectResponse)
        );
        assert!(a.spans_multiple_blocks);
        assert_eq!(a.block_id, None);
    }

    #[tokio::test]
    async fn worldlink_in_bill_code_matches_without_agency() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.bill_code = "WorldLink:Acme DR".to_string();
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(
            a.business_rule_applied,
            Some(BusinessRule::WorldlinkDirectResponse)
        );
    }

    #[tokio::test]
    async fn paid_programming_revenue_short_circuits() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.revenue_type = Some("Paid Programming".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.campaign_type, CampaignType::PaidProgramming);
        assert_eq!(
            a.business_rule_applied,
            Some(BusinessRule::RevenueTypePaidProgramming)
        );
    }

    #[tokio::test]
    async fn chinese_prime_classic_is_a_family_span() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("19:00:00".to_string());
        spot.time_out = Some("23:59:00".to_string());
        spot.language_code = Some("M".to_string());
        spot.language_id = Some(2);
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.campaign_type, CampaignType::LanguageSpecific);
        assert!(a.spans_multiple_blocks);
        assert_eq!(a.primary_block_id, Some(105)); // Mandarin Prime
        assert_eq!(a.business_rule_applied, Some(BusinessRule::ChineseFamilySpan));
        assert_eq!(a.blocks_spanned, vec![105, 106]);
    }

    #[tokio::test]
    async fn rollover_midnight_end_also_spans_chinese_family() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("19:00:00".to_string());
        spot.time_out = Some("1 day, 0:00:00".to_string());
        spot.language_code = Some("C".to_string());
        spot.language_id = Some(3);
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.business_rule_applied, Some(BusinessRule::ChineseFamilySpan));
        assert_eq!(a.primary_block_id, Some(105));
    }

    #[tokio::test]
    async fn evening_chinese_window_without_span_shape_is_operational() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("20:00:00".to_string());
        spot.time_out = Some("21:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(
            a.business_rule_applied,
            Some(BusinessRule::OperationalChineseTime)
        );
        assert_eq!(a.block_id, Some(105));
        assert!(!a.spans_multiple_blocks);
    }

    #[tokio::test]
    async fn morning_chinese_window_targets_morning_block() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("06:30:00".to_string());
        spot.time_out = Some("07:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(
            a.business_rule_applied,
            Some(BusinessRule::OperationalChineseTime)
        );
        assert_eq!(a.block_id, Some(101));
    }

    #[tokio::test]
    async fn operational_rule_suppresses_itself_without_chinese_coverage() {
        let store = store_with_grid();
        // Evening slot on a day whose grid has no Chinese blocks
        store
            .insert_language_block(301, 10, "Tuesday", "19:00:00", "23:00:00", 7, "Vietnamese Evening", Some("Prime"))
            .unwrap();
        let mut spot = base_spot(1);
        spot.day_of_week = Some("Tuesday".to_string());
        spot.time_in = Some("19:30:00".to_string());
        spot.time_out = Some("20:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        // Falls through to grid analysis and lands on the Vietnamese block.
        assert_eq!(a.business_rule_applied, None);
        assert_eq!(a.block_id, Some(301));
        assert_eq!(a.campaign_type, CampaignType::LanguageSpecific);
    }

    #[tokio::test]
    async fn hmong_weekend_exception_reaches_the_grid() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.day_of_week = Some("Saturday".to_string());
        spot.time_in = Some("19:00:00".to_string());
        spot.time_out = Some("20:00:00".to_string());
        spot.language_code = Some("H".to_string());
        spot.language_id = Some(5);
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.block_id, Some(201)); // Hmong Weekend
        assert_eq!(a.business_rule_applied, None);
        assert_eq!(a.campaign_type, CampaignType::LanguageSpecific);
    }

    #[tokio::test]
    async fn tagalog_pattern_selects_tagalog_block() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("17:00:00".to_string());
        spot.time_out = Some("19:00:00".to_string());
        spot.language_code = Some("T".to_string());
        spot.language_id = Some(4);
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.business_rule_applied, Some(BusinessRule::TagalogPattern));
        assert_eq!(a.block_id, Some(104));
        assert!(!a.spans_multiple_blocks);
        assert!(!a.requires_attention);
    }

    #[tokio::test]
    async fn tagalog_16_start_also_matches() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("16:00:00".to_string());
        spot.time_out = Some("19:00:00".to_string());
        spot.language_code = Some("T".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.business_rule_applied, Some(BusinessRule::TagalogPattern));
    }

    #[tokio::test]
    async fn full_day_rollover_is_ros_by_duration() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("06:00:00".to_string());
        spot.time_out = Some("1 day, 0:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.campaign_type, CampaignType::Ros);
        assert_eq!(a.business_rule_applied, Some(BusinessRule::RosDuration));
        assert!(a.spans_multiple_blocks);
        assert_eq!(a.block_id, None);
    }

    #[tokio::test]
    async fn afternoon_to_signoff_is_ros() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("13:00:00".to_string());
        spot.time_out = Some("23:59:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.campaign_type, CampaignType::Ros);
        // 13:00-23:59 is 659 minutes, so the duration rule claims it first
        assert_eq!(a.business_rule_applied, Some(BusinessRule::RosDuration));
    }

    #[tokio::test]
    async fn late_night_rollover_defers_to_grid_when_uncovered_by_chinese() {
        let store = store_with_grid();
        store
            .insert_language_block(
                302, 10, "Tuesday", "19:00:00", "24:00:00", 7, "Vietnamese Night", Some("Prime"),
            )
            .unwrap();
        let mut spot = base_spot(1);
        spot.time_in = Some("22:00:00".to_string());
        spot.time_out = Some("1 day, 0:00:00".to_string());
        spot.day_of_week = Some("Tuesday".to_string());
        store.insert_spot(&spot, None).unwrap();

        // Hour 22 is inside the operational Chinese window; with no Chinese
        // block on Tuesday the cascade drops to grid analysis.
        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.business_rule_applied, None);
        assert_eq!(a.block_id, Some(302));
        assert_eq!(a.campaign_type, CampaignType::LanguageSpecific);
    }

    #[tokio::test]
    async fn single_overlap_assigns_single_block() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("10:00:00".to_string());
        spot.time_out = Some("11:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.block_id, Some(102));
        assert!(!a.spans_multiple_blocks);
        assert_eq!(a.customer_intent, Some(CustomerIntent::LanguageSpecific));
        assert_eq!(engine.stats().assigned, 1);
    }

    #[tokio::test]
    async fn true_multi_language_flags_attention() {
        let store = store_with_grid();
        // English Midday + Vietnamese Afternoon: two families, 240 minutes
        let mut spot = base_spot(1);
        spot.time_in = Some("12:00:00".to_string());
        spot.time_out = Some("16:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.campaign_type, CampaignType::MultiLanguage);
        assert!(a.requires_attention);
        assert!(a.spans_multiple_blocks);
        assert_eq!(a.block_id, None);
        assert!(a.blocks_spanned.len() >= 2);
        let reason = a.alert_reason.unwrap();
        assert!(reason.contains("English") && reason.contains("Vietnamese"));
        assert_eq!(engine.stats().multi_block, 1);
    }

    #[tokio::test]
    async fn same_family_span_is_language_specific() {
        let store = store_with_grid();
        // Two Mandarin-family blocks on a fresh day: Mandarin + Cantonese
        store
            .insert_language_block(401, 10, "Wednesday", "18:00:00", "20:00:00", 2, "Mandarin Evening", None)
            .unwrap();
        store
            .insert_language_block(402, 10, "Wednesday", "20:00:00", "22:00:00", 3, "Cantonese Evening", None)
            .unwrap();
        let mut spot = base_spot(1);
        spot.day_of_week = Some("Wednesday".to_string());
        spot.time_in = Some("18:00:00".to_string());
        spot.time_out = Some("22:00:00".to_string());
        // No Chinese hint: the operational window at hour 18 does not fire.
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.campaign_type, CampaignType::LanguageSpecific);
        assert!(a.spans_multiple_blocks);
        assert!(!a.requires_attention);
        assert_eq!(a.alert_reason.as_deref(), Some("Multi-block same family: Chinese"));
        assert_eq!(engine.stats().assigned, 1);
    }

    #[tokio::test]
    async fn primary_block_prefers_spot_language_match() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("12:00:00".to_string());
        spot.time_out = Some("16:00:00".to_string());
        spot.language_id = Some(7); // Vietnamese
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.primary_block_id, Some(103)); // Vietnamese Afternoon
    }

    #[tokio::test]
    async fn missing_market_short_circuits_to_no_grid() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.market_id = None;
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.customer_intent, Some(CustomerIntent::NoGridCoverage));
        assert!(a.requires_attention);
        assert_eq!(a.alert_reason.as_deref(), Some("Spot has no market assignment"));
        assert_eq!(engine.stats().no_coverage, 1);
        // Persisted despite the missing market
        assert!(store.get_block_assignment(1).unwrap().is_some());
    }

    #[tokio::test]
    async fn market_without_schedule_is_no_grid() {
        let store = store_with_grid();
        store.insert_market(2, "LAX").unwrap();
        let mut spot = base_spot(1);
        spot.market_id = Some(2);
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.customer_intent, Some(CustomerIntent::NoGridCoverage));
        assert_eq!(a.alert_reason.as_deref(), Some("No programming grid for market"));
    }

    #[tokio::test]
    async fn uncovered_slot_is_no_grid_with_schedule() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        // Monday grid has nothing between 00:00 and 06:00
        spot.time_in = Some("02:00:00".to_string());
        spot.time_out = Some("03:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        let a = engine.assign_single_spot(1).await.unwrap();
        assert_eq!(a.customer_intent, Some(CustomerIntent::NoGridCoverage));
        assert_eq!(a.schedule_id, Some(10));
        assert_eq!(a.alert_reason.as_deref(), Some("No language blocks cover spot time"));
    }

    #[tokio::test]
    async fn batch_run_is_idempotent() {
        let store = store_with_grid();
        let mut spot = base_spot(1);
        spot.time_in = Some("10:00:00".to_string());
        spot.time_out = Some("11:00:00".to_string());
        store.insert_spot(&spot, None).unwrap();

        let mut engine = engine(&store);
        engine.assign_spots_batch(None, None, None).await.unwrap();
        let first = store.get_block_assignment(1).unwrap().unwrap();

        let mut engine2 = BlockAssignmentEngine::new(
            store.clone(),
            ReferenceData::from_rows(&store.languages().unwrap()),
        );
        engine2
            .assign_spots_batch(Some(vec![1]), None, None)
            .await
            .unwrap();
        let second = store.get_block_assignment(1).unwrap().unwrap();

        assert_eq!(first.block_id, second.block_id);
        assert_eq!(first.campaign_type, second.campaign_type);
        assert_eq!(first.blocks_spanned, second.blocks_spanned);
        assert_eq!(first.business_rule_applied, second.business_rule_applied);
    }

    #[test]
    fn ros_time_excludes_chinese_and_tagalog_shapes() {
        let store = store_with_grid();
        let engine = engine(&store);

        let mut chinese = base_spot(1);
        chinese.time_in = Some("19:00:00".to_string());
        chinese.time_out = Some("1 day, 0:00:00".to_string());
        chinese.language_code = Some("M".to_string());
        assert!(!engine.is_ros_by_time(&chinese));

        let mut tagalog = base_spot(2);
        tagalog.time_in = Some("17:00:00".to_string());
        tagalog.time_out = Some("19:00:00".to_string());
        tagalog.language_code = Some("T".to_string());
        assert!(!engine.is_ros_by_time(&tagalog));

        let mut early = base_spot(3);
        early.time_in = Some("05:00:00".to_string());
        early.time_out = Some("1 day, 0:00:00".to_string());
        assert!(engine.is_ros_by_time(&early));
    }

    #[test]
    fn enhanced_chinese_pattern_covers_extended_starts() {
        let store = store_with_grid();
        let engine = engine(&store);

        let mut spot = base_spot(1);
        spot.language_code = Some("M/C".to_string());
        spot.time_in = Some("22:15:00".to_string());
        spot.time_out = Some("22:45:00".to_string());
        assert!(engine.is_chinese_pattern_enhanced(&spot));

        spot.time_in = Some("23:45:00".to_string());
        assert!(!engine.is_chinese_pattern_enhanced(&spot));

        spot.time_in = Some("18:00:00".to_string());
        assert!(!engine.is_chinese_pattern_enhanced(&spot));
    }
}
