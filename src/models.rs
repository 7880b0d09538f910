use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing category a spot is routed through, derived from
/// `(revenue_type, spot_type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotCategory {
    LanguageAssignmentRequired,
    ReviewCategory,
    DefaultEnglish,
}

impl SpotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotCategory::LanguageAssignmentRequired => "language_assignment_required",
            SpotCategory::ReviewCategory => "review_category",
            SpotCategory::DefaultEnglish => "default_english",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "language_assignment_required" => Some(SpotCategory::LanguageAssignmentRequired),
            "review_category" => Some(SpotCategory::ReviewCategory),
            "default_english" => Some(SpotCategory::DefaultEnglish),
            _ => None,
        }
    }
}

/// Language determination status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageStatus {
    Determined,
    Undetermined,
    Default,
    Invalid,
}

impl LanguageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageStatus::Determined => "determined",
            LanguageStatus::Undetermined => "undetermined",
            LanguageStatus::Default => "default",
            LanguageStatus::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "determined" => Some(LanguageStatus::Determined),
            "undetermined" => Some(LanguageStatus::Undetermined),
            "default" => Some(LanguageStatus::Default),
            "invalid" => Some(LanguageStatus::Invalid),
            _ => None,
        }
    }
}

/// How a language assignment was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    DirectMapping,
    DefaultEnglish,
    AutoDefaultComBb,
    UndeterminedFlagged,
    InvalidCodeFlagged,
    BusinessReviewRequired,
    BusinessRuleDefaultEnglish,
    ErrorFallback,
}

impl AssignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMethod::DirectMapping => "direct_mapping",
            AssignmentMethod::DefaultEnglish => "default_english",
            AssignmentMethod::AutoDefaultComBb => "auto_default_com_bb",
            AssignmentMethod::UndeterminedFlagged => "undetermined_flagged",
            AssignmentMethod::InvalidCodeFlagged => "invalid_code_flagged",
            AssignmentMethod::BusinessReviewRequired => "business_review_required",
            AssignmentMethod::BusinessRuleDefaultEnglish => "business_rule_default_english",
            AssignmentMethod::ErrorFallback => "error_fallback",
        }
    }
}

/// Customer intent classification for spot placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIntent {
    /// Single block or single family, language-targeted
    LanguageSpecific,
    /// Block language differs from the spot's own language
    TimeSpecific,
    /// Multi-block, customer flexible
    Indifferent,
    /// Market has no programming grid
    NoGridCoverage,
}

impl CustomerIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerIntent::LanguageSpecific => "language_specific",
            CustomerIntent::TimeSpecific => "time_specific",
            CustomerIntent::Indifferent => "indifferent",
            CustomerIntent::NoGridCoverage => "no_grid_coverage",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "language_specific" => Some(CustomerIntent::LanguageSpecific),
            "time_specific" => Some(CustomerIntent::TimeSpecific),
            "indifferent" => Some(CustomerIntent::Indifferent),
            "no_grid_coverage" => Some(CustomerIntent::NoGridCoverage),
            _ => None,
        }
    }
}

/// Coarse campaign category used by revenue reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    LanguageSpecific,
    MultiLanguage,
    Ros,
    DirectResponse,
    PaidProgramming,
    Roadblock,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::LanguageSpecific => "language_specific",
            CampaignType::MultiLanguage => "multi_language",
            CampaignType::Ros => "ros",
            CampaignType::DirectResponse => "direct_response",
            CampaignType::PaidProgramming => "paid_programming",
            CampaignType::Roadblock => "roadblock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "language_specific" => Some(CampaignType::LanguageSpecific),
            "multi_language" => Some(CampaignType::MultiLanguage),
            "ros" => Some(CampaignType::Ros),
            "direct_response" => Some(CampaignType::DirectResponse),
            "paid_programming" => Some(CampaignType::PaidProgramming),
            "roadblock" => Some(CampaignType::Roadblock),
            _ => None,
        }
    }
}

/// Business rule that short-circuited or shaped a block assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRule {
    WorldlinkDirectResponse,
    RevenueTypePaidProgramming,
    OperationalChineseTime,
    ChineseFamilySpan,
    ChinesePattern,
    TagalogPattern,
    RosDuration,
    RosTime,
}

impl BusinessRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessRule::WorldlinkDirectResponse => "worldlink_direct_response",
            BusinessRule::RevenueTypePaidProgramming => "revenue_type_paid_programming",
            BusinessRule::OperationalChineseTime => "operational_chinese_time",
            BusinessRule::ChineseFamilySpan => "chinese_family_span",
            BusinessRule::ChinesePattern => "chinese_pattern",
            BusinessRule::TagalogPattern => "tagalog_pattern",
            BusinessRule::RosDuration => "ros_duration",
            BusinessRule::RosTime => "ros_time",
        }
    }
}

/// A single scheduled commercial airing, as read from the spots table.
///
/// Immutable input to both engines; only the two assignment tables are
/// written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spot {
    pub spot_id: i64,
    pub bill_code: String,
    pub agency_name: Option<String>,
    pub revenue_type: Option<String>,
    pub spot_type: Option<String>,
    pub market_id: Option<i64>,
    pub air_date: Option<String>,
    pub day_of_week: Option<String>,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub language_code: Option<String>,
    pub language_id: Option<i64>,
    pub gross_rate: Option<f64>,
    pub broadcast_month: Option<String>,
    pub spot_category: Option<SpotCategory>,
    pub import_batch_id: Option<String>,
}

impl Spot {
    /// Raw language hint, trimmed and upper-cased ("M", "C", "M/C", "T", "H", "L", ...).
    pub fn language_hint(&self) -> Option<String> {
        self.language_code
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
    }

    pub fn is_trade(&self) -> bool {
        self.revenue_type.as_deref() == Some("Trade")
    }
}

/// A time-bounded programming segment on a market schedule, tagged with a
/// single language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageBlock {
    pub block_id: i64,
    pub schedule_id: i64,
    pub day_of_week: String,
    pub time_start: String,
    pub time_end: String,
    pub language_id: i64,
    pub block_name: String,
    pub block_type: Option<String>,
    pub day_part: Option<String>,
}

/// Language assignment result with undetermined language handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageAssignment {
    pub spot_id: i64,
    pub language_code: String,
    pub status: LanguageStatus,
    pub confidence: f64,
    pub method: AssignmentMethod,
    pub requires_review: bool,
    pub notes: Option<String>,
    pub assigned_date: DateTime<Utc>,
}

impl LanguageAssignment {
    pub fn new(
        spot_id: i64,
        language_code: impl Into<String>,
        status: LanguageStatus,
        method: AssignmentMethod,
    ) -> Self {
        Self {
            spot_id,
            language_code: language_code.into(),
            status,
            confidence: 1.0,
            method,
            requires_review: false,
            notes: None,
            assigned_date: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_review(mut self, requires_review: bool) -> Self {
        self.requires_review = requires_review;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Block assignment result with business rule tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockAssignment {
    pub spot_id: i64,
    pub schedule_id: Option<i64>,
    pub block_id: Option<i64>,
    pub customer_intent: Option<CustomerIntent>,
    pub spans_multiple_blocks: bool,
    pub blocks_spanned: Vec<i64>,
    pub primary_block_id: Option<i64>,
    pub requires_attention: bool,
    pub alert_reason: Option<String>,
    pub error_message: Option<String>,
    pub campaign_type: CampaignType,
    pub business_rule_applied: Option<BusinessRule>,
    pub auto_resolved_date: Option<DateTime<Utc>>,
    pub assigned_date: DateTime<Utc>,
    pub assigned_by: String,
}

impl BlockAssignment {
    pub fn new(spot_id: i64) -> Self {
        Self {
            spot_id,
            schedule_id: None,
            block_id: None,
            customer_intent: None,
            spans_multiple_blocks: false,
            blocks_spanned: Vec::new(),
            primary_block_id: None,
            requires_attention: false,
            alert_reason: None,
            error_message: None,
            campaign_type: CampaignType::LanguageSpecific,
            business_rule_applied: None,
            auto_resolved_date: None,
            assigned_date: Utc::now(),
            assigned_by: "system".to_string(),
        }
    }

    /// No-grid shape: nothing resolvable, flagged for human attention.
    pub fn no_grid(spot_id: i64, schedule_id: Option<i64>, alert_reason: impl Into<String>) -> Self {
        let mut a = Self::new(spot_id);
        a.schedule_id = schedule_id;
        a.customer_intent = Some(CustomerIntent::NoGridCoverage);
        a.requires_attention = true;
        a.alert_reason = Some(alert_reason.into());
        a
    }

    /// Precedence-rule shape: schedule-wide placement with no block
    /// enumeration (WorldLink, paid programming, ROS shortcuts).
    pub fn schedule_wide(
        spot_id: i64,
        schedule_id: i64,
        intent: CustomerIntent,
        campaign_type: CampaignType,
        rule: BusinessRule,
    ) -> Self {
        let mut a = Self::new(spot_id);
        a.schedule_id = Some(schedule_id);
        a.customer_intent = Some(intent);
        a.spans_multiple_blocks = true;
        a.campaign_type = campaign_type;
        a.business_rule_applied = Some(rule);
        a.auto_resolved_date = Some(Utc::now());
        a
    }
}

/// Aggregate result of a language-category processing run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LanguageBatchOutcome {
    pub processed: usize,
    pub assigned: usize,
    pub review_flagged: usize,
    pub errors: usize,
}

/// Aggregate result of a block-assignment run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BlockStats {
    pub processed: usize,
    pub assigned: usize,
    pub multi_block: usize,
    pub no_coverage: usize,
    pub errors: usize,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub batch_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./spotgrid.db".to_string());

        let batch_size = std::env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        Ok(Self {
            database_path,
            batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_strings() {
        for cat in [
            SpotCategory::LanguageAssignmentRequired,
            SpotCategory::ReviewCategory,
            SpotCategory::DefaultEnglish,
        ] {
            assert_eq!(SpotCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(SpotCategory::parse("garbage"), None);
    }

    #[test]
    fn language_hint_is_trimmed_and_uppercased() {
        let mut spot = Spot {
            spot_id: 1,
            bill_code: "Acme:Widgets".to_string(),
            agency_name: None,
            revenue_type: None,
            spot_type: None,
            market_id: None,
            air_date: None,
            day_of_week: None,
            time_in: None,
            time_out: None,
            language_code: Some(" m/c ".to_string()),
            language_id: None,
            gross_rate: None,
            broadcast_month: None,
            spot_category: None,
            import_batch_id: None,
        };
        assert_eq!(spot.language_hint().as_deref(), Some("M/C"));

        spot.language_code = Some("   ".to_string());
        assert_eq!(spot.language_hint(), None);
    }

    #[test]
    fn schedule_wide_shape_satisfies_span_constraints() {
        let a = BlockAssignment::schedule_wide(
            7,
            1,
            CustomerIntent::Indifferent,
            CampaignType::DirectResponse,
            BusinessRule::WorldlinkDirectResponse,
        );
        assert!(a.spans_multiple_blocks);
        assert_eq!(a.block_id, None);
        assert!(a.blocks_spanned.is_empty());
    }
}
