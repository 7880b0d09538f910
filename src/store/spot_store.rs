//! Spot and assignment storage
//!
//! Single SQLite store backing both assignment engines. Spots, reference
//! tables, and the two per-spot assignment tables live here; the engines
//! never touch SQL directly.
//!
//! Key properties:
//! - WAL mode for concurrent reads during batch writes
//! - Prepared statement caching on hot per-spot lookups
//! - Assignment upserts keyed by spot_id (replay-safe)
//! - Batch writes wrapped in IMMEDIATE transactions

use crate::models::{
    AssignmentMethod, BlockAssignment, BusinessRule, CampaignType, CustomerIntent,
    LanguageAssignment, LanguageBlock, LanguageStatus, Spot, SpotCategory,
};
use crate::reference::LanguageRow;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS spots (
    spot_id INTEGER PRIMARY KEY,
    bill_code TEXT NOT NULL,
    agency_id INTEGER,
    customer_id INTEGER,
    revenue_type TEXT,
    spot_type TEXT,
    market_id INTEGER,
    air_date TEXT,
    day_of_week TEXT,
    time_in TEXT,
    time_out TEXT,
    language_code TEXT,
    language_id INTEGER,
    gross_rate REAL,
    broadcast_month TEXT,
    spot_category TEXT,
    import_batch_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_spots_category
    ON spots(spot_category, spot_id);

CREATE INDEX IF NOT EXISTS idx_spots_batch
    ON spots(import_batch_id, spot_category);

CREATE INDEX IF NOT EXISTS idx_spots_language_code
    ON spots(language_code);

CREATE TABLE IF NOT EXISTS languages (
    language_id INTEGER PRIMARY KEY,
    language_code TEXT NOT NULL,
    language_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agencies (
    agency_id INTEGER PRIMARY KEY,
    agency_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS markets (
    market_id INTEGER PRIMARY KEY,
    market_code TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS programming_schedules (
    schedule_id INTEGER PRIMARY KEY,
    schedule_name TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS schedule_market_assignments (
    schedule_id INTEGER NOT NULL,
    market_id INTEGER NOT NULL,
    effective_start_date TEXT NOT NULL,
    effective_end_date TEXT,
    assignment_priority INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (schedule_id, market_id, effective_start_date)
);

CREATE INDEX IF NOT EXISTS idx_sma_market
    ON schedule_market_assignments(market_id, assignment_priority DESC);

CREATE TABLE IF NOT EXISTS language_blocks (
    block_id INTEGER PRIMARY KEY,
    schedule_id INTEGER NOT NULL,
    day_of_week TEXT NOT NULL,
    time_start TEXT NOT NULL,
    time_end TEXT NOT NULL,
    language_id INTEGER NOT NULL,
    block_name TEXT NOT NULL,
    block_type TEXT,
    day_part TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_language_blocks_schedule_day
    ON language_blocks(schedule_id, day_of_week, time_start);

CREATE TABLE IF NOT EXISTS spot_language_assignments (
    spot_id INTEGER PRIMARY KEY,
    language_code TEXT NOT NULL,
    language_status TEXT NOT NULL,
    confidence REAL NOT NULL,
    assignment_method TEXT NOT NULL,
    assigned_date TEXT NOT NULL,
    requires_review INTEGER NOT NULL,
    notes TEXT
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS spot_language_blocks (
    spot_id INTEGER PRIMARY KEY,
    schedule_id INTEGER,
    block_id INTEGER,
    customer_intent TEXT,
    intent_confidence REAL NOT NULL DEFAULT 1.0,
    spans_multiple_blocks INTEGER NOT NULL DEFAULT 0,
    blocks_spanned TEXT,
    primary_block_id INTEGER,
    assignment_method TEXT NOT NULL,
    assigned_date TEXT NOT NULL,
    assigned_by TEXT NOT NULL,
    requires_attention INTEGER NOT NULL DEFAULT 0,
    alert_reason TEXT,
    notes TEXT,
    campaign_type TEXT NOT NULL,
    business_rule_applied TEXT,
    auto_resolved_date TEXT
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_slb_rule
    ON spot_language_blocks(business_rule_applied);
"#;

const SPOT_COLUMNS: &str = "s.spot_id, s.bill_code, a.agency_name, s.revenue_type, s.spot_type, \
     s.market_id, s.air_date, s.day_of_week, s.time_in, s.time_out, \
     s.language_code, s.language_id, s.gross_rate, s.broadcast_month, \
     s.spot_category, s.import_batch_id";

/// Summary of spots requiring manual review
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub undetermined_language: i64,
    pub invalid_codes: i64,
    pub total_review_required: i64,
    pub high_value_undetermined: i64,
}

/// Spot counts per category plus the uncategorized remainder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySummary {
    pub by_category: Vec<(String, i64)>,
    pub uncategorized: i64,
}

/// Total vs processed spot counts per category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub categories: Vec<(String, i64, i64)>,
}

/// Per-year block assignment coverage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearSummary {
    pub year: String,
    pub total_spots: i64,
    pub assigned_spots: i64,
    pub unassigned_spots: i64,
    pub total_revenue: f64,
    pub assigned_revenue: f64,
    pub unassigned_revenue: f64,
}

/// Detailed per-spot assignment view used by test-assignment reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentDetails {
    pub spot_id: i64,
    pub bill_code: String,
    pub air_date: Option<String>,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub market_code: Option<String>,
    pub customer_intent: Option<String>,
    pub spans_multiple_blocks: bool,
    pub requires_attention: bool,
    pub alert_reason: Option<String>,
    pub block_name: Option<String>,
    pub day_part: Option<String>,
    pub business_rule_applied: Option<String>,
}

fn conv_err(msg: String) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(msg.into())
}

fn parse_date(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conv_err(format!("bad timestamp {raw:?}: {e}")))
}

/// SQLite-backed spot store
pub struct SpotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SpotStore {
    /// Open (or create) the store at the given path.
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // parking_lot handles locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("📊 Spot store initialized at: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- row mappers ----

    fn row_to_spot(row: &rusqlite::Row) -> rusqlite::Result<Spot> {
        let category: Option<String> = row.get(14)?;
        Ok(Spot {
            spot_id: row.get(0)?,
            bill_code: row.get(1)?,
            agency_name: row.get(2)?,
            revenue_type: row.get(3)?,
            spot_type: row.get(4)?,
            market_id: row.get(5)?,
            air_date: row.get(6)?,
            day_of_week: row.get(7)?,
            time_in: row.get(8)?,
            time_out: row.get(9)?,
            language_code: row.get(10)?,
            language_id: row.get(11)?,
            gross_rate: row.get(12)?,
            broadcast_month: row.get(13)?,
            spot_category: category.as_deref().and_then(SpotCategory::parse),
            import_batch_id: row.get(15)?,
        })
    }

    fn row_to_block(row: &rusqlite::Row) -> rusqlite::Result<LanguageBlock> {
        Ok(LanguageBlock {
            block_id: row.get(0)?,
            schedule_id: row.get(1)?,
            day_of_week: row.get(2)?,
            time_start: row.get(3)?,
            time_end: row.get(4)?,
            language_id: row.get(5)?,
            block_name: row.get(6)?,
            block_type: row.get(7)?,
            day_part: row.get(8)?,
        })
    }

    fn row_to_language_assignment(row: &rusqlite::Row) -> rusqlite::Result<LanguageAssignment> {
        let status: String = row.get(2)?;
        let method: String = row.get(4)?;
        let assigned_date: String = row.get(5)?;

        let status = LanguageStatus::parse(&status)
            .ok_or_else(|| conv_err(format!("unknown language_status {status:?}")))?;
        let method = match method.as_str() {
            "direct_mapping" => AssignmentMethod::DirectMapping,
            "default_english" => AssignmentMethod::DefaultEnglish,
            "auto_default_com_bb" => AssignmentMethod::AutoDefaultComBb,
            "undetermined_flagged" => AssignmentMethod::UndeterminedFlagged,
            "invalid_code_flagged" => AssignmentMethod::InvalidCodeFlagged,
            "business_review_required" => AssignmentMethod::BusinessReviewRequired,
            "business_rule_default_english" => AssignmentMethod::BusinessRuleDefaultEnglish,
            "error_fallback" => AssignmentMethod::ErrorFallback,
            other => return Err(conv_err(format!("unknown assignment_method {other:?}"))),
        };

        Ok(LanguageAssignment {
            spot_id: row.get(0)?,
            language_code: row.get(1)?,
            status,
            confidence: row.get(3)?,
            method,
            assigned_date: parse_date(&assigned_date)?,
            requires_review: row.get(6)?,
            notes: row.get(7)?,
        })
    }

    fn row_to_block_assignment(row: &rusqlite::Row) -> rusqlite::Result<BlockAssignment> {
        let intent: Option<String> = row.get(3)?;
        let blocks_spanned: Option<String> = row.get(5)?;
        let assigned_date: String = row.get(7)?;
        let campaign_type: String = row.get(12)?;
        let rule: Option<String> = row.get(13)?;
        let auto_resolved: Option<String> = row.get(14)?;

        let blocks_spanned = match blocks_spanned {
            Some(ref json) => serde_json::from_str(json)
                .map_err(|e| conv_err(format!("bad blocks_spanned {json:?}: {e}")))?,
            None => Vec::new(),
        };

        let campaign_type = CampaignType::parse(&campaign_type)
            .ok_or_else(|| conv_err(format!("unknown campaign_type {campaign_type:?}")))?;

        let rule = match rule.as_deref() {
            None => None,
            Some("worldlink_direct_response") => Some(BusinessRule::WorldlinkDirectResponse),
            Some("revenue_type_paid_programming") => Some(BusinessRule::RevenueTypePaidProgramming),
            Some("operational_chinese_time") => Some(BusinessRule::OperationalChineseTime),
            Some("chinese_family_span") => Some(BusinessRule::ChineseFamilySpan),
            Some("chinese_pattern") => Some(BusinessRule::ChinesePattern),
            Some("tagalog_pattern") => Some(BusinessRule::TagalogPattern),
            Some("ros_duration") => Some(BusinessRule::RosDuration),
            Some("ros_time") => Some(BusinessRule::RosTime),
            Some(other) => return Err(conv_err(format!("unknown business rule {other:?}"))),
        };

        Ok(BlockAssignment {
            spot_id: row.get(0)?,
            schedule_id: row.get(1)?,
            block_id: row.get(2)?,
            customer_intent: intent.as_deref().and_then(CustomerIntent::parse),
            spans_multiple_blocks: row.get(4)?,
            blocks_spanned,
            primary_block_id: row.get(6)?,
            assigned_date: parse_date(&assigned_date)?,
            assigned_by: row.get(8)?,
            requires_attention: row.get(9)?,
            alert_reason: row.get(10)?,
            error_message: row.get(11)?,
            campaign_type,
            business_rule_applied: rule,
            auto_resolved_date: match auto_resolved {
                Some(ref raw) => Some(parse_date(raw)?),
                None => None,
            },
        })
    }

    // ---- spots ----

    /// Fetch a single spot by id, with its agency name joined in.
    pub fn get_spot(&self, spot_id: i64) -> Result<Option<Spot>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SPOT_COLUMNS} FROM spots s \
             LEFT JOIN agencies a ON s.agency_id = a.agency_id \
             WHERE s.spot_id = ?1"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        Ok(stmt
            .query_row([spot_id], Self::row_to_spot)
            .optional()?)
    }

    /// Fetch a spot for language resolution, skipping Trade rows.
    pub fn get_spot_excluding_trade(&self, spot_id: i64) -> Result<Option<Spot>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SPOT_COLUMNS} FROM spots s \
             LEFT JOIN agencies a ON s.agency_id = a.agency_id \
             WHERE s.spot_id = ?1 \
               AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL)"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        Ok(stmt
            .query_row([spot_id], Self::row_to_spot)
            .optional()?)
    }

    /// Spots that have not been categorized yet (Trade excluded).
    pub fn list_uncategorized(&self, limit: Option<usize>) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT spot_id FROM spots \
             WHERE spot_category IS NULL \
               AND (revenue_type != 'Trade' OR revenue_type IS NULL) \
             ORDER BY spot_id \
             LIMIT ?1",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let ids = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Spot ids in a category, optionally restricted to an import batch.
    pub fn list_by_category(
        &self,
        category: SpotCategory,
        batch_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let ids = if let Some(batch_id) = batch_id {
            let mut stmt = conn.prepare_cached(
                "SELECT spot_id FROM spots \
                 WHERE spot_category = ?1 AND import_batch_id = ?2 \
                 ORDER BY spot_id LIMIT ?3",
            )?;
            let result = stmt
                .query_map(params![category.as_str(), batch_id, limit], |row| {
                    row.get(0)
                })?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            result
        } else {
            let mut stmt = conn.prepare_cached(
                "SELECT spot_id FROM spots \
                 WHERE spot_category = ?1 \
                 ORDER BY spot_id LIMIT ?2",
            )?;
            let result = stmt
                .query_map(params![category.as_str(), limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            result
        };
        Ok(ids)
    }

    /// Spots whose raw code is `L` or not in the languages table, excluding
    /// Trade and COM/BB (those auto-default), highest revenue first.
    pub fn list_review_required(&self, limit: Option<usize>) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.spot_id FROM spots s \
             LEFT JOIN languages l ON UPPER(s.language_code) = UPPER(l.language_code) \
             WHERE (s.language_code = 'L' \
                    OR (s.language_code IS NOT NULL AND l.language_id IS NULL)) \
               AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
               AND UPPER(COALESCE(s.spot_type, '')) NOT IN ('COM', 'BB') \
             ORDER BY s.gross_rate DESC, s.spot_id \
             LIMIT ?1",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let ids = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Spots with the undetermined sentinel `L`, highest revenue first.
    pub fn list_undetermined(&self, limit: Option<usize>) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.spot_id FROM spots s \
             WHERE s.language_code = 'L' \
               AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
               AND UPPER(COALESCE(s.spot_type, '')) NOT IN ('COM', 'BB') \
             ORDER BY s.gross_rate DESC, s.spot_id \
             LIMIT ?1",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let ids = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Spots whose code exists but is not in the languages table.
    pub fn list_invalid_codes(&self, limit: Option<usize>) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.spot_id FROM spots s \
             LEFT JOIN languages l ON UPPER(s.language_code) = UPPER(l.language_code) \
             WHERE s.language_code IS NOT NULL \
               AND s.language_code != 'L' \
               AND l.language_id IS NULL \
               AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
             ORDER BY s.gross_rate DESC, s.spot_id \
             LIMIT ?1",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let ids = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Undetermined spots worth at least `min_value` in gross rate.
    pub fn list_high_value_undetermined(&self, min_value: f64) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.spot_id FROM spots s \
             WHERE s.language_code = 'L' \
               AND s.gross_rate >= ?1 \
               AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
             ORDER BY s.gross_rate DESC",
        )?;
        let ids = stmt
            .query_map([min_value], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Spots missing a block assignment that carry market, time, and day
    /// fields. `year` filters on the broadcast-month suffix (`Mmm-YY`).
    pub fn list_unassigned_blocks(
        &self,
        year: Option<i32>,
        limit: Option<usize>,
    ) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let ids = if let Some(year) = year {
            let suffix = format!("%-{:02}", year % 100);
            let mut stmt = conn.prepare_cached(
                "SELECT s.spot_id FROM spots s \
                 LEFT JOIN spot_language_blocks slb ON s.spot_id = slb.spot_id \
                 WHERE slb.spot_id IS NULL \
                   AND s.broadcast_month LIKE ?1 \
                   AND s.market_id IS NOT NULL \
                   AND s.time_in IS NOT NULL \
                   AND s.time_out IS NOT NULL \
                   AND s.day_of_week IS NOT NULL \
                   AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
                 ORDER BY s.spot_id LIMIT ?2",
            )?;
            let result = stmt
                .query_map(params![suffix, limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            result
        } else {
            let mut stmt = conn.prepare_cached(
                "SELECT s.spot_id FROM spots s \
                 LEFT JOIN spot_language_blocks slb ON s.spot_id = slb.spot_id \
                 WHERE slb.spot_id IS NULL \
                   AND s.market_id IS NOT NULL \
                   AND s.time_in IS NOT NULL \
                   AND s.time_out IS NOT NULL \
                   AND s.day_of_week IS NOT NULL \
                   AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
                 ORDER BY s.spot_id LIMIT ?1",
            )?;
            let result = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            result
        };
        Ok(ids)
    }

    // ---- categorization ----

    /// Tag a batch of spots with their categories in one transaction.
    pub fn set_categories(&self, categorized: &[(i64, SpotCategory)]) -> Result<usize> {
        if categorized.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        let mut updated = 0usize;
        {
            let mut stmt = conn
                .prepare_cached("UPDATE spots SET spot_category = ?1 WHERE spot_id = ?2")?;
            for (spot_id, category) in categorized {
                updated += stmt.execute(params![category.as_str(), spot_id])?;
            }
        }
        conn.execute("COMMIT", [])?;
        Ok(updated)
    }

    pub fn set_category(&self, spot_id: i64, category: SpotCategory) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE spots SET spot_category = ?1 WHERE spot_id = ?2",
            params![category.as_str(), spot_id],
        )?;
        Ok(())
    }

    /// Clear every category tag (Trade rows are never tagged).
    pub fn clear_categories(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let cleared = conn.execute(
            "UPDATE spots SET spot_category = NULL \
             WHERE (revenue_type != 'Trade' OR revenue_type IS NULL)",
            [],
        )?;
        Ok(cleared)
    }

    /// Drop both assignment tables' contents (force-recategorize path).
    pub fn clear_assignments(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM spot_language_assignments", [])?;
        conn.execute("DELETE FROM spot_language_blocks", [])?;
        info!("🗑️  Cleared all spot assignments");
        Ok(())
    }

    // ---- assignments ----

    pub async fn upsert_language_assignment(&self, a: &LanguageAssignment) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO spot_language_assignments \
             (spot_id, language_code, language_status, confidence, assignment_method, \
              assigned_date, requires_review, notes) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(spot_id) DO UPDATE SET \
                language_code = excluded.language_code, \
                language_status = excluded.language_status, \
                confidence = excluded.confidence, \
                assignment_method = excluded.assignment_method, \
                assigned_date = excluded.assigned_date, \
                requires_review = excluded.requires_review, \
                notes = excluded.notes",
            params![
                a.spot_id,
                a.language_code,
                a.status.as_str(),
                a.confidence,
                a.method.as_str(),
                a.assigned_date.to_rfc3339(),
                a.requires_review,
                a.notes,
            ],
        )?;
        Ok(())
    }

    pub async fn upsert_block_assignment(&self, b: &BlockAssignment) -> Result<()> {
        let blocks_spanned = serde_json::to_string(&b.blocks_spanned)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO spot_language_blocks \
             (spot_id, schedule_id, block_id, customer_intent, intent_confidence, \
              spans_multiple_blocks, blocks_spanned, primary_block_id, \
              assignment_method, assigned_date, assigned_by, \
              requires_attention, alert_reason, notes, campaign_type, \
              business_rule_applied, auto_resolved_date) \
             VALUES (?1, ?2, ?3, ?4, 1.0, ?5, ?6, ?7, 'auto_computed', ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
             ON CONFLICT(spot_id) DO UPDATE SET \
                schedule_id = excluded.schedule_id, \
                block_id = excluded.block_id, \
                customer_intent = excluded.customer_intent, \
                intent_confidence = excluded.intent_confidence, \
                spans_multiple_blocks = excluded.spans_multiple_blocks, \
                blocks_spanned = excluded.blocks_spanned, \
                primary_block_id = excluded.primary_block_id, \
                assignment_method = excluded.assignment_method, \
                assigned_date = excluded.assigned_date, \
                assigned_by = excluded.assigned_by, \
                requires_attention = excluded.requires_attention, \
                alert_reason = excluded.alert_reason, \
                notes = excluded.notes, \
                campaign_type = excluded.campaign_type, \
                business_rule_applied = excluded.business_rule_applied, \
                auto_resolved_date = excluded.auto_resolved_date",
            params![
                b.spot_id,
                b.schedule_id,
                b.block_id,
                b.customer_intent.map(|i| i.as_str()),
                b.spans_multiple_blocks,
                blocks_spanned,
                b.primary_block_id,
                b.assigned_date.to_rfc3339(),
                b.assigned_by,
                b.requires_attention,
                b.alert_reason,
                b.error_message,
                b.campaign_type.as_str(),
                b.business_rule_applied.map(|r| r.as_str()),
                b.auto_resolved_date.map(|d| d.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_language_assignment(&self, spot_id: i64) -> Result<Option<LanguageAssignment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT spot_id, language_code, language_status, confidence, assignment_method, \
                    assigned_date, requires_review, notes \
             FROM spot_language_assignments WHERE spot_id = ?1",
        )?;
        Ok(stmt
            .query_row([spot_id], Self::row_to_language_assignment)
            .optional()?)
    }

    pub fn get_block_assignment(&self, spot_id: i64) -> Result<Option<BlockAssignment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT spot_id, schedule_id, block_id, customer_intent, spans_multiple_blocks, \
                    blocks_spanned, primary_block_id, assigned_date, assigned_by, \
                    requires_attention, alert_reason, notes, campaign_type, \
                    business_rule_applied, auto_resolved_date \
             FROM spot_language_blocks WHERE spot_id = ?1",
        )?;
        Ok(stmt
            .query_row([spot_id], Self::row_to_block_assignment)
            .optional()?)
    }

    // ---- schedules and blocks ----

    /// Resolve the programming schedule active for a market on an air date.
    ///
    /// Highest priority wins, then the latest effective start at or before
    /// the air date. When no effective-date row matches, falls back to the
    /// market's highest-priority active schedule regardless of dates; this
    /// can pick a schedule whose start postdates the air date.
    pub fn active_schedule_for(&self, market_id: i64, air_date: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare_cached(
            "SELECT ps.schedule_id \
             FROM programming_schedules ps \
             JOIN schedule_market_assignments sma ON ps.schedule_id = sma.schedule_id \
             WHERE sma.market_id = ?1 \
               AND DATE(sma.effective_start_date) <= DATE(?2) \
               AND (sma.effective_end_date IS NULL OR DATE(sma.effective_end_date) >= DATE(?2)) \
               AND ps.is_active = 1 \
             ORDER BY sma.assignment_priority DESC, sma.effective_start_date DESC \
             LIMIT 1",
        )?;
        if let Some(schedule_id) = stmt
            .query_row(params![market_id, air_date], |row| row.get::<_, i64>(0))
            .optional()?
        {
            return Ok(Some(schedule_id));
        }

        let mut fallback = conn.prepare_cached(
            "SELECT ps.schedule_id \
             FROM programming_schedules ps \
             JOIN schedule_market_assignments sma ON ps.schedule_id = sma.schedule_id \
             WHERE sma.market_id = ?1 AND ps.is_active = 1 \
             ORDER BY sma.assignment_priority DESC \
             LIMIT 1",
        )?;
        let schedule_id = fallback
            .query_row([market_id], |row| row.get::<_, i64>(0))
            .optional()?;

        if let Some(schedule_id) = schedule_id {
            debug!(
                market_id,
                schedule_id, air_date, "no effective-date match, using fallback schedule"
            );
        }
        Ok(schedule_id)
    }

    /// Active language blocks for a schedule day, in schedule order.
    /// Day comparison is case-insensitive.
    pub fn blocks_for(&self, schedule_id: i64, day_of_week: &str) -> Result<Vec<LanguageBlock>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT block_id, schedule_id, day_of_week, time_start, time_end, \
                    language_id, block_name, block_type, day_part \
             FROM language_blocks \
             WHERE schedule_id = ?1 \
               AND LOWER(day_of_week) = LOWER(?2) \
               AND is_active = 1 \
             ORDER BY time_start",
        )?;
        let blocks = stmt
            .query_map(params![schedule_id, day_of_week], Self::row_to_block)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(blocks)
    }

    // ---- reference data ----

    pub fn languages(&self) -> Result<Vec<LanguageRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT language_id, language_code, language_name FROM languages \
             WHERE language_code IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LanguageRow {
                    language_id: row.get(0)?,
                    language_code: row.get(1)?,
                    language_name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn language_name(&self, language_id: i64) -> Result<String> {
        let conn = self.conn.lock();
        let name: Option<String> = conn
            .query_row(
                "SELECT language_name FROM languages WHERE language_id = ?1",
                [language_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.unwrap_or_else(|| format!("Unknown_{}", language_id)))
    }

    pub fn language_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM languages", [], |row| row.get(0))?)
    }

    pub fn schedule_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM programming_schedules WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?)
    }

    // ---- reporting ----

    /// Review workload summary, excluding Trade and COM/BB spot types.
    pub fn review_summary(&self) -> Result<ReviewSummary> {
        let conn = self.conn.lock();
        let (undetermined, high_value, invalid): (i64, i64, i64) = conn.query_row(
            "SELECT \
                COALESCE(SUM(CASE WHEN s.language_code = 'L' THEN 1 ELSE 0 END), 0), \
                COALESCE(SUM(CASE WHEN s.language_code = 'L' AND s.gross_rate >= 1000 THEN 1 ELSE 0 END), 0), \
                COALESCE(SUM(CASE WHEN s.language_code IS NOT NULL \
                            AND s.language_code != 'L' \
                            AND l.language_id IS NULL THEN 1 ELSE 0 END), 0) \
             FROM spots s \
             LEFT JOIN languages l ON UPPER(s.language_code) = UPPER(l.language_code) \
             WHERE (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
               AND UPPER(COALESCE(s.spot_type, '')) NOT IN ('COM', 'BB')",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(ReviewSummary {
            undetermined_language: undetermined,
            invalid_codes: invalid,
            total_review_required: undetermined + invalid,
            high_value_undetermined: high_value,
        })
    }

    /// Spot counts per category plus the uncategorized remainder.
    pub fn category_summary(&self) -> Result<CategorySummary> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT spot_category, COUNT(*) FROM spots \
             WHERE spot_category IS NOT NULL \
             GROUP BY spot_category ORDER BY spot_category",
        )?;
        let by_category = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        let uncategorized: i64 = conn.query_row(
            "SELECT COUNT(*) FROM spots WHERE spot_category IS NULL \
             AND (revenue_type != 'Trade' OR revenue_type IS NULL)",
            [],
            |row| row.get(0),
        )?;

        Ok(CategorySummary {
            by_category,
            uncategorized,
        })
    }

    /// Total vs language-processed counts per category.
    pub fn processing_status(&self) -> Result<ProcessingStatus> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.spot_category, COUNT(*), COUNT(sla.spot_id) \
             FROM spots s \
             LEFT JOIN spot_language_assignments sla ON s.spot_id = sla.spot_id \
             WHERE s.spot_category IS NOT NULL \
             GROUP BY s.spot_category ORDER BY s.spot_category",
        )?;
        let categories = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64, i64)>>>()?;
        Ok(ProcessingStatus { categories })
    }

    /// Counts per applied business rule over persisted block assignments,
    /// plus the count of rule-less (grid-analyzed) assignments.
    pub fn business_rule_stats(&self) -> Result<(Vec<(String, i64)>, i64)> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT business_rule_applied, COUNT(*) \
             FROM spot_language_blocks \
             WHERE business_rule_applied IS NOT NULL \
             GROUP BY business_rule_applied ORDER BY COUNT(*) DESC",
        )?;
        let rules = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        let standard: i64 = conn.query_row(
            "SELECT COUNT(*) FROM spot_language_blocks WHERE business_rule_applied IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok((rules, standard))
    }

    /// Block-assignment coverage per broadcast year.
    pub fn unassigned_by_year(&self) -> Result<Vec<YearSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT '20' || SUBSTR(s.broadcast_month, -2) AS year, \
                    COUNT(*), COUNT(slb.spot_id), COUNT(*) - COUNT(slb.spot_id), \
                    COALESCE(SUM(s.gross_rate), 0), \
                    COALESCE(SUM(CASE WHEN slb.spot_id IS NOT NULL THEN s.gross_rate ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN slb.spot_id IS NULL THEN s.gross_rate ELSE 0 END), 0) \
             FROM spots s \
             LEFT JOIN spot_language_blocks slb ON s.spot_id = slb.spot_id \
             WHERE s.market_id IS NOT NULL \
               AND s.time_in IS NOT NULL \
               AND s.time_out IS NOT NULL \
               AND s.day_of_week IS NOT NULL \
               AND (s.revenue_type != 'Trade' OR s.revenue_type IS NULL) \
               AND s.broadcast_month IS NOT NULL \
             GROUP BY SUBSTR(s.broadcast_month, -2) \
             ORDER BY year DESC",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(YearSummary {
                    year: row.get(0)?,
                    total_spots: row.get(1)?,
                    assigned_spots: row.get(2)?,
                    unassigned_spots: row.get(3)?,
                    total_revenue: row.get(4)?,
                    assigned_revenue: row.get(5)?,
                    unassigned_revenue: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Detailed assignment view for a single spot (test-mode reporting).
    pub fn assignment_details(&self, spot_id: i64) -> Result<Option<AssignmentDetails>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.spot_id, s.bill_code, s.air_date, s.time_in, s.time_out, \
                    m.market_code, \
                    slb.customer_intent, slb.spans_multiple_blocks, slb.requires_attention, \
                    slb.alert_reason, lb.block_name, lb.day_part, slb.business_rule_applied \
             FROM spots s \
             LEFT JOIN markets m ON s.market_id = m.market_id \
             LEFT JOIN spot_language_blocks slb ON s.spot_id = slb.spot_id \
             LEFT JOIN language_blocks lb ON slb.block_id = lb.block_id \
             WHERE s.spot_id = ?1",
        )?;
        let details = stmt
            .query_row([spot_id], |row| {
                Ok(AssignmentDetails {
                    spot_id: row.get(0)?,
                    bill_code: row.get(1)?,
                    air_date: row.get(2)?,
                    time_in: row.get(3)?,
                    time_out: row.get(4)?,
                    market_code: row.get(5)?,
                    customer_intent: row.get(6)?,
                    spans_multiple_blocks: row.get::<_, Option<bool>>(7)?.unwrap_or(false),
                    requires_attention: row.get::<_, Option<bool>>(8)?.unwrap_or(false),
                    alert_reason: row.get(9)?,
                    block_name: row.get(10)?,
                    day_part: row.get(11)?,
                    business_rule_applied: row.get(12)?,
                })
            })
            .optional()?;
        Ok(details)
    }

    // ---- seeding (importer / admin collaborators and tests) ----

    pub fn insert_language(&self, language_id: i64, code: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO languages (language_id, language_code, language_name) \
             VALUES (?1, ?2, ?3)",
            params![language_id, code, name],
        )?;
        Ok(())
    }

    pub fn insert_agency(&self, agency_id: i64, agency_name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO agencies (agency_id, agency_name) VALUES (?1, ?2)",
            params![agency_id, agency_name],
        )?;
        Ok(())
    }

    pub fn insert_market(&self, market_id: i64, market_code: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO markets (market_id, market_code) VALUES (?1, ?2)",
            params![market_id, market_code],
        )?;
        Ok(())
    }

    pub fn insert_schedule(&self, schedule_id: i64, name: &str, is_active: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO programming_schedules (schedule_id, schedule_name, is_active) \
             VALUES (?1, ?2, ?3)",
            params![schedule_id, name, is_active],
        )?;
        Ok(())
    }

    pub fn assign_schedule_to_market(
        &self,
        schedule_id: i64,
        market_id: i64,
        effective_start_date: &str,
        effective_end_date: Option<&str>,
        priority: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO schedule_market_assignments \
             (schedule_id, market_id, effective_start_date, effective_end_date, \
              assignment_priority, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![
                schedule_id,
                market_id,
                effective_start_date,
                effective_end_date,
                priority
            ],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_language_block(
        &self,
        block_id: i64,
        schedule_id: i64,
        day_of_week: &str,
        time_start: &str,
        time_end: &str,
        language_id: i64,
        block_name: &str,
        day_part: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO language_blocks \
             (block_id, schedule_id, day_of_week, time_start, time_end, \
              language_id, block_name, block_type, day_part, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, 1)",
            params![
                block_id,
                schedule_id,
                day_of_week,
                time_start,
                time_end,
                language_id,
                block_name,
                day_part
            ],
        )?;
        Ok(())
    }

    pub fn insert_spot(&self, spot: &Spot, agency_id: Option<i64>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO spots \
             (spot_id, bill_code, agency_id, revenue_type, spot_type, market_id, \
              air_date, day_of_week, time_in, time_out, language_code, language_id, \
              gross_rate, broadcast_month, spot_category, import_batch_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                spot.spot_id,
                spot.bill_code,
                agency_id,
                spot.revenue_type,
                spot.spot_type,
                spot.market_id,
                spot.air_date,
                spot.day_of_week,
                spot.time_in,
                spot.time_out,
                spot.language_code,
                spot.language_id,
                spot.gross_rate,
                spot.broadcast_month,
                spot.spot_category.map(|c| c.as_str()),
                spot.import_batch_id,
            ],
        )?;
        Ok(())
    }

    pub fn spot_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM spots", [], |row| row.get(0))?)
    }
}
