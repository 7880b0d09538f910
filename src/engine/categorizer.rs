//! Spot categorization
//!
//! Routes each spot into one of three processing categories from its
//! `(revenue_type, spot_type)` pair. Trade spots are filtered upstream and
//! never reach this function.

use crate::models::SpotCategory;

/// Categorize a spot from its revenue type and spot type.
///
/// Missing values are treated as empty strings; anything unrecognized falls
/// back to the review category.
pub fn categorize_spot(revenue_type: Option<&str>, spot_type: Option<&str>) -> SpotCategory {
    let revenue_type = revenue_type.unwrap_or("");
    let spot_type = spot_type.unwrap_or("");

    // Language assignment required
    if revenue_type == "Internal Ad Sales" && matches!(spot_type, "COM" | "BNS") {
        return SpotCategory::LanguageAssignmentRequired;
    }
    if revenue_type == "Local" {
        // Treated the same as Internal Ad Sales
        return SpotCategory::LanguageAssignmentRequired;
    }

    // Review category
    if revenue_type == "Internal Ad Sales" && matches!(spot_type, "PKG" | "CRD" | "AV") {
        return SpotCategory::ReviewCategory;
    }
    if revenue_type == "Other" && matches!(spot_type, "COM" | "BNS" | "") {
        return SpotCategory::ReviewCategory;
    }

    // Default English
    if matches!(
        revenue_type,
        "Direct Response Sales" | "Paid Programming" | "Branded Content"
    ) {
        return SpotCategory::DefaultEnglish;
    }
    if revenue_type == "Other" && matches!(spot_type, "SVC" | "PRD") {
        return SpotCategory::DefaultEnglish;
    }

    // Anything unmatched goes to review
    SpotCategory::ReviewCategory
}
