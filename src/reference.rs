//! Reference data
//!
//! In-memory lookup tables loaded once from the languages table: the set of
//! valid canonical codes, the canonical English code, language names, and
//! the language-family groupings used by multi-block analysis.

use std::collections::{HashMap, HashSet};

/// One row of the languages table.
#[derive(Debug, Clone)]
pub struct LanguageRow {
    pub language_id: i64,
    pub language_code: String,
    pub language_name: String,
}

/// Language family groupings by language id.
///
/// Mandarin and Cantonese are one family; every other language currently
/// stands alone. Adding a language is a data edit here, not new code.
pub const LANGUAGE_FAMILIES: &[(&str, &[i64])] = &[
    ("Chinese", &[MANDARIN, CANTONESE]),
    ("Filipino", &[4]),
    ("South Asian", &[6]),
    ("English", &[1]),
    ("Vietnamese", &[7]),
    ("Korean", &[8]),
    ("Japanese", &[9]),
    ("Hmong", &[5]),
];

pub const MANDARIN: i64 = 2;
pub const CANTONESE: i64 = 3;

/// True for Mandarin or Cantonese block languages.
pub fn is_chinese(language_id: i64) -> bool {
    language_id == MANDARIN || language_id == CANTONESE
}

/// Name of the family containing every id in `language_ids`, if one exists.
pub fn family_containing(language_ids: &HashSet<i64>) -> Option<&'static str> {
    LANGUAGE_FAMILIES
        .iter()
        .find(|(_, members)| language_ids.iter().all(|id| members.contains(id)))
        .map(|(name, _)| *name)
}

/// Immutable lookup tables shared by both resolvers.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    valid_codes: HashSet<String>,
    english_code: String,
    names: HashMap<i64, String>,
    codes: HashMap<i64, String>,
}

impl ReferenceData {
    pub fn from_rows(rows: &[LanguageRow]) -> Self {
        let valid_codes = rows
            .iter()
            .map(|r| r.language_code.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        // Prefer the code from the table; fall back to EN.
        let english_code = rows
            .iter()
            .find(|r| {
                r.language_name.to_uppercase() == "ENGLISH"
                    || matches!(r.language_code.to_uppercase().as_str(), "EN" | "ENG")
            })
            .map(|r| r.language_code.to_uppercase())
            .unwrap_or_else(|| "EN".to_string());

        let names = rows
            .iter()
            .map(|r| (r.language_id, r.language_name.clone()))
            .collect();

        let codes = rows
            .iter()
            .map(|r| (r.language_id, r.language_code.trim().to_uppercase()))
            .collect();

        Self {
            valid_codes,
            english_code,
            names,
            codes,
        }
    }

    pub fn is_valid_code(&self, code: &str) -> bool {
        self.valid_codes.contains(code)
    }

    pub fn english_code(&self) -> &str {
        &self.english_code
    }

    pub fn language_name(&self, language_id: i64) -> String {
        self.names
            .get(&language_id)
            .cloned()
            .unwrap_or_else(|| format!("Unknown_{}", language_id))
    }

    pub fn code_for(&self, language_id: i64) -> Option<&str> {
        self.codes.get(&language_id).map(|c| c.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<LanguageRow> {
        [
            (1, "E", "English"),
            (2, "M", "Mandarin"),
            (3, "C", "Cantonese"),
            (4, "T", "Tagalog"),
            (5, "H", "Hmong"),
            (7, "V", "Vietnamese"),
        ]
        .into_iter()
        .map(|(id, code, name)| LanguageRow {
            language_id: id,
            language_code: code.to_string(),
            language_name: name.to_string(),
        })
        .collect()
    }

    #[test]
    fn english_code_comes_from_table() {
        let reference = ReferenceData::from_rows(&sample_rows());
        assert_eq!(reference.english_code(), "E");
    }

    #[test]
    fn english_code_falls_back_to_en() {
        let rows = vec![LanguageRow {
            language_id: 2,
            language_code: "M".to_string(),
            language_name: "Mandarin".to_string(),
        }];
        let reference = ReferenceData::from_rows(&rows);
        assert_eq!(reference.english_code(), "EN");
    }

    #[test]
    fn code_validity_is_uppercased() {
        let reference = ReferenceData::from_rows(&sample_rows());
        assert!(reference.is_valid_code("M"));
        assert!(!reference.is_valid_code("m"));
        assert!(!reference.is_valid_code("ZZ"));
    }

    #[test]
    fn unknown_language_name_is_tagged() {
        let reference = ReferenceData::from_rows(&sample_rows());
        assert_eq!(reference.language_name(2), "Mandarin");
        assert_eq!(reference.language_name(42), "Unknown_42");
    }

    #[test]
    fn chinese_family_groups_mandarin_and_cantonese() {
        let ids: HashSet<i64> = [MANDARIN, CANTONESE].into_iter().collect();
        assert_eq!(family_containing(&ids), Some("Chinese"));

        let mixed: HashSet<i64> = [MANDARIN, 4].into_iter().collect();
        assert_eq!(family_containing(&mixed), None);

        let solo: HashSet<i64> = [7].into_iter().collect();
        assert_eq!(family_containing(&solo), Some("Vietnamese"));
    }
}
