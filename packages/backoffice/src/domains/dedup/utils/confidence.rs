//! Pure confidence scoring for duplicate candidate pairs
//!
//! No side effects: these functions implement the business logic for deciding
//! how likely two records describe the same business. Matching predicates are
//! symmetric, so `score_pair(a, b) == score_pair(b, a)` always holds.

use std::collections::BTreeSet;

use crate::domains::dedup::models::{MatchedField, Recommendation};
use crate::domains::directory::models::BusinessRecord;

/// Field weights. An exact ABN match is close to conclusive on its own;
/// suburb only ever acts as a tiebreaker.
pub const WEIGHT_ABN: u8 = 35;
pub const WEIGHT_PHONE: u8 = 30;
pub const WEIGHT_WEBSITE: u8 = 25;
pub const WEIGHT_NAME: u8 = 20;
pub const WEIGHT_EMAIL: u8 = 20;
pub const WEIGHT_SUBURB: u8 = 10;

/// Scores at or above this recommend an automatic merge.
pub const MERGE_THRESHOLD: u8 = 80;
/// Scores at or above this (but below merge) go to human review.
pub const REVIEW_THRESHOLD: u8 = 50;

pub const MAX_SCORE: u8 = 100;

// ============================================================================
// Normalizers
// ============================================================================

/// Digits-only phone comparison form. `+61` country prefixes collapse to the
/// local `0` form so "0400 000 000" and "+61 400 000 000" compare equal.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if let Some(rest) = digits.strip_prefix("61") {
        if digits.len() == 11 {
            return Some(format!("0{rest}"));
        }
    }
    Some(digits)
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        None
    } else {
        Some(email)
    }
}

/// Hosts compare without scheme, `www.` prefix, or trailing slash.
pub fn normalize_website(raw: &str) -> Option<String> {
    let mut site = raw.trim().to_lowercase();
    for prefix in ["https://", "http://"] {
        if let Some(rest) = site.strip_prefix(prefix) {
            site = rest.to_string();
            break;
        }
    }
    if let Some(rest) = site.strip_prefix("www.") {
        site = rest.to_string();
    }
    let site = site.trim_end_matches('/').to_string();
    if site.is_empty() {
        None
    } else {
        Some(site)
    }
}

pub fn normalize_abn(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Case-insensitive, whitespace-collapsed name comparison form.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn normalize_suburb(raw: &str) -> Option<String> {
    let suburb = normalize_name(raw);
    if suburb.is_empty() {
        None
    } else {
        Some(suburb)
    }
}

// ============================================================================
// Matching and scoring
// ============================================================================

fn both<T: Eq>(a: Option<T>, b: Option<T>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

/// The set of identity fields on which two records agree exactly (after
/// normalization). Symmetric by construction.
pub fn matched_fields(a: &BusinessRecord, b: &BusinessRecord) -> BTreeSet<MatchedField> {
    let mut fields = BTreeSet::new();

    let norm = |value: &Option<String>, f: fn(&str) -> Option<String>| {
        value.as_deref().and_then(f)
    };

    if both(norm(&a.abn, normalize_abn), norm(&b.abn, normalize_abn)) {
        fields.insert(MatchedField::Abn);
    }
    if both(norm(&a.phone, normalize_phone), norm(&b.phone, normalize_phone)) {
        fields.insert(MatchedField::Phone);
    }
    if both(norm(&a.website, normalize_website), norm(&b.website, normalize_website)) {
        fields.insert(MatchedField::Website);
    }
    if normalize_name(&a.name) == normalize_name(&b.name) && !a.name.trim().is_empty() {
        fields.insert(MatchedField::Name);
    }
    if both(norm(&a.email, normalize_email), norm(&b.email, normalize_email)) {
        fields.insert(MatchedField::Email);
    }
    if both(norm(&a.suburb, normalize_suburb), norm(&b.suburb, normalize_suburb)) {
        fields.insert(MatchedField::Suburb);
    }

    fields
}

pub fn field_weight(field: MatchedField) -> u8 {
    match field {
        MatchedField::Abn => WEIGHT_ABN,
        MatchedField::Phone => WEIGHT_PHONE,
        MatchedField::Website => WEIGHT_WEBSITE,
        MatchedField::Name => WEIGHT_NAME,
        MatchedField::Email => WEIGHT_EMAIL,
        MatchedField::Suburb => WEIGHT_SUBURB,
    }
}

/// Sum of field weights, capped at [`MAX_SCORE`].
pub fn score(fields: &BTreeSet<MatchedField>) -> u8 {
    let total: u32 = fields.iter().map(|f| u32::from(field_weight(*f))).sum();
    total.min(u32::from(MAX_SCORE)) as u8
}

pub fn classify(score: u8) -> Recommendation {
    if score >= MERGE_THRESHOLD {
        Recommendation::Merge
    } else if score >= REVIEW_THRESHOLD {
        Recommendation::Review
    } else {
        Recommendation::Ignore
    }
}

/// Score one candidate pair. Deterministic: identical inputs always yield
/// identical output.
pub fn score_pair(
    a: &BusinessRecord,
    b: &BusinessRecord,
) -> (BTreeSet<MatchedField>, u8, Recommendation) {
    let fields = matched_fields(a, b);
    let score = score(&fields);
    (fields, score, classify(score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> BusinessRecord {
        BusinessRecord::builder().name(name).build()
    }

    #[test]
    fn test_phone_normalization_collapses_country_code() {
        assert_eq!(
            normalize_phone("+61 400 000 000"),
            normalize_phone("0400 000 000")
        );
        assert_eq!(normalize_phone("(02) 9555 1234").as_deref(), Some("0295551234"));
        assert_eq!(normalize_phone(" "), None);
    }

    #[test]
    fn test_website_normalization() {
        assert_eq!(
            normalize_website("https://www.acme.com.au/"),
            Some("acme.com.au".to_string())
        );
        assert_eq!(
            normalize_website("http://acme.com.au"),
            Some("acme.com.au".to_string())
        );
        assert_eq!(normalize_website(""), None);
    }

    #[test]
    fn test_abn_match_scores_thirty_five() {
        let mut a = record("Acme Plumbing");
        let mut b = record("Acme Plumbing Pty Ltd");
        a.abn = Some("51 824 753 556".to_string());
        b.abn = Some("51824753556".to_string());

        let (fields, score, _) = score_pair(&a, &b);
        assert!(fields.contains(&MatchedField::Abn));
        assert_eq!(score, WEIGHT_ABN);
    }

    #[test]
    fn test_score_caps_at_one_hundred() {
        let mut a = record("Acme Plumbing");
        let mut b = record("Acme Plumbing");
        a.abn = Some("51824753556".to_string());
        b.abn = a.abn.clone();
        a.phone = Some("0400000000".to_string());
        b.phone = a.phone.clone();
        a.website = Some("acme.com.au".to_string());
        b.website = a.website.clone();
        a.email = Some("hi@acme.com.au".to_string());
        b.email = a.email.clone();

        // 35 + 30 + 25 + 20 (name) + 20 (email) = 130, capped
        let (_, score, recommendation) = score_pair(&a, &b);
        assert_eq!(score, MAX_SCORE);
        assert_eq!(recommendation, Recommendation::Merge);
    }

    #[test]
    fn test_symmetry() {
        let mut a = record("Glebe Cafe");
        let mut b = record("The Glebe Cafe");
        a.phone = Some("+61 2 9555 1234".to_string());
        b.phone = Some("02 9555 1234".to_string());
        a.suburb = Some("Glebe".to_string());
        b.suburb = Some("glebe".to_string());

        assert_eq!(score_pair(&a, &b), score_pair(&b, &a));
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(classify(80), Recommendation::Merge);
        assert_eq!(classify(100), Recommendation::Merge);
        assert_eq!(classify(79), Recommendation::Review);
        assert_eq!(classify(50), Recommendation::Review);
        assert_eq!(classify(49), Recommendation::Ignore);
        assert_eq!(classify(0), Recommendation::Ignore);
    }

    #[test]
    fn test_absent_fields_never_match() {
        let a = record("Acme");
        let b = record("Zenith");
        let (fields, score, recommendation) = score_pair(&a, &b);
        assert!(fields.is_empty());
        assert_eq!(score, 0);
        assert_eq!(recommendation, Recommendation::Ignore);
    }

    #[test]
    fn test_phone_plus_email_recommends_review() {
        let mut a = record("Acme");
        let mut b = record("Acme Services");
        a.phone = Some("0400111222".to_string());
        b.phone = a.phone.clone();
        a.email = Some("team@acme.com.au".to_string());
        b.email = a.email.clone();

        // 30 + 20 = 50 - review range
        let (_, score, recommendation) = score_pair(&a, &b);
        assert_eq!(score, 50);
        assert_eq!(recommendation, Recommendation::Review);
    }
}
