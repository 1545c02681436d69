// 🔍 Deduplication Engine - Flag imported transactions that already exist
// Two strategies: Exact ID, Fuzzy (weighted description/amount/date score)

use crate::similarity::similarity;
use crate::transaction::TransactionRecord;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const DESCRIPTION_WEIGHT: f64 = 0.6;
pub const AMOUNT_WEIGHT: f64 = 0.3;
pub const DATE_WEIGHT: f64 = 0.1;

pub const EXACT_ID_REASON: &str = "Exact ID match";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

// ============================================================================
// OPTIONS
// ============================================================================

/// Tunable detector settings. Every field is optional in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DedupOptions {
    /// Minimum composite score to flag a probable duplicate (default: 0.8)
    pub threshold: f64,

    /// Dates within this many days earn the date bonus (default: 3)
    pub date_window_days: f64,

    /// Amount deviation (%) at which amount closeness bottoms out (default: 20)
    pub amount_tolerance_percent: f64,
}

impl Default for DedupOptions {
    fn default() -> Self {
        DedupOptions {
            threshold: 0.8,
            date_window_days: 3.0,
            amount_tolerance_percent: 20.0,
        }
    }
}

impl DedupOptions {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_date_window_days(mut self, days: f64) -> Self {
        self.date_window_days = days;
        self
    }

    pub fn with_amount_tolerance_percent(mut self, percent: f64) -> Self {
        self.amount_tolerance_percent = percent;
        self
    }
}

// ============================================================================
// MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// Incoming id equals an existing id; no scoring done
    ExactId,

    /// Composite score met the threshold
    Fuzzy,
}

/// Breakdown of one pairwise comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub description: f64,
    pub amount: f64,
    pub date: f64,
    pub composite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub incoming_id: String,

    /// Existing record that triggered the flag
    pub existing_id: String,

    pub strategy: MatchStrategy,

    /// 1.0 for exact id matches, otherwise the composite score
    pub confidence: f64,
}

impl DuplicateMatch {
    /// Human-readable reason shown next to the record during review
    pub fn reason(&self) -> String {
        match self.strategy {
            MatchStrategy::ExactId => EXACT_ID_REASON.to_string(),
            MatchStrategy::Fuzzy => {
                format!("Possible duplicate (score {:.2})", self.confidence)
            }
        }
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DeduplicationEngine {
    pub options: DedupOptions,
}

impl DeduplicationEngine {
    /// Create engine with default options
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DedupOptions) -> Self {
        DeduplicationEngine { options }
    }

    /// Classify every incoming record against the existing set.
    ///
    /// Records absent from the result are treated as new. Neither input is
    /// modified. Fuzzy matching stops at the first existing record that meets
    /// the threshold; a later, higher-scoring record is never considered.
    pub fn find_duplicates(
        &self,
        existing: &[TransactionRecord],
        incoming: &[TransactionRecord],
    ) -> BTreeMap<String, DuplicateMatch> {
        let existing_ids: HashSet<&str> = existing.iter().map(|e| e.id.as_str()).collect();
        let mut matches = BTreeMap::new();

        for inc in incoming {
            // Strategy 1: Exact ID (cheapest, wins outright)
            if existing_ids.contains(inc.id.as_str()) {
                debug!("{}: exact id match", inc.id);
                matches.insert(
                    inc.id.clone(),
                    DuplicateMatch {
                        incoming_id: inc.id.clone(),
                        existing_id: inc.id.clone(),
                        strategy: MatchStrategy::ExactId,
                        confidence: 1.0,
                    },
                );
                continue;
            }

            // Strategy 2: Fuzzy, first match wins
            if let Some(m) = self.check_fuzzy_match(existing, inc) {
                debug!(
                    "{}: possible duplicate of {} (score {:.3})",
                    inc.id, m.existing_id, m.confidence
                );
                matches.insert(inc.id.clone(), m);
            }
        }

        matches
    }

    fn check_fuzzy_match(
        &self,
        existing: &[TransactionRecord],
        inc: &TransactionRecord,
    ) -> Option<DuplicateMatch> {
        existing.iter().find_map(|e| {
            let score = self.score(e, inc);
            if score.composite >= self.options.threshold {
                Some(DuplicateMatch {
                    incoming_id: inc.id.clone(),
                    existing_id: e.id.clone(),
                    strategy: MatchStrategy::Fuzzy,
                    confidence: score.composite,
                })
            } else {
                None
            }
        })
    }

    /// Score one existing/incoming pair
    pub fn score(&self, existing: &TransactionRecord, incoming: &TransactionRecord) -> MatchScore {
        let description = similarity(
            existing.description_or_empty(),
            incoming.description_or_empty(),
        );
        let amount = self.amount_closeness(existing.amount, incoming.amount);
        let date = self.date_bonus(existing.date, incoming.date);

        let composite = (DESCRIPTION_WEIGHT * description + AMOUNT_WEIGHT * amount + DATE_WEIGHT * date)
            .clamp(0.0, 1.0);

        MatchScore {
            description,
            amount,
            date,
            composite,
        }
    }

    /// 1 at identical amounts, falling linearly to 0 at the tolerance.
    /// The deviation is relative to the existing amount, floored at 1 so a
    /// zero amount cannot divide by zero. Non-finite inputs score 0.
    fn amount_closeness(&self, existing: f64, incoming: f64) -> f64 {
        let diff_percent = (existing - incoming).abs() / existing.abs().max(1.0) * 100.0;
        if !diff_percent.is_finite() {
            return 0.0;
        }

        let tolerance = self.options.amount_tolerance_percent;
        let closeness = if tolerance > 0.0 {
            1.0 - (diff_percent / tolerance).min(1.0)
        } else if diff_percent == 0.0 {
            1.0
        } else {
            0.0
        };

        closeness.clamp(0.0, 1.0)
    }

    /// Step function: 1 inside the window, 0 outside
    fn date_bonus(&self, existing: i64, incoming: i64) -> f64 {
        let window_ms = self.options.date_window_days * MILLIS_PER_DAY;
        if (existing.abs_diff(incoming) as f64) <= window_ms {
            1.0
        } else {
            0.0
        }
    }
}

/// Map of incoming id to human-readable reason for every flagged record.
/// `None` options means defaults.
pub fn detect_fuzzy_duplicates(
    existing: &[TransactionRecord],
    incoming: &[TransactionRecord],
    options: Option<DedupOptions>,
) -> HashMap<String, String> {
    DeduplicationEngine::with_options(options.unwrap_or_default())
        .find_duplicates(existing, incoming)
        .into_iter()
        .map(|(id, m)| (id, m.reason()))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z
    const DAY: i64 = 86_400_000;

    fn create_test_record(id: &str, amount: f64, date: i64, description: &str) -> TransactionRecord {
        TransactionRecord::new(id, amount, date).with_description(description)
    }

    #[test]
    fn test_netflix_possible_duplicate() {
        let existing = vec![create_test_record("e1", 100.0, T, "Netflix Subscription")];
        let incoming = vec![create_test_record("i1", 102.0, T, "netflix subscription")];
        let options = DedupOptions::default()
            .with_threshold(0.5)
            .with_date_window_days(2.0)
            .with_amount_tolerance_percent(10.0);

        let result = detect_fuzzy_duplicates(&existing, &incoming, Some(options));

        let reason = result.get("i1").expect("i1 should be flagged");
        assert!(reason.contains("Possible duplicate"));
        // 0.6 * 1.0 + 0.3 * (1 - 2/10) + 0.1 = 0.94
        assert_eq!(reason, "Possible duplicate (score 0.94)");
    }

    #[test]
    fn test_exact_id_match() {
        let existing = vec![create_test_record("t1", 9999.0, T - 400 * DAY, "Rent")];
        let incoming = vec![create_test_record("t1", 50.0, T, "Coffee")];

        let result = detect_fuzzy_duplicates(&existing, &incoming, None);

        assert!(result["t1"].contains("Exact ID"));
    }

    #[test]
    fn test_exact_id_takes_precedence_over_fuzzy() {
        let existing = vec![
            create_test_record("other", 50.0, T, "Coffee"),
            create_test_record("t1", 1.0, T - 100 * DAY, "Something else"),
        ];
        let incoming = vec![create_test_record("t1", 50.0, T, "Coffee")];

        let matches = DeduplicationEngine::new().find_duplicates(&existing, &incoming);

        assert_eq!(matches["t1"].strategy, MatchStrategy::ExactId);
        assert_eq!(matches["t1"].reason(), EXACT_ID_REASON);
    }

    #[test]
    fn test_empty_description_far_amount_not_flagged() {
        let existing = vec![create_test_record("e1", 100.0, T, "Groceries")];
        let incoming = vec![TransactionRecord::new("i1", 150.0, T + 30 * DAY)];

        let result = detect_fuzzy_duplicates(&existing, &incoming, None);

        assert!(result.is_empty());
    }

    #[test]
    fn test_first_match_wins_over_better_later_match() {
        // Known quirk: scanning stops at the first record over the threshold,
        // so the identical record later in the list is ignored.
        let existing = vec![
            create_test_record("close", 100.0, T, "Netflix Subscriptio"),
            create_test_record("identical", 100.0, T, "Netflix Subscription"),
        ];
        let incoming = vec![create_test_record("i1", 100.0, T, "Netflix Subscription")];

        let matches = DeduplicationEngine::new().find_duplicates(&existing, &incoming);

        assert_eq!(matches["i1"].existing_id, "close");
        assert!(matches["i1"].confidence < 1.0);
    }

    #[test]
    fn test_date_bonus_is_a_step_function() {
        let engine = DeduplicationEngine::new();
        let e = create_test_record("e", 10.0, T, "x");

        let inside = engine.score(&e, &create_test_record("a", 10.0, T + 3 * DAY, "x"));
        let edge = engine.score(&e, &create_test_record("b", 10.0, T - 3 * DAY, "x"));
        let outside = engine.score(&e, &create_test_record("c", 10.0, T + 3 * DAY + 1, "x"));

        assert_eq!(inside.date, 1.0);
        assert_eq!(edge.date, 1.0);
        assert_eq!(outside.date, 0.0);
        assert!((inside.composite - 1.0).abs() < 1e-12);
        assert!((outside.composite - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_amount_closeness_floors_at_tolerance() {
        let engine = DeduplicationEngine::new();
        let e = create_test_record("e", 100.0, T, "");

        let ten_pct = engine.score(&e, &TransactionRecord::new("a", 110.0, T));
        let fifty_pct = engine.score(&e, &TransactionRecord::new("b", 150.0, T));

        assert!((ten_pct.amount - 0.5).abs() < 1e-12);
        assert_eq!(fifty_pct.amount, 0.0);
    }

    #[test]
    fn test_zero_existing_amount_uses_denominator_floor() {
        let engine = DeduplicationEngine::new();
        let e = create_test_record("e", 0.0, T, "Fee");

        // |0 - 0.1| / 1 * 100 = 10% -> closeness 0.5
        let score = engine.score(&e, &create_test_record("i", 0.1, T, "Fee"));

        assert!(score.amount.is_finite());
        assert!((score.amount - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_amounts_do_not_panic() {
        let engine = DeduplicationEngine::new();
        let e = create_test_record("e", f64::NAN, T, "Fee");

        for amount in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.0] {
            let score = engine.score(&e, &create_test_record("i", amount, T, "Fee"));
            assert_eq!(score.amount, 0.0);
            assert!((0.0..=1.0).contains(&score.composite));
        }
    }

    #[test]
    fn test_zero_tolerance_only_accepts_exact_amount() {
        let engine = DeduplicationEngine::with_options(
            DedupOptions::default().with_amount_tolerance_percent(0.0),
        );
        let e = create_test_record("e", 20.0, T, "");

        assert_eq!(engine.score(&e, &TransactionRecord::new("a", 20.0, T)).amount, 1.0);
        assert_eq!(engine.score(&e, &TransactionRecord::new("b", 20.01, T)).amount, 0.0);
    }

    #[test]
    fn test_missing_descriptions_score_as_identical() {
        let engine = DeduplicationEngine::new();
        let score = engine.score(
            &TransactionRecord::new("e", 5.0, T),
            &TransactionRecord::new("i", 5.0, T),
        );

        assert_eq!(score.description, 1.0);
        assert!((score.composite - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unflagged_records_absent_from_result() {
        let existing = vec![create_test_record("e1", 45.99, T, "Starbucks")];
        let incoming = vec![
            create_test_record("dup", 45.99, T + DAY, "STARBUCKS"),
            create_test_record("new", 1200.0, T + 60 * DAY, "Airline tickets"),
        ];

        let result = detect_fuzzy_duplicates(&existing, &incoming, None);

        assert_eq!(result.len(), 1);
        assert!(result.contains_key("dup"));
        assert!(!result.contains_key("new"));
    }

    #[test]
    fn test_empty_inputs() {
        let records = vec![create_test_record("a", 1.0, T, "x")];

        assert!(detect_fuzzy_duplicates(&[], &records, None).is_empty());
        assert!(detect_fuzzy_duplicates(&records, &[], None).is_empty());
    }

    #[test]
    fn test_options_deserialize_with_partial_fields() {
        let options: DedupOptions = serde_json::from_str(r#"{"threshold": 0.5}"#).unwrap();

        assert_eq!(options.threshold, 0.5);
        assert_eq!(options.date_window_days, 3.0);
        assert_eq!(options.amount_tolerance_percent, 20.0);
    }
}
