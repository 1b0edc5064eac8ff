//! Merges rule contributions into a bounded, explainable risk report

use crate::feature_extractor::{normalize_key, InvoiceFeatures};
use crate::scoring::duplicate::DuplicateFindings;
use crate::types::report::RiskLevelThresholds;
use crate::types::{InvoiceRecord, RiskLevel, RiskReport};

/// Vendor amounts required before the median rule applies
pub const MIN_VENDOR_HISTORY: usize = 5;
pub const MAX_REASONS: usize = 5;
pub const MAX_MATCHES: usize = 3;

const SEVERE_RATIO: f64 = 5.0;
const SEVERE_POINTS: u32 = 25;
const ELEVATED_RATIO: f64 = 2.0;
const ELEVATED_POINTS: u32 = 10;

/// Combines the duplicate contribution with a coarse median-ratio amount rule.
///
/// The median rule is independent of the z-score `AnomalyScorer`; both are
/// reported, neither replaces the other.
pub struct RiskAggregator {
    thresholds: RiskLevelThresholds,
}

impl RiskAggregator {
    pub fn new(thresholds: RiskLevelThresholds) -> Self {
        Self { thresholds }
    }

    pub fn aggregate(
        &self,
        duplicate: DuplicateFindings,
        amount: Option<f64>,
        vendor: Option<&str>,
        history: &[InvoiceRecord],
    ) -> RiskReport {
        let mut score = duplicate.contribution;
        let mut reasons = duplicate.reasons;
        let mut matches = duplicate.matches;

        if let Some((points, reason)) = self.median_rule(amount, vendor, history) {
            score += points;
            reasons.push(reason);
        }

        let risk_score = score.min(100) as u8;
        reasons.truncate(MAX_REASONS);
        matches.truncate(MAX_MATCHES);

        RiskReport {
            risk_score,
            risk_level: RiskLevel::from_score(risk_score, &self.thresholds),
            reasons,
            matches,
        }
    }

    /// Points and reason when the amount is a multiple of the vendor's median.
    fn median_rule(
        &self,
        amount: Option<f64>,
        vendor: Option<&str>,
        history: &[InvoiceRecord],
    ) -> Option<(u32, String)> {
        let amount = amount.filter(|a| a.is_finite())?;
        let vendor = normalize_key(vendor?)?;

        let amounts: Vec<f64> = history
            .iter()
            .map(InvoiceFeatures::from)
            .filter(|old| old.vendor.as_deref() == Some(vendor.as_str()))
            .filter_map(|old| old.amount)
            .collect();

        let median = upper_median(amounts, MIN_VENDOR_HISTORY)?;
        if median <= 0.0 {
            return None;
        }

        let ratio = amount / median;
        if ratio >= SEVERE_RATIO {
            Some((SEVERE_POINTS, format!("amount is {:.1}x vendor median", ratio)))
        } else if ratio >= ELEVATED_RATIO {
            Some((ELEVATED_POINTS, format!("amount is {:.1}x vendor median", ratio)))
        } else {
            None
        }
    }
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new(RiskLevelThresholds::default())
    }
}

/// Element at `len / 2` of the sorted values, once at least `min_len` exist.
pub fn upper_median(mut values: Vec<f64>, min_len: usize) -> Option<f64> {
    if values.len() < min_len || values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DuplicateMatch;
    use chrono::Utc;

    fn history(vendor: &str, amounts: &[f64]) -> Vec<InvoiceRecord> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, &amount)| InvoiceRecord {
                id: i as i64 + 1,
                vendor_name: Some(vendor.to_string()),
                invoice_number: Some(format!("INV-{}", i)),
                invoice_date: None,
                total_amount: Some(amount),
                currency: None,
                source_file: None,
                raw_text: String::new(),
                created_at: Utc::now(),
            })
            .collect()
    }

    fn exact_hit() -> DuplicateFindings {
        DuplicateFindings {
            contribution: 60,
            reasons: vec!["exact vendor+invoice_number match".to_string()],
            matches: vec![DuplicateMatch {
                id: 1,
                score: 0.99,
                why: "exact vendor+invoice_number match".to_string(),
            }],
        }
    }

    #[test]
    fn test_fully_degraded_input() {
        let report = RiskAggregator::default().aggregate(DuplicateFindings::default(), None, None, &[]);

        assert_eq!(report.risk_score, 0);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(report.reasons.is_empty());
        assert!(report.matches.is_empty());
    }

    #[test]
    fn test_median_rule_needs_five_amounts() {
        let aggregator = RiskAggregator::default();
        let few = history("Acme Corp", &[100.0, 100.0, 100.0, 100.0]);

        let report = aggregator.aggregate(DuplicateFindings::default(), Some(1000.0), Some("acme corp"), &few);
        assert_eq!(report.risk_score, 0);

        let enough = history("Acme Corp", &[100.0, 100.0, 100.0, 100.0, 100.0]);
        let report = aggregator.aggregate(DuplicateFindings::default(), Some(1000.0), Some("acme corp"), &enough);
        assert_eq!(report.risk_score, 25);
        assert_eq!(report.reasons, vec!["amount is 10.0x vendor median".to_string()]);
    }

    #[test]
    fn test_elevated_amount() {
        let past = history("Acme Corp", &[90.0, 100.0, 110.0, 95.0, 105.0]);

        let report = RiskAggregator::default().aggregate(DuplicateFindings::default(), Some(250.0), Some("acme corp"), &past);

        assert_eq!(report.risk_score, 10);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert_eq!(report.reasons, vec!["amount is 2.5x vendor median".to_string()]);
    }

    #[test]
    fn test_other_vendors_are_ignored() {
        let past = history("Globex", &[100.0, 100.0, 100.0, 100.0, 100.0]);

        let report = RiskAggregator::default().aggregate(DuplicateFindings::default(), Some(1000.0), Some("acme corp"), &past);

        assert_eq!(report.risk_score, 0);
    }

    #[test]
    fn test_all_rules_stay_bounded() {
        let past = history("Acme Corp", &[10.0, 10.0, 10.0, 10.0, 10.0]);

        let report = RiskAggregator::default().aggregate(exact_hit(), Some(1_000_000.0), Some("acme corp"), &past);

        assert_eq!(report.risk_score, 85);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert!(report.risk_score <= 100);
        assert!(report.reasons[0].starts_with("exact vendor+invoice_number match"));
        assert!(report.reasons[1].starts_with("amount is"));
    }

    #[test]
    fn test_score_clamps_at_100() {
        let findings = DuplicateFindings {
            contribution: 95,
            reasons: (0..7).map(|i| format!("reason {}", i)).collect(),
            matches: (0..4)
                .map(|id| DuplicateMatch {
                    id,
                    score: 0.5,
                    why: String::new(),
                })
                .collect(),
        };
        let past = history("Acme Corp", &[1.0, 1.0, 1.0, 1.0, 1.0]);

        let report = RiskAggregator::default().aggregate(findings, Some(50.0), Some("acme corp"), &past);

        assert_eq!(report.risk_score, 100);
        assert_eq!(report.reasons.len(), MAX_REASONS);
        assert_eq!(report.matches.len(), MAX_MATCHES);
    }

    #[test]
    fn test_upper_median() {
        assert_eq!(upper_median(vec![5.0, 1.0, 3.0, 2.0, 4.0], 5), Some(3.0));
        assert_eq!(upper_median(vec![4.0, 1.0, 3.0, 2.0, 6.0, 5.0], 5), Some(4.0));
        assert_eq!(upper_median(vec![1.0, 2.0], 5), None);
        assert_eq!(upper_median(Vec::new(), 0), None);
    }
}
