//! Z-score amount anomaly against the vendor's running baseline

use crate::scoring::vendor_stats::VendorStats;
use crate::types::{AnomalyLevel, AnomalyReport};

/// z at or above this is HIGH
pub const HIGH_Z: f64 = 4.0;
/// z at or above this is MEDIUM
pub const MEDIUM_Z: f64 = 2.5;
/// z that saturates the score at 1.0
const SATURATION_Z: f64 = 6.0;

/// Classifies an invoice amount by its distance from the vendor mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyScorer;

impl AnomalyScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score an amount against a baseline. Never fails; thin data yields `Unknown`.
    pub fn score(&self, amount: Option<f64>, stats: Option<&VendorStats>) -> AnomalyReport {
        let (amount, stats) = match (amount.filter(|a| a.is_finite()), stats) {
            (Some(amount), Some(stats)) => (amount, stats),
            _ => return unknown("no amount/stats available".to_string()),
        };

        let std = stats.std();
        if stats.n < 2 || std == 0.0 || !std.is_finite() {
            return unknown(format!("insufficient vendor history (n={})", stats.n));
        }

        let z = (amount - stats.mean).abs() / std;
        let level = if z >= HIGH_Z {
            AnomalyLevel::High
        } else if z >= MEDIUM_Z {
            AnomalyLevel::Medium
        } else {
            AnomalyLevel::Low
        };

        AnomalyReport {
            score: (z / SATURATION_Z).min(1.0),
            level,
            reason: format!(
                "amount z-score={:.2} vs vendor mean={:.2}, std={:.2} (n={})",
                z, stats.mean, std, stats.n
            ),
        }
    }
}

fn unknown(reason: String) -> AnomalyReport {
    AnomalyReport {
        score: 0.0,
        level: AnomalyLevel::Unknown,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Baseline with mean 100 and std exactly 2
    fn baseline() -> VendorStats {
        VendorStats {
            vendor_name: "acme corp".to_string(),
            n: 2,
            mean: 100.0,
            m2: 4.0,
        }
    }

    #[test]
    fn test_missing_inputs_are_unknown() {
        let scorer = AnomalyScorer::new();

        let report = scorer.score(None, Some(&baseline()));
        assert_eq!(report.level, AnomalyLevel::Unknown);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.reason, "no amount/stats available");

        let report = scorer.score(Some(100.0), None);
        assert_eq!(report.level, AnomalyLevel::Unknown);
    }

    #[test]
    fn test_insufficient_history() {
        let scorer = AnomalyScorer::new();

        let single = VendorStats::first("acme corp", 100.0);
        let report = scorer.score(Some(500.0), Some(&single));
        assert_eq!(report.level, AnomalyLevel::Unknown);
        assert_eq!(report.reason, "insufficient vendor history (n=1)");

        let flat = VendorStats {
            n: 5,
            m2: 0.0,
            ..baseline()
        };
        let report = scorer.score(Some(500.0), Some(&flat));
        assert_eq!(report.level, AnomalyLevel::Unknown);
        assert_eq!(report.reason, "insufficient vendor history (n=5)");
    }

    #[test]
    fn test_boundaries_close_upward() {
        let scorer = AnomalyScorer::new();
        let stats = baseline();

        assert_eq!(scorer.score(Some(104.9), Some(&stats)).level, AnomalyLevel::Low);
        assert_eq!(scorer.score(Some(105.0), Some(&stats)).level, AnomalyLevel::Medium);
        assert_eq!(scorer.score(Some(107.9), Some(&stats)).level, AnomalyLevel::Medium);
        assert_eq!(scorer.score(Some(108.0), Some(&stats)).level, AnomalyLevel::High);
        // Below the mean counts the same
        assert_eq!(scorer.score(Some(92.0), Some(&stats)).level, AnomalyLevel::High);
    }

    #[test]
    fn test_score_saturates() {
        let scorer = AnomalyScorer::new();
        let stats = baseline();

        let report = scorer.score(Some(106.0), Some(&stats));
        assert!((report.score - 0.5).abs() < 1e-12);

        let report = scorer.score(Some(1_000.0), Some(&stats));
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn test_reason_is_auditable() {
        let scorer = AnomalyScorer::new();
        let report = scorer.score(Some(105.0), Some(&baseline()));

        assert_eq!(
            report.reason,
            "amount z-score=2.50 vs vendor mean=100.00, std=2.00 (n=2)"
        );
    }
}
