//! Risk verdict data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Determine risk level from score and thresholds
    pub fn from_score(score: u8, thresholds: &RiskLevelThresholds) -> Self {
        if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Configurable risk level thresholds (inclusive lower bounds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub medium: u8,
    pub high: u8,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 30,
            high: 70,
        }
    }
}

/// Evidence that a prior invoice is a duplicate of the new one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Id of the matching historical invoice
    pub id: i64,
    /// Match confidence (0.0 - 1.0)
    pub score: f64,
    /// Which sub-conditions held
    pub why: String,
}

/// Rule-based risk verdict for one invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    /// Bounded risk score (0 - 100)
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    /// Reasons in the order the rules fired
    pub reasons: Vec<String>,
    pub matches: Vec<DuplicateMatch>,
}

/// Z-score anomaly level. `Unknown` when there is no usable baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnomalyLevel {
    Unknown,
    Low,
    Medium,
    High,
}

/// Explainable amount anomaly against the vendor's running baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    /// Anomaly score (0.0 - 1.0)
    pub score: f64,
    pub level: AnomalyLevel,
    pub reason: String,
}

/// A semantically similar historical invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEvidence {
    pub invoice_id: i64,
    /// Cosine similarity (-1.0 - 1.0)
    pub similarity: f64,
    pub vendor_name: Option<String>,
    pub invoice_number: Option<String>,
    pub total_amount: Option<f64>,
    pub invoice_date: Option<String>,
}

/// Independent statistical and semantic signals, reported beside the risk score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlSignals {
    pub duplicate_probability: f64,
    pub nearest_neighbors: Vec<NeighborEvidence>,
    pub amount_anomaly: AnomalyReport,
}

/// Fields echoed back for the reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSummary {
    pub vendor_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<f64>,
    pub currency: String,
    pub source_file: Option<String>,
}

/// Complete assessment of one invoice, produced after it was committed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceAssessment {
    /// Unique assessment identifier
    pub assessment_id: String,

    /// Id assigned to the invoice by the store
    pub invoice_id: i64,

    pub assessed_at: DateTime<Utc>,

    pub extracted: ExtractedSummary,

    pub risk: RiskReport,

    pub ml: MlSignals,
}

impl InvoiceAssessment {
    /// Create a new assessment
    pub fn new(invoice_id: i64, extracted: ExtractedSummary, risk: RiskReport, ml: MlSignals) -> Self {
        Self {
            assessment_id: uuid::Uuid::new_v4().to_string(),
            invoice_id,
            assessed_at: Utc::now(),
            extracted,
            risk,
            ml,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_from_score() {
        let thresholds = RiskLevelThresholds::default();

        assert_eq!(RiskLevel::from_score(0, &thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(29, &thresholds), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(30, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(69, &thresholds), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70, &thresholds), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100, &thresholds), RiskLevel::High);
    }

    #[test]
    fn test_levels_serialize_uppercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(serde_json::to_string(&AnomalyLevel::Unknown).unwrap(), "\"UNKNOWN\"");
    }

    #[test]
    fn test_assessment_serialization() {
        let assessment = InvoiceAssessment::new(
            7,
            ExtractedSummary {
                vendor_name: Some("Acme Corp".to_string()),
                invoice_number: Some("INV-100".to_string()),
                invoice_date: None,
                total_amount: Some(100.0),
                currency: "USD".to_string(),
                source_file: None,
            },
            RiskReport {
                risk_score: 60,
                risk_level: RiskLevel::Medium,
                reasons: vec!["exact vendor+invoice_number match".to_string()],
                matches: vec![DuplicateMatch {
                    id: 3,
                    score: 0.99,
                    why: "exact vendor+invoice_number match".to_string(),
                }],
            },
            MlSignals {
                duplicate_probability: 0.0,
                nearest_neighbors: Vec::new(),
                amount_anomaly: AnomalyReport {
                    score: 0.0,
                    level: AnomalyLevel::Unknown,
                    reason: "no amount/stats available".to_string(),
                },
            },
        );

        let json = serde_json::to_value(&assessment).unwrap();

        assert_eq!(json["invoice_id"], 7);
        assert_eq!(json["risk"]["risk_level"], "MEDIUM");
        assert_eq!(json["ml"]["amount_anomaly"]["level"], "UNKNOWN");

        let deserialized: InvoiceAssessment = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized.assessment_id, assessment.assessment_id);
        assert_eq!(deserialized.risk.matches, assessment.risk.matches);
    }
}
