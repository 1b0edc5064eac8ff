//! Per-invoice risk engine
//!
//! Scores an incoming invoice against a consistent snapshot of history, then
//! commits it. Scoring never sees the invoice being scored.

use crate::config::{AppConfig, SimilarityStrategy};
use crate::error::Result;
use crate::feature_extractor::InvoiceFeatures;
use crate::metrics::PipelineMetrics;
use crate::scoring::{
    AnomalyScorer, DuplicateDetector, RiskAggregator, SimilarityReport, SimilaritySearch,
    VendorStatsTracker,
};
use crate::store::{HistorySnapshot, InvoiceStore};
use crate::types::report::{ExtractedSummary, MlSignals};
use crate::types::{IncomingInvoice, InvoiceAssessment, InvoiceEmbedding, RiskReport};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Currency reported when none was extracted
pub const DEFAULT_CURRENCY: &str = "USD";

/// Scores computed before the invoice is committed
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub risk: RiskReport,
    pub ml: MlSignals,
}

/// Orchestrates duplicate, anomaly and similarity scoring for one invoice at a time.
///
/// The engine is shared across workers; all mutable state lives in the store.
pub struct RiskEngine {
    store: Arc<dyn InvoiceStore>,
    tracker: VendorStatsTracker,
    duplicates: DuplicateDetector,
    anomaly: AnomalyScorer,
    /// `None` when the similarity strategy is disabled
    similarity: Option<SimilaritySearch>,
    aggregator: RiskAggregator,
    default_model: String,
    review_threshold: u8,
    metrics: Arc<PipelineMetrics>,
}

impl RiskEngine {
    /// Create a new engine from configuration
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn InvoiceStore>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let similarity = match config.similarity.strategy {
            SimilarityStrategy::Exhaustive => Some(SimilaritySearch::exhaustive()),
            SimilarityStrategy::Disabled => None,
        };

        info!(
            backend = store.backend_name(),
            strategy = ?config.similarity.strategy,
            model = %config.similarity.model_name,
            review_threshold = config.detection.review_threshold,
            "Risk engine initialized"
        );

        Self {
            tracker: VendorStatsTracker::new(store.clone()),
            store,
            duplicates: DuplicateDetector::new(),
            anomaly: AnomalyScorer::new(),
            similarity,
            aggregator: RiskAggregator::new(config.detection.risk_levels.clone()),
            default_model: config.similarity.model_name.clone(),
            review_threshold: config.detection.review_threshold,
            metrics,
        }
    }

    /// Name of the active similarity index, if any
    pub fn similarity_strategy(&self) -> Option<&'static str> {
        self.similarity.as_ref().map(SimilaritySearch::index_name)
    }

    /// Score an invoice against history, then persist it, its embedding and its
    /// vendor baseline update in one commit.
    ///
    /// Only store failures are returned as errors.
    pub fn assess(&self, incoming: IncomingInvoice) -> Result<InvoiceAssessment> {
        let start = Instant::now();
        let IncomingInvoice { fields, embedding } = incoming;
        let embedding = embedding.filter(|e| !e.vector.is_empty());

        let features = InvoiceFeatures::from(&fields);
        let model_name = embedding
            .as_ref()
            .map(|e| e.model_name.as_str())
            .unwrap_or(self.default_model.as_str());

        let snapshot = self.store.snapshot(features.vendor.as_deref(), model_name)?;
        let evaluation = self.evaluate(&features, embedding.as_ref(), &snapshot);

        let record = self.tracker.commit(&fields, embedding.as_ref())?;

        let Evaluation { risk, ml } = evaluation;
        let processing_time = start.elapsed();
        self.metrics.record_assessment(processing_time, risk.risk_score);

        if risk.risk_score >= self.review_threshold {
            self.metrics.record_flag(risk.risk_level);
            info!(
                invoice_id = record.id,
                risk_score = risk.risk_score,
                risk_level = risk.risk_level.as_str(),
                duplicate_probability = ml.duplicate_probability,
                reasons = ?risk.reasons,
                "Invoice flagged for review"
            );
        } else {
            debug!(
                invoice_id = record.id,
                risk_score = risk.risk_score,
                latency_us = processing_time.as_micros() as u64,
                "Invoice assessed"
            );
        }

        let extracted = ExtractedSummary {
            vendor_name: fields.vendor_name,
            invoice_number: fields.invoice_number,
            invoice_date: fields.invoice_date,
            total_amount: fields.total_amount,
            currency: fields
                .currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            source_file: fields.source_file,
        };

        Ok(InvoiceAssessment::new(record.id, extracted, risk, ml))
    }

    /// Score an invoice against a snapshot without touching the store
    pub fn evaluate(
        &self,
        features: &InvoiceFeatures,
        embedding: Option<&InvoiceEmbedding>,
        snapshot: &HistorySnapshot,
    ) -> Evaluation {
        let stage = Instant::now();
        let duplicates = self.duplicates.detect(features, &snapshot.invoices);
        self.metrics.record_stage_time("duplicates", stage.elapsed());
        if duplicates.is_duplicate() {
            debug!(matches = ?duplicates.matches, "Duplicate evidence found");
        }

        let stage = Instant::now();
        let amount_anomaly = self
            .anomaly
            .score(features.amount, snapshot.vendor_stats.as_ref());
        self.metrics.record_stage_time("anomaly", stage.elapsed());

        let similar = match (&self.similarity, embedding) {
            (Some(search), Some(embedding)) => {
                let stage = Instant::now();
                let report =
                    search.search(&embedding.vector, &snapshot.embeddings, &snapshot.invoices);
                self.metrics.record_stage_time("similarity", stage.elapsed());
                self.metrics
                    .record_dimension_mismatches(report.dimension_mismatches);
                report
            }
            _ => SimilarityReport::default(),
        };

        let risk = self.aggregator.aggregate(
            duplicates,
            features.amount,
            features.vendor.as_deref(),
            &snapshot.invoices,
        );

        Evaluation {
            risk,
            ml: MlSignals {
                duplicate_probability: similar.duplicate_probability,
                nearest_neighbors: similar.neighbors,
                amount_anomaly,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{AnomalyLevel, InvoiceFields, RiskLevel};

    fn engine_with(config: &AppConfig) -> (RiskEngine, Arc<dyn InvoiceStore>) {
        let store: Arc<dyn InvoiceStore> = Arc::new(MemoryStore::new());
        let engine = RiskEngine::new(config, store.clone(), Arc::new(PipelineMetrics::new()));
        (engine, store)
    }

    #[test]
    fn test_first_invoice_is_clean() {
        let (engine, store) = engine_with(&AppConfig::default());

        let incoming = IncomingInvoice::new(InvoiceFields::new("Acme Corp", "INV-1", 100.0));
        let assessment = engine.assess(incoming).unwrap();

        assert_eq!(assessment.invoice_id, 1);
        assert_eq!(assessment.risk.risk_score, 0);
        assert_eq!(assessment.risk.risk_level, RiskLevel::Low);
        assert_eq!(assessment.ml.amount_anomaly.level, AnomalyLevel::Unknown);
        assert_eq!(assessment.extracted.currency, DEFAULT_CURRENCY);
        assert_eq!(store.vendor_stats("acme corp").unwrap().unwrap().n, 1);
    }

    #[test]
    fn test_evaluate_does_not_persist() {
        let (engine, store) = engine_with(&AppConfig::default());
        let features = InvoiceFeatures::from(&InvoiceFields::new("Acme", "INV-1", 10.0));

        let evaluation = engine.evaluate(&features, None, &HistorySnapshot::default());

        assert_eq!(evaluation.risk.risk_score, 0);
        assert!(evaluation.ml.nearest_neighbors.is_empty());
        assert!(store.invoices().unwrap().is_empty());
    }

    #[test]
    fn test_embedding_is_stored_under_its_model() {
        let (engine, store) = engine_with(&AppConfig::default());

        let incoming = IncomingInvoice::new(InvoiceFields::new("Acme", "INV-1", 10.0))
            .with_embedding("custom-model", vec![1.0, 0.0]);
        engine.assess(incoming).unwrap();

        assert_eq!(store.embeddings("custom-model").unwrap().len(), 1);
        assert!(store.embeddings(&AppConfig::default().similarity.model_name).unwrap().is_empty());
    }

    #[test]
    fn test_disabled_strategy_skips_search() {
        let mut config = AppConfig::default();
        config.similarity.strategy = SimilarityStrategy::Disabled;
        let (engine, store) = engine_with(&config);
        assert!(engine.similarity_strategy().is_none());

        for number in ["INV-1", "INV-2"] {
            let incoming = IncomingInvoice::new(InvoiceFields::new("Acme", number, 10.0))
                .with_embedding("mini", vec![1.0, 0.0]);
            let assessment = engine.assess(incoming).unwrap();
            assert!(assessment.ml.nearest_neighbors.is_empty());
            assert_eq!(assessment.ml.duplicate_probability, 0.0);
        }

        assert_eq!(store.embeddings("mini").unwrap().len(), 2);
    }
}
