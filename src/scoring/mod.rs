//! Risk scoring components

pub mod aggregator;
pub mod anomaly;
pub mod duplicate;
pub mod similarity;
pub mod vendor_stats;

pub use aggregator::RiskAggregator;
pub use anomaly::AnomalyScorer;
pub use duplicate::{DuplicateDetector, DuplicateFindings};
pub use similarity::{ExhaustiveIndex, NeighborIndex, SimilarityReport, SimilaritySearch};
pub use vendor_stats::{VendorObservation, VendorStats, VendorStatsTracker};
