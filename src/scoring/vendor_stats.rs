//! Streaming per-vendor amount baselines (Welford's online algorithm)

use crate::error::Result;
use crate::feature_extractor::normalize_key;
use crate::store::InvoiceStore;
use crate::types::{InvoiceEmbedding, InvoiceFields, InvoiceRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Running amount statistics for one vendor.
///
/// Only `(n, mean, m2)` are stored. `m2` is the sum of squared deviations from the
/// current mean, never a variance; `variance` and `std` are derived on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorStats {
    /// Normalized vendor name
    pub vendor_name: String,
    pub n: u64,
    pub mean: f64,
    pub m2: f64,
}

impl VendorStats {
    /// Baseline seeded by the first observed amount
    pub fn first(vendor_name: &str, x: f64) -> Self {
        Self {
            vendor_name: vendor_name.to_string(),
            n: 1,
            mean: x,
            m2: 0.0,
        }
    }

    /// Fold one more amount into the baseline.
    pub fn observe(&self, x: f64) -> Self {
        let n = self.n + 1;
        let delta = x - self.mean;
        let mean = self.mean + delta / n as f64;
        let delta2 = x - mean;

        Self {
            vendor_name: self.vendor_name.clone(),
            n,
            mean,
            m2: self.m2 + delta * delta2,
        }
    }

    /// Sample variance (divisor `n - 1`); zero below two samples
    pub fn variance(&self) -> f64 {
        if self.n >= 2 {
            (self.m2 / (self.n - 1) as f64).max(0.0)
        } else {
            0.0
        }
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Apply one observation to an optional existing baseline.
pub fn welford_step(current: Option<&VendorStats>, vendor_name: &str, x: f64) -> VendorStats {
    match current {
        Some(stats) => stats.observe(x),
        None => VendorStats::first(vendor_name, x),
    }
}

/// One amount to fold into a vendor baseline, keyed by normalized vendor name
#[derive(Debug, Clone, PartialEq)]
pub struct VendorObservation {
    pub vendor_key: String,
    pub amount: f64,
}

impl VendorObservation {
    /// `None` for a blank vendor name or a non-finite amount
    pub fn new(vendor: &str, amount: f64) -> Option<Self> {
        let vendor_key = normalize_key(vendor)?;
        amount.is_finite().then_some(Self { vendor_key, amount })
    }
}

/// Reads and updates vendor baselines held by the store.
///
/// Vendor names are normalized before keying. Updates are serialized per vendor
/// by the store backend.
#[derive(Clone)]
pub struct VendorStatsTracker {
    store: Arc<dyn InvoiceStore>,
}

impl VendorStatsTracker {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    /// Current baseline for a vendor, if any amount has been observed
    pub fn read(&self, vendor: &str) -> Result<Option<VendorStats>> {
        match normalize_key(vendor) {
            Some(key) => self.store.vendor_stats(&key),
            None => Ok(None),
        }
    }

    /// Record a committed invoice amount and return the new baseline.
    ///
    /// Returns `None` for a blank vendor name or a non-finite amount.
    pub fn update(&self, vendor: &str, amount: f64) -> Result<Option<VendorStats>> {
        match VendorObservation::new(vendor, amount) {
            Some(obs) => self.store.update_vendor_stats(&obs.vendor_key, obs.amount).map(Some),
            None => Ok(None),
        }
    }

    /// Persist an invoice with its embedding and fold its amount into the vendor
    /// baseline as a single store commit.
    pub fn commit(
        &self,
        fields: &InvoiceFields,
        embedding: Option<&InvoiceEmbedding>,
    ) -> Result<InvoiceRecord> {
        let observation = match (fields.vendor_name.as_deref(), fields.total_amount) {
            (Some(vendor), Some(amount)) => VendorObservation::new(vendor, amount),
            _ => None,
        };
        self.store
            .commit_invoice(fields, embedding, observation.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn feed(amounts: &[f64]) -> VendorStats {
        let mut stats: Option<VendorStats> = None;
        for &x in amounts {
            stats = Some(welford_step(stats.as_ref(), "acme corp", x));
        }
        stats.unwrap()
    }

    #[test]
    fn test_constant_amounts_have_zero_std() {
        let stats = feed(&[100.0, 100.0, 100.0, 100.0, 100.0]);

        assert_eq!(stats.n, 5);
        assert_eq!(stats.mean, 100.0);
        assert_eq!(stats.m2, 0.0);
        assert_eq!(stats.std(), 0.0);
    }

    #[test]
    fn test_sample_standard_deviation() {
        let stats = feed(&[10.0, 20.0, 30.0, 40.0, 50.0]);

        assert_eq!(stats.n, 5);
        assert!((stats.mean - 30.0).abs() < 1e-12);
        assert!((stats.m2 - 1000.0).abs() < 1e-9);
        assert!((stats.std() - 15.811).abs() < 0.001);
    }

    #[test]
    fn test_first_observation() {
        let stats = VendorStats::first("acme corp", 42.0);

        assert_eq!(stats.n, 1);
        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.m2, 0.0);
        assert_eq!(stats.std(), 0.0);
    }

    #[test]
    fn test_large_magnitude_stability() {
        // Naive sum-of-squares loses the variance entirely at this offset
        let base = 1.0e9;
        let stats = feed(&[base + 4.0, base + 7.0, base + 13.0, base + 16.0]);

        assert!((stats.mean - (base + 10.0)).abs() < 1e-6);
        assert!((stats.variance() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_tracker_normalizes_vendor_key() {
        let store: Arc<dyn InvoiceStore> = Arc::new(MemoryStore::new());
        let tracker = VendorStatsTracker::new(store);

        tracker.update("  ACME Corp", 10.0).unwrap();
        tracker.update("acme corp ", 20.0).unwrap();

        let stats = tracker.read("Acme Corp").unwrap().unwrap();
        assert_eq!(stats.vendor_name, "acme corp");
        assert_eq!(stats.n, 2);
        assert_eq!(stats.mean, 15.0);
    }

    #[test]
    fn test_tracker_ignores_unusable_input() {
        let store: Arc<dyn InvoiceStore> = Arc::new(MemoryStore::new());
        let tracker = VendorStatsTracker::new(store);

        assert!(tracker.update("   ", 10.0).unwrap().is_none());
        assert!(tracker.update("acme", f64::INFINITY).unwrap().is_none());
        assert!(tracker.read("acme").unwrap().is_none());
    }

    #[test]
    fn test_commit_folds_amount_into_baseline() {
        let store: Arc<dyn InvoiceStore> = Arc::new(MemoryStore::new());
        let tracker = VendorStatsTracker::new(store.clone());

        let record = tracker
            .commit(&InvoiceFields::new(" Acme Corp", "INV-1", 40.0), None)
            .unwrap();
        tracker.commit(&InvoiceFields::default(), None).unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(store.invoices().unwrap().len(), 2);
        let stats = tracker.read("acme corp").unwrap().unwrap();
        assert_eq!(stats.n, 1);
        assert_eq!(stats.mean, 40.0);
    }

    #[test]
    fn test_observation_rejects_unusable_input() {
        assert!(VendorObservation::new("  ", 1.0).is_none());
        assert!(VendorObservation::new("acme", f64::NAN).is_none());
        assert_eq!(
            VendorObservation::new(" ACME ", 2.5),
            Some(VendorObservation { vendor_key: "acme".to_string(), amount: 2.5 })
        );
    }
}
