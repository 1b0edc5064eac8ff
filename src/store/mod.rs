//! Persistence contract for invoices, embeddings and vendor baselines

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::scoring::vendor_stats::{VendorObservation, VendorStats};
use crate::types::{EmbeddingEntry, InvoiceEmbedding, InvoiceFields, InvoiceRecord};
use std::sync::Arc;
use tracing::info;

/// Read-only view of history taken before an invoice is scored
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    /// All invoices, ordered by id
    pub invoices: Vec<InvoiceRecord>,
    /// Embeddings of the active model
    pub embeddings: Vec<EmbeddingEntry>,
    /// Baseline of the new invoice's vendor
    pub vendor_stats: Option<VendorStats>,
}

/// Storage backend for scoring state.
///
/// `snapshot` must be consistent: all three parts reflect the same committed
/// state. `commit_invoice` is atomic: the invoice, its embedding and its vendor
/// baseline update become visible together or not at all.
/// `update_vendor_stats` must be an atomic read-modify-write per vendor key.
pub trait InvoiceStore: Send + Sync {
    /// History, embeddings for `model_name` and the baseline for `vendor_key`
    fn snapshot(&self, vendor_key: Option<&str>, model_name: &str) -> Result<HistorySnapshot>;

    /// All invoices, ordered by id
    fn invoices(&self) -> Result<Vec<InvoiceRecord>>;

    /// Persist a new invoice, assign its id, upsert its embedding and fold
    /// `observation` into the vendor baseline in one commit
    fn commit_invoice(
        &self,
        fields: &InvoiceFields,
        embedding: Option<&InvoiceEmbedding>,
        observation: Option<&VendorObservation>,
    ) -> Result<InvoiceRecord>;

    /// Insert or replace the embedding keyed by `(invoice_id, model_name)`
    fn upsert_embedding(&self, entry: &EmbeddingEntry) -> Result<()>;

    fn embeddings(&self, model_name: &str) -> Result<Vec<EmbeddingEntry>>;

    fn vendor_stats(&self, vendor_key: &str) -> Result<Option<VendorStats>>;

    /// Fold `amount` into the vendor's baseline and return the result
    fn update_vendor_stats(&self, vendor_key: &str, amount: f64) -> Result<VendorStats>;

    fn backend_name(&self) -> &'static str;
}

/// Open the backend selected in configuration
pub fn open(config: &StoreConfig) -> Result<Arc<dyn InvoiceStore>> {
    let store: Arc<dyn InvoiceStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.path)?),
    };

    info!(backend = store.backend_name(), path = %config.path, "Invoice store opened");
    Ok(store)
}
