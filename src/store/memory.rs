//! In-process store, used for tests and ephemeral batch runs

use super::{HistorySnapshot, InvoiceStore};
use crate::error::Result;
use crate::scoring::vendor_stats::{welford_step, VendorObservation, VendorStats};
use crate::types::{EmbeddingEntry, InvoiceEmbedding, InvoiceFields, InvoiceRecord};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: i64,
    invoices: Vec<InvoiceRecord>,
    /// Keyed by `(model_name, invoice_id)` so a model's entries iterate in id order
    embeddings: BTreeMap<(String, i64), EmbeddingEntry>,
    vendor_stats: HashMap<String, VendorStats>,
}

impl Inner {
    fn upsert(&mut self, entry: EmbeddingEntry) {
        self.embeddings
            .insert((entry.model_name.clone(), entry.invoice_id), entry);
    }

    fn observe(&mut self, vendor_key: &str, amount: f64) -> VendorStats {
        let updated = welford_step(self.vendor_stats.get(vendor_key), vendor_key, amount);
        self.vendor_stats
            .insert(vendor_key.to_string(), updated.clone());
        updated
    }
}

/// Store holding everything behind one `RwLock`.
///
/// Writers take the write lock, which serializes vendor stat updates and makes
/// each commit atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvoiceStore for MemoryStore {
    fn snapshot(&self, vendor_key: Option<&str>, model_name: &str) -> Result<HistorySnapshot> {
        let inner = self.inner.read()?;

        Ok(HistorySnapshot {
            invoices: inner.invoices.clone(),
            embeddings: model_embeddings(&inner, model_name),
            vendor_stats: vendor_key.and_then(|key| inner.vendor_stats.get(key).cloned()),
        })
    }

    fn invoices(&self) -> Result<Vec<InvoiceRecord>> {
        Ok(self.inner.read()?.invoices.clone())
    }

    fn commit_invoice(
        &self,
        fields: &InvoiceFields,
        embedding: Option<&InvoiceEmbedding>,
        observation: Option<&VendorObservation>,
    ) -> Result<InvoiceRecord> {
        let mut inner = self.inner.write()?;
        inner.next_id += 1;

        let record = InvoiceRecord::from_fields(inner.next_id, fields, Utc::now());
        inner.invoices.push(record.clone());

        if let Some(embedding) = embedding {
            inner.upsert(EmbeddingEntry::new(
                record.id,
                &embedding.model_name,
                embedding.vector.clone(),
            ));
        }
        if let Some(obs) = observation {
            inner.observe(&obs.vendor_key, obs.amount);
        }
        Ok(record)
    }

    fn upsert_embedding(&self, entry: &EmbeddingEntry) -> Result<()> {
        self.inner.write()?.upsert(entry.clone());
        Ok(())
    }

    fn embeddings(&self, model_name: &str) -> Result<Vec<EmbeddingEntry>> {
        let inner = self.inner.read()?;
        Ok(model_embeddings(&inner, model_name))
    }

    fn vendor_stats(&self, vendor_key: &str) -> Result<Option<VendorStats>> {
        Ok(self.inner.read()?.vendor_stats.get(vendor_key).cloned())
    }

    fn update_vendor_stats(&self, vendor_key: &str, amount: f64) -> Result<VendorStats> {
        Ok(self.inner.write()?.observe(vendor_key, amount))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn model_embeddings(inner: &Inner, model_name: &str) -> Vec<EmbeddingEntry> {
    inner
        .embeddings
        .iter()
        .filter(|((model, _), _)| model == model_name)
        .map(|(_, entry)| entry.clone())
        .collect()
}
