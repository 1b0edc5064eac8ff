//! Invoice data structures shared by the scorers and the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Fields extracted from a scanned invoice, before it has been persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFields {
    #[serde(default)]
    pub vendor_name: Option<String>,

    #[serde(default)]
    pub invoice_number: Option<String>,

    /// ISO-8601 date as extracted; compared textually
    #[serde(default)]
    pub invoice_date: Option<String>,

    /// Total amount. Malformed values deserialize to `None`
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<f64>,

    #[serde(default)]
    pub currency: Option<String>,

    /// Name of the scanned file the fields came from
    #[serde(default)]
    pub source_file: Option<String>,

    #[serde(default)]
    pub raw_text: String,
}

impl InvoiceFields {
    /// Create fields with the identifying triple set
    pub fn new(vendor_name: &str, invoice_number: &str, total_amount: f64) -> Self {
        Self {
            vendor_name: Some(vendor_name.to_string()),
            invoice_number: Some(invoice_number.to_string()),
            total_amount: Some(total_amount),
            ..Self::default()
        }
    }

    pub fn with_date(mut self, invoice_date: &str) -> Self {
        self.invoice_date = Some(invoice_date.to_string());
        self
    }

    pub fn with_raw_text(mut self, raw_text: &str) -> Self {
        self.raw_text = raw_text.to_string();
        self
    }
}

/// Output vector of the embedding collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceEmbedding {
    pub model_name: String,
    /// Unit-normalized vector
    pub vector: Vec<f32>,
}

/// A freshly parsed invoice as handed to the risk engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingInvoice {
    #[serde(flatten)]
    pub fields: InvoiceFields,

    #[serde(default)]
    pub embedding: Option<InvoiceEmbedding>,
}

impl IncomingInvoice {
    pub fn new(fields: InvoiceFields) -> Self {
        Self {
            fields,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, model_name: &str, vector: Vec<f32>) -> Self {
        self.embedding = Some(InvoiceEmbedding {
            model_name: model_name.to_string(),
            vector,
        });
        self
    }
}

/// A persisted invoice. Immutable once written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Auto-incrementing identifier assigned by the store
    pub id: i64,
    pub vendor_name: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub source_file: Option<String>,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
}

impl InvoiceRecord {
    /// Materialize a record from extracted fields and a store-assigned id
    pub fn from_fields(id: i64, fields: &InvoiceFields, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            vendor_name: fields.vendor_name.clone(),
            invoice_number: fields.invoice_number.clone(),
            invoice_date: fields.invoice_date.clone(),
            total_amount: fields.total_amount.filter(|a| a.is_finite()),
            currency: fields.currency.clone(),
            source_file: fields.source_file.clone(),
            raw_text: fields.raw_text.clone(),
            created_at,
        }
    }
}

/// Stored embedding keyed by `(invoice_id, model_name)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub invoice_id: i64,
    pub model_name: String,
    pub dim: usize,
    pub vector: Vec<f32>,
}

impl EmbeddingEntry {
    pub fn new(invoice_id: i64, model_name: &str, vector: Vec<f32>) -> Self {
        Self {
            invoice_id,
            model_name: model_name.to_string(),
            dim: vector.len(),
            vector,
        }
    }
}

/// Accepts a JSON number or a numeric string; anything else becomes `None`.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| coerce_amount(&v)))
}

/// Coerce an arbitrary JSON value to a finite amount
pub fn coerce_amount(value: &serde_json::Value) -> Option<f64> {
    let amount = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    amount.filter(|a| a.is_finite())
}
