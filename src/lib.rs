//! Invoice Guard Library
//!
//! Risk scoring and anomaly detection for accounts-payable invoices: duplicate
//! detection, per-vendor amount baselines and embedding similarity, combined
//! into an explainable risk report.

pub mod config;
pub mod engine;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod scoring;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use engine::RiskEngine;
pub use error::{Result, StoreError};
pub use feature_extractor::InvoiceFeatures;
pub use store::{InvoiceStore, MemoryStore, SqliteStore};
pub use types::{IncomingInvoice, InvoiceAssessment, InvoiceFields};
