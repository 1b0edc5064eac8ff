//! Type definitions for invoice risk scoring

pub mod invoice;
pub mod report;

pub use invoice::{EmbeddingEntry, IncomingInvoice, InvoiceEmbedding, InvoiceFields, InvoiceRecord};
pub use report::{
    AnomalyLevel, AnomalyReport, DuplicateMatch, InvoiceAssessment, NeighborEvidence, RiskLevel,
    RiskReport,
};
