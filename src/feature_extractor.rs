//! Normalized comparison features for invoices.
//!
//! Duplicate matching, the median-ratio rule and the vendor baselines all key on
//! the same normalized view of an invoice. Empty values after normalization are
//! treated as missing so they never produce a match.

use crate::types::{InvoiceFields, InvoiceRecord};

/// Normalized features of one invoice, as compared across history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceFeatures {
    /// Trimmed, lowercased vendor name
    pub vendor: Option<String>,
    /// Trimmed, lowercased invoice number
    pub invoice_number: Option<String>,
    /// Trimmed invoice date, compared textually
    pub invoice_date: Option<String>,
    /// Finite total amount
    pub amount: Option<f64>,
}

impl InvoiceFeatures {
    pub fn new(
        vendor: Option<&str>,
        invoice_number: Option<&str>,
        invoice_date: Option<&str>,
        amount: Option<f64>,
    ) -> Self {
        Self {
            vendor: vendor.and_then(normalize_key),
            invoice_number: invoice_number.and_then(normalize_key),
            invoice_date: invoice_date
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            amount: amount.filter(|a| a.is_finite()),
        }
    }
}

impl From<&InvoiceFields> for InvoiceFeatures {
    fn from(fields: &InvoiceFields) -> Self {
        Self::new(
            fields.vendor_name.as_deref(),
            fields.invoice_number.as_deref(),
            fields.invoice_date.as_deref(),
            fields.total_amount,
        )
    }
}

impl From<&InvoiceRecord> for InvoiceFeatures {
    fn from(record: &InvoiceRecord) -> Self {
        Self::new(
            record.vendor_name.as_deref(),
            record.invoice_number.as_deref(),
            record.invoice_date.as_deref(),
            record.total_amount,
        )
    }
}

/// Trim and lowercase a vendor name or invoice number. Blank input is `None`.
pub fn normalize_key(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_normalization() {
        let fields = InvoiceFields::new("  Acme Corp ", " INV-100", 120.0).with_date(" 2024-03-01 ");
        let features = InvoiceFeatures::from(&fields);

        assert_eq!(features.vendor.as_deref(), Some("acme corp"));
        assert_eq!(features.invoice_number.as_deref(), Some("inv-100"));
        assert_eq!(features.invoice_date.as_deref(), Some("2024-03-01"));
        assert_eq!(features.amount, Some(120.0));
    }

    #[test]
    fn test_blank_fields_are_missing() {
        let fields = InvoiceFields {
            vendor_name: Some("   ".to_string()),
            invoice_number: Some(String::new()),
            invoice_date: Some(" ".to_string()),
            total_amount: Some(f64::NAN),
            ..InvoiceFields::default()
        };
        let features = InvoiceFeatures::from(&fields);

        assert_eq!(features, InvoiceFeatures::default());
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("ACME"), Some("acme".to_string()));
        assert_eq!(normalize_key("\t"), None);
    }
}
