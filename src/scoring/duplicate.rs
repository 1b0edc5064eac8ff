//! Exact and fuzzy duplicate detection against invoice history

use crate::feature_extractor::InvoiceFeatures;
use crate::types::{DuplicateMatch, InvoiceRecord};

/// Points added for an exact vendor + invoice number match
pub const EXACT_POINTS: u32 = 60;
/// Points added for a fuzzy match
pub const FUZZY_POINTS: u32 = 45;
/// Confidence reported for an exact match
pub const EXACT_CONFIDENCE: f64 = 0.99;

const EXACT_WHY: &str = "exact vendor+invoice_number match";
const INVOICE_SIM_MIN: f64 = 0.85;
const VENDOR_SIM_MIN: f64 = 0.80;
const AMOUNT_TOLERANCE_FLOOR: f64 = 1.0;
const AMOUNT_TOLERANCE_RATIO: f64 = 0.01;

/// Outcome of a duplicate scan. At most one match fires.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuplicateFindings {
    pub contribution: u32,
    pub reasons: Vec<String>,
    pub matches: Vec<DuplicateMatch>,
}

impl DuplicateFindings {
    pub fn is_duplicate(&self) -> bool {
        self.contribution > 0
    }
}

/// Scans history for resubmitted invoices.
///
/// An exact pass runs first; the fuzzy pass only runs when it found nothing.
/// Both stop at the first qualifying record in stored order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, new: &InvoiceFeatures, history: &[InvoiceRecord]) -> DuplicateFindings {
        if let Some(found) = self.exact_pass(new, history) {
            return found;
        }
        self.fuzzy_pass(new, history).unwrap_or_default()
    }

    fn exact_pass(&self, new: &InvoiceFeatures, history: &[InvoiceRecord]) -> Option<DuplicateFindings> {
        let (vendor, number) = (new.vendor.as_deref()?, new.invoice_number.as_deref()?);

        let old = history.iter().find(|old| {
            let old = InvoiceFeatures::from(*old);
            old.vendor.as_deref() == Some(vendor) && old.invoice_number.as_deref() == Some(number)
        })?;

        Some(DuplicateFindings {
            contribution: EXACT_POINTS,
            reasons: vec![EXACT_WHY.to_string()],
            matches: vec![DuplicateMatch {
                id: old.id,
                score: EXACT_CONFIDENCE,
                why: EXACT_WHY.to_string(),
            }],
        })
    }

    fn fuzzy_pass(&self, new: &InvoiceFeatures, history: &[InvoiceRecord]) -> Option<DuplicateFindings> {
        let number = new.invoice_number.as_deref()?;
        let vendor = new.vendor.as_deref()?;

        for record in history {
            let old = InvoiceFeatures::from(record);
            let (Some(old_number), Some(old_vendor)) =
                (old.invoice_number.as_deref(), old.vendor.as_deref())
            else {
                continue;
            };

            let inv_sim = invoice_similarity(number, old_number);
            let vendor_sim = vendor_similarity(vendor, old_vendor);
            let amt_match = amounts_match(new.amount, old.amount);
            let date_same = matches!(
                (new.invoice_date.as_deref(), old.invoice_date.as_deref()),
                (Some(a), Some(b)) if a == b
            );

            if inv_sim > INVOICE_SIM_MIN && vendor_sim > VENDOR_SIM_MIN && (amt_match || date_same) {
                return Some(DuplicateFindings {
                    contribution: FUZZY_POINTS,
                    reasons: vec![format!(
                        "likely duplicate: invoice number and vendor closely match invoice {}",
                        record.id
                    )],
                    matches: vec![DuplicateMatch {
                        id: record.id,
                        score: (inv_sim * 1000.0).round() / 1000.0,
                        why: format!(
                            "inv_sim={:.2}, vendor_sim={:.2}, amt_match={}, date_same={}",
                            inv_sim, vendor_sim, amt_match, date_same
                        ),
                    }],
                });
            }
        }

        None
    }
}

/// Normalized edit similarity for invoice numbers.
///
/// Glyphs OCR commonly confuses are folded to one form first, so `inv-1oo`
/// and `inv-100` compare equal while `1001` and `1002` stay one edit apart.
pub fn invoice_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&fold_ocr_glyphs(a), &fold_ocr_glyphs(b))
}

fn fold_ocr_glyphs(number: &str) -> String {
    number
        .chars()
        .map(|c| match c {
            'o' | 'O' => '0',
            'i' | 'I' | 'l' | 'L' => '1',
            's' | 'S' => '5',
            'b' | 'B' => '8',
            other => other,
        })
        .collect()
}

/// Containment-style vendor similarity.
///
/// 1.0 when one name contains the other, otherwise the best normalized edit
/// similarity of the shorter name against every equal-width window of the longer.
pub fn vendor_similarity(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if short.is_empty() {
        return 0.0;
    }
    if long.contains(short) {
        return 1.0;
    }

    let long_chars: Vec<char> = long.chars().collect();
    let width = short.chars().count();
    long_chars
        .windows(width)
        .map(|window| {
            let window: String = window.iter().collect();
            strsim::normalized_levenshtein(short, &window)
        })
        .fold(0.0, f64::max)
}

fn amounts_match(new: Option<f64>, old: Option<f64>) -> bool {
    match (new, old) {
        (Some(new), Some(old)) => {
            let tolerance = AMOUNT_TOLERANCE_FLOOR.max(AMOUNT_TOLERANCE_RATIO * new);
            (new - old).abs() <= tolerance
        }
        _ => false,
    }
}
