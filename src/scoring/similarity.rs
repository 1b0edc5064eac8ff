//! Nearest-neighbour search over invoice text embeddings

use crate::types::{EmbeddingEntry, InvoiceRecord, NeighborEvidence};
use std::collections::HashMap;
use tracing::warn;

/// Neighbours reported per invoice
pub const TOP_NEIGHBORS: usize = 3;

/// A ranked candidate returned by a `NeighborIndex`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub invoice_id: i64,
    pub similarity: f64,
}

/// Ranked neighbours plus data-quality counters
#[derive(Debug, Clone, Default)]
pub struct RankedNeighbors {
    /// Sorted descending by similarity, ties in candidate order
    pub hits: Vec<ScoredCandidate>,
    /// Candidates whose dimension differed from the query
    pub dimension_mismatches: usize,
}

/// Nearest-neighbour lookup over embeddings of a single model.
///
/// Implementations may index the candidates in any way as long as the ranking
/// contract holds: descending similarity, input order on ties, at most `limit` hits.
pub trait NeighborIndex: Send + Sync {
    fn rank(&self, query: &[f32], candidates: &[&EmbeddingEntry], limit: usize) -> RankedNeighbors;

    fn name(&self) -> &'static str;
}

/// Brute-force dot-product scan over every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustiveIndex;

impl NeighborIndex for ExhaustiveIndex {
    fn rank(&self, query: &[f32], candidates: &[&EmbeddingEntry], limit: usize) -> RankedNeighbors {
        let mut dimension_mismatches = 0;
        let mut hits = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if candidate.vector.len() != query.len() {
                dimension_mismatches += 1;
                warn!(
                    invoice_id = candidate.invoice_id,
                    model = %candidate.model_name,
                    expected = query.len(),
                    actual = candidate.vector.len(),
                    "Embedding dimension mismatch, comparing shared prefix"
                );
            }

            let similarity = dot(query, &candidate.vector);
            if similarity.is_finite() {
                hits.push(ScoredCandidate {
                    invoice_id: candidate.invoice_id,
                    similarity,
                });
            }
        }

        // Stable sort keeps candidate order for equal similarities
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        RankedNeighbors {
            hits,
            dimension_mismatches,
        }
    }

    fn name(&self) -> &'static str {
        "exhaustive"
    }
}

/// Dot product accumulated in f64. Equals cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// Map the best similarity to a duplicate probability.
pub fn duplicate_probability(top_similarity: f64) -> f64 {
    if top_similarity >= 0.97 {
        0.98
    } else if top_similarity >= 0.92 {
        0.80
    } else {
        0.0
    }
}

/// Semantic evidence for one invoice
#[derive(Debug, Clone, Default)]
pub struct SimilarityReport {
    pub neighbors: Vec<NeighborEvidence>,
    /// Best similarity found, 0.0 with no candidates
    pub top_similarity: f64,
    pub duplicate_probability: f64,
    pub dimension_mismatches: usize,
}

/// Finds the historical invoices whose text is closest to a new one.
pub struct SimilaritySearch {
    index: Box<dyn NeighborIndex>,
}

impl SimilaritySearch {
    pub fn new(index: Box<dyn NeighborIndex>) -> Self {
        Self { index }
    }

    pub fn exhaustive() -> Self {
        Self::new(Box::new(ExhaustiveIndex))
    }

    pub fn index_name(&self) -> &'static str {
        self.index.name()
    }

    /// Rank `candidates` against `query` and attach invoice details.
    ///
    /// Candidates without a matching invoice in `invoices` are skipped.
    pub fn search(
        &self,
        query: &[f32],
        candidates: &[EmbeddingEntry],
        invoices: &[InvoiceRecord],
    ) -> SimilarityReport {
        let by_id: HashMap<i64, &InvoiceRecord> = invoices.iter().map(|r| (r.id, r)).collect();
        let known: Vec<&EmbeddingEntry> = candidates
            .iter()
            .filter(|c| by_id.contains_key(&c.invoice_id))
            .collect();

        let ranked = self.index.rank(query, &known, TOP_NEIGHBORS);
        let top_similarity = ranked.hits.first().map(|h| h.similarity).unwrap_or(0.0);

        let neighbors = ranked
            .hits
            .iter()
            .filter_map(|hit| {
                by_id.get(&hit.invoice_id).map(|inv| NeighborEvidence {
                    invoice_id: hit.invoice_id,
                    similarity: hit.similarity,
                    vendor_name: inv.vendor_name.clone(),
                    invoice_number: inv.invoice_number.clone(),
                    total_amount: inv.total_amount,
                    invoice_date: inv.invoice_date.clone(),
                })
            })
            .collect();

        SimilarityReport {
            neighbors,
            top_similarity,
            duplicate_probability: duplicate_probability(top_similarity),
            dimension_mismatches: ranked.dimension_mismatches,
        }
    }
}

impl Default for SimilaritySearch {
    fn default() -> Self {
        Self::exhaustive()
    }
}
