//! Search-side abstractions: the common search trait, ranked results, caching,
//! result ordering and mapping ids back to documents.

pub mod cache;
pub mod sort;

pub use cache::{CacheParams, CacheStats, CachedSearch};
pub use sort::{joint_sort, ScoredIds};

use crate::error::Result;
use crate::VectorId;
use std::collections::HashMap;

/// Anything that answers k-nearest-neighbor queries over row-major query batches.
///
/// Implementations must be safe to call from many threads at once.
pub trait VectorSearch: Send + Sync {
    /// Dimension every query row must have.
    fn dimension(&self) -> usize;

    /// Search `queries` (one or more rows of `dimension` values) for `k`
    /// neighbors each. Rows of the result follow the order of the query rows.
    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults>;
}

impl<S: VectorSearch + ?Sized> VectorSearch for std::sync::Arc<S> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn search(&self, queries: &[f32], k: usize) -> Result<SearchResults> {
        (**self).search(queries, k)
    }
}

/// Per-query ranked `(distance, id)` lists. Lower distance is more similar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub distances: Vec<Vec<f32>>,
    pub ids: Vec<Vec<VectorId>>,
}

impl SearchResults {
    pub fn with_capacity(queries: usize) -> Self {
        Self {
            distances: Vec::with_capacity(queries),
            ids: Vec::with_capacity(queries),
        }
    }

    pub fn push_row(&mut self, distances: Vec<f32>, ids: Vec<VectorId>) {
        self.distances.push(distances);
        self.ids.push(ids);
    }

    /// Number of query rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// `(distance, id)` pairs of row `query`; empty when there is no such row.
    pub fn row(&self, query: usize) -> impl Iterator<Item = (f32, VectorId)> + '_ {
        let distances: &[f32] = self.distances.get(query).map(Vec::as_slice).unwrap_or_default();
        let ids: &[VectorId] = self.ids.get(query).map(Vec::as_slice).unwrap_or_default();
        distances.iter().copied().zip(ids.iter().copied())
    }
}

/// External store mapping vector ids back to sentence text.
pub trait DocumentLookup {
    fn text(&self, id: VectorId) -> Option<String>;
}

impl DocumentLookup for HashMap<VectorId, String> {
    fn text(&self, id: VectorId) -> Option<String> {
        self.get(&id).cloned()
    }
}

/// A ranked result joined with its document text.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: VectorId,
    pub distance: f32,
    pub text: String,
}

/// Resolve row `query` of `results` against `store`, keeping rank order.
///
/// Ids the store does not know are skipped rather than reported with empty text.
pub fn resolve_hits<L: DocumentLookup + ?Sized>(
    results: &SearchResults,
    query: usize,
    store: &L,
) -> Vec<Hit> {
    results
        .row(query)
        .filter_map(|(distance, id)| {
            store.text(id).map(|text| Hit { id, distance, text })
        })
        .collect()
}
