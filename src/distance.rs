//! Distance metrics for dense vectors.
//!
//! All metrics are expressed as *distances*: lower means more similar. Inner
//! product search therefore reports the negated dot product, so ascending
//! distance is descending similarity for every metric.
//!
//! ## Important nuance
//!
//! [`DistanceMetric::L2`] is the **squared** Euclidean distance. Rankings are
//! identical to true L2 and it skips a square root per candidate, but a caller
//! comparing against a radius must square the radius.

use crate::simd;
use serde::{Deserialize, Serialize};

/// Distance metric for dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Inner product distance $-\langle a,b\rangle$ (for maximum inner product search).
    InnerProduct,
}

impl DistanceMetric {
    /// Compute distance between two vectors.
    ///
    /// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
    /// nearest neighbor).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_distance_squared(a, b),
            DistanceMetric::InnerProduct => inner_product_distance(a, b),
        }
    }

    /// Stable tag mixed into base-index fingerprints.
    pub(crate) fn tag(self) -> u8 {
        match self {
            DistanceMetric::L2 => 1,
            DistanceMetric::InnerProduct => 2,
        }
    }
}

/// Squared L2 distance.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    simd::l2_distance_squared(a, b)
}

/// Inner product distance (negative dot product).
#[inline]
#[must_use]
pub fn inner_product_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    -simd::dot(a, b)
}

/// Normalize a vector to unit L2 norm.
#[inline]
#[must_use]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = simd::norm(v);
    if n < 1e-10 {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / n).collect()
}
