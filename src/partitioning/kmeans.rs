//! k-means clustering implementation.
//!
//! Produces the coarse centroids of a base index. Training is an offline
//! concern; this implementation exists so a base can be produced from a sample
//! without an external toolchain, and so tests can create small bases.

use crate::distance::DistanceMetric;
use crate::error::{IndexError, Result};

/// k-means clustering for partitioning vectors.
///
/// Uses k-means++ initialization followed by Lloyd iterations.
pub struct KMeans {
    /// Centroids, flattened (k x dimension)
    centroids: Vec<f32>,
    dimension: usize,
    k: usize,
    metric: DistanceMetric,
    max_iterations: usize,
    seed: Option<u64>,
}

impl KMeans {
    /// Create new k-means with k clusters.
    pub fn new(dimension: usize, k: usize) -> Result<Self> {
        if dimension == 0 || k == 0 {
            return Err(IndexError::InvalidParameter(
                "dimension and k must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            centroids: Vec::new(),
            dimension,
            k,
            metric: DistanceMetric::L2,
            max_iterations: 100,
            seed: None,
        })
    }

    /// Configure a deterministic seed for k-means++ initialization.
    ///
    /// When set, repeated `fit(...)` calls on the same inputs produce identical results.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Metric used for assignment. Inner product expects L2-normalized inputs.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Train k-means on `num_vectors` row-major vectors.
    pub fn fit(&mut self, vectors: &[f32], num_vectors: usize) -> Result<()> {
        if vectors.len() < num_vectors * self.dimension {
            return Err(IndexError::InvalidParameter(
                "insufficient vectors".to_string(),
            ));
        }
        if num_vectors < self.k {
            return Err(IndexError::InvalidParameter(format!(
                "need at least k={} training vectors, got {num_vectors}",
                self.k
            )));
        }

        self.centroids = self.kmeans_plus_plus(vectors, num_vectors);

        for _iteration in 0..self.max_iterations {
            let assignments = self.assign_clusters(vectors, num_vectors);
            let new_centroids = self.update_centroids(vectors, &assignments);

            let converged = self
                .centroids
                .chunks_exact(self.dimension)
                .zip(new_centroids.chunks_exact(self.dimension))
                .all(|(old, new)| crate::distance::l2_distance_squared(old, new) <= 1e-12);

            self.centroids = new_centroids;
            if converged {
                break;
            }
        }

        Ok(())
    }

    /// k-means++ initialization.
    fn kmeans_plus_plus(&self, vectors: &[f32], num_vectors: usize) -> Vec<f32> {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // Use an explicit seed when configured; otherwise derive one from entropy.
        let seed = self.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);

        let mut centroids = Vec::with_capacity(self.k * self.dimension);

        // First centroid: random vector
        let first_idx = rng.random_range(0..num_vectors);
        centroids.extend_from_slice(self.get_vector(vectors, first_idx));

        // Subsequent centroids: weighted by squared distance to nearest existing centroid
        let mut min_dists = vec![f32::INFINITY; num_vectors];
        for c in 1..self.k {
            let last = &centroids[(c - 1) * self.dimension..c * self.dimension];
            let mut total = 0.0f64;
            for (i, slot) in min_dists.iter_mut().enumerate() {
                let d = crate::distance::l2_distance_squared(self.get_vector(vectors, i), last);
                if d < *slot {
                    *slot = d;
                }
                total += *slot as f64;
            }

            let threshold = rng.random::<f64>() * total;
            let mut cumulative = 0.0f64;
            let mut chosen = num_vectors - 1;
            for (i, &dist) in min_dists.iter().enumerate() {
                cumulative += dist as f64;
                if cumulative >= threshold {
                    chosen = i;
                    break;
                }
            }
            centroids.extend_from_slice(self.get_vector(vectors, chosen));
        }

        centroids
    }

    /// Assign vectors to nearest clusters.
    pub fn assign_clusters(&self, vectors: &[f32], num_vectors: usize) -> Vec<usize> {
        (0..num_vectors)
            .map(|i| nearest_centroid(self.metric, &self.centroids, self.get_vector(vectors, i)))
            .collect()
    }

    /// Update centroids based on assignments.
    fn update_centroids(&self, vectors: &[f32], assignments: &[usize]) -> Vec<f32> {
        let mut sums = vec![0.0f32; self.k * self.dimension];
        let mut counts = vec![0usize; self.k];

        for (i, &cluster) in assignments.iter().enumerate() {
            counts[cluster] += 1;
            let dst = &mut sums[cluster * self.dimension..(cluster + 1) * self.dimension];
            for (s, &v) in dst.iter_mut().zip(self.get_vector(vectors, i)) {
                *s += v;
            }
        }

        for (c, &count) in counts.iter().enumerate() {
            let range = c * self.dimension..(c + 1) * self.dimension;
            if count > 0 {
                for s in &mut sums[range] {
                    *s /= count as f32;
                }
            } else {
                // Empty cluster: keep old centroid
                sums[range.clone()].copy_from_slice(&self.centroids[range]);
            }
        }

        sums
    }

    /// Get vector from row-major storage.
    fn get_vector<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        let start = idx * self.dimension;
        &vectors[start..start + self.dimension]
    }

    /// Flattened centroids (k x dimension).
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Consume the model, returning flattened centroids.
    pub fn into_centroids(self) -> Vec<f32> {
        self.centroids
    }
}

/// Index of the centroid nearest to `vector` (first wins on ties).
pub fn nearest_centroid(metric: DistanceMetric, centroids: &[f32], vector: &[f32]) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f32::INFINITY;
    for (cluster_idx, centroid) in centroids.chunks_exact(vector.len().max(1)).enumerate() {
        let dist = metric.distance(vector, centroid);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = cluster_idx;
        }
    }
    best_cluster
}
