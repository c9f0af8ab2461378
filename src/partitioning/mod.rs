//! Coarse partitioning of the vector space.

pub mod kmeans;

pub use kmeans::{nearest_centroid, KMeans};
