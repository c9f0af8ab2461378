//! Build → zip/merge → deploy → cached search, through the public API only.

use ivfshard::ivf::{merge_shards, BaseIndex, DeployedIndex, ShardBuilder};
use ivfshard::search::{resolve_hits, CacheParams, CachedSearch};
use ivfshard::shards::{zip_indexes, ZipOptions};
use ivfshard::{DistanceMetric, VectorId, VectorSearch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 16;
const NLIST: usize = 8;

fn random_vectors(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * DIM).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect()
}

fn trained_base() -> Arc<BaseIndex> {
    let sample = random_vectors(256, 7);
    Arc::new(BaseIndex::train(DIM, NLIST, &sample, DistanceMetric::L2, 42).unwrap())
}

/// `document_id * 10^4 + sentence_offset`
fn ids(doc_start: u64, n: usize) -> Vec<VectorId> {
    (0..n as u64).map(|i| (doc_start + i / 3) * 10_000 + i % 3).collect()
}

#[test]
fn shards_of_100_and_50_merge_to_150_and_find_themselves() {
    let dir = TempDir::new().unwrap();
    let base = trained_base();
    let mut builder = ShardBuilder::new(base.clone());

    let va = random_vectors(100, 1);
    let ia = ids(1, 100);
    let vb = random_vectors(50, 2);
    let ib = ids(500, 50);
    builder
        .build(&dir.path().join("2018-08-07_a.index"), &va, &ia)
        .unwrap();
    builder
        .build(&dir.path().join("2018-08-07_b.index"), &vb, &ib)
        .unwrap();

    let out = dir.path().join("2018-08-07_zipped.index");
    let merged = merge_shards(&builder.registry().paths(), &base, &out).unwrap();
    assert_eq!(merged.ntotal, 150);

    let index = DeployedIndex::load(&out, NLIST).unwrap();
    assert_eq!(index.len(), 150);

    for (vectors, expected) in [(&va, &ia), (&vb, &ib)] {
        for (row, &id) in vectors.chunks_exact(DIM).zip(expected.iter()).step_by(7) {
            let res = index.search(row, 5).unwrap();
            assert_eq!(res.ids[0].len(), 5);
            assert_eq!(res.ids[0][0], id);
            assert!(res.distances[0][0].abs() < 1e-5);
            assert!(res.distances[0].windows(2).all(|w| w[0] <= w[1]));
        }
    }
}

#[test]
fn batch_search_matches_single_queries() {
    let dir = TempDir::new().unwrap();
    let base = trained_base();
    let mut builder = ShardBuilder::new(base.clone());
    let vectors = random_vectors(64, 3);
    builder
        .build(&dir.path().join("2020-01-01_a.index"), &vectors, &ids(1, 64))
        .unwrap();
    let out = dir.path().join("merged.index");
    builder.registry().merge(&base, &out).unwrap();

    let index = DeployedIndex::load(&out, 3).unwrap();
    let queries = &vectors[..4 * DIM];
    let batch = index.search(queries, 4).unwrap();
    assert_eq!(batch.len(), 4);
    for (i, q) in queries.chunks_exact(DIM).enumerate() {
        let single = index.search(q, 4).unwrap();
        assert_eq!(single.ids[0], batch.ids[i]);
        assert_eq!(single.distances[0], batch.distances[i]);
    }
}

#[test]
fn zipped_index_serves_cached_searches_with_text() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let base = trained_base();
    let mut builder = ShardBuilder::new(base.clone());

    let va = random_vectors(30, 4);
    let ia = ids(1, 30);
    builder
        .build(&src.path().join("2018-08-07_a.index"), &va, &ia)
        .unwrap();
    builder
        .build(&src.path().join("2018-08-08_a.index"), &random_vectors(20, 5), &ids(90, 20))
        .unwrap();

    let report = zip_indexes(src.path(), dst.path(), &base, &ZipOptions::default()).unwrap();
    assert_eq!(report.merged.len(), 2);
    let (key, merged) = &report.merged[0];
    assert_eq!(key, "2018-08-07");
    assert_eq!(merged.ntotal, 30);

    let index = Arc::new(DeployedIndex::load(&merged.path, NLIST).unwrap());
    let cached = CachedSearch::new(index.clone(), CacheParams { capacity: 4 }).unwrap();

    let query = &va[..DIM];
    let fresh = index.search(query, 3).unwrap();
    let first = cached.search(query, 3).unwrap();
    let second = cached.search(query, 3).unwrap();
    assert_eq!(first, fresh);
    assert_eq!(second, fresh);
    assert_eq!(cached.stats().hits, 1);

    let store: HashMap<VectorId, String> = ia
        .iter()
        .map(|&id| (id, format!("sentence {} of doc {}", id % 10_000, id / 10_000)))
        .collect();
    let hits = resolve_hits(&first, 0, &store);
    assert_eq!(hits[0].id, ia[0]);
    assert_eq!(hits[0].text, "sentence 0 of doc 1");
}

#[test]
fn malformed_query_does_not_poison_the_cache() {
    let dir = TempDir::new().unwrap();
    let base = trained_base();
    let mut builder = ShardBuilder::new(base.clone());
    let vectors = random_vectors(10, 6);
    builder
        .build(&dir.path().join("a.index"), &vectors, &ids(1, 10))
        .unwrap();
    let out = dir.path().join("m.index");
    builder.registry().merge(&base, &out).unwrap();

    let cached =
        CachedSearch::new(DeployedIndex::load(&out, 2).unwrap(), CacheParams::default()).unwrap();
    assert!(cached.search(&vectors[..DIM - 1], 3).is_err());
    assert!(cached.is_empty());
    assert!(cached.search(&vectors[..DIM], 3).is_ok());
    assert_eq!(cached.len(), 1);
}
