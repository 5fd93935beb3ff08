use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kb_index::ScoredHit;
use kb_retrieval::fusion::reciprocal_rank_fusion;

fn bench_fusion(c: &mut Criterion) {
    let dense: Vec<ScoredHit> = (0..500).map(|i| ScoredHit { chunk_id: format!("c{i}"), score: 1.0 / (i as f32 + 1.0) }).collect();
    let sparse: Vec<ScoredHit> = (0..500).map(|i| ScoredHit { chunk_id: format!("c{}", 999 - i), score: 1.0 / (i as f32 + 1.0) }).collect();

    c.bench_function("rrf_fuse_500x500", |b| {
        b.iter(|| reciprocal_rank_fusion(black_box(&[dense.clone(), sparse.clone()]), 60.0))
    });
}

criterion_group!(benches, bench_fusion);
criterion_main!(benches);
