use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kb_chunker::{chunk_document, ChunkerConfig};
use kb_chunker::parser::{ParsedDocument, ParsedElement};

fn bench_chunk(c: &mut Criterion) {
    let text = "Lorem ipsum dolor sit amet. ".repeat(2000);
    let doc = ParsedDocument {
        elements: vec![ParsedElement { text: text.clone(), ..Default::default() }],
        text,
        source_modality: "text".to_string(),
    };
    let config = ChunkerConfig::default();

    c.bench_function("chunk_document_60k_chars", |b| {
        b.iter(|| chunk_document(black_box(&doc), 1, "default", 1, &config).unwrap())
    });
}

criterion_group!(benches, bench_chunk);
criterion_main!(benches);
