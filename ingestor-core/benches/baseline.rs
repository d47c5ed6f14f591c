use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ingestor_core::chunk::{chunk_file, AdapterRegistry, ChunkOptions};
use ingestor_core::embeddings::{EmbeddingClient, HashingEmbeddingClient};
use ingestor_core::ids::StoreId;
use ingestor_core::indexer::{index_directory, IndexOptions};
use ingestor_core::model::{DetailLevel, SearchFilters, SearchMode, SearchQuery};
use ingestor_core::search::{search, SearchInput, StoreContext};
use ingestor_core::store::DocumentStore;
use ingestor_core::util::detect_kind;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn sample_source(index: usize, size_kb: usize) -> String {
    format!(
        "// file {index}\n{}",
        "fn test() { println!(\"hello\"); }\n".repeat(size_kb * 10)
    )
}

fn populate(dir: &Path, file_count: usize, file_size_kb: usize) {
    for i in 0..file_count {
        fs::write(dir.join(format!("file_{i}.rs")), sample_source(i, file_size_kb)).unwrap();
    }
}

fn build_store(file_count: usize, file_size_kb: usize) -> (TempDir, DocumentStore) {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), file_count, file_size_kb);
    let embedder = HashingEmbeddingClient::new(64);
    let adapters = AdapterRegistry::new();
    let store_id = StoreId::from("bench");
    let mut store = DocumentStore::empty(dir.path().join(".store"));
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(index_directory(&store_id, dir.path(), &mut store, &embedder, &adapters, &IndexOptions::default()))
        .unwrap();
    (dir, store)
}

fn bench_index_directory(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_directory");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for (file_count, file_size_kb) in [(10, 1), (50, 2), (100, 5)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{file_count}files_{file_size_kb}kb")),
            &(file_count, file_size_kb),
            |b, &(fc, fs_kb)| {
                b.iter(|| {
                    let dir = TempDir::new().unwrap();
                    populate(dir.path(), fc, fs_kb);
                    let embedder = HashingEmbeddingClient::new(64);
                    let adapters = AdapterRegistry::new();
                    let store_id = StoreId::from("bench");
                    let mut store = DocumentStore::empty(dir.path().join(".store"));
                    black_box(
                        rt.block_on(index_directory(&store_id, dir.path(), &mut store, &embedder, &adapters, &IndexOptions::default()))
                            .unwrap(),
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");
    let adapters = AdapterRegistry::new();

    for size_kb in [1, 8, 64] {
        let content = sample_source(0, size_kb);
        let kind = detect_kind("file.rs");
        group.bench_with_input(BenchmarkId::from_parameter(format!("{size_kb}kb")), &content, |b, content| {
            b.iter(|| black_box(chunk_file("file.rs", content, kind, &ChunkOptions::default(), &adapters)))
        });
    }

    group.finish();
}

fn bench_lexical_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexical_search");
    let (_dir, store) = build_store(50, 2);

    for query in ["function", "test println", "hello world"] {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, q| {
            b.iter(|| black_box(store.lexical_scores(q)))
        });
    }

    group.finish();
}

fn bench_vector_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_search");
    let (_dir, store) = build_store(50, 2);
    let embedder = HashingEmbeddingClient::new(64);
    let query_vector = embedder.embed("function test").unwrap();

    group.bench_function("vector_search_50chunks", |b| b.iter(|| black_box(store.vector_scores(&query_vector))));

    group.finish();
}

fn bench_hybrid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("hybrid_search");
    let (_dir, store) = build_store(50, 2);
    let embedder = HashingEmbeddingClient::new(64);

    for query in ["function", "test println", "error handling"] {
        let query_vector = embedder.embed(query).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(query), &(query, query_vector), |b, (q, qv)| {
            let search_query = SearchQuery {
                text: q.to_string(),
                store_ids: vec![StoreId::from("bench")],
                mode: SearchMode::Hybrid,
                limit: 10,
                threshold: None,
                min_raw_relevance: None,
                include_content: false,
                detail: DetailLevel::Minimal,
                filters: SearchFilters::default(),
            };
            b.iter(|| {
                black_box(search(
                    SearchInput {
                        query: &search_query,
                        query_vector: Some(qv.clone()),
                        stores: vec![StoreContext { store: &store, graph: None }],
                        weight_vector: 0.6,
                        weight_fts: 0.4,
                        overfetch: 4,
                    },
                    0,
                ))
            });
        });
    }

    group.finish();
}

fn bench_document_store_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_store_serialization");
    let (dir, _store) = build_store(50, 2);
    let documents_path = dir.path().join(".store").join("documents.json");
    let serialized = fs::read(&documents_path).unwrap();

    group.bench_function("load_from_disk", |b| b.iter(|| black_box(DocumentStore::load(dir.path().join(".store")).unwrap())));

    group.bench_function("parse_documents_json", |b| {
        b.iter(|| black_box(serde_json::from_slice::<serde_json::Value>(&serialized).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_index_directory,
    bench_chunking,
    bench_lexical_search,
    bench_vector_search,
    bench_hybrid_search,
    bench_document_store_serialization
);

criterion_main!(benches);
