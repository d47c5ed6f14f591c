//! Crawl pipeline boundary (§4.9): turns one externally-fetched page into a
//! single-chunk `Document`. The crawler itself — browser automation,
//! extraction strategy, fetch retry/backoff — lives outside this crate;
//! this module is exactly the seam it hands pages across.
//!
//! Grounded on `indexer.rs`'s document-construction shape (same
//! `DocumentMetadata` envelope, same batched-upsert call into
//! `DocumentStore`), generalized from a file walk to a page stream with no
//! sub-chunking.

use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::ids::{DocumentId, StoreId};
use crate::model::{CrawledPage, Document, DocumentKind, DocumentMetadata, FileType};
use crate::store::DocumentStore;
use crate::util::md5_hex;

/// The opaque boundary to the external crawler (§4.9: "browser automation,
/// the LLM-assisted extraction strategy, page-fetch retry/backoff" are out
/// of scope here) — the same shape as `EmbeddingClient`: this crate owns
/// the trait, not an implementation.
pub trait CrawlSource: Send + Sync {
    fn fetch_pages(&self, url: &str, max_pages: usize) -> Result<Vec<CrawledPage>>;
}

/// Turns one crawled page into a `Document`: id is `<store-id>-<md5(url)>`,
/// content-to-embed is the extracted summary when present, else the raw
/// markdown (§4.9).
pub fn page_to_document(store_id: &StoreId, page: &CrawledPage, vector: Vec<f32>) -> Document {
    let id = format!("{}-{}", store_id.as_str(), md5_hex(page.url.as_bytes()));
    let content = page.extracted_summary.clone().unwrap_or_else(|| page.markdown.clone());
    Document {
        id: DocumentId::new(id),
        content,
        vector,
        metadata: DocumentMetadata {
            store_id: store_id.clone(),
            kind: DocumentKind::Web,
            indexed_at: crate::model::now_ms(),
            source_path: None,
            source_url: Some(page.url.clone()),
            file_hash: md5_hex(page.markdown.as_bytes()),
            chunk_index: 0,
            total_chunks: 1,
            file_type: FileType::Documentation,
            section_header: Some(page.title.clone()),
            symbol_name: None,
            has_doc_comments: false,
            imports: Vec::new(),
        },
    }
}

/// Embeds and upserts one crawled page (§4.9). Cancellation is the
/// caller's concern: `ingest_pages` below polls it between pages, but a
/// single-page call leaves that to whoever drives the loop.
pub fn ingest_page(store_id: &StoreId, page: &CrawledPage, store: &mut DocumentStore, embedder: &dyn EmbeddingClient) -> Result<Document> {
    let content = page.extracted_summary.as_deref().unwrap_or(&page.markdown);
    let vector = embedder.embed(content)?;
    let document = page_to_document(store_id, page, vector);
    store.upsert_batch(vec![document.clone()])?;
    Ok(document)
}

/// Drives a full crawl: one `ingest_page` per page, polling `cancel`
/// between pages (§5: "Cancellation is polled between pages"). Returns the
/// number of pages ingested before either exhausting `pages` or observing
/// cancellation.
pub fn ingest_pages(
    store_id: &StoreId,
    pages: impl IntoIterator<Item = CrawledPage>,
    store: &mut DocumentStore,
    embedder: &dyn EmbeddingClient,
    cancel: Option<&tokio::sync::watch::Receiver<bool>>,
) -> Result<usize> {
    let mut count = 0usize;
    for page in pages {
        if cancel.is_some_and(|rx| *rx.borrow()) {
            return Err(crate::error::CoreError::Cancelled);
        }
        ingest_page(store_id, &page, store, embedder)?;
        count += 1;
    }
    Ok(count)
}
