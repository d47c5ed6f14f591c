//! Bounded result cache (§4.11): caches materialized `SearchResult`s keyed
//! by `DocumentId` so a progressive detail-level upgrade (minimal ->
//! contextual -> full) can reuse the lower-detail work already done.
//!
//! Grounded on the teacher's `handlers/cache.rs::DynamicCache` (an `lru`
//! crate cache with a fixed capacity), with its mtime-sampling
//! invalidation dropped: a cached search result is immutable once
//! produced, so there's nothing to invalidate.

use crate::ids::DocumentId;
use crate::model::{DetailLevel, SearchResult};
use lru::LruCache;
use std::num::NonZeroUsize;

const MAX_ENTRIES: usize = 1000;

fn detail_rank(level: DetailLevel) -> u8 {
    match level {
        DetailLevel::Minimal => 0,
        DetailLevel::Contextual => 1,
        DetailLevel::Full => 2,
    }
}

pub struct ResultCache {
    cache: LruCache<DocumentId, (DetailLevel, SearchResult)>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(MAX_ENTRIES).unwrap()),
        }
    }

    /// Returns a cached result only if it was materialized at `>= detail`
    /// the caller is asking for; a cache hit at a lower detail level is
    /// treated as a miss so the caller re-materializes at full fidelity.
    pub fn get(&mut self, id: &DocumentId, detail: DetailLevel) -> Option<SearchResult> {
        let (cached_detail, result) = self.cache.get(id)?;
        if detail_rank(*cached_detail) >= detail_rank(detail) {
            Some(result.clone())
        } else {
            None
        }
    }

    pub fn put(&mut self, id: DocumentId, detail: DetailLevel, result: SearchResult) {
        self.cache.put(id, (detail, result));
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentKind, SearchSummary};

    fn result(id: &str) -> SearchResult {
        SearchResult {
            id: DocumentId::from(id),
            score: 0.9,
            raw_cosine: 0.9,
            summary: SearchSummary {
                kind: DocumentKind::Chunk,
                name: "x".to_string(),
                location: "x.rs".to_string(),
                purpose: "x".to_string(),
            },
            context: None,
            full: None,
            metadata: crate::model::DocumentMetadata {
                store_id: crate::ids::StoreId::from("s"),
                kind: DocumentKind::Chunk,
                indexed_at: 0,
                source_path: None,
                source_url: None,
                file_hash: "h".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                file_type: crate::model::FileType::Source,
                section_header: None,
                symbol_name: None,
                has_doc_comments: false,
                imports: Vec::new(),
            },
        }
    }

    #[test]
    fn lower_detail_hit_is_treated_as_miss() {
        let mut cache = ResultCache::new();
        cache.put(DocumentId::from("d1"), DetailLevel::Minimal, result("d1"));
        assert!(cache.get(&DocumentId::from("d1"), DetailLevel::Full).is_none());
        assert!(cache.get(&DocumentId::from("d1"), DetailLevel::Minimal).is_some());
    }

    #[test]
    fn higher_detail_hit_satisfies_lower_request() {
        let mut cache = ResultCache::new();
        cache.put(DocumentId::from("d1"), DetailLevel::Full, result("d1"));
        assert!(cache.get(&DocumentId::from("d1"), DetailLevel::Minimal).is_some());
    }

    #[test]
    fn cache_is_bounded() {
        let mut cache = ResultCache::new();
        for i in 0..(MAX_ENTRIES + 10) {
            cache.put(DocumentId::from(format!("d{i}")), DetailLevel::Full, result(&format!("d{i}")));
        }
        assert_eq!(cache.len(), MAX_ENTRIES);
    }
}
