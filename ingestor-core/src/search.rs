//! Search planner & ranker (§4.4).
//!
//! Generalizes the teacher's single-alpha `combine_results` blend (see
//! `zen-search::hybrid`) into the fuller pipeline the spec calls for:
//! per-backend min-max normalization, a two-weight linear fusion
//! (`w_v = 0.6`, `w_f = 0.4`), a raw-cosine floor plus fused-score
//! threshold, a file-type bonus multiply, and a fully-specified tie-break.

use crate::graph::CodeGraph;
use crate::ids::DocumentId;
use crate::model::{
    Confidence, DetailLevel, Document, DocumentMetadata, SearchContext, SearchEnvelope,
    SearchFilters, SearchFull, SearchMode, SearchResult, SearchSummary,
};
use crate::store::DocumentStore;
use std::collections::HashMap;

/// Maximum related-symbol labels surfaced in a contextual/full result
/// (§4.4 step 7) — enough to be useful without flooding the payload.
const MAX_RELATED: usize = 3;

/// Imports surfaced in a contextual/full result (§4.4 step 8) — first 3.
const MAX_IMPORTS: usize = 3;

pub const WEIGHT_VECTOR: f64 = 0.6;
pub const WEIGHT_FTS: f64 = 0.4;

/// Resolved per §9 open question #2: tiers used to label a result set's
/// overall confidence.
pub const CONFIDENCE_HIGH_THRESHOLD: f64 = 0.65;
pub const CONFIDENCE_MEDIUM_THRESHOLD: f64 = 0.45;

const TIE_EPSILON: f64 = 1e-9;

struct Candidate {
    doc_id: DocumentId,
    raw_cosine: f64,
    fts_raw: f64,
    fused: f64,
}

/// Per-backend min-max normalization: maps the observed score range into
/// `[0, 1]`. A single-candidate backend is explicitly undefined by range
/// (§4.4 step 3) and normalizes to `1.0`; a multi-candidate backend with
/// zero range normalizes to `0.0`, which keeps a silent/flat backend from
/// distorting the fusion.
fn min_max_normalize(scores: &HashMap<DocumentId, f64>) -> HashMap<DocumentId, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }
    if scores.len() == 1 {
        return scores.keys().map(|id| (id.clone(), 1.0)).collect();
    }
    let min = scores.values().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.values().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    scores
        .iter()
        .map(|(id, score)| {
            let normalized = if range > f64::EPSILON { (score - min) / range } else { 0.0 };
            (id.clone(), normalized)
        })
        .collect()
}

/// Keeps the top `cap` entries of `scores` by value, descending. This is
/// each backend's own overfetch cutoff (§4.4 step 2), applied before
/// min-max normalization so the normalized range reflects the returned
/// candidate set rather than the whole corpus (§4.4 step 3).
fn top_n(mut scores: HashMap<DocumentId, f64>, cap: usize) -> HashMap<DocumentId, f64> {
    if scores.len() <= cap {
        return scores;
    }
    let mut ranked: Vec<(DocumentId, f64)> = scores.drain().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(cap);
    ranked.into_iter().collect()
}

/// Runs one store's hybrid search and returns raw-ranked candidates before
/// threshold/bonus/tie-break is applied. Each store fans out independently
/// rather than sharing one accumulator, so a store with no matches simply
/// contributes nothing.
#[allow(clippy::too_many_arguments)]
fn rank_store(
    store: &DocumentStore,
    query_text: &str,
    query_vector: Option<&[f32]>,
    mode: SearchMode,
    limit: usize,
    overfetch: usize,
    weight_vector: f64,
    weight_fts: f64,
) -> Vec<Candidate> {
    let candidate_cap = limit.saturating_mul(overfetch).max(1);

    let vector_scores: HashMap<DocumentId, f64> = match (mode, query_vector) {
        (SearchMode::Fts, _) => HashMap::new(),
        (_, Some(qv)) => top_n(store.vector_scores(qv).into_iter().collect(), candidate_cap),
        (_, None) => HashMap::new(),
    };
    let fts_scores: HashMap<DocumentId, f64> = match mode {
        SearchMode::Vector => HashMap::new(),
        _ => top_n(store.lexical_scores(query_text).into_iter().collect(), candidate_cap),
    };

    let normalized_vector = min_max_normalize(&vector_scores);
    let normalized_fts = min_max_normalize(&fts_scores);

    let mut ids: Vec<DocumentId> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for id in vector_scores.keys().chain(fts_scores.keys()) {
        if seen.insert(id.clone()) {
            ids.push(id.clone());
        }
    }

    ids.into_iter()
        .map(|doc_id| {
            let nv = normalized_vector.get(&doc_id).copied().unwrap_or(0.0);
            let nf = normalized_fts.get(&doc_id).copied().unwrap_or(0.0);
            let fused = match mode {
                SearchMode::Vector => nv,
                SearchMode::Fts => nf,
                SearchMode::Hybrid => weight_vector * nv + weight_fts * nf,
            };
            Candidate {
                raw_cosine: vector_scores.get(&doc_id).copied().unwrap_or(0.0),
                fts_raw: fts_scores.get(&doc_id).copied().unwrap_or(0.0),
                fused,
                doc_id,
            }
        })
        .collect()
}

/// One store's indexes, paired with its (optional) code graph so a result
/// drawn from it can resolve sibling chunks and related symbols without a
/// second top-level lookup structure.
pub struct StoreContext<'a> {
    pub store: &'a DocumentStore,
    pub graph: Option<&'a CodeGraph>,
}

pub struct SearchInput<'a> {
    pub query: &'a crate::model::SearchQuery,
    pub query_vector: Option<Vec<f32>>,
    pub stores: Vec<StoreContext<'a>>,
    /// Fusion weights and per-backend overfetch multiplier (§10.4), sourced
    /// from the caller's `CoreConfig` rather than hardcoded here.
    pub weight_vector: f64,
    pub weight_fts: f64,
    pub overfetch: usize,
}

pub fn search(input: SearchInput<'_>, elapsed_ms: u64) -> SearchEnvelope {
    let query = input.query;
    let mut candidates: Vec<(Candidate, &Document, &StoreContext<'_>)> = Vec::new();
    let mut max_raw_cosine = 0.0f64;

    for ctx in &input.stores {
        for candidate in rank_store(
            ctx.store,
            &query.text,
            input.query_vector.as_deref(),
            query.mode,
            query.limit,
            input.overfetch,
            input.weight_vector,
            input.weight_fts,
        ) {
            if candidate.raw_cosine > max_raw_cosine {
                max_raw_cosine = candidate.raw_cosine;
            }
            if let Some(raw_floor) = query.min_raw_relevance {
                if candidate.raw_cosine < raw_floor {
                    continue;
                }
            }
            let Some(doc) = ctx.store.get(&candidate.doc_id) else {
                continue;
            };
            if !passes_filters(&doc.metadata, &query.filters) {
                continue;
            }
            candidates.push((candidate, doc, ctx));
        }
    }

    // Apply the file-type bonus multiply (§4.4 step 6) after fusion,
    // before the threshold filter and sort.
    let mut bonused: Vec<(f64, f64, &Document, &StoreContext<'_>)> = candidates
        .into_iter()
        .map(|(c, doc, ctx)| {
            let bonus = doc.metadata.file_type.bonus();
            (c.fused * bonus, c.raw_cosine, doc, ctx)
        })
        .collect();

    if let Some(threshold) = query.threshold {
        bonused.retain(|(score, _, _, _)| *score >= threshold);
    }

    // Tie-break resolved in §9: post-bonus score first (epsilon-tolerant),
    // then raw cosine, then document id ascending.
    bonused.sort_by(|a, b| {
        let score_cmp = b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal);
        if matches!(score_cmp, std::cmp::Ordering::Equal) || (a.0 - b.0).abs() < TIE_EPSILON {
            let cosine_cmp = b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal);
            if matches!(cosine_cmp, std::cmp::Ordering::Equal) {
                a.2.id.as_str().cmp(b.2.id.as_str())
            } else {
                cosine_cmp
            }
        } else {
            score_cmp
        }
    });

    let total_results = bonused.len();
    bonused.truncate(query.limit);

    let results: Vec<SearchResult> = bonused
        .into_iter()
        .map(|(score, raw_cosine, doc, ctx)| materialize(doc, ctx, score, raw_cosine, query.detail, query.include_content))
        .collect();

    let confidence = overall_confidence(max_raw_cosine);

    SearchEnvelope {
        mode: query.mode,
        results,
        total_results,
        elapsed_ms,
        confidence,
    }
}

fn passes_filters(metadata: &DocumentMetadata, filters: &SearchFilters) -> bool {
    if let Some(prefix) = &filters.path_prefix {
        let matches = metadata.source_path.as_deref().is_some_and(|p| p.starts_with(prefix.as_str()));
        if !matches {
            return false;
        }
    }
    if let Some(file_type) = filters.file_type {
        if metadata.file_type != file_type {
            return false;
        }
    }
    if let Some(prefix) = &filters.symbol_prefix {
        let matches = metadata.symbol_name.as_deref().is_some_and(|s| s.starts_with(prefix.as_str()));
        if !matches {
            return false;
        }
    }
    true
}

/// Progressive detail materialization (§4.4 step 7): `minimal` is summary
/// only, `contextual` adds imports/related/preview, `full` adds full
/// content plus sibling-chunk previews.
fn materialize(
    doc: &Document,
    ctx: &StoreContext<'_>,
    score: f64,
    raw_cosine: f64,
    detail: DetailLevel,
    include_content: bool,
) -> SearchResult {
    let location = doc
        .metadata
        .source_path
        .clone()
        .or_else(|| doc.metadata.source_url.clone())
        .unwrap_or_default();
    let name = doc
        .metadata
        .symbol_name
        .clone()
        .or_else(|| doc.metadata.section_header.clone())
        .unwrap_or_else(|| location.clone());

    let summary = SearchSummary {
        kind: doc.metadata.kind,
        name: name.clone(),
        location: location.clone(),
        purpose: crate::util::snippet(&doc.content, 140),
    };

    let context = matches!(detail, DetailLevel::Contextual | DetailLevel::Full).then(|| {
        let related = match (ctx.graph, &doc.metadata.symbol_name) {
            (Some(graph), Some(symbol)) => graph.related_labels(&location, symbol, MAX_RELATED),
            _ => Vec::new(),
        };
        SearchContext {
            imports: doc.metadata.imports.iter().take(MAX_IMPORTS).cloned().collect(),
            related,
            preview: crate::util::snippet(&doc.content, 280),
        }
    });

    let full = (matches!(detail, DetailLevel::Full) || include_content).then(|| {
        let previous_chunk = doc
            .metadata
            .chunk_index
            .checked_sub(1)
            .and_then(|idx| ctx.store.sibling_chunk(&location, &doc.metadata.file_hash, idx))
            .map(|sibling| crate::util::snippet(&sibling.content, 200));
        let next_chunk = ctx
            .store
            .sibling_chunk(&location, &doc.metadata.file_hash, doc.metadata.chunk_index + 1)
            .map(|sibling| crate::util::snippet(&sibling.content, 200));
        SearchFull {
            content: doc.content.clone(),
            previous_chunk,
            next_chunk,
        }
    });

    SearchResult {
        id: doc.id.clone(),
        score,
        raw_cosine,
        summary,
        context,
        full,
        metadata: doc.metadata.clone(),
    }
}

/// Confidence is derived from the maximum raw cosine seen across every
/// candidate considered, not the post-fusion/post-bonus score a result
/// happens to rank by (§4.4).
fn overall_confidence(max_raw_cosine: f64) -> Confidence {
    if max_raw_cosine >= CONFIDENCE_HIGH_THRESHOLD {
        Confidence::High
    } else if max_raw_cosine >= CONFIDENCE_MEDIUM_THRESHOLD {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}
