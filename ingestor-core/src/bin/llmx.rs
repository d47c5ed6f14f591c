//! `ingestor` CLI - a thin worked transport over `ingestor_core`.
//!
//! Argument parsing itself is out of this crate's spec scope (§1 "the
//! command-line argument parser" is listed as an external collaborator);
//! this binary exists to exercise `CoreContext` end-to-end, not to be a
//! fully-featured agent-facing surface. Subcommands map close to 1:1 onto
//! the registry/indexer/search/jobs operations in `lib.rs`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ingestor_core::embeddings::HashingEmbeddingClient;
use ingestor_core::graph_builder;
use ingestor_core::ids::{JobId, StoreId};
use ingestor_core::indexer::{index_directory, IndexOptions};
use ingestor_core::model::{
    DetailLevel, JobDetails, JobStatus, SearchFilters, SearchMode, SearchQuery, StoreKind, StoreSpec,
};
use ingestor_core::search::{search, SearchInput as PlannerInput, StoreContext};
use ingestor_core::store::DocumentStore;
use ingestor_core::{CoreConfig, CoreContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "ingestor", version, about = "Local knowledge-indexing and retrieval engine")]
struct Cli {
    /// Data directory holding stores.json, jobs/, and per-store indexes.
    #[arg(long, global = true, default_value = ".ingestor")]
    data_dir: PathBuf,

    /// Output JSON instead of a human-readable summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store registry operations (§4.10).
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
    /// Index a store synchronously in this process (no detached worker).
    Index {
        /// Store id or name.
        store: String,
        /// Skip unchanged files by comparing file hashes.
        #[arg(long)]
        incremental: bool,
    },
    /// Run hybrid search against one or more stores.
    Search {
        query: String,
        /// Store ids or names to search (repeatable).
        #[arg(long = "store", required = true)]
        stores: Vec<String>,
        #[arg(long, default_value = "hybrid")]
        mode: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "contextual")]
        detail: String,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        min_raw_relevance: Option<f64>,
    },
    /// Job engine operations (§4.6).
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    Create {
        name: String,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, value_enum, default_value = "local-directory")]
        kind: StoreKindArg,
    },
    List,
    Get {
        id_or_name: String,
    },
    Delete {
        id_or_name: String,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum StoreKindArg {
    LocalDirectory,
    ClonedRepo,
    WebCollection,
}

impl From<StoreKindArg> for StoreKind {
    fn from(v: StoreKindArg) -> Self {
        match v {
            StoreKindArg::LocalDirectory => StoreKind::LocalDirectory,
            StoreKindArg::ClonedRepo => StoreKind::ClonedRepo,
            StoreKindArg::WebCollection => StoreKind::WebCollection,
        }
    }
}

#[derive(Subcommand)]
enum JobAction {
    Status { id: String },
    Cancel { id: String },
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("ingestor=info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let embedder: Arc<dyn ingestor_core::embeddings::EmbeddingClient> = Arc::new(HashingEmbeddingClient::default());
    let ctx = CoreContext::new(&cli.data_dir, embedder, CoreConfig::default()).context("failed to open data directory")?;

    match cli.command {
        Commands::Store { action } => run_store(&ctx, action, cli.json),
        Commands::Index { store, incremental } => run_index(&ctx, &store, incremental, cli.json).await,
        Commands::Search {
            query,
            stores,
            mode,
            limit,
            detail,
            threshold,
            min_raw_relevance,
        } => run_search(&ctx, query, stores, mode, limit, detail, threshold, min_raw_relevance, cli.json).await,
        Commands::Job { action } => run_job(&ctx, action, cli.json),
    }
}

fn run_store(ctx: &CoreContext, action: StoreAction, json: bool) -> Result<()> {
    match action {
        StoreAction::Create { name, path, url, branch, kind } => {
            let spec = StoreSpec {
                name,
                kind: kind.into(),
                path,
                url,
                branch,
                description: None,
                tags: Vec::new(),
            };
            let store = ctx.stores().lock().unwrap().create(spec)?;
            print_value(&store, json, |s| format!("created store {} ({})", s.id, s.name));
        }
        StoreAction::List => {
            let stores = ctx.stores().lock().unwrap();
            let list = stores.list(None);
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                for s in list {
                    println!("{}\t{}\t{:?}\t{:?}", s.id, s.name, s.kind, s.status);
                }
            }
        }
        StoreAction::Get { id_or_name } => {
            let stores = ctx.stores().lock().unwrap();
            let store = stores.get_by_id_or_name(&id_or_name)?;
            print_value(store, json, |s| format!("{} ({}) — {:?}", s.name, s.id, s.status));
        }
        StoreAction::Delete { id_or_name } => {
            let id = ctx.stores().lock().unwrap().get_by_id_or_name(&id_or_name)?.id.clone();
            ctx.delete_store(&id)?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn run_index(ctx: &CoreContext, store: &str, incremental: bool, json: bool) -> Result<()> {
    let resolved = ctx.stores().lock().unwrap().get_by_id_or_name(store)?.clone();
    let root = resolved
        .path
        .as_ref()
        .context("store has no local path to index (cloned-repo/web-collection stores are indexed via a clone/crawl job)")?;

    let job = ctx.jobs().create(JobDetails::Index { store_id: resolved.id.clone() })?;
    let index_root = ctx.store_index_root(&resolved.id);
    let mut doc_store = DocumentStore::load(&index_root)?;
    let adapters = ctx.adapters();
    let options = IndexOptions {
        incremental,
        chunk_options: ingestor_core::chunk::ChunkOptions {
            size: ctx.config().chunk_window,
            overlap: ctx.config().chunk_overlap,
        },
        ..IndexOptions::default()
    };
    let written = index_directory(&resolved.id, std::path::Path::new(root), &mut doc_store, ctx.embedder().as_ref(), adapters, &options).await?;

    let graph = graph_builder::build(std::path::Path::new(root), adapters)?;
    graph_builder::write_graph(&ctx.store_graph_root(&resolved.id), &graph)?;

    ctx.jobs().update(
        &job.id,
        ingestor_core::model::JobPatch {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some(format!("indexed {written} documents")),
            ..Default::default()
        },
    )?;
    ctx.stores().lock().unwrap().update_status(&resolved.id, ingestor_core::model::StoreStatus::Ready, doc_store.dimension())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "job_id": job.id, "documents_written": written }))?);
    } else {
        println!("indexed {written} documents into {}", resolved.id);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    ctx: &CoreContext,
    query_text: String,
    stores: Vec<String>,
    mode: String,
    limit: usize,
    detail: String,
    threshold: Option<f64>,
    min_raw_relevance: Option<f64>,
    json: bool,
) -> Result<()> {
    let mode = match mode.as_str() {
        "vector" => SearchMode::Vector,
        "fts" => SearchMode::Fts,
        _ => SearchMode::Hybrid,
    };
    let detail = match detail.as_str() {
        "minimal" => DetailLevel::Minimal,
        "full" => DetailLevel::Full,
        _ => DetailLevel::Contextual,
    };

    let store_ids: Vec<StoreId> = {
        let registry = ctx.stores().lock().unwrap();
        stores
            .iter()
            .map(|s| registry.get_by_id_or_name(s).map(|store| store.id.clone()))
            .collect::<ingestor_core::Result<Vec<_>>>()?
    };

    let query = SearchQuery {
        text: query_text,
        store_ids: store_ids.clone(),
        mode,
        limit,
        threshold,
        min_raw_relevance,
        include_content: false,
        detail,
        filters: SearchFilters::default(),
    };

    let start = Instant::now();
    let query_vector = match mode {
        SearchMode::Fts => None,
        _ => Some(ctx.embedder().embed(&query.text)?),
    };

    let mut doc_stores = Vec::with_capacity(store_ids.len());
    let mut graphs = Vec::with_capacity(store_ids.len());
    for id in &store_ids {
        doc_stores.push(DocumentStore::load(ctx.store_index_root(id))?);
        graphs.push(graph_builder::load_graph(&ctx.store_graph_root(id)).ok());
    }
    let store_contexts: Vec<StoreContext<'_>> = doc_stores
        .iter()
        .zip(graphs.iter())
        .map(|(store, graph)| StoreContext {
            store,
            graph: graph.as_ref(),
        })
        .collect();

    let envelope = search(
        PlannerInput {
            query: &query,
            query_vector,
            stores: store_contexts,
            weight_vector: ctx.config().weight_vector,
            weight_fts: ctx.config().weight_fts,
            overfetch: ctx.config().overfetch,
        },
        start.elapsed().as_millis() as u64,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        println!(
            "{} results ({:?} confidence, {} total, {}ms)",
            envelope.results.len(),
            envelope.confidence,
            envelope.total_results,
            envelope.elapsed_ms
        );
        for r in &envelope.results {
            println!("  [{:.3}] {} — {}", r.score, r.summary.location, r.summary.purpose);
        }
    }
    Ok(())
}

fn run_job(ctx: &CoreContext, action: JobAction, json: bool) -> Result<()> {
    match action {
        JobAction::Status { id } => {
            let job = ctx.jobs().get(&JobId::new(id))?;
            print_value(&job, json, |j| format!("{:?} ({}%) — {}", j.status, j.progress, j.message));
        }
        JobAction::Cancel { id } => {
            let job = ctx.jobs().cancel(&JobId::new(id))?;
            print_value(&job, json, |j| format!("{:?}", j.status));
        }
        JobAction::List => {
            let jobs = ctx.jobs().list(None);
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                for j in jobs {
                    println!("{}\t{:?}\t{}%\t{}", j.id, j.status, j.progress, j.message);
                }
            }
        }
    }
    Ok(())
}

fn print_value<T: serde::Serialize>(value: &T, json: bool, human: impl FnOnce(&T) -> String) {
    if json {
        println!("{}", serde_json::to_string_pretty(value).unwrap());
    } else {
        println!("{}", human(value));
    }
}
