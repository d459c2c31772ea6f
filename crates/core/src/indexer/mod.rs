//! Event indexer projecting protocol logs into write-once entities.
//!
//! - [`entities`]: entity types and composite ids
//! - [`store`]: [`EntityStore`] with in-memory and JSON-snapshot backends
//! - [`reader`]: block-pinned contract reads
//! - [`handlers`]: per-event projections
//! - [`runner`]: source discovery, paged log fetch, follow mode

pub mod entities;
pub mod handlers;
pub mod reader;
pub mod runner;
pub mod store;

pub use entities::{EntityKind, Record};
pub use handlers::EventHandlers;
pub use reader::{MarketInfo, OnChainReader, StateReader};
pub use runner::{IndexStats, IndexerRunner, LogSource, RunnerConfig};
pub use store::{EntityStore, JsonStore, MemoryStore};

use crate::tasks::TaskContext;
use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("indexer store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("indexer store snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `index` options from the command line.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub from_block: Option<u64>,
    pub follow: bool,
    /// JSON snapshot; in-memory only when absent
    pub store: Option<PathBuf>,
}

fn open_store(path: Option<&Path>) -> Result<Arc<dyn EntityStore>> {
    Ok(match path {
        Some(path) => Arc::new(JsonStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    })
}

/// `index`: resume from the store's cursor unless `--from-block` is given.
#[instrument(skip_all, name = "index")]
pub async fn run(tasks: &TaskContext, options: &IndexOptions) -> Result<IndexStats> {
    let store = open_store(options.store.as_deref())?;
    let from_block = options
        .from_block
        .or_else(|| store.cursor().map(|b| b + 1))
        .unwrap_or(tasks.network.network.start_block);

    let reader: Arc<dyn StateReader> = Arc::new(OnChainReader::new(tasks.provider().clone()));
    let handlers = EventHandlers::new(store.clone(), reader.clone());
    let defaults = &tasks.protocol.indexer;
    let config = RunnerConfig {
        factory: tasks.factory_address()?,
        from_block,
        batch_size: defaults.batch_size,
        follow: options.follow,
        poll_interval: Duration::from_millis(defaults.poll_interval_ms),
    };

    let stats = IndexerRunner::new(tasks.client.clone(), handlers, reader, config)
        .run()
        .await?;
    print_summary(store.as_ref(), &stats);
    Ok(stats)
}

pub fn print_summary(store: &dyn EntityStore, stats: &IndexStats) {
    println!(
        "{} {} blocks, {} events, {} entities written, {} markets",
        "indexed".green().bold(),
        stats.blocks,
        stats.events,
        stats.written,
        stats.markets
    );
    for kind in EntityKind::ALL {
        let count = store.count(kind);
        if count > 0 {
            println!("  {:<26}{count}", kind.to_string().bright_white());
        }
    }
}
