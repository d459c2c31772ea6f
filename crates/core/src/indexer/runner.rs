//! Log fetching and dispatch.
//!
//! Sources mirror data-source templates: the factory is watched from the
//! start block, and every market it creates (plus that market's CLB token)
//! is added as a source from the block of its `MarketCreated` event.

use super::entities::{address_key, EntityKind, Record};
use super::handlers::EventHandlers;
use super::reader::StateReader;
use alloy::primitives::{Address, B256};
use alloy::rpc::types::{Filter, Log};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromatic_chain::events::{clb_topics, decode, factory_topics, market_topics};
use chromatic_chain::{ChainClient, ChromaticEvent, LogMeta};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Block head and log queries.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn head(&self) -> Result<u64>;

    /// Logs emitted by any of `addresses` with any of `topics` in `[from, to]`,
    /// ordered by block and log index.
    async fn logs(&self, addresses: &[Address], topics: &[B256], from: u64, to: u64) -> Result<Vec<Log>>;
}

#[async_trait]
impl LogSource for ChainClient {
    async fn head(&self) -> Result<u64> {
        self.block_number().await
    }

    async fn logs(&self, addresses: &[Address], topics: &[B256], from: u64, to: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .address(addresses.to_vec())
            .event_signature(topics.to_vec());
        self.logs_in_range(&filter, from, to, to.saturating_sub(from) + 1)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub factory: Address,
    /// First block to scan
    pub from_block: u64,
    /// Blocks per page
    pub batch_size: u64,
    /// Keep polling the head after catching up
    pub follow: bool,
    pub poll_interval: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub blocks: u64,
    pub events: usize,
    pub written: usize,
    pub markets: usize,
}

pub struct IndexerRunner<L> {
    source: L,
    handlers: EventHandlers,
    reader: Arc<dyn StateReader>,
    config: RunnerConfig,
    markets: BTreeSet<Address>,
    clb_tokens: BTreeSet<Address>,
}

impl<L: LogSource> IndexerRunner<L> {
    pub fn new(
        source: L,
        handlers: EventHandlers,
        reader: Arc<dyn StateReader>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            source,
            handlers,
            reader,
            config,
            markets: BTreeSet::new(),
            clb_tokens: BTreeSet::new(),
        }
    }

    pub fn markets(&self) -> &BTreeSet<Address> {
        &self.markets
    }

    /// Index from the configured block to the head, then keep following
    /// the head if configured to.
    pub async fn run(&mut self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let mut cursor = self.config.from_block;
        self.seed_sources(cursor).await?;

        info!(
            factory = %self.config.factory,
            from_block = cursor,
            batch_size = self.config.batch_size,
            follow = self.config.follow,
            markets = self.markets.len(),
            "Indexer starting"
        );

        loop {
            let head = self.source.head().await?;
            if cursor > head {
                if !self.config.follow {
                    break;
                }
                trace!(head, "Waiting for new blocks");
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            let to = cursor
                .saturating_add(self.config.batch_size.max(1) - 1)
                .min(head);
            let started = Instant::now();
            let (events, written) = self.index_range(cursor, to).await?;
            self.handlers
                .store()
                .checkpoint(to)
                .context("checkpointing indexer store")?;

            stats.blocks += to - cursor + 1;
            stats.events += events;
            stats.written += written;
            info!(
                from = cursor,
                to,
                head,
                events,
                written,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Indexed range"
            );
            cursor = to + 1;
        }

        stats.markets = self.markets.len();
        Ok(stats)
    }

    /// Markets created before `from_block` are watched from the start.
    async fn seed_sources(&mut self, from_block: u64) -> Result<()> {
        if from_block == 0 {
            return Ok(());
        }
        let block = from_block - 1;
        let markets = match self.reader.markets(self.config.factory, block).await {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, block, "Could not list existing markets, watching new ones only");
                return Ok(());
            }
        };
        for market in markets {
            self.add_market(market, block).await?;
        }
        Ok(())
    }

    async fn add_market(&mut self, market: Address, block: u64) -> Result<()> {
        if !self.markets.insert(market) {
            return Ok(());
        }
        let known = self
            .handlers
            .store()
            .load(EntityKind::ChromaticMarket, &address_key(market))
            .as_ref()
            .and_then(Record::as_market)
            .map(|m| m.clb_token);
        let clb_token = match known {
            Some(token) => token,
            None => self.reader.market_info(market, block).await?.clb_token,
        };
        self.clb_tokens.insert(clb_token);
        debug!(market = %market, clb_token = %clb_token, block, "Watching market");
        Ok(())
    }

    async fn index_range(&mut self, from: u64, to: u64) -> Result<(usize, usize)> {
        let factory_logs = self
            .source
            .logs(&[self.config.factory], &factory_topics(), from, to)
            .await?;
        let mut events = decode_all(&factory_logs);

        for (event, meta) in &events {
            if let ChromaticEvent::MarketCreated { market, .. } = event {
                self.add_market(*market, meta.block_number).await?;
            }
        }

        if !self.markets.is_empty() {
            let markets: Vec<Address> = self.markets.iter().copied().collect();
            let logs = self.source.logs(&markets, &market_topics(), from, to).await?;
            events.extend(decode_all(&logs));
        }
        if !self.clb_tokens.is_empty() {
            let tokens: Vec<Address> = self.clb_tokens.iter().copied().collect();
            let logs = self.source.logs(&tokens, &clb_topics(), from, to).await?;
            events.extend(decode_all(&logs));
        }

        events.sort_by_key(|(_, meta)| (meta.block_number, meta.log_index));

        let mut written = 0;
        for (event, meta) in &events {
            written += self
                .handlers
                .handle(event, meta)
                .await
                .with_context(|| format!("{} at block {}", event.name(), meta.block_number))?;
        }
        Ok((events.len(), written))
    }
}

fn decode_all(logs: &[Log]) -> Vec<(ChromaticEvent, LogMeta)> {
    logs.iter()
        .filter_map(|log| {
            let decoded = decode(log);
            if decoded.is_none() {
                trace!(address = %log.address(), "Undecodable log skipped");
            }
            decoded
        })
        .collect()
}
