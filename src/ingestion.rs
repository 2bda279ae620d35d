//! # Ingestion
//!
//! One [`ChainListener`] per chain follows new blocks, fetches the Sync/Swap logs of each
//! block range and applies them to the shared graph through [`dispatch_log`]. Price
//! observations go to a [`PriceTickSink`]; the last processed block is checkpointed in the
//! [`SnapshotStore`] so a restart resumes where it stopped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers::providers::Middleware;
use ethers::types::{BlockNumber, Filter, Log, ValueOrArray};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::edges::{PriceObservation, UpdateContext};
use crate::graph::{GraphError, RoutingGraph};
use crate::metrics;
use crate::persistence::{PriceTickSink, SnapshotStore};
use crate::settings::IngestionSettings;
use crate::types::ChainId;

/// Applies one log to the graph.
///
/// Logs of unknown pools and logs that fail to decode are skipped and counted; they never
/// abort ingestion.
pub fn dispatch_log(graph: &RoutingGraph, log: &Log, ctx: &UpdateContext) -> Vec<PriceObservation> {
    match graph.apply_log(log, ctx) {
        Ok(observations) => {
            if !observations.is_empty() {
                metrics::increment_logs_applied(ctx.chain.as_str());
            }
            observations
        }
        Err(GraphError::UnknownPool(pool)) => {
            debug!("[Ingestion] Ignoring log of unknown pool {} on {}", pool, ctx.chain);
            metrics::increment_logs_skipped(ctx.chain.as_str(), "unknown_pool");
            Vec::new()
        }
        Err(e) => {
            warn!(
                "[Ingestion] Skipping log {:?} in block {:?} on {}: {}",
                log.transaction_hash, log.block_number, ctx.chain, e
            );
            metrics::increment_logs_skipped(ctx.chain.as_str(), "decode_error");
            Vec::new()
        }
    }
}

/// Next block range to fetch after `last`, capped at `max_range` blocks. `None` when caught up.
pub fn next_range(last: u64, head: u64, max_range: u64) -> Option<(u64, u64)> {
    if head <= last {
        return None;
    }
    let from = last + 1;
    let to = head.min(last.saturating_add(max_range.max(1)));
    Some((from, to))
}

/// Block follower for one chain.
pub struct ChainListener<M> {
    chain: ChainId,
    client: Arc<M>,
    graph: Arc<RoutingGraph>,
    ctx: UpdateContext,
    store: Arc<dyn SnapshotStore>,
    sink: Arc<dyn PriceTickSink>,
    settings: IngestionSettings,
}

impl<M: Middleware + 'static> ChainListener<M> {
    pub fn new(
        client: Arc<M>,
        graph: Arc<RoutingGraph>,
        ctx: UpdateContext,
        store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn PriceTickSink>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            chain: ctx.chain.clone(),
            client,
            graph,
            ctx,
            store,
            sink,
            settings,
        }
    }

    async fn head(&self) -> Result<u64> {
        let head = self
            .client
            .get_block_number()
            .await
            .context("Failed to get latest block")?;
        Ok(head.as_u64())
    }

    /// Last processed block: the stored checkpoint, else the block before `start_block`,
    /// else the current head.
    pub async fn resume_block(&self) -> Result<u64> {
        if let Some(checkpoint) = self.store.checkpoint(&self.chain).await? {
            return Ok(checkpoint.last_block);
        }
        match self.settings.start_block {
            Some(start) => Ok(start.saturating_sub(1)),
            None => self.head().await,
        }
    }

    async fn fetch_logs(&self, from: u64, to: u64) -> Result<Vec<Log>> {
        let filter = Filter::new()
            .from_block(BlockNumber::Number(from.into()))
            .to_block(BlockNumber::Number(to.into()))
            .topic0(ValueOrArray::Array(vec![
                Some(self.ctx.sync_topic),
                Some(self.ctx.swap_topic),
            ]));
        let mut logs = self
            .client
            .get_logs(&filter)
            .await
            .with_context(|| format!("Failed to get logs for blocks {}..={}", from, to))?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    /// Applies every log in `from..=to` and checkpoints `to`. Returns the number of
    /// observations produced. Nothing is checkpointed when the fetch fails.
    pub async fn process_range(&self, from: u64, to: u64) -> Result<usize> {
        let logs = self.fetch_logs(from, to).await?;

        let mut observed = 0;
        for log in &logs {
            for observation in dispatch_log(&self.graph, log, &self.ctx) {
                observed += 1;
                if let Err(e) = self.sink.record(&observation).await {
                    warn!("[Ingestion] Failed to record price tick on {}: {:#}", self.chain, e);
                }
            }
        }

        self.store
            .set_checkpoint(&self.chain, to)
            .await
            .with_context(|| format!("Failed to update last block to {}", to))?;
        debug!(
            "[Ingestion] {} blocks {}..={}: {} logs, {} observations",
            self.chain,
            from,
            to,
            logs.len(),
            observed
        );
        Ok(observed)
    }

    /// One poll: returns the new last block and the head it was measured against, or
    /// `None` when there is nothing new.
    async fn step(&self, last: u64) -> Result<Option<(u64, u64)>> {
        let head = self.head().await?;
        let Some((from, to)) = next_range(last, head, self.settings.max_block_range) else {
            return Ok(None);
        };
        self.process_range(from, to).await?;
        Ok(Some((to, head)))
    }

    /// Follows the chain until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut last = loop {
            match self.resume_block().await {
                Ok(last) => break last,
                Err(e) => {
                    warn!("[Ingestion] {}: cannot resume yet: {:#}", self.chain, e);
                    metrics::increment_ingestion_retries(self.chain.as_str());
                    tokio::select! {
                        _ = shutdown.changed() => return Ok(()),
                        _ = sleep(self.settings.retry_delay()) => {}
                    }
                }
            }
        };
        info!("[Ingestion] {} listener starting after block {}", self.chain, last);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                _ = shutdown.changed() => break,
                outcome = self.step(last) => outcome,
            };

            let pause = match outcome {
                Ok(Some((processed, head))) => {
                    last = processed;
                    if processed < head {
                        Duration::ZERO
                    } else {
                        self.settings.poll_interval()
                    }
                }
                Ok(None) => self.settings.poll_interval(),
                Err(e) => {
                    warn!(
                        "[Ingestion] {} fetch after block {} failed, retrying in {:?}: {:#}",
                        self.chain,
                        last,
                        self.settings.retry_delay(),
                        e
                    );
                    metrics::increment_ingestion_retries(self.chain.as_str());
                    self.settings.retry_delay()
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(pause) => {}
            }
        }

        info!("[Ingestion] {} listener stopped at block {}", self.chain, last);
        Ok(())
    }
}
