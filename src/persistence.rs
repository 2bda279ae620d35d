//! # Persistence
//!
//! Storage seams used by discovery and ingestion:
//!
//! - [`SnapshotStore`]: pools, edge snapshots, tick sets and per-chain checkpoints
//! - [`PriceTickSink`]: the price-tick time series produced by log application
//!
//! [`MemoryStore`] implements both for tests and database-less runs. The Postgres
//! implementations live in [`crate::database`] and [`crate::postgres_async_writer`].

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::edges::{Edge, EdgeSnapshot, PriceObservation, PricingEdge};
use crate::graph::{GraphState, Pool};
use crate::tick_provider::Tick;
use crate::types::{ChainId, PoolId, TokenId};

/// One directed edge as stored: keys plus the JSON snapshot in `edge_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub chain_id: ChainId,
    pub from_token: TokenId,
    pub to_token: TokenId,
    pub pool_id: PoolId,
    pub edge_data: String,
}

impl EdgeRecord {
    pub fn from_edge(
        from: &TokenId,
        to: &TokenId,
        pool: &PoolId,
        chain: &ChainId,
        edge: &Edge,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            chain_id: chain.clone(),
            from_token: from.clone(),
            to_token: to.clone(),
            pool_id: pool.clone(),
            edge_data: edge.export().to_json()?,
        })
    }

    pub fn snapshot(&self) -> serde_json::Result<EdgeSnapshot> {
        EdgeSnapshot::from_json(&self.edge_data)
    }
}

/// Every edge of `state` as records, in no particular order.
pub fn edge_records(state: &GraphState) -> Result<Vec<EdgeRecord>> {
    state
        .iter_edges()
        .map(|(from, to, pool, chain, edge)| {
            EdgeRecord::from_edge(from, to, pool, chain, edge)
                .with_context(|| format!("Failed to export edge {} -> {} ({})", from, to, pool))
        })
        .collect()
}

/// Row form of an initialized tick. Liquidity values are decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRecord {
    pub pool_address: PoolId,
    pub tick_index: i32,
    pub liquidity_gross: String,
    pub liquidity_net: String,
}

impl TickRecord {
    pub fn new(pool: &PoolId, tick: &Tick) -> Self {
        Self {
            pool_address: pool.clone(),
            tick_index: tick.index,
            liquidity_gross: tick.liquidity_gross.to_string(),
            liquidity_net: tick.liquidity_net.to_string(),
        }
    }

    pub fn to_tick(&self) -> Result<Tick> {
        Ok(Tick {
            index: self.tick_index,
            liquidity_gross: self
                .liquidity_gross
                .parse()
                .with_context(|| format!("bad liquidity_gross at tick {}", self.tick_index))?,
            liquidity_net: self
                .liquidity_net
                .parse()
                .with_context(|| format!("bad liquidity_net at tick {}", self.tick_index))?,
        })
    }
}

/// Last fully processed block of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    pub chain_id: ChainId,
    pub last_block: u64,
    pub updated_at: DateTime<Utc>,
}

/// Stored price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTickRecord {
    pub id: Uuid,
    pub price: f64,
    pub token_in: TokenId,
    pub amount_in: f64,
    pub token_out: TokenId,
    pub amount_out: f64,
    pub chain: ChainId,
    pub created_at: DateTime<Utc>,
}

impl From<&PriceObservation> for PriceTickRecord {
    fn from(observation: &PriceObservation) -> Self {
        Self {
            id: Uuid::new_v4(),
            price: observation.price,
            token_in: observation.token_in.clone(),
            amount_in: crate::v3_math::u256_to_f64(observation.amount_in),
            token_out: observation.token_out.clone(),
            amount_out: crate::v3_math::u256_to_f64(observation.amount_out),
            chain: observation.chain.clone(),
            created_at: observation.observed_at,
        }
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_pool(&self, pool: &Pool) -> Result<()>;

    async fn load_pools(&self, chain: &ChainId) -> Result<Vec<Pool>>;

    async fn save_edges(&self, records: &[EdgeRecord]) -> Result<()>;

    async fn save_ticks(&self, pool: &PoolId, ticks: &[Tick]) -> Result<()>;

    /// `None` when no tick set was stored for the pool.
    async fn load_ticks(&self, pool: &PoolId) -> Result<Option<Vec<Tick>>>;

    async fn checkpoint(&self, chain: &ChainId) -> Result<Option<ChainCheckpoint>>;

    async fn set_checkpoint(&self, chain: &ChainId, last_block: u64) -> Result<()>;
}

#[async_trait]
pub trait PriceTickSink: Send + Sync {
    async fn record(&self, observation: &PriceObservation) -> Result<()>;
}

/// In-process store backing both traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pools: Mutex<HashMap<PoolId, Pool>>,
    edges: Mutex<Vec<EdgeRecord>>,
    ticks: Mutex<HashMap<PoolId, Vec<Tick>>>,
    checkpoints: Mutex<HashMap<ChainId, ChainCheckpoint>>,
    price_ticks: Mutex<Vec<PriceTickRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edges(&self) -> Vec<EdgeRecord> {
        self.edges.lock().clone()
    }

    pub fn price_ticks(&self) -> Vec<PriceTickRecord> {
        self.price_ticks.lock().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save_pool(&self, pool: &Pool) -> Result<()> {
        self.pools.lock().insert(pool.pair.clone(), pool.clone());
        Ok(())
    }

    async fn load_pools(&self, chain: &ChainId) -> Result<Vec<Pool>> {
        Ok(self
            .pools
            .lock()
            .values()
            .filter(|pool| &pool.chain == chain)
            .cloned()
            .collect())
    }

    async fn save_edges(&self, records: &[EdgeRecord]) -> Result<()> {
        let mut edges = self.edges.lock();
        for record in records {
            edges.retain(|existing| {
                !(existing.chain_id == record.chain_id
                    && existing.from_token == record.from_token
                    && existing.to_token == record.to_token
                    && existing.pool_id == record.pool_id)
            });
            edges.push(record.clone());
        }
        Ok(())
    }

    async fn save_ticks(&self, pool: &PoolId, ticks: &[Tick]) -> Result<()> {
        self.ticks.lock().insert(pool.clone(), ticks.to_vec());
        Ok(())
    }

    async fn load_ticks(&self, pool: &PoolId) -> Result<Option<Vec<Tick>>> {
        Ok(self.ticks.lock().get(pool).cloned())
    }

    async fn checkpoint(&self, chain: &ChainId) -> Result<Option<ChainCheckpoint>> {
        Ok(self.checkpoints.lock().get(chain).cloned())
    }

    async fn set_checkpoint(&self, chain: &ChainId, last_block: u64) -> Result<()> {
        self.checkpoints.lock().insert(
            chain.clone(),
            ChainCheckpoint {
                chain_id: chain.clone(),
                last_block,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl PriceTickSink for MemoryStore {
    async fn record(&self, observation: &PriceObservation) -> Result<()> {
        self.price_ticks.lock().push(PriceTickRecord::from(observation));
        Ok(())
    }
}
