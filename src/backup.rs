//! Bincode snapshot of the whole graph for cold starts without RPC.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::edges::Edge;
use crate::graph::{GraphError, GraphState, Pool, RoutingGraph};
use crate::persistence::{edge_records, EdgeRecord};
use crate::tick_provider::{Tick, TickListDataProvider};
use crate::types::conversions::u256_dec;
use crate::types::PoolId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub pool: PoolId,
    pub tick_spacing: i32,
    pub ticks: Vec<Tick>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFeeSnapshot {
    pub pool: PoolId,
    #[serde(with = "u256_dec")]
    pub fee: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphBackup {
    #[serde(with = "u256_dec")]
    pub default_fee: U256,
    pub pools: Vec<Pool>,
    pub edges: Vec<EdgeRecord>,
    pub ticks: Vec<TickSnapshot>,
    pub pool_fees: Vec<PoolFeeSnapshot>,
}

impl GraphBackup {
    pub fn capture(state: &GraphState) -> Result<Self> {
        Ok(Self {
            default_fee: state.default_fee(),
            pools: state.pools().cloned().collect(),
            edges: edge_records(state)?,
            ticks: state
                .tick_sets()
                .map(|(pool, provider)| TickSnapshot {
                    pool: pool.clone(),
                    tick_spacing: provider.tick_spacing(),
                    ticks: provider.ticks().to_vec(),
                })
                .collect(),
            pool_fees: state
                .pool_fees()
                .map(|(pool, fee)| PoolFeeSnapshot {
                    pool: pool.clone(),
                    fee: *fee,
                })
                .collect(),
        })
    }

    /// Rebuilds a graph state; tick sets are re-validated.
    pub fn into_state(self) -> Result<GraphState, GraphError> {
        let mut state = GraphState::new(self.default_fee);
        for pool in self.pools {
            state.new_pool(pool);
        }
        for snapshot in self.ticks {
            let provider = TickListDataProvider::new(snapshot.ticks, snapshot.tick_spacing)
                .map_err(|e| GraphError::Edge {
                    pool: snapshot.pool.clone(),
                    source: e.into(),
                })?;
            state.set_ticks(snapshot.pool, Arc::new(provider));
        }
        for fee in self.pool_fees {
            state.set_pool_fee(fee.pool, fee.fee);
        }
        for record in self.edges {
            let snapshot = record
                .snapshot()
                .map_err(|source| GraphError::CorruptSnapshot {
                    pool: record.pool_id.clone(),
                    source,
                })?;
            let ticks = state.ticks(&record.pool_id).cloned();
            let edge = Edge::from_snapshot(snapshot, ticks).map_err(|source| GraphError::Edge {
                pool: record.pool_id.clone(),
                source,
            })?;
            state.new_edge(
                record.from_token,
                record.to_token,
                record.pool_id,
                record.chain_id,
                edge,
            );
        }
        Ok(state)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create backup {}", path.display()))?;
        bincode::serialize_into(BufWriter::new(file), self).context("Failed to encode backup")?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open backup {}", path.display()))?;
        bincode::deserialize_from(BufReader::new(file)).context("Failed to decode backup")
    }
}

impl RoutingGraph {
    pub fn backup(&self) -> Result<GraphBackup> {
        GraphBackup::capture(&self.read())
    }

    /// Replaces the current state with the contents of `backup`.
    pub fn restore(&self, backup: GraphBackup) -> Result<()> {
        let state = backup.into_state()?;
        info!(
            "[Backup] Restored {} pools, {} edges",
            state.pool_count(),
            state.edge_count()
        );
        self.replace_state(state);
        Ok(())
    }
}
