//! # DEX Adapter Trait
//!
//! This module defines the abstraction used to read pools of one DEX protocol from a
//! chain. Discovery runs every configured adapter over the configured token list and
//! turns the [`DiscoveredPool`] values they return into graph edges.
//!
//! ## Adding a New DEX Protocol
//!
//! 1. Implement [`DexAdapter`] for the protocol.
//! 2. Add a [`DiscoveredPool`] variant if its state does not fit an existing one, and the
//!    matching edge model under `edges`.
//! 3. Build the adapter in the binary from its settings section.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;

use crate::graph::Pool;
use crate::tick_provider::Tick;
use crate::types::TokenId;

/// State of one pool as read at discovery time.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveredPool {
    /// Uniswap V2 style pair. Reserves follow the pool's own token0/token1 order.
    ConstantProduct {
        pool: Pool,
        reserve0: U256,
        reserve1: U256,
    },
    /// Uniswap V3 style pool with its initialized ticks.
    ConcentratedLiquidity {
        pool: Pool,
        fee: u32,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
        tick_spacing: i32,
        ticks: Vec<Tick>,
    },
}

impl DiscoveredPool {
    pub fn pool(&self) -> &Pool {
        match self {
            DiscoveredPool::ConstantProduct { pool, .. } => pool,
            DiscoveredPool::ConcentratedLiquidity { pool, .. } => pool,
        }
    }
}

/// The main trait for all DEX protocol adapters.
///
/// Adapters must be `Send + Sync` so discovery can hold them as trait objects.
#[async_trait]
pub trait DexAdapter: Send + Sync {
    /// Protocol name, used in logs and metric labels.
    fn name(&self) -> &str;

    /// Finds every pool among `tokens` and reads its current state.
    ///
    /// `fee_tiers` is only meaningful for fee-tiered protocols. A pool that fails to load is
    /// logged and left out; an error means the adapter could not run at all.
    async fn discover(&self, tokens: &[TokenId], fee_tiers: &[u32]) -> Result<Vec<DiscoveredPool>>;
}

/// Every unordered pair of distinct tokens, in input order. Repeated tokens are ignored.
pub fn token_pairs(tokens: &[TokenId]) -> Vec<(&TokenId, &TokenId)> {
    let mut unique: Vec<&TokenId> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !unique.contains(&token) {
            unique.push(token);
        }
    }

    let mut pairs = Vec::new();
    for (i, a) in unique.iter().enumerate() {
        for b in &unique[i + 1..] {
            pairs.push((*a, *b));
        }
    }
    pairs
}
