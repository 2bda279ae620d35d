//! # Edge Models
//!
//! Directed pricing relationships between two tokens through one pool on one chain.
//!
//! Every variant implements [`PricingEdge`]:
//!
//! - `compute_exact_amount_out` is pure and never mutates the edge
//! - `update_edge` is the only mutation path and is driven by a chain log
//! - `export` produces the persisted snapshot
//!
//! [`Edge`] is the sum type stored in the routing graph. Cloning an edge is the deep copy
//! used for copy-on-write updates; tick providers are immutable and shared behind `Arc`.

pub mod bridge;
pub mod concentrated;
pub mod constant_product;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethers::types::{Log, H256, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use bridge::BridgeEdge;
pub use concentrated::{ConcentratedLiquidityEdge, ConcentratedLiquiditySnapshot, SwapError};
pub use constant_product::ConstantProductEdge;

use crate::tick_provider::{TickListDataProvider, TickProviderError};
use crate::types::conversions::{u256_dec, ConversionError};
use crate::types::{ChainId, TokenId};
use crate::v3_math::tick_spacing_for_fee;

/// `Sync(uint112,uint112)` emitted by constant-product pairs.
pub static SYNC_TOPIC: Lazy<H256> = Lazy::new(|| H256::from(keccak256("Sync(uint112,uint112)")));

/// `Swap(address,address,int256,int256,uint160,uint128,int24)` emitted by V3 pools.
pub static SWAP_V3_TOPIC: Lazy<H256> = Lazy::new(|| {
    H256::from(keccak256(
        "Swap(address,address,int256,int256,uint160,uint128,int24)",
    ))
});

#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("malformed {event} log: {source}")]
    MalformedLog {
        event: &'static str,
        #[source]
        source: ConversionError,
    },
    #[error("malformed concentrated-liquidity snapshot for fee {fee}: {source}")]
    MalformedSnapshot {
        fee: u32,
        #[source]
        source: ConversionError,
    },
    #[error("concentrated-liquidity snapshot for fee {0} has no tick data")]
    MissingTicks(u32),
    #[error("fee tier {0} has no tick spacing")]
    UnknownFeeTier(u32),
    #[error(transparent)]
    Ticks(#[from] TickProviderError),
}

/// Per-chain parameters an edge needs when applying a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateContext {
    pub chain: ChainId,
    /// Input used to compute the observed price after each update.
    pub reference_amount: U256,
    pub sync_topic: H256,
    pub swap_topic: H256,
}

impl UpdateContext {
    pub fn new(chain: ChainId, reference_amount: U256) -> Self {
        Self {
            chain,
            reference_amount,
            sync_topic: *SYNC_TOPIC,
            swap_topic: *SWAP_V3_TOPIC,
        }
    }

    pub fn with_topics(mut self, sync_topic: H256, swap_topic: H256) -> Self {
        self.sync_topic = sync_topic;
        self.swap_topic = swap_topic;
        self
    }
}

/// Price-tick observation produced by a state-changing log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub token_in: TokenId,
    pub token_out: TokenId,
    pub chain: ChainId,
    #[serde(with = "u256_dec")]
    pub amount_in: U256,
    #[serde(with = "u256_dec")]
    pub amount_out: U256,
    /// amount_out / amount_in in raw token units
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(
        token_in: TokenId,
        token_out: TokenId,
        chain: ChainId,
        amount_in: U256,
        amount_out: U256,
    ) -> Self {
        Self {
            token_in,
            token_out,
            chain,
            amount_in,
            amount_out,
            price: ratio(amount_out, amount_in),
            observed_at: Utc::now(),
        }
    }
}

/// Capability set shared by all edge variants.
pub trait PricingEdge {
    /// Exact output for `amount_in`; zero when the edge cannot price the input.
    fn compute_exact_amount_out(&self, amount_in: U256) -> U256;

    /// Applies a chain log. Returns `Ok(None)` without touching state when the log is not
    /// this variant's event.
    fn update_edge(
        &mut self,
        log: &Log,
        ctx: &UpdateContext,
    ) -> Result<Option<PriceObservation>, EdgeError>;

    /// Advisory price impact as a fraction in `[0, 1]`.
    fn compute_price_impact(&self, amount_in: U256) -> f64;

    fn export(&self) -> EdgeSnapshot;

    /// Cached exchange rate, 0 when the variant does not track one.
    fn weight(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    ConstantProduct(ConstantProductEdge),
    ConcentratedLiquidity(ConcentratedLiquidityEdge),
    Bridge(BridgeEdge),
}

/// Serialized edge state, stored as `edge_data` by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSnapshot {
    ConstantProduct(ConstantProductEdge),
    ConcentratedLiquidity(ConcentratedLiquiditySnapshot),
    Bridge(BridgeEdge),
}

impl EdgeSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl Edge {
    pub fn kind(&self) -> &'static str {
        match self {
            Edge::ConstantProduct(_) => "constant_product",
            Edge::ConcentratedLiquidity(_) => "concentrated_liquidity",
            Edge::Bridge(_) => "bridge",
        }
    }

    /// Rebuilds an edge from its snapshot. Concentrated-liquidity edges need the pool's
    /// tick provider, which is persisted separately.
    pub fn from_snapshot(
        snapshot: EdgeSnapshot,
        ticks: Option<Arc<TickListDataProvider>>,
    ) -> Result<Self, EdgeError> {
        match snapshot {
            EdgeSnapshot::ConstantProduct(edge) => Ok(Edge::ConstantProduct(edge)),
            EdgeSnapshot::Bridge(edge) => Ok(Edge::Bridge(edge)),
            EdgeSnapshot::ConcentratedLiquidity(state) => {
                let ticks = match ticks {
                    Some(ticks) => ticks,
                    None => {
                        let spacing = tick_spacing_for_fee(state.fee)
                            .ok_or(EdgeError::UnknownFeeTier(state.fee))?;
                        if state.liquidity != 0 {
                            return Err(EdgeError::MissingTicks(state.fee));
                        }
                        Arc::new(TickListDataProvider::empty(spacing)?)
                    }
                };
                Ok(Edge::ConcentratedLiquidity(
                    ConcentratedLiquidityEdge::from_snapshot(state, ticks)?,
                ))
            }
        }
    }
}

impl PricingEdge for Edge {
    fn compute_exact_amount_out(&self, amount_in: U256) -> U256 {
        match self {
            Edge::ConstantProduct(edge) => edge.compute_exact_amount_out(amount_in),
            Edge::ConcentratedLiquidity(edge) => edge.compute_exact_amount_out(amount_in),
            Edge::Bridge(edge) => edge.compute_exact_amount_out(amount_in),
        }
    }

    fn update_edge(
        &mut self,
        log: &Log,
        ctx: &UpdateContext,
    ) -> Result<Option<PriceObservation>, EdgeError> {
        match self {
            Edge::ConstantProduct(edge) => edge.update_edge(log, ctx),
            Edge::ConcentratedLiquidity(edge) => edge.update_edge(log, ctx),
            Edge::Bridge(edge) => edge.update_edge(log, ctx),
        }
    }

    fn compute_price_impact(&self, amount_in: U256) -> f64 {
        match self {
            Edge::ConstantProduct(edge) => edge.compute_price_impact(amount_in),
            Edge::ConcentratedLiquidity(edge) => edge.compute_price_impact(amount_in),
            Edge::Bridge(edge) => edge.compute_price_impact(amount_in),
        }
    }

    fn export(&self) -> EdgeSnapshot {
        match self {
            Edge::ConstantProduct(edge) => edge.export(),
            Edge::ConcentratedLiquidity(edge) => edge.export(),
            Edge::Bridge(edge) => edge.export(),
        }
    }

    fn weight(&self) -> f64 {
        match self {
            Edge::ConstantProduct(edge) => edge.weight(),
            Edge::ConcentratedLiquidity(edge) => edge.weight(),
            Edge::Bridge(edge) => edge.weight(),
        }
    }
}

impl From<ConstantProductEdge> for Edge {
    fn from(edge: ConstantProductEdge) -> Self {
        Edge::ConstantProduct(edge)
    }
}

impl From<ConcentratedLiquidityEdge> for Edge {
    fn from(edge: ConcentratedLiquidityEdge) -> Self {
        Edge::ConcentratedLiquidity(edge)
    }
}

impl From<BridgeEdge> for Edge {
    fn from(edge: BridgeEdge) -> Self {
        Edge::Bridge(edge)
    }
}

/// True when the log's first topic equals `topic`.
pub(crate) fn has_topic(log: &Log, topic: H256) -> bool {
    log.topics.first() == Some(&topic)
}

/// Lossy `numerator / denominator`, 0 for a zero denominator.
pub(crate) fn ratio(numerator: U256, denominator: U256) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    crate::v3_math::u256_to_f64(numerator) / crate::v3_math::u256_to_f64(denominator)
}
