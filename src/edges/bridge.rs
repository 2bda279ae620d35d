use ethers::types::{Log, U256};
use serde::{Deserialize, Serialize};

use super::{EdgeError, EdgeSnapshot, PriceObservation, PricingEdge, UpdateContext};
use crate::types::TokenId;

/// 1:1 transfer of the same asset between two chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEdge {
    pub token0: TokenId,
    pub token1: TokenId,
}

impl BridgeEdge {
    pub fn new(token0: TokenId, token1: TokenId) -> Self {
        Self { token0, token1 }
    }
}

impl PricingEdge for BridgeEdge {
    fn compute_exact_amount_out(&self, amount_in: U256) -> U256 {
        amount_in
    }

    // Bridges carry no on-chain state to refresh.
    fn update_edge(
        &mut self,
        _log: &Log,
        _ctx: &UpdateContext,
    ) -> Result<Option<PriceObservation>, EdgeError> {
        Ok(None)
    }

    fn compute_price_impact(&self, _amount_in: U256) -> f64 {
        0.0
    }

    fn export(&self) -> EdgeSnapshot {
        EdgeSnapshot::Bridge(self.clone())
    }

    fn weight(&self) -> f64 {
        0.0
    }
}
