use ethers::types::{Log, U256, U512};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{has_topic, ratio, EdgeError, EdgeSnapshot, PriceObservation, PricingEdge, UpdateContext};
use crate::types::conversions::{data_word, u256_dec};
use crate::types::TokenId;

/// x*y=k edge with the 0.3% fee taken from the input.
///
/// `token0`/`token1` and the reserves are stored in pool order; `zero_for_one` selects the
/// direction this edge prices (token0 in when true).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstantProductEdge {
    pub token0: TokenId,
    pub token1: TokenId,
    #[serde(with = "u256_dec")]
    pub reserve0: U256,
    #[serde(with = "u256_dec")]
    pub reserve1: U256,
    pub zero_for_one: bool,
}

impl ConstantProductEdge {
    pub fn new(
        token0: TokenId,
        token1: TokenId,
        reserve0: U256,
        reserve1: U256,
        zero_for_one: bool,
    ) -> Self {
        Self {
            token0,
            token1,
            reserve0,
            reserve1,
            zero_for_one,
        }
    }

    /// Both directions of one pool built from the same raw reserves: (token0→token1, token1→token0).
    pub fn pair(token0: TokenId, token1: TokenId, reserve0: U256, reserve1: U256) -> (Self, Self) {
        let forward = Self::new(token0.clone(), token1.clone(), reserve0, reserve1, true);
        let backward = Self::new(token0, token1, reserve0, reserve1, false);
        (forward, backward)
    }

    pub fn token_in(&self) -> &TokenId {
        if self.zero_for_one {
            &self.token0
        } else {
            &self.token1
        }
    }

    pub fn token_out(&self) -> &TokenId {
        if self.zero_for_one {
            &self.token1
        } else {
            &self.token0
        }
    }

    /// (reserve_in, reserve_out) for this edge's direction.
    pub fn oriented_reserves(&self) -> (U256, U256) {
        if self.zero_for_one {
            (self.reserve0, self.reserve1)
        } else {
            (self.reserve1, self.reserve0)
        }
    }
}

/// floor(amount_in * 997 * reserve_out / (reserve_in * 1000 + amount_in * 997)).
///
/// Evaluated in 512-bit space; returns zero for a zero denominator or an intermediate that
/// cannot be represented.
pub fn get_amount_out(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    let amount_in_with_fee = amount_in.full_mul(U256::from(997u64));
    let numerator = match amount_in_with_fee.checked_mul(U512::from(reserve_out)) {
        Some(value) => value,
        None => return U256::zero(),
    };
    let denominator = match reserve_in
        .full_mul(U256::from(1000u64))
        .checked_add(amount_in_with_fee)
    {
        Some(value) if !value.is_zero() => value,
        _ => return U256::zero(),
    };
    U256::try_from(numerator / denominator).unwrap_or_default()
}

impl PricingEdge for ConstantProductEdge {
    fn compute_exact_amount_out(&self, amount_in: U256) -> U256 {
        let (reserve_in, reserve_out) = self.oriented_reserves();
        get_amount_out(amount_in, reserve_in, reserve_out)
    }

    fn update_edge(
        &mut self,
        log: &Log,
        ctx: &UpdateContext,
    ) -> Result<Option<PriceObservation>, EdgeError> {
        if !has_topic(log, ctx.sync_topic) {
            return Ok(None);
        }

        let malformed = |source| EdgeError::MalformedLog {
            event: "Sync",
            source,
        };
        let reserve0 = data_word(&log.data, 0).map_err(malformed)?;
        let reserve1 = data_word(&log.data, 1).map_err(malformed)?;

        self.reserve0 = reserve0;
        self.reserve1 = reserve1;

        let amount_out = self.compute_exact_amount_out(ctx.reference_amount);
        if amount_out.is_zero() {
            debug!(
                "[ConstantProduct] Zero output after Sync, {} -> {} on {}",
                self.token_in(),
                self.token_out(),
                ctx.chain
            );
        }
        trace!(
            "[ConstantProduct] Sync applied: reserve0={} reserve1={}",
            reserve0,
            reserve1
        );

        Ok(Some(PriceObservation::new(
            self.token_in().clone(),
            self.token_out().clone(),
            ctx.chain.clone(),
            ctx.reference_amount,
            amount_out,
        )))
    }

    fn compute_price_impact(&self, amount_in: U256) -> f64 {
        let (reserve_in, reserve_out) = self.oriented_reserves();
        let spot = ratio(reserve_out, reserve_in);
        if spot <= 0.0 || amount_in.is_zero() {
            return 0.0;
        }
        let execution = ratio(self.compute_exact_amount_out(amount_in), amount_in);
        (1.0 - execution / spot).clamp(0.0, 1.0)
    }

    fn export(&self) -> EdgeSnapshot {
        EdgeSnapshot::ConstantProduct(self.clone())
    }

    fn weight(&self) -> f64 {
        0.0
    }
}
