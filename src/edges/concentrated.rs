use std::sync::Arc;

use ethers::types::{Log, I256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{has_topic, ratio, EdgeError, EdgeSnapshot, PriceObservation, PricingEdge, UpdateContext};
use crate::tick_provider::TickListDataProvider;
use crate::types::conversions::{
    data_word, i256_to_i32, signed_data_word, u128_dec, u256_dec, u256_to_u128, ConversionError,
};
use crate::types::TokenId;
use crate::v3_math::{
    self, add_delta, compute_swap_step, get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio,
    MathError, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("SqrtPriceLimitX96 too low")]
    SqrtPriceLimitTooLow,
    #[error("SqrtPriceLimitX96 too high")]
    SqrtPriceLimitTooHigh,
    #[error(transparent)]
    Math(#[from] MathError),
}

/// Final state of a simulated swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Negative for exact input (amount paid out), positive for exact output (amount paid in).
    pub amount_calculated: I256,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick: i32,
}

/// Concentrated-liquidity (Uniswap V3) edge.
///
/// Tokens are stored sorted; `zero_for_one` selects the direction this edge prices.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentratedLiquidityEdge {
    pub token0: TokenId,
    pub token1: TokenId,
    pub fee: u32,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick_current: i32,
    pub ticks: Arc<TickListDataProvider>,
    pub zero_for_one: bool,
    exchange_rate: Option<f64>,
}

/// Persisted form of a concentrated-liquidity edge; ticks are stored per pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcentratedLiquiditySnapshot {
    pub token0: TokenId,
    pub token1: TokenId,
    #[serde(rename = "sqrtRatioX96", with = "u256_dec")]
    pub sqrt_price_x96: U256,
    #[serde(with = "u128_dec")]
    pub liquidity: u128,
    pub tick_current: i32,
    pub fee: u32,
    pub zero_for_one: bool,
}

// Per-iteration bookkeeping of the swap loop
struct StepComputations {
    sqrt_price_start_x96: U256,
    tick_next: i32,
    initialized: bool,
    sqrt_price_next_x96: U256,
}

impl ConcentratedLiquidityEdge {
    /// Builds the edge for `token_a -> token_b`; tokens are sorted and the orientation derived.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token_a: TokenId,
        token_b: TokenId,
        fee: u32,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick_current: i32,
        ticks: Arc<TickListDataProvider>,
    ) -> Self {
        let zero_for_one = token_a.sorts_before(&token_b);
        let (token0, token1) = if zero_for_one {
            (token_a, token_b)
        } else {
            (token_b, token_a)
        };
        Self {
            token0,
            token1,
            fee,
            sqrt_price_x96,
            liquidity,
            tick_current,
            ticks,
            zero_for_one,
            exchange_rate: None,
        }
    }

    /// Both directions of one pool sharing the same state and tick provider.
    pub fn pair(
        token0: TokenId,
        token1: TokenId,
        fee: u32,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick_current: i32,
        ticks: Arc<TickListDataProvider>,
    ) -> (Self, Self) {
        let forward = Self::new(
            token0.clone(),
            token1.clone(),
            fee,
            sqrt_price_x96,
            liquidity,
            tick_current,
            ticks.clone(),
        );
        let backward = Self::new(
            token1,
            token0,
            fee,
            sqrt_price_x96,
            liquidity,
            tick_current,
            ticks,
        );
        (forward, backward)
    }

    pub fn from_snapshot(
        state: ConcentratedLiquiditySnapshot,
        ticks: Arc<TickListDataProvider>,
    ) -> Result<Self, EdgeError> {
        in_tick_range(state.tick_current).map_err(|source| EdgeError::MalformedSnapshot {
            fee: state.fee,
            source,
        })?;
        Ok(Self {
            token0: state.token0,
            token1: state.token1,
            fee: state.fee,
            sqrt_price_x96: state.sqrt_price_x96,
            liquidity: state.liquidity,
            tick_current: state.tick_current,
            ticks,
            zero_for_one: state.zero_for_one,
            exchange_rate: None,
        })
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

    pub fn tick_spacing(&self) -> i32 {
        self.ticks.tick_spacing()
    }

    /// Simulates the pool's swap loop from the current state without committing it.
    ///
    /// A non-negative `amount_specified` is exact input, a negative one exact output.
    /// `sqrt_price_limit_x96` defaults to one unit inside the price range bound.
    pub fn simulate_swap(
        &self,
        zero_for_one: bool,
        amount_specified: I256,
        sqrt_price_limit_x96: Option<U256>,
    ) -> Result<SwapOutcome, SwapError> {
        let sqrt_price_limit_x96 = sqrt_price_limit_x96.unwrap_or(if zero_for_one {
            MIN_SQRT_RATIO + U256::one()
        } else {
            MAX_SQRT_RATIO - U256::one()
        });

        if zero_for_one {
            if sqrt_price_limit_x96 <= MIN_SQRT_RATIO {
                return Err(SwapError::SqrtPriceLimitTooLow);
            }
            if sqrt_price_limit_x96 >= self.sqrt_price_x96 {
                return Err(SwapError::SqrtPriceLimitTooHigh);
            }
        } else {
            if sqrt_price_limit_x96 >= MAX_SQRT_RATIO {
                return Err(SwapError::SqrtPriceLimitTooHigh);
            }
            if sqrt_price_limit_x96 <= self.sqrt_price_x96 {
                return Err(SwapError::SqrtPriceLimitTooLow);
            }
        }

        let exact_input = !amount_specified.is_negative();
        let tick_spacing = self.tick_spacing();

        let mut amount_specified_remaining = amount_specified;
        let mut amount_calculated = I256::zero();
        let mut sqrt_price_x96 = self.sqrt_price_x96;
        let mut tick = self.tick_current;
        let mut liquidity = self.liquidity;

        while !amount_specified_remaining.is_zero() && sqrt_price_x96 != sqrt_price_limit_x96 {
            let (tick_next, initialized) =
                self.ticks
                    .next_initialized_tick_within_one_word(tick, zero_for_one, tick_spacing);
            let tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);
            let step = StepComputations {
                sqrt_price_start_x96: sqrt_price_x96,
                tick_next,
                initialized,
                sqrt_price_next_x96: get_sqrt_ratio_at_tick(tick_next)?,
            };

            let target = if zero_for_one {
                step.sqrt_price_next_x96.max(sqrt_price_limit_x96)
            } else {
                step.sqrt_price_next_x96.min(sqrt_price_limit_x96)
            };

            let swap_step = compute_swap_step(
                sqrt_price_x96,
                target,
                liquidity,
                amount_specified_remaining,
                self.fee,
            )?;
            sqrt_price_x96 = swap_step.sqrt_ratio_next_x96;

            if exact_input {
                let consumed = signed(swap_step.amount_in + swap_step.fee_amount)?;
                amount_specified_remaining = amount_specified_remaining
                    .checked_sub(consumed)
                    .ok_or(MathError::Overflow)?;
                amount_calculated = amount_calculated
                    .checked_sub(signed(swap_step.amount_out)?)
                    .ok_or(MathError::Overflow)?;
            } else {
                amount_specified_remaining = amount_specified_remaining
                    .checked_add(signed(swap_step.amount_out)?)
                    .ok_or(MathError::Overflow)?;
                let paid = signed(swap_step.amount_in + swap_step.fee_amount)?;
                amount_calculated = amount_calculated
                    .checked_add(paid)
                    .ok_or(MathError::Overflow)?;
            }

            if sqrt_price_x96 == step.sqrt_price_next_x96 {
                if step.initialized {
                    let mut liquidity_net = self.ticks.get_tick(step.tick_next).liquidity_net;
                    if zero_for_one {
                        liquidity_net = -liquidity_net;
                    }
                    liquidity = add_delta(liquidity, liquidity_net)?;
                }
                tick = if zero_for_one {
                    step.tick_next - 1
                } else {
                    step.tick_next
                };
            } else if sqrt_price_x96 != step.sqrt_price_start_x96 {
                tick = get_tick_at_sqrt_ratio(sqrt_price_x96)?;
            }
        }

        Ok(SwapOutcome {
            amount_calculated,
            sqrt_price_x96,
            liquidity,
            tick,
        })
    }

    fn spot_price(&self) -> f64 {
        let price = v3_math::sqrt_price_to_price(self.sqrt_price_x96);
        if self.zero_for_one {
            price
        } else if price > 0.0 {
            1.0 / price
        } else {
            0.0
        }
    }
}

fn in_tick_range(tick: i32) -> Result<i32, ConversionError> {
    if (MIN_TICK..=MAX_TICK).contains(&tick) {
        Ok(tick)
    } else {
        Err(ConversionError::TickOutOfRange(tick))
    }
}

fn signed(value: U256) -> Result<I256, MathError> {
    if value.bit(255) {
        return Err(MathError::Overflow);
    }
    Ok(I256::from_raw(value))
}

impl PricingEdge for ConcentratedLiquidityEdge {
    fn compute_exact_amount_out(&self, amount_in: U256) -> U256 {
        let amount_specified = match signed(amount_in) {
            Ok(amount) => amount,
            Err(_) => return U256::zero(),
        };
        match self.simulate_swap(self.zero_for_one, amount_specified, None) {
            Ok(outcome) if outcome.amount_calculated.is_negative() => {
                outcome.amount_calculated.unsigned_abs()
            }
            Ok(_) => U256::zero(),
            Err(err) => {
                debug!(
                    "[ConcentratedLiquidity] Err calculating amount out {} -> {}: {}",
                    self.token_in(),
                    self.token_out(),
                    err
                );
                U256::zero()
            }
        }
    }

    fn update_edge(
        &mut self,
        log: &Log,
        ctx: &UpdateContext,
    ) -> Result<Option<PriceObservation>, EdgeError> {
        if !has_topic(log, ctx.swap_topic) {
            return Ok(None);
        }

        let malformed = |source| EdgeError::MalformedLog {
            event: "Swap",
            source,
        };
        let sqrt_price_x96 = data_word(&log.data, 2).map_err(malformed)?;
        let liquidity = data_word(&log.data, 3)
            .and_then(u256_to_u128)
            .map_err(malformed)?;
        let tick = signed_data_word(&log.data, 4)
            .and_then(i256_to_i32)
            .and_then(in_tick_range)
            .map_err(malformed)?;

        self.sqrt_price_x96 = sqrt_price_x96;
        self.liquidity = liquidity;
        self.tick_current = tick;

        let amount_out = self.compute_exact_amount_out(ctx.reference_amount);
        self.exchange_rate = Some(ratio(amount_out, ctx.reference_amount));

        Ok(Some(PriceObservation::new(
            self.token_in().clone(),
            self.token_out().clone(),
            ctx.chain.clone(),
            ctx.reference_amount,
            amount_out,
        )))
    }

    fn compute_price_impact(&self, amount_in: U256) -> f64 {
        let spot = self.spot_price();
        if spot <= 0.0 || amount_in.is_zero() {
            return 0.0;
        }
        let execution = ratio(self.compute_exact_amount_out(amount_in), amount_in);
        (1.0 - execution / spot).clamp(0.0, 1.0)
    }

    fn export(&self) -> EdgeSnapshot {
        EdgeSnapshot::ConcentratedLiquidity(ConcentratedLiquiditySnapshot {
            token0: self.token0.clone(),
            token1: self.token1.clone(),
            sqrt_price_x96: self.sqrt_price_x96,
            liquidity: self.liquidity,
            tick_current: self.tick_current,
            fee: self.fee,
            zero_for_one: self.zero_for_one,
        })
    }

    fn weight(&self) -> f64 {
        self.exchange_rate.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::SWAP_V3_TOPIC;
    use crate::tick_provider::Tick;
    use crate::types::ChainId;
    use crate::v3_math::Q96;
    use ethers::types::Bytes;

    const E18: u128 = 1_000_000_000_000_000_000;

    fn ticks() -> Arc<TickListDataProvider> {
        let tick = |index: i32, net: i128| Tick {
            index,
            liquidity_gross: net.unsigned_abs(),
            liquidity_net: net,
        };
        Arc::new(
            TickListDataProvider::new(
                vec![
                    tick(-600, E18 as i128),
                    tick(-120, (E18 / 2) as i128),
                    tick(120, -((E18 / 2) as i128)),
                    tick(600, -(E18 as i128)),
                ],
                60,
            )
            .unwrap(),
        )
    }

    fn pool_at(tick: i32) -> (ConcentratedLiquidityEdge, ConcentratedLiquidityEdge) {
        ConcentratedLiquidityEdge::pair(
            "0xA".into(),
            "0xB".into(),
            3000,
            get_sqrt_ratio_at_tick(tick).unwrap(),
            E18 + E18 / 2,
            tick,
            ticks(),
        )
    }

    fn u(value: &str) -> U256 {
        U256::from_dec_str(value).unwrap()
    }

    #[test]
    fn pair_orients_by_sorted_tokens() {
        let (forward, backward) = pool_at(0);
        assert!(forward.zero_for_one);
        assert!(!backward.zero_for_one);
        assert_eq!(forward.token0, backward.token0);
        assert_eq!(backward.token_in().as_str(), "0xB");
    }

    #[test]
    fn exact_input_within_and_across_ticks() {
        let (forward, backward) = pool_at(0);
        let cases = [
            ("0", "0"),
            ("1", "0"),
            ("1000000000000", "996999337327"),
            ("1000000000000000", "996337767497203"),
            ("10000000000000000", "9903879361385374"),
            ("20000000000000000", "19640111211818619"),
            // runs through all liquidity to the price limit
            ("100000000000000000", "32543879759392000"),
            ("100000000000000000000", "32543879759392000"),
        ];
        for (amount_in, expected) in cases {
            assert_eq!(forward.compute_exact_amount_out(u(amount_in)), u(expected));
            assert_eq!(backward.compute_exact_amount_out(u(amount_in)), u(expected));
        }
    }

    #[test]
    fn exact_input_from_off_center_price() {
        let (forward, backward) = pool_at(30);
        assert_eq!(
            forward.compute_exact_amount_out(u("1000000000000000")),
            u("999330122549232")
        );
        assert_eq!(
            forward.compute_exact_amount_out(u("20000000000000000")),
            u("19712907586651711")
        );
        assert_eq!(
            backward.compute_exact_amount_out(u("1000000000000000")),
            u("993354371152721")
        );
        assert_eq!(
            backward.compute_exact_amount_out(u("20000000000000000")),
            u("19564326026028483")
        );
    }

    #[test]
    fn computing_output_is_idempotent() {
        let (forward, _) = pool_at(0);
        let before = forward.clone();
        let first = forward.compute_exact_amount_out(u("20000000000000000"));
        let second = forward.compute_exact_amount_out(u("20000000000000000"));
        assert_eq!(first, second);
        assert_eq!(forward, before);
    }

    #[test]
    fn price_limit_on_wrong_side_is_rejected() {
        let (forward, _) = pool_at(0);
        assert_eq!(
            forward.simulate_swap(true, I256::from_raw(U256::from(10)), Some(MIN_SQRT_RATIO)),
            Err(SwapError::SqrtPriceLimitTooLow)
        );
        assert_eq!(
            forward.simulate_swap(true, I256::from_raw(U256::from(10)), Some(Q96)),
            Err(SwapError::SqrtPriceLimitTooHigh)
        );
        assert_eq!(
            forward.simulate_swap(false, I256::from_raw(U256::from(10)), Some(Q96)),
            Err(SwapError::SqrtPriceLimitTooLow)
        );
    }

    #[test]
    fn pool_at_min_price_yields_zero_instead_of_error() {
        let edge = ConcentratedLiquidityEdge::new(
            "0xA".into(),
            "0xB".into(),
            3000,
            MIN_SQRT_RATIO,
            E18,
            MIN_TICK,
            ticks(),
        );
        assert_eq!(edge.compute_exact_amount_out(u("1000")), U256::zero());
    }

    #[test]
    fn swap_log_refreshes_state_and_weight() {
        let (mut forward, _) = pool_at(30);
        assert_eq!(forward.weight(), 0.0);

        let mut data = vec![0u8; 160];
        get_sqrt_ratio_at_tick(0)
            .unwrap()
            .to_big_endian(&mut data[64..96]);
        U256::from(E18 + E18 / 2).to_big_endian(&mut data[96..128]);
        let log = Log {
            topics: vec![*SWAP_V3_TOPIC],
            data: Bytes::from(data),
            ..Default::default()
        };
        let ctx = UpdateContext::new(ChainId::from("avalanche"), u("1000000000000000"));

        let observation = forward.update_edge(&log, &ctx).unwrap().unwrap();
        assert_eq!(forward.tick_current, 0);
        assert_eq!(forward.sqrt_price_x96, Q96);
        assert_eq!(observation.amount_out, u("996337767497203"));
        assert!((forward.weight() - 0.996337767497203).abs() < 1e-12);
    }

    #[test]
    fn swap_log_decodes_negative_tick() {
        let (mut forward, _) = pool_at(0);
        let mut data = vec![0u8; 160];
        let sqrt = get_sqrt_ratio_at_tick(-61).unwrap();
        sqrt.to_big_endian(&mut data[64..96]);
        U256::from(E18).to_big_endian(&mut data[96..128]);
        (-I256::from_raw(U256::from(61)))
            .into_raw()
            .to_big_endian(&mut data[128..160]);
        let log = Log {
            topics: vec![*SWAP_V3_TOPIC],
            data: Bytes::from(data),
            ..Default::default()
        };
        let ctx = UpdateContext::new(ChainId::from("avalanche"), u("1000"));
        forward.update_edge(&log, &ctx).unwrap();
        assert_eq!(forward.tick_current, -61);
        assert_eq!(forward.liquidity, E18);
    }

    fn swap_log_with_tick(tick: i32, sqrt_price_x96: U256) -> Log {
        let mut data = vec![0u8; 160];
        sqrt_price_x96.to_big_endian(&mut data[64..96]);
        U256::from(E18).to_big_endian(&mut data[96..128]);
        I256::from(tick).into_raw().to_big_endian(&mut data[128..160]);
        Log {
            topics: vec![*SWAP_V3_TOPIC],
            data: Bytes::from(data),
            ..Default::default()
        }
    }

    #[test]
    fn swap_log_with_tick_outside_range_is_rejected() {
        let ctx = UpdateContext::new(ChainId::from("avalanche"), u("1000"));
        for tick in [i32::MAX, MAX_TICK + 1, MIN_TICK - 1, i32::MIN] {
            let (_, mut backward) = pool_at(30);
            let before = backward.clone();
            let err = backward
                .update_edge(&swap_log_with_tick(tick, Q96), &ctx)
                .unwrap_err();
            assert!(matches!(
                err,
                EdgeError::MalformedLog {
                    event: "Swap",
                    source: ConversionError::TickOutOfRange(t),
                } if t == tick
            ));
            assert_eq!(backward, before);
        }
    }

    #[test]
    fn swap_log_at_range_bounds_is_accepted() {
        let ctx = UpdateContext::new(ChainId::from("avalanche"), u("1000"));
        for tick in [MIN_TICK, MAX_TICK] {
            let (mut forward, mut backward) = pool_at(0);
            let log = swap_log_with_tick(tick, get_sqrt_ratio_at_tick(tick).unwrap());
            forward.update_edge(&log, &ctx).unwrap();
            backward.update_edge(&log, &ctx).unwrap();
            assert_eq!(forward.tick_current, tick);
            assert_eq!(backward.tick_current, tick);
        }
    }

    #[test]
    fn snapshot_with_tick_outside_range_is_rejected() {
        let (forward, _) = pool_at(0);
        let EdgeSnapshot::ConcentratedLiquidity(mut state) = forward.export() else {
            panic!("expected a concentrated-liquidity snapshot");
        };
        state.tick_current = MAX_TICK + 1;
        assert!(matches!(
            ConcentratedLiquidityEdge::from_snapshot(state, ticks()),
            Err(EdgeError::MalformedSnapshot { fee: 3000, .. })
        ));
    }

    #[test]
    fn snapshot_roundtrip_keeps_state() {
        let (forward, _) = pool_at(30);
        let snapshot = forward.export();
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"sqrtRatioX96\""));
        assert!(json.contains("\"tickCurrent\":30"));
        let rebuilt = crate::edges::Edge::from_snapshot(
            crate::edges::EdgeSnapshot::from_json(&json).unwrap(),
            Some(ticks()),
        )
        .unwrap();
        assert_eq!(rebuilt, crate::edges::Edge::from(forward));
    }
}
