// UniswapV3 math, bit-exact with TickMath / SqrtPriceMath / SwapMath / FullMath
use ethers::types::{I256, U256, U512};

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]); // sqrt(1.0001^-887272) * 2^96
pub const MAX_SQRT_RATIO: U256 = U256([6743328256752651558, 17280870778742802505, 4294805859, 0]); // sqrt(1.0001^887272) * 2^96

/// Q96 fixed point constant (2^96)
pub const Q96: U256 = U256([0, 4294967296, 0, 0]);

/// Fee denominator: fees are expressed in hundredths of a bip
pub const FEE_MAX: u32 = 1_000_000;

// (mask, factor) ladder from TickMath.getSqrtRatioAtTick, factors in Q128.128
const SQRT_RATIO_FACTORS: [(u32, u128); 19] = [
    (0x2, 0xfff97272373d413259a46990580e213a),
    (0x4, 0xfff2e50f5f656932ef12357cf3c7fdcc),
    (0x8, 0xffe5caca7e10e4e61c3624eaa0941cd0),
    (0x10, 0xffcb9843d60f6159c9db58835c926644),
    (0x20, 0xff973b41fa98c081472e6896dfb254c0),
    (0x40, 0xff2ea16466c96a3843ec78b326b52861),
    (0x80, 0xfe5dee046a99a2a811c461f1969c3053),
    (0x100, 0xfcbe86c7900a88aedcffc83b479aa3a4),
    (0x200, 0xf987a7253ac413176f2b074cf7815e54),
    (0x400, 0xf3392b0822b70005940c7a398e4b70f3),
    (0x800, 0xe7159475a2c29b7443b29c7fa6e889d9),
    (0x1000, 0xd097f3bdfd2022b8845ad8f792aa5825),
    (0x2000, 0xa9f746462d870fdf8a65dc1f90e061e5),
    (0x4000, 0x70d869a156d2a1b890bb3df62baf32f7),
    (0x8000, 0x31be135f97d08fd981231505542fcfa6),
    (0x10000, 0x9aa508b5b7a84e1c677de54f3e99bc9),
    (0x20000, 0x5d6af8dedb81196699c329225ee604),
    (0x40000, 0x2216e584f5fa1ea926041bedfe98),
    (0x80000, 0x48a170391f7dc42444e8fa2),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("result does not fit in 256 bits")]
    Overflow,
    #[error("arithmetic underflow")]
    Underflow,
    #[error("tick {0} outside [-887272, 887272]")]
    TickOutOfBounds(i32),
    #[error("sqrt price {0} outside [MIN_SQRT_RATIO, MAX_SQRT_RATIO)")]
    SqrtPriceOutOfBounds(U256),
    #[error("liquidity is zero")]
    ZeroLiquidity,
    #[error("sqrt price is zero")]
    ZeroPrice,
    #[error("next sqrt price leaves the representable range")]
    PriceOverflow,
    #[error("liquidity delta {delta} cannot be applied to {liquidity}")]
    LiquidityDelta { liquidity: u128, delta: i128 },
}

/// Standard tick spacing for a fee tier, `None` for tiers without one.
pub fn tick_spacing_for_fee(fee: u32) -> Option<i32> {
    match fee {
        100 => Some(1),
        500 => Some(10),
        3000 => Some(60),
        10000 => Some(200),
        _ => None,
    }
}

fn narrow(value: U512) -> Result<U256, MathError> {
    U256::try_from(value).map_err(|_| MathError::Overflow)
}

/// floor(a * b / denominator) with a full 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    narrow(a.full_mul(b) / U512::from(denominator))
}

/// ceil(a * b / denominator) with a full 512-bit intermediate product.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.full_mul(b);
    let denominator = U512::from(denominator);
    let mut quotient = product / denominator;
    if !(product % denominator).is_zero() {
        quotient += U512::one();
    }
    narrow(quotient)
}

/// LiquidityMath.addDelta
pub fn add_delta(liquidity: u128, delta: i128) -> Result<u128, MathError> {
    let next = if delta < 0 {
        liquidity.checked_sub(delta.unsigned_abs())
    } else {
        liquidity.checked_add(delta as u128)
    };
    next.ok_or(MathError::LiquidityDelta { liquidity, delta })
}

/// sqrt(1.0001^tick) * 2^96, rounded up.
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Result<U256, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfBounds(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        U256::one() << 128
    };
    for (mask, factor) in SQRT_RATIO_FACTORS {
        if abs_tick & mask != 0 {
            ratio = narrow(ratio.full_mul(U256::from(factor)) >> 128)?;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up
    let remainder = ratio & U256::from(u32::MAX);
    let mut sqrt_price = ratio >> 32;
    if !remainder.is_zero() {
        sqrt_price += U256::one();
    }
    Ok(sqrt_price)
}

/// Greatest tick whose sqrt ratio is <= `sqrt_price_x96`.
///
/// Binary search over the exact forward ladder; monotonic and bit-compatible with
/// TickMath.getTickAtSqrtRatio over the valid domain.
pub fn get_tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32, MathError> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 >= MAX_SQRT_RATIO {
        return Err(MathError::SqrtPriceOutOfBounds(sqrt_price_x96));
    }

    let mut low = MIN_TICK;
    let mut high = MAX_TICK;
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if get_sqrt_ratio_at_tick(mid)? <= sqrt_price_x96 {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Ok(low)
}

/// Amount of token0 between two sqrt prices for the given liquidity.
pub fn get_amount0_delta(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        std::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }
    if sqrt_ratio_a_x96.is_zero() {
        return Err(MathError::ZeroPrice);
    }

    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = sqrt_ratio_b_x96 - sqrt_ratio_a_x96;

    if round_up {
        let inner = mul_div_rounding_up(numerator1, numerator2, sqrt_ratio_b_x96)?;
        mul_div_rounding_up(inner, U256::one(), sqrt_ratio_a_x96)
    } else {
        Ok(mul_div(numerator1, numerator2, sqrt_ratio_b_x96)? / sqrt_ratio_a_x96)
    }
}

/// Amount of token1 between two sqrt prices for the given liquidity.
pub fn get_amount1_delta(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        std::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }
    let liquidity = U256::from(liquidity);
    let delta = sqrt_ratio_b_x96 - sqrt_ratio_a_x96;
    if round_up {
        mul_div_rounding_up(liquidity, delta, Q96)
    } else {
        mul_div(liquidity, delta, Q96)
    }
}

fn get_next_sqrt_price_from_amount0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    if amount.is_zero() {
        return Ok(sqrt_price_x96);
    }
    let numerator1 = U256::from(liquidity) << 96;
    let (product, _) = amount.overflowing_mul(sqrt_price_x96);
    let product_fits = product / amount == sqrt_price_x96;

    if add {
        if product_fits {
            let (denominator, _) = numerator1.overflowing_add(product);
            if denominator >= numerator1 {
                return mul_div_rounding_up(numerator1, sqrt_price_x96, denominator);
            }
        }
        // numerator1 / (numerator1 / sqrtP + amount), rounded up
        let denominator = U512::from(numerator1 / sqrt_price_x96) + U512::from(amount);
        let numerator = U512::from(numerator1);
        narrow((numerator + denominator - U512::one()) / denominator)
    } else {
        if !product_fits || numerator1 <= product {
            return Err(MathError::PriceOverflow);
        }
        mul_div_rounding_up(numerator1, sqrt_price_x96, numerator1 - product)
    }
}

fn get_next_sqrt_price_from_amount1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    let liquidity = U256::from(liquidity);
    if add {
        let quotient = mul_div(amount, Q96, liquidity)?;
        sqrt_price_x96
            .checked_add(quotient)
            .ok_or(MathError::PriceOverflow)
    } else {
        let quotient = mul_div_rounding_up(amount, Q96, liquidity)?;
        if sqrt_price_x96 <= quotient {
            return Err(MathError::PriceOverflow);
        }
        Ok(sqrt_price_x96 - quotient)
    }
}

/// Next sqrt price after adding `amount_in` of the input token.
pub fn get_next_sqrt_price_from_input(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price_x96.is_zero() {
        return Err(MathError::ZeroPrice);
    }
    if liquidity == 0 {
        return Err(MathError::ZeroLiquidity);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_in, true)
    }
}

/// Next sqrt price after removing `amount_out` of the output token.
pub fn get_next_sqrt_price_from_output(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price_x96.is_zero() {
        return Err(MathError::ZeroPrice);
    }
    if liquidity == 0 {
        return Err(MathError::ZeroLiquidity);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_out, false)
    }
}

/// Outcome of one swap step within a single initialized-tick range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_ratio_next_x96: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_amount: U256,
}

/// SwapMath.computeSwapStep. A non-negative `amount_remaining` is exact input, a negative one
/// exact output.
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: I256,
    fee_pips: u32,
) -> Result<SwapStep, MathError> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let exact_in = !amount_remaining.is_negative();
    let remaining = amount_remaining.unsigned_abs();
    let fee = U256::from(fee_pips);
    let fee_complement = U256::from(FEE_MAX.saturating_sub(fee_pips));

    let mut amount_in = U256::zero();
    let mut amount_out = U256::zero();
    let sqrt_ratio_next_x96;

    if exact_in {
        let remaining_less_fee = mul_div(remaining, fee_complement, U256::from(FEE_MAX))?;
        amount_in = if zero_for_one {
            get_amount0_delta(sqrt_ratio_target_x96, sqrt_ratio_current_x96, liquidity, true)?
        } else {
            get_amount1_delta(sqrt_ratio_current_x96, sqrt_ratio_target_x96, liquidity, true)?
        };
        sqrt_ratio_next_x96 = if remaining_less_fee >= amount_in {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                remaining_less_fee,
                zero_for_one,
            )?
        };
    } else {
        amount_out = if zero_for_one {
            get_amount1_delta(sqrt_ratio_target_x96, sqrt_ratio_current_x96, liquidity, false)?
        } else {
            get_amount0_delta(sqrt_ratio_current_x96, sqrt_ratio_target_x96, liquidity, false)?
        };
        sqrt_ratio_next_x96 = if remaining >= amount_out {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                remaining,
                zero_for_one,
            )?
        };
    }

    let reached_target = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    if zero_for_one {
        if !(reached_target && exact_in) {
            amount_in =
                get_amount0_delta(sqrt_ratio_next_x96, sqrt_ratio_current_x96, liquidity, true)?;
        }
        if !(reached_target && !exact_in) {
            amount_out =
                get_amount1_delta(sqrt_ratio_next_x96, sqrt_ratio_current_x96, liquidity, false)?;
        }
    } else {
        if !(reached_target && exact_in) {
            amount_in =
                get_amount1_delta(sqrt_ratio_current_x96, sqrt_ratio_next_x96, liquidity, true)?;
        }
        if !(reached_target && !exact_in) {
            amount_out =
                get_amount0_delta(sqrt_ratio_current_x96, sqrt_ratio_next_x96, liquidity, false)?;
        }
    }

    // cap the output amount to not exceed the remaining output amount
    if !exact_in && amount_out > remaining {
        amount_out = remaining;
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        // the remainder of the maximum input is taken as fee
        remaining
            .checked_sub(amount_in)
            .ok_or(MathError::Underflow)?
    } else {
        mul_div_rounding_up(amount_in, fee, fee_complement)?
    };

    Ok(SwapStep {
        sqrt_ratio_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}

/// (sqrtPriceX96 / 2^96)^2 as f64, the spot price of token0 in token1.
pub fn sqrt_price_to_price(sqrt_price_x96: U256) -> f64 {
    let q96 = 2f64.powi(96);
    let sqrt_price = u256_to_f64(sqrt_price_x96) / q96;
    sqrt_price * sqrt_price
}

/// Lossy conversion used for advisory ratios only.
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0f64, |acc, limb| acc * 18446744073709551616f64 + *limb as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(value: &str) -> U256 {
        U256::from_dec_str(value).unwrap()
    }

    #[test]
    fn sqrt_ratio_at_tick_bounds_and_known_values() {
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
        assert_eq!(get_sqrt_ratio_at_tick(0).unwrap(), Q96);
        assert_eq!(
            get_sqrt_ratio_at_tick(1).unwrap(),
            u("79232123823359799118286999568")
        );
        assert_eq!(
            get_sqrt_ratio_at_tick(-1).unwrap(),
            u("79224201403219477170569942574")
        );
        assert_eq!(
            get_sqrt_ratio_at_tick(-60).unwrap(),
            u("78990846045029531151608375686")
        );
        assert_eq!(
            get_sqrt_ratio_at_tick(200000).unwrap(),
            u("1744244129640337381386292603617838")
        );
        assert_eq!(get_sqrt_ratio_at_tick(-887271).unwrap(), u("4295343490"));
    }

    #[test]
    fn sqrt_ratio_rejects_out_of_range_ticks() {
        assert_eq!(
            get_sqrt_ratio_at_tick(MAX_TICK + 1),
            Err(MathError::TickOutOfBounds(MAX_TICK + 1))
        );
        assert!(get_sqrt_ratio_at_tick(MIN_TICK - 1).is_err());
    }

    #[test]
    fn tick_at_sqrt_ratio_is_floor_inverse() {
        assert_eq!(get_tick_at_sqrt_ratio(MIN_SQRT_RATIO).unwrap(), MIN_TICK);
        assert_eq!(
            get_tick_at_sqrt_ratio(MAX_SQRT_RATIO - U256::one()).unwrap(),
            MAX_TICK - 1
        );
        assert_eq!(get_tick_at_sqrt_ratio(Q96).unwrap(), 0);

        let at_minus_60 = get_sqrt_ratio_at_tick(-60).unwrap();
        assert_eq!(get_tick_at_sqrt_ratio(at_minus_60).unwrap(), -60);
        assert_eq!(get_tick_at_sqrt_ratio(at_minus_60 + U256::one()).unwrap(), -60);
        assert_eq!(get_tick_at_sqrt_ratio(at_minus_60 - U256::one()).unwrap(), -61);

        assert!(get_tick_at_sqrt_ratio(MAX_SQRT_RATIO).is_err());
        assert!(get_tick_at_sqrt_ratio(MIN_SQRT_RATIO - U256::one()).is_err());
    }

    #[test]
    fn mul_div_keeps_full_precision() {
        // (2^255 * 4) / 8 overflows 256 bits in the product but not in the result
        let big = U256::one() << 255;
        assert_eq!(
            mul_div(big, U256::from(4), U256::from(8)).unwrap(),
            U256::one() << 254
        );
        assert_eq!(
            mul_div(U256::MAX, U256::MAX, U256::MAX).unwrap(),
            U256::MAX
        );
        assert_eq!(
            mul_div(U256::MAX, U256::from(2), U256::one()),
            Err(MathError::Overflow)
        );
        assert_eq!(
            mul_div(U256::one(), U256::one(), U256::zero()),
            Err(MathError::DivisionByZero)
        );
    }

    #[test]
    fn mul_div_rounding_up_rounds_only_with_remainder() {
        assert_eq!(
            mul_div_rounding_up(U256::from(10), U256::from(10), U256::from(3)).unwrap(),
            U256::from(34)
        );
        assert_eq!(
            mul_div_rounding_up(U256::from(9), U256::from(10), U256::from(3)).unwrap(),
            U256::from(30)
        );
    }

    #[test]
    fn add_delta_checks_bounds() {
        assert_eq!(add_delta(10, -3).unwrap(), 7);
        assert_eq!(add_delta(10, 5).unwrap(), 15);
        assert!(add_delta(1, -2).is_err());
        assert!(add_delta(u128::MAX, 1).is_err());
    }

    #[test]
    fn amount_deltas_match_reference() {
        let lower = get_sqrt_ratio_at_tick(-60).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;
        assert_eq!(
            get_amount0_delta(lower, Q96, liquidity, true).unwrap(),
            u("3004354062741926")
        );
        assert_eq!(
            get_amount1_delta(lower, Q96, liquidity, false).unwrap(),
            u("2995354955910780")
        );
    }

    #[test]
    fn next_sqrt_price_from_input_moves_in_swap_direction() {
        let liquidity = 1_000_000_000_000_000_000u128;
        let amount = U256::from(1_000_000_000_000_000u64);
        assert_eq!(
            get_next_sqrt_price_from_input(Q96, liquidity, amount, true).unwrap(),
            u("79149013500763574019524425911")
        );
        assert_eq!(
            get_next_sqrt_price_from_input(Q96, liquidity, amount, false).unwrap(),
            u("79307390676778601931137494286")
        );
        assert_eq!(
            get_next_sqrt_price_from_input(Q96, 0, amount, true),
            Err(MathError::ZeroLiquidity)
        );
    }

    #[test]
    fn swap_step_exact_input_partial_range() {
        let target = get_sqrt_ratio_at_tick(-60).unwrap();
        let step = compute_swap_step(
            Q96,
            target,
            1_000_000_000_000_000_000,
            I256::from_raw(U256::from(1_000_000_000_000_000u64)),
            3000,
        )
        .unwrap();
        assert_eq!(step.sqrt_ratio_next_x96, u("79149250711305166342700278159"));
        assert_eq!(step.amount_in, u("997000000000000"));
        assert_eq!(step.amount_out, u("996006981039903"));
        assert_eq!(step.fee_amount, u("3000000000000"));
        assert_eq!(
            step.amount_in + step.fee_amount,
            U256::from(1_000_000_000_000_000u64)
        );
    }

    #[test]
    fn swap_step_exact_output_partial_range() {
        let target = get_sqrt_ratio_at_tick(60).unwrap();
        let step = compute_swap_step(
            Q96,
            target,
            1_000_000_000_000_000_000,
            -I256::from_raw(U256::from(1_000_000_000_000_000u64)),
            3000,
        )
        .unwrap();
        assert_eq!(step.sqrt_ratio_next_x96, u("79307469984248586179723674011"));
        assert_eq!(step.amount_in, u("1001001001001002"));
        assert_eq!(step.amount_out, u("1000000000000000"));
        assert_eq!(step.fee_amount, u("3012039120365"));
    }

    #[test]
    fn tick_spacings_cover_standard_tiers() {
        assert_eq!(tick_spacing_for_fee(500), Some(10));
        assert_eq!(tick_spacing_for_fee(3000), Some(60));
        assert_eq!(tick_spacing_for_fee(10000), Some(200));
        assert_eq!(tick_spacing_for_fee(1234), None);
    }
}
