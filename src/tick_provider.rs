//! Sparse initialized-tick storage for concentrated-liquidity pools.
//!
//! A pool's initialized ticks are collected once at discovery (bitmap scan or snapshot)
//! and kept sorted. The swap loop only needs two queries: the liquidity net of a tick and
//! the next initialized tick inside the current 256-tick bitmap word.

use serde::{Deserialize, Serialize};

use crate::types::conversions::{i128_dec, u128_dec};

/// One initialized tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub index: i32,
    #[serde(with = "u128_dec")]
    pub liquidity_gross: u128,
    #[serde(with = "i128_dec")]
    pub liquidity_net: i128,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickProviderError {
    #[error("tick spacing must be positive, got {0}")]
    InvalidSpacing(i32),
    #[error("tick {index} is not a multiple of spacing {spacing}")]
    NotOnSpacing { index: i32, spacing: i32 },
    #[error("ticks are not sorted and unique around index {0}")]
    Unsorted(i32),
    #[error("liquidity net of all ticks sums to {0}, expected zero")]
    NonZeroNet(i128),
}

/// Sorted tick list answering `next_initialized_tick_within_one_word` by binary search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickListDataProvider {
    ticks: Vec<Tick>,
    tick_spacing: i32,
}

impl TickListDataProvider {
    /// Validates and stores the tick list. Input order does not matter.
    pub fn new(mut ticks: Vec<Tick>, tick_spacing: i32) -> Result<Self, TickProviderError> {
        if tick_spacing <= 0 {
            return Err(TickProviderError::InvalidSpacing(tick_spacing));
        }
        ticks.sort_by_key(|t| t.index);

        let mut net: i128 = 0;
        for (i, tick) in ticks.iter().enumerate() {
            if tick.index % tick_spacing != 0 {
                return Err(TickProviderError::NotOnSpacing {
                    index: tick.index,
                    spacing: tick_spacing,
                });
            }
            if i > 0 && ticks[i - 1].index == tick.index {
                return Err(TickProviderError::Unsorted(tick.index));
            }
            net = net.saturating_add(tick.liquidity_net);
        }
        if net != 0 {
            return Err(TickProviderError::NonZeroNet(net));
        }

        Ok(Self {
            ticks,
            tick_spacing,
        })
    }

    /// Provider with no initialized ticks; every query returns a word boundary.
    pub fn empty(tick_spacing: i32) -> Result<Self, TickProviderError> {
        Self::new(Vec::new(), tick_spacing)
    }

    pub fn tick_spacing(&self) -> i32 {
        self.tick_spacing
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Tick at `index`, or a zero-valued tick when it is not initialized.
    pub fn get_tick(&self, index: i32) -> Tick {
        match self.ticks.binary_search_by_key(&index, |t| t.index) {
            Ok(position) => self.ticks[position],
            Err(_) => Tick {
                index,
                ..Tick::default()
            },
        }
    }

    /// Nearest initialized tick in the bitmap word containing `tick`, searching toward
    /// −∞ when `lte` (token0 in) and toward +∞ otherwise. Falls back to the word boundary
    /// with `false` when the word has no initialized tick in that direction.
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        lte: bool,
        tick_spacing: i32,
    ) -> (i32, bool) {
        // word boundaries are computed in i64 so ticks near the i32 limits cannot overflow
        let spacing = i64::from(tick_spacing);
        let compressed = i64::from(tick).div_euclid(spacing);

        if lte {
            let word_pos = compressed >> 8;
            let minimum = saturate((word_pos << 8) * spacing);
            match self.last_at_or_below(tick) {
                Some(found) if found.index >= minimum => (found.index, true),
                _ => (minimum, false),
            }
        } else {
            let word_pos = (compressed + 1) >> 8;
            let maximum = saturate(((word_pos + 1) << 8) * spacing - 1);
            match self.first_above(tick) {
                Some(found) if found.index <= maximum => (found.index, true),
                _ => (maximum, false),
            }
        }
    }

    fn last_at_or_below(&self, tick: i32) -> Option<&Tick> {
        let split = self.ticks.partition_point(|t| t.index <= tick);
        split.checked_sub(1).map(|i| &self.ticks[i])
    }

    fn first_above(&self, tick: i32) -> Option<&Tick> {
        let split = self.ticks.partition_point(|t| t.index <= tick);
        self.ticks.get(split)
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
