use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info, warn};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::contracts::{IUniswapV3Factory, IUniswapV3Pool};
use crate::dex_adapter::{token_pairs, DexAdapter, DiscoveredPool};
use crate::graph::Pool;
use crate::persistence::SnapshotStore;
use crate::settings::DiscoverySettings;
use crate::tick_provider::Tick;
use crate::types::conversions::checksum;
use crate::types::{ChainId, PoolId, TokenId};
use crate::v3_math::{tick_spacing_for_fee, MAX_TICK, MIN_TICK};

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Bitmap words that can hold initialized ticks for `tick_spacing`.
pub fn bitmap_word_range(tick_spacing: i32) -> std::ops::RangeInclusive<i16> {
    let first = MIN_TICK.div_euclid(tick_spacing) >> 8;
    let last = MAX_TICK.div_euclid(tick_spacing) >> 8;
    (first as i16)..=(last as i16)
}

/// Tick indexes flagged in one bitmap word.
pub fn initialized_ticks_in_word(word: i16, bitmap: U256, tick_spacing: i32) -> Vec<i32> {
    (0..256usize)
        .filter(|bit| bitmap.bit(*bit))
        .map(|bit| (i32::from(word) * 256 + bit as i32) * tick_spacing)
        .collect()
}

/// Concentrated-liquidity pools found through `getPool` for every fee tier.
///
/// Tick sets come from the snapshot store when present. Otherwise the whole tick bitmap is
/// scanned at the configured pace and the result is stored for the next start.
pub struct UniswapV3Adapter<M> {
    chain: ChainId,
    factories: Vec<Address>,
    client: Arc<M>,
    store: Arc<dyn SnapshotStore>,
    limiter: Option<DefaultDirectRateLimiter>,
    retry_delay: Duration,
    retries: usize,
}

impl<M: Middleware + 'static> UniswapV3Adapter<M> {
    pub fn new(
        chain: ChainId,
        factories: Vec<Address>,
        client: Arc<M>,
        store: Arc<dyn SnapshotStore>,
        settings: &DiscoverySettings,
    ) -> Self {
        let limiter = Quota::with_period(Duration::from_millis(settings.tick_pacing_ms))
            .map(RateLimiter::direct);
        Self {
            chain,
            factories,
            client,
            store,
            limiter,
            retry_delay: Duration::from_millis(settings.tick_retry_delay_ms),
            retries: settings.tick_fetch_retries,
        }
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.retry_delay).take(self.retries)
    }

    async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn load_pool(
        &self,
        factory: &IUniswapV3Factory<M>,
        token_a: Address,
        token_b: Address,
        fee: u32,
        tick_spacing: i32,
    ) -> Result<Option<DiscoveredPool>> {
        let address = factory
            .get_pool(token_a, token_b, fee)
            .call()
            .await
            .context("getPool failed")?;
        if address.is_zero() {
            return Ok(None);
        }

        let contract = IUniswapV3Pool::new(address, Arc::clone(&self.client));
        let token0 = contract.token_0().call().await.context("token0 failed")?;
        let token1 = contract.token_1().call().await.context("token1 failed")?;
        let pool_fee = contract.fee().call().await.context("fee failed")?;
        let (sqrt_price_x96, tick, _, _, _, _, _) =
            contract.slot_0().call().await.context("slot0 failed")?;
        let liquidity = contract.liquidity().call().await.context("liquidity failed")?;

        let pool_id = PoolId::from(address);
        let ticks = match self.store.load_ticks(&pool_id).await? {
            Some(stored) => {
                debug!("[UniswapV3] {} ticks of {} loaded from store", stored.len(), pool_id);
                stored
            }
            None => {
                let scanned = self.scan_ticks(&contract, tick_spacing).await?;
                self.store.save_ticks(&pool_id, &scanned).await?;
                scanned
            }
        };

        Ok(Some(DiscoveredPool::ConcentratedLiquidity {
            pool: Pool {
                token0: TokenId::from(token0),
                token1: TokenId::from(token1),
                pair: pool_id,
                factory: checksum(factory.address()),
                chain: self.chain.clone(),
            },
            fee: pool_fee,
            sqrt_price_x96,
            liquidity,
            tick,
            tick_spacing,
            ticks,
        }))
    }

    async fn scan_ticks(&self, contract: &IUniswapV3Pool<M>, tick_spacing: i32) -> Result<Vec<Tick>> {
        let mut ticks = Vec::new();
        for word in bitmap_word_range(tick_spacing) {
            self.pace().await;
            let bitmap = Retry::spawn(self.retry_strategy(), || {
                let call = contract.tick_bitmap(word);
                async move { call.call().await }
            })
            .await
            .with_context(|| format!("tickBitmap({}) failed", word))?;

            for index in initialized_ticks_in_word(word, bitmap, tick_spacing) {
                self.pace().await;
                let (liquidity_gross, liquidity_net, ..) = Retry::spawn(self.retry_strategy(), || {
                    let call = contract.ticks(index);
                    async move { call.call().await }
                })
                .await
                .with_context(|| format!("ticks({}) failed", index))?;
                ticks.push(Tick {
                    index,
                    liquidity_gross,
                    liquidity_net,
                });
            }
        }
        debug!("[UniswapV3] Scanned {} initialized ticks", ticks.len());
        Ok(ticks)
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexAdapter for UniswapV3Adapter<M> {
    fn name(&self) -> &str {
        "UniswapV3"
    }

    async fn discover(&self, tokens: &[TokenId], fee_tiers: &[u32]) -> Result<Vec<DiscoveredPool>> {
        let mut discovered = Vec::new();
        for factory_address in &self.factories {
            let factory = IUniswapV3Factory::new(*factory_address, Arc::clone(&self.client));
            for (a, b) in token_pairs(tokens) {
                let (Some(token_a), Some(token_b)) = (a.to_address(), b.to_address()) else {
                    continue;
                };
                for &fee in fee_tiers {
                    let Some(tick_spacing) = tick_spacing_for_fee(fee) else {
                        warn!("[UniswapV3] No tick spacing for fee {}, skipping", fee);
                        continue;
                    };
                    match self.load_pool(&factory, token_a, token_b, fee, tick_spacing).await {
                        Ok(Some(pool)) => discovered.push(pool),
                        Ok(None) => {}
                        Err(e) => warn!(
                            "[UniswapV3] Skipping {}/{} fee {} on {}: {:#}",
                            a, b, fee, self.chain, e
                        ),
                    }
                }
            }
        }
        info!(
            "[UniswapV3] Discovered {} pools on {} across {} factories",
            discovered.len(),
            self.chain,
            self.factories.len()
        );
        Ok(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_range_covers_full_tick_range() {
        assert_eq!(bitmap_word_range(60), -58..=57);
        assert_eq!(bitmap_word_range(10), -347..=346);
        assert_eq!(bitmap_word_range(1), -3466..=3465);
    }

    #[test]
    fn set_bits_map_to_spaced_ticks() {
        let bitmap = U256::one() | (U256::one() << 255);
        assert_eq!(initialized_ticks_in_word(0, bitmap, 60), vec![0, 255 * 60]);
        assert_eq!(
            initialized_ticks_in_word(-1, U256::one() << 246, 60),
            vec![-10 * 60]
        );
        assert!(initialized_ticks_in_word(3, U256::zero(), 10).is_empty());
    }
}
