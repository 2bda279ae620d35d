use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::*;
use log::{info, warn};

use crate::contracts::{IUniswapV2Factory, IUniswapV2Pair};
use crate::dex_adapter::{token_pairs, DexAdapter, DiscoveredPool};
use crate::graph::Pool;
use crate::types::conversions::checksum;
use crate::types::{ChainId, PoolId, TokenId};

/// Constant-product pairs found through `getPair` on each configured factory.
pub struct UniswapV2Adapter<M> {
    chain: ChainId,
    factories: Vec<Address>,
    client: Arc<M>,
}

impl<M: Middleware + 'static> UniswapV2Adapter<M> {
    pub fn new(chain: ChainId, factories: Vec<Address>, client: Arc<M>) -> Self {
        Self {
            chain,
            factories,
            client,
        }
    }

    async fn load_pair(
        &self,
        factory: &IUniswapV2Factory<M>,
        token_a: Address,
        token_b: Address,
    ) -> Result<Option<DiscoveredPool>> {
        let pair = factory
            .get_pair(token_a, token_b)
            .call()
            .await
            .context("getPair failed")?;
        if pair.is_zero() {
            return Ok(None);
        }

        let contract = IUniswapV2Pair::new(pair, Arc::clone(&self.client));
        let token0 = contract.token_0().call().await.context("token0 failed")?;
        let token1 = contract.token_1().call().await.context("token1 failed")?;
        let (reserve0, reserve1, _) = contract
            .get_reserves()
            .call()
            .await
            .context("getReserves failed")?;

        Ok(Some(DiscoveredPool::ConstantProduct {
            pool: Pool {
                token0: TokenId::from(token0),
                token1: TokenId::from(token1),
                pair: PoolId::from(pair),
                factory: checksum(factory.address()),
                chain: self.chain.clone(),
            },
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
        }))
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexAdapter for UniswapV2Adapter<M> {
    fn name(&self) -> &str {
        "UniswapV2"
    }

    async fn discover(&self, tokens: &[TokenId], _fee_tiers: &[u32]) -> Result<Vec<DiscoveredPool>> {
        let mut discovered = Vec::new();
        for factory_address in &self.factories {
            let factory = IUniswapV2Factory::new(*factory_address, Arc::clone(&self.client));
            for (a, b) in token_pairs(tokens) {
                let (Some(token_a), Some(token_b)) = (a.to_address(), b.to_address()) else {
                    continue;
                };
                match self.load_pair(&factory, token_a, token_b).await {
                    Ok(Some(pool)) => discovered.push(pool),
                    Ok(None) => {}
                    Err(e) => warn!(
                        "[UniswapV2] Skipping {}/{} on factory {:?} ({}): {:#}",
                        a, b, factory_address, self.chain, e
                    ),
                }
            }
        }
        info!(
            "[UniswapV2] Discovered {} pools on {} across {} factories",
            discovered.len(),
            self.chain,
            self.factories.len()
        );
        Ok(discovered)
    }
}
