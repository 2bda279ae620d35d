//! Graph construction from discovered pools and configured bridge links.
//!
//! Runs before the graph is shared: [`discover_pools`] collects pools from every adapter,
//! [`DiscoveryOutcome::install`] writes them into a [`GraphState`], and
//! [`bootstrap_bridges`] adds the bridge edges.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};

use crate::dex_adapter::{DexAdapter, DiscoveredPool};
use crate::edges::{BridgeEdge, ConcentratedLiquidityEdge, ConstantProductEdge, Edge};
use crate::graph::{GraphState, Pool, RoutingGraph};
use crate::persistence::{EdgeRecord, SnapshotStore};
use crate::settings::BridgeSettings;
use crate::tick_provider::TickListDataProvider;
use crate::types::{ChainId, PoolId, TokenId};
use crate::v3_math::{FEE_MAX, MAX_TICK, MIN_TICK};

/// Position of one directed edge in the graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub from: TokenId,
    pub to: TokenId,
    pub pool: PoolId,
    pub chain: ChainId,
}

/// Pools, edges and tick sets ready to be installed into a graph.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub pools: BTreeMap<PoolId, Pool>,
    pub edges: BTreeMap<EdgeKey, Edge>,
    pub ticks: BTreeMap<PoolId, Arc<TickListDataProvider>>,
}

impl DiscoveryOutcome {
    /// Builds both edge directions for every pool. The first record of a pool id wins.
    pub fn from_pools(discovered: Vec<DiscoveredPool>) -> Self {
        let mut outcome = Self::default();
        for pool in discovered {
            if outcome.pools.contains_key(&pool.pool().pair) {
                continue;
            }
            outcome.add(pool);
        }
        outcome
    }

    fn add(&mut self, discovered: DiscoveredPool) {
        match discovered {
            DiscoveredPool::ConstantProduct {
                pool,
                reserve0,
                reserve1,
            } => {
                let (forward, backward) =
                    ConstantProductEdge::pair(pool.token0.clone(), pool.token1.clone(), reserve0, reserve1);
                self.insert_pair(&pool, forward.into(), backward.into());
                self.pools.insert(pool.pair.clone(), pool);
            }
            DiscoveredPool::ConcentratedLiquidity {
                pool,
                fee,
                sqrt_price_x96,
                liquidity,
                tick,
                tick_spacing,
                ticks,
            } => {
                if fee >= FEE_MAX {
                    warn!("[Discovery] Pool {} has fee {} >= {}, skipping", pool.pair, fee, FEE_MAX);
                    return;
                }
                if !(MIN_TICK..=MAX_TICK).contains(&tick) {
                    warn!("[Discovery] Pool {} reports tick {} out of range, skipping", pool.pair, tick);
                    return;
                }
                let provider = match TickListDataProvider::new(ticks, tick_spacing) {
                    Ok(provider) => Arc::new(provider),
                    Err(e) => {
                        warn!("[Discovery] Pool {} has an invalid tick set, skipping: {}", pool.pair, e);
                        return;
                    }
                };
                let (forward, backward) = ConcentratedLiquidityEdge::pair(
                    pool.token0.clone(),
                    pool.token1.clone(),
                    fee,
                    sqrt_price_x96,
                    liquidity,
                    tick,
                    provider.clone(),
                );
                self.insert_pair(&pool, forward.into(), backward.into());
                self.ticks.insert(pool.pair.clone(), provider);
                self.pools.insert(pool.pair.clone(), pool);
            }
        }
    }

    fn insert_pair(&mut self, pool: &Pool, forward: Edge, backward: Edge) {
        self.edges.insert(
            EdgeKey {
                from: pool.token0.clone(),
                to: pool.token1.clone(),
                pool: pool.pair.clone(),
                chain: pool.chain.clone(),
            },
            forward,
        );
        self.edges.insert(
            EdgeKey {
                from: pool.token1.clone(),
                to: pool.token0.clone(),
                pool: pool.pair.clone(),
                chain: pool.chain.clone(),
            },
            backward,
        );
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Writes everything into `state`. Existing pool records are kept.
    pub fn install(self, state: &mut GraphState) {
        for (pool_id, provider) in self.ticks {
            state.set_ticks(pool_id, provider);
        }
        for (key, edge) in self.edges {
            state.new_edge(key.from, key.to, key.pool, key.chain, edge);
        }
        for (_, pool) in self.pools {
            state.new_pool(pool);
        }
    }

    /// Installs under the graph's write lock.
    pub fn install_into(self, graph: &RoutingGraph) {
        self.install(&mut graph.write());
    }

    /// Stores pool records and edge snapshots.
    /// Saves pools and edge snapshots. Returns how many pools the store did not know yet.
    pub async fn persist(&self, store: &dyn SnapshotStore) -> Result<usize> {
        let mut known: HashSet<PoolId> = HashSet::new();
        let chains: BTreeSet<&ChainId> = self.pools.values().map(|pool| &pool.chain).collect();
        for chain in chains {
            known.extend(store.load_pools(chain).await?.into_iter().map(|pool| pool.pair));
        }

        let mut new_pools = 0;
        for pool in self.pools.values() {
            if !known.contains(&pool.pair) {
                new_pools += 1;
            }
            store.save_pool(pool).await?;
        }
        let records = self
            .edges
            .iter()
            .map(|(key, edge)| EdgeRecord::from_edge(&key.from, &key.to, &key.pool, &key.chain, edge))
            .collect::<serde_json::Result<Vec<_>>>()?;
        store.save_edges(&records).await?;
        debug!(
            "[Discovery] Persisted {} pools ({} new), {} edges",
            self.pools.len(),
            new_pools,
            records.len()
        );
        Ok(new_pools)
    }
}

/// Runs every adapter over `tokens`. A failing adapter is logged and skipped.
pub async fn discover_pools(
    adapters: &[Arc<dyn DexAdapter>],
    tokens: &[TokenId],
    fee_tiers: &[u32],
) -> DiscoveryOutcome {
    let mut discovered = Vec::new();
    for adapter in adapters {
        match adapter.discover(tokens, fee_tiers).await {
            Ok(pools) => {
                crate::metrics::increment_discovered_pools(adapter.name(), pools.len() as u64);
                discovered.extend(pools);
            }
            Err(e) => warn!("[Discovery] Adapter {} failed: {:#}", adapter.name(), e),
        }
    }
    let outcome = DiscoveryOutcome::from_pools(discovered);
    info!(
        "[Discovery] {} pools, {} edges from {} adapters",
        outcome.pools.len(),
        outcome.edges.len(),
        adapters.len()
    );
    outcome
}

/// Inserts one bridge edge pair per link.
///
/// The forward edge (`from_token -> to_token`) is keyed on `to_chain` with `forward_pool`,
/// the backward edge on `from_chain` with `backward_pool`. Bridges have no pool record.
pub fn bootstrap_bridges(state: &mut GraphState, links: &[BridgeSettings]) {
    for link in links {
        let from = TokenId::from_config(&link.from_token);
        let to = TokenId::from_config(&link.to_token);
        state.new_edge(
            from.clone(),
            to.clone(),
            PoolId::new(link.forward_pool.as_str()),
            ChainId::normalized(&link.to_chain),
            Edge::from(BridgeEdge::new(from.clone(), to.clone())),
        );
        state.new_edge(
            to.clone(),
            from.clone(),
            PoolId::new(link.backward_pool.as_str()),
            ChainId::normalized(&link.from_chain),
            Edge::from(BridgeEdge::new(to.clone(), from.clone())),
        );
        info!(
            "[Discovery] Bridge {} ({}) <-> {} ({})",
            from, link.from_chain, to, link.to_chain
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::PricingEdge;
    use crate::persistence::MemoryStore;
    use crate::tick_provider::Tick;
    use crate::v3_math::get_sqrt_ratio_at_tick;
    use async_trait::async_trait;
    use ethers::types::U256;

    fn pool(pair: &str, token0: &str, token1: &str) -> Pool {
        Pool {
            token0: token0.into(),
            token1: token1.into(),
            pair: pair.into(),
            factory: "0xfactory".into(),
            chain: "avalanche".into(),
        }
    }

    fn v2(pair: &str, token0: &str, token1: &str) -> DiscoveredPool {
        DiscoveredPool::ConstantProduct {
            pool: pool(pair, token0, token1),
            reserve0: U256::from(1_000_000_000u64),
            reserve1: U256::from(2_000_000_000u64),
        }
    }

    fn v3(pair: &str, fee: u32, ticks: Vec<Tick>) -> DiscoveredPool {
        DiscoveredPool::ConcentratedLiquidity {
            pool: pool(pair, "A", "B"),
            fee,
            sqrt_price_x96: get_sqrt_ratio_at_tick(0).unwrap(),
            liquidity: 1_000_000_000,
            tick: 0,
            tick_spacing: 60,
            ticks,
        }
    }

    fn balanced_ticks() -> Vec<Tick> {
        vec![
            Tick {
                index: -600,
                liquidity_gross: 1_000_000_000,
                liquidity_net: 1_000_000_000,
            },
            Tick {
                index: 600,
                liquidity_gross: 1_000_000_000,
                liquidity_net: -1_000_000_000,
            },
        ]
    }

    struct FixedAdapter(Vec<DiscoveredPool>);

    #[async_trait]
    impl DexAdapter for FixedAdapter {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn discover(&self, _: &[TokenId], _: &[u32]) -> Result<Vec<DiscoveredPool>> {
            Ok(self.0.clone())
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl DexAdapter for FailingAdapter {
        fn name(&self) -> &str {
            "failing"
        }

        async fn discover(&self, _: &[TokenId], _: &[u32]) -> Result<Vec<DiscoveredPool>> {
            anyhow::bail!("rpc down")
        }
    }

    #[test]
    fn constant_product_pool_gets_both_directions() {
        let outcome = DiscoveryOutcome::from_pools(vec![v2("p1", "A", "B")]);
        assert_eq!(outcome.pool_count(), 1);
        assert_eq!(outcome.edges.len(), 2);

        let mut state = GraphState::default();
        outcome.install(&mut state);
        let forward = state
            .get_edge(&"A".into(), &"B".into(), &"p1".into(), &"avalanche".into())
            .unwrap();
        let backward = state
            .get_edge(&"B".into(), &"A".into(), &"p1".into(), &"avalanche".into())
            .unwrap();
        assert_eq!(forward.compute_exact_amount_out(U256::from(1_000_000u64)), U256::from(1_992_013u64));
        assert_eq!(backward.compute_exact_amount_out(U256::from(1_000_000u64)), U256::from(498_251u64));
    }

    #[test]
    fn concentrated_pool_shares_its_tick_set() {
        let outcome = DiscoveryOutcome::from_pools(vec![v3("p3", 3000, balanced_ticks())]);
        let mut state = GraphState::default();
        outcome.install(&mut state);

        let ticks = state.ticks(&"p3".into()).unwrap().clone();
        match &**state
            .get_edge(&"A".into(), &"B".into(), &"p3".into(), &"avalanche".into())
            .unwrap()
        {
            Edge::ConcentratedLiquidity(edge) => {
                assert!(edge.zero_for_one);
                assert!(Arc::ptr_eq(&edge.ticks, &ticks));
            }
            other => panic!("unexpected edge {:?}", other),
        }
    }

    #[test]
    fn invalid_pools_are_skipped() {
        let mut unbalanced = balanced_ticks();
        unbalanced.pop();
        let outcome = DiscoveryOutcome::from_pools(vec![
            v3("bad-ticks", 3000, unbalanced),
            v3("bad-fee", FEE_MAX, balanced_ticks()),
            DiscoveredPool::ConcentratedLiquidity {
                pool: pool("bad-tick", "A", "B"),
                fee: 3000,
                sqrt_price_x96: get_sqrt_ratio_at_tick(0).unwrap(),
                liquidity: 1_000_000_000,
                tick: MAX_TICK + 1,
                tick_spacing: 60,
                ticks: balanced_ticks(),
            },
            v2("p1", "A", "B"),
            v2("p1", "X", "Y"),
        ]);
        assert_eq!(outcome.pools.keys().map(PoolId::as_str).collect::<Vec<_>>(), ["p1"]);
        assert_eq!(outcome.pools[&PoolId::from("p1")].token0.as_str(), "A");
        assert_eq!(outcome.edges.len(), 2);
    }

    #[tokio::test]
    async fn failing_adapter_does_not_stop_discovery() {
        let adapters: Vec<Arc<dyn DexAdapter>> = vec![
            Arc::new(FailingAdapter),
            Arc::new(FixedAdapter(vec![v2("p1", "A", "B")])),
        ];
        let outcome = discover_pools(&adapters, &[], &[3000]).await;
        assert_eq!(outcome.pool_count(), 1);

        let store = MemoryStore::new();
        assert_eq!(outcome.persist(&store).await.unwrap(), 1);
        assert_eq!(store.edges().len(), 2);
        assert_eq!(store.load_pools(&"avalanche".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persist_counts_only_pools_new_to_the_store() {
        let store = MemoryStore::new();
        DiscoveryOutcome::from_pools(vec![v2("p1", "A", "B")])
            .persist(&store)
            .await
            .unwrap();

        let outcome = DiscoveryOutcome::from_pools(vec![v2("p1", "A", "B"), v2("p2", "B", "C")]);
        assert_eq!(outcome.persist(&store).await.unwrap(), 1);
        assert_eq!(outcome.persist(&store).await.unwrap(), 0);
        assert_eq!(store.load_pools(&"avalanche".into()).await.unwrap().len(), 2);
    }

    #[test]
    fn bridges_use_configured_pool_labels() {
        let mut state = GraphState::default();
        bootstrap_bridges(
            &mut state,
            &[BridgeSettings {
                from_chain: "AVALANCHE".into(),
                from_token: "USDC_AVAX".into(),
                to_chain: "COQNET".into(),
                to_token: "USDC_COQ".into(),
                forward_pool: "pool".into(),
                backward_pool: "pool1".into(),
            }],
        );
        assert!(state
            .get_edge(&"USDC_AVAX".into(), &"USDC_COQ".into(), &"pool".into(), &"coqnet".into())
            .is_some());
        assert!(state
            .get_edge(&"USDC_COQ".into(), &"USDC_AVAX".into(), &"pool1".into(), &"avalanche".into())
            .is_some());
        assert_eq!(state.pool_count(), 0);
    }
}
