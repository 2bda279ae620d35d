//! Graph lifecycle: discovery, live log application, persistence and backup restore.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, I256, U256, U64};
use mig_routing_sdk::backup::GraphBackup;
use mig_routing_sdk::dex_adapter::{DexAdapter, DiscoveredPool};
use mig_routing_sdk::discovery::discover_pools;
use mig_routing_sdk::edges::{PricingEdge, UpdateContext, SWAP_V3_TOPIC, SYNC_TOPIC};
use mig_routing_sdk::ingestion::dispatch_log;
use mig_routing_sdk::persistence::{MemoryStore, PriceTickSink, SnapshotStore};
use mig_routing_sdk::tick_provider::Tick;
use mig_routing_sdk::v3_math::get_sqrt_ratio_at_tick;
use mig_routing_sdk::{ChainId, Pool, PoolId, RoutingGraph, TokenId};

const TOKEN_LOW: &str = "0x0000000000000000000000000000000000000001";
const TOKEN_HIGH: &str = "0x0000000000000000000000000000000000000002";
const LIQUIDITY: u128 = 1_000_000_000_000;

fn v2_address() -> Address {
    Address::repeat_byte(0x11)
}

fn v3_address() -> Address {
    Address::repeat_byte(0x22)
}

fn pool(pair: Address, token0: &str, token1: &str) -> Pool {
    Pool {
        token0: TokenId::from_config(token0),
        token1: TokenId::from_config(token1),
        pair: pair.into(),
        factory: "0xfactory".into(),
        chain: "avalanche".into(),
    }
}

struct FixedAdapter;

#[async_trait]
impl DexAdapter for FixedAdapter {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn discover(&self, _tokens: &[TokenId], _fee_tiers: &[u32]) -> Result<Vec<DiscoveredPool>> {
        Ok(vec![
            DiscoveredPool::ConstantProduct {
                pool: pool(v2_address(), "A", "B"),
                reserve0: U256::from(1_000_000_000u64),
                reserve1: U256::from(2_000_000_000u64),
            },
            DiscoveredPool::ConcentratedLiquidity {
                pool: pool(v3_address(), TOKEN_LOW, TOKEN_HIGH),
                fee: 3000,
                sqrt_price_x96: get_sqrt_ratio_at_tick(0).unwrap(),
                liquidity: LIQUIDITY,
                tick: 0,
                tick_spacing: 60,
                ticks: vec![
                    Tick {
                        index: -600,
                        liquidity_gross: LIQUIDITY,
                        liquidity_net: LIQUIDITY as i128,
                    },
                    Tick {
                        index: 600,
                        liquidity_gross: LIQUIDITY,
                        liquidity_net: -(LIQUIDITY as i128),
                    },
                ],
            },
        ])
    }
}

async fn discovered_graph(store: &MemoryStore) -> RoutingGraph {
    let adapters: Vec<Arc<dyn DexAdapter>> = vec![Arc::new(FixedAdapter)];
    let outcome = discover_pools(&adapters, &[], &[3000]).await;
    outcome.persist(store).await.unwrap();

    let graph = RoutingGraph::new(U256::zero());
    outcome.install_into(&graph);
    graph
}

fn ctx() -> UpdateContext {
    UpdateContext::new(ChainId::from("avalanche"), U256::from(1_000_000u64))
}

fn word(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

fn sync_log(reserve0: u64, reserve1: u64) -> Log {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(&word(U256::from(reserve0)));
    data.extend_from_slice(&word(U256::from(reserve1)));
    Log {
        address: v2_address(),
        topics: vec![*SYNC_TOPIC],
        data: Bytes::from(data),
        block_number: Some(U64::from(10)),
        ..Default::default()
    }
}

fn swap_log(tick: i32) -> Log {
    let mut data = Vec::with_capacity(160);
    data.extend_from_slice(&word(I256::from(1_000).into_raw()));
    data.extend_from_slice(&word(I256::from(-990).into_raw()));
    data.extend_from_slice(&word(get_sqrt_ratio_at_tick(tick).unwrap()));
    data.extend_from_slice(&word(U256::from(LIQUIDITY)));
    data.extend_from_slice(&word(I256::from(tick).into_raw()));
    Log {
        address: v3_address(),
        topics: vec![*SWAP_V3_TOPIC, Default::default(), Default::default()],
        data: Bytes::from(data),
        block_number: Some(U64::from(11)),
        ..Default::default()
    }
}

#[tokio::test]
async fn discovery_installs_and_persists_both_directions() {
    let store = MemoryStore::new();
    let graph = discovered_graph(&store).await;

    assert!(graph.has_pool(&PoolId::from(v2_address())));
    assert!(graph.has_pool(&PoolId::from(v3_address())));
    assert_eq!(graph.read().edge_count(), 4);
    assert_eq!(store.edges().len(), 4);
    assert_eq!(store.load_pools(&"avalanche".into()).await.unwrap().len(), 2);

    let ticks = graph.read().ticks(&PoolId::from(v3_address())).cloned().unwrap();
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks.tick_spacing(), 60);
}

#[tokio::test]
async fn sync_log_reprices_the_constant_product_pool() {
    let store = MemoryStore::new();
    let graph = discovered_graph(&store).await;
    let amount = U256::from(1_000_000u64);

    let before = graph.best_paths(&"A".into(), &"B".into(), amount, 0.0);
    let observations = dispatch_log(&graph, &sync_log(1_000_000_000, 4_000_000_000), &ctx());
    let after = graph.best_paths(&"A".into(), &"B".into(), amount, 0.0);

    assert_eq!(observations.len(), 2);
    assert!(after[0].amount_out > before[0].amount_out);

    for observation in &observations {
        store.record(observation).await.unwrap();
    }
    let ticks = store.price_ticks();
    assert_eq!(ticks.len(), 2);
    assert!(ticks.iter().all(|t| t.chain.as_str() == "avalanche"));
}

#[tokio::test]
async fn swap_log_moves_the_concentrated_pool() {
    let store = MemoryStore::new();
    let graph = discovered_graph(&store).await;
    let (low, high) = (TokenId::from_config(TOKEN_LOW), TokenId::from_config(TOKEN_HIGH));
    let pool_id = PoolId::from(v3_address());
    let chain = ChainId::from("avalanche");
    let amount = U256::from(1_000_000u64);

    let before = graph
        .get_edge(&low, &high, &pool_id, &chain)
        .unwrap()
        .compute_exact_amount_out(amount);

    let observations = dispatch_log(&graph, &swap_log(120), &ctx());
    assert_eq!(observations.len(), 2);

    let forward = graph.get_edge(&low, &high, &pool_id, &chain).unwrap();
    let backward = graph.get_edge(&high, &low, &pool_id, &chain).unwrap();
    // token1 got more expensive: selling token0 yields more, selling token1 less
    assert!(forward.compute_exact_amount_out(amount) > before);
    assert!(backward.compute_exact_amount_out(amount) < before);
}

#[tokio::test]
async fn logs_of_unknown_pools_leave_the_graph_untouched() {
    let store = MemoryStore::new();
    let graph = discovered_graph(&store).await;
    let snapshot = graph.backup().unwrap();

    let mut foreign = sync_log(1, 1);
    foreign.address = Address::repeat_byte(0x33);
    assert!(dispatch_log(&graph, &foreign, &ctx()).is_empty());

    let mut truncated = swap_log(120);
    truncated.data = Bytes::from(vec![0u8; 64]);
    assert!(dispatch_log(&graph, &truncated, &ctx()).is_empty());

    assert_eq!(graph.backup().unwrap(), snapshot);
}

#[tokio::test]
async fn swap_log_with_impossible_tick_is_skipped() {
    let store = MemoryStore::new();
    let graph = discovered_graph(&store).await;
    let snapshot = graph.backup().unwrap();

    let mut log = swap_log(120);
    let mut data = log.data.to_vec();
    I256::from(i32::MAX)
        .into_raw()
        .to_big_endian(&mut data[128..160]);
    log.data = Bytes::from(data);

    assert!(dispatch_log(&graph, &log, &ctx()).is_empty());
    assert_eq!(graph.backup().unwrap(), snapshot);

    // the listener keeps applying later logs
    assert_eq!(dispatch_log(&graph, &swap_log(120), &ctx()).len(), 2);
}

#[tokio::test]
async fn backup_restores_an_equivalent_graph() {
    let store = MemoryStore::new();
    let graph = discovered_graph(&store).await;
    dispatch_log(&graph, &swap_log(60), &ctx());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("backup");
    graph.backup().unwrap().write_to(&path).unwrap();

    let restored = RoutingGraph::new(U256::zero());
    restored.restore(GraphBackup::read_from(&path).unwrap()).unwrap();

    let amount = U256::from(1_000_000u64);
    for (from, to) in [
        (TokenId::from("A"), TokenId::from("B")),
        (TokenId::from_config(TOKEN_LOW), TokenId::from_config(TOKEN_HIGH)),
        (TokenId::from_config(TOKEN_HIGH), TokenId::from_config(TOKEN_LOW)),
    ] {
        assert_eq!(
            restored.best_paths(&from, &to, amount, 0.0),
            graph.best_paths(&from, &to, amount, 0.0)
        );
    }
    assert_eq!(restored.read().pool_count(), 2);
}
