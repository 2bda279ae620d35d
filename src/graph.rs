//! # Routing Graph
//!
//! Multigraph of tokens connected by directed, chain-tagged pool edges.
//!
//! ## Layout
//!
//! ```text
//! edges: from -> to -> pool -> chain -> Arc<Edge>
//! pools: pool id -> Pool
//! ```
//!
//! Every level below `from` is a `BTreeMap`, so iteration order (and therefore the
//! best-path tie-break) is deterministic.
//!
//! ## Concurrency
//!
//! One `parking_lot::RwLock` guards the whole [`GraphState`]. Queries hold the read lock
//! for their full duration. Log application is copy-on-write: the affected edges are
//! cloned under a read lock, updated outside any lock and swapped in under a short write
//! lock, so a running search never observes a half-applied update. The swap only lands
//! if the pool still exists and its edges are the ones that were cloned.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use ethers::types::{Log, U256};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::edges::{Edge, EdgeError, PriceObservation, PricingEdge, UpdateContext};
use crate::router::{self, NoTokenMappings, RouteHop, TokenMappings};
use crate::tick_provider::TickListDataProvider;
use crate::types::{ChainId, PoolId, TokenId};

/// Chain assigned to the source label of every search unless configured otherwise.
pub const DEFAULT_ORIGIN_CHAIN: &str = "avalanche";

/// Optimistic log application gives up after this many conflicting writers.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Edges of one token pair, by pool then chain.
pub type PoolEdges = BTreeMap<PoolId, BTreeMap<ChainId, Arc<Edge>>>;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown pool {0}")]
    UnknownPool(PoolId),
    #[error("edge update failed for pool {pool}: {source}")]
    Edge {
        pool: PoolId,
        #[source]
        source: EdgeError,
    },
    #[error("corrupt edge snapshot for pool {pool}: {source}")]
    CorruptSnapshot {
        pool: PoolId,
        #[source]
        source: serde_json::Error,
    },
}

/// Immutable pool record, created once at discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub token0: TokenId,
    pub token1: TokenId,
    pub pair: PoolId,
    pub factory: String,
    pub chain: ChainId,
}

/// Updated copy of the edge `from -> to`, and the edge it was cloned from.
pub(crate) struct EdgeUpdate {
    pub from: TokenId,
    pub to: TokenId,
    pub base: Arc<Edge>,
    pub next: Arc<Edge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Commit {
    Applied,
    /// Another writer replaced or removed one of the base edges.
    Stale,
    PoolGone,
}

/// Plain graph data. Only reachable through [`RoutingGraph`]'s lock once shared.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    edges: HashMap<TokenId, BTreeMap<TokenId, PoolEdges>>,
    pools: HashMap<PoolId, Pool>,
    pool_fees: HashMap<PoolId, U256>,
    ticks: HashMap<PoolId, Arc<TickListDataProvider>>,
    default_fee: U256,
}

impl GraphState {
    pub fn new(default_fee: U256) -> Self {
        Self {
            default_fee,
            ..Self::default()
        }
    }

    /// Inserts the pool unless a record with the same id exists.
    pub fn new_pool(&mut self, pool: Pool) {
        self.pools.entry(pool.pair.clone()).or_insert(pool);
    }

    /// Inserts or replaces the edge at `(from, to, pool, chain)`.
    pub fn new_edge(
        &mut self,
        from: TokenId,
        to: TokenId,
        pool: PoolId,
        chain: ChainId,
        edge: impl Into<Arc<Edge>>,
    ) {
        self.edges
            .entry(from)
            .or_default()
            .entry(to)
            .or_default()
            .entry(pool)
            .or_default()
            .insert(chain, edge.into());
    }

    pub fn get_pool(&self, pool: &PoolId) -> Option<&Pool> {
        self.pools.get(pool)
    }

    pub fn has_pool(&self, pool: &PoolId) -> bool {
        self.pools.contains_key(pool)
    }

    pub fn get_edge(
        &self,
        from: &TokenId,
        to: &TokenId,
        pool: &PoolId,
        chain: &ChainId,
    ) -> Option<&Arc<Edge>> {
        self.edges.get(from)?.get(to)?.get(pool)?.get(chain)
    }

    /// All edges from `from` to `to`, by pool then chain.
    pub fn pools_between(&self, from: &TokenId, to: &TokenId) -> Option<&PoolEdges> {
        self.edges.get(from)?.get(to)
    }

    /// Outgoing edges of `from` grouped by target token, in ascending target order.
    pub fn neighbors(&self, from: &TokenId) -> Option<&BTreeMap<TokenId, PoolEdges>> {
        self.edges.get(from)
    }

    /// Removes both directions of `pool` between `a` and `b`. Returns whether anything was removed.
    pub fn delete_edge(&mut self, a: &TokenId, b: &TokenId, pool: &PoolId) -> bool {
        let forward = self.remove_pool_edges(a, b, pool);
        let backward = self.remove_pool_edges(b, a, pool);
        forward || backward
    }

    /// Removes the pool record, both directions of its edges, its fee and its ticks.
    pub fn delete_pool(&mut self, pool: &PoolId) -> Result<Pool, GraphError> {
        let record = self
            .pools
            .remove(pool)
            .ok_or_else(|| GraphError::UnknownPool(pool.clone()))?;
        self.delete_edge(&record.token0, &record.token1, pool);
        self.pool_fees.remove(pool);
        self.ticks.remove(pool);
        Ok(record)
    }

    pub fn set_pool_fee(&mut self, pool: PoolId, fee: U256) {
        self.pool_fees.insert(pool, fee);
    }

    /// Builder fee for `pool`, falling back to the configured default.
    pub fn pool_fee(&self, pool: &PoolId) -> U256 {
        self.pool_fees.get(pool).copied().unwrap_or(self.default_fee)
    }

    pub fn default_fee(&self) -> U256 {
        self.default_fee
    }

    pub fn set_ticks(&mut self, pool: PoolId, ticks: Arc<TickListDataProvider>) {
        self.ticks.insert(pool, ticks);
    }

    pub fn ticks(&self, pool: &PoolId) -> Option<&Arc<TickListDataProvider>> {
        self.ticks.get(pool)
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn pool_fees(&self) -> impl Iterator<Item = (&PoolId, &U256)> {
        self.pool_fees.iter()
    }

    pub fn tick_sets(&self) -> impl Iterator<Item = (&PoolId, &Arc<TickListDataProvider>)> {
        self.ticks.iter()
    }

    /// Every stored edge as `(from, to, pool, chain, edge)`.
    pub fn iter_edges(
        &self,
    ) -> impl Iterator<Item = (&TokenId, &TokenId, &PoolId, &ChainId, &Arc<Edge>)> {
        self.edges.iter().flat_map(|(from, targets)| {
            targets.iter().flat_map(move |(to, pools)| {
                pools.iter().flat_map(move |(pool, chains)| {
                    chains
                        .iter()
                        .map(move |(chain, edge)| (from, to, pool, chain, edge))
                })
            })
        })
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn edge_count(&self) -> usize {
        self.iter_edges().count()
    }

    /// Swaps in copy-on-write updates of `pool` on `chain`, all or nothing.
    ///
    /// Each update applies only if the stored edge is still the `base` it was cloned from
    /// and the pool record still exists.
    pub(crate) fn commit(
        &mut self,
        pool: &PoolId,
        chain: &ChainId,
        updates: Vec<EdgeUpdate>,
    ) -> Commit {
        if !self.has_pool(pool) {
            return Commit::PoolGone;
        }
        let unchanged = updates.iter().all(|update| {
            self.get_edge(&update.from, &update.to, pool, chain)
                .is_some_and(|current| Arc::ptr_eq(current, &update.base))
        });
        if !unchanged {
            return Commit::Stale;
        }
        for update in updates {
            self.new_edge(update.from, update.to, pool.clone(), chain.clone(), update.next);
        }
        Commit::Applied
    }

    fn remove_pool_edges(&mut self, from: &TokenId, to: &TokenId, pool: &PoolId) -> bool {
        let Some(targets) = self.edges.get_mut(from) else {
            return false;
        };
        let Some(pools) = targets.get_mut(to) else {
            return false;
        };
        let removed = pools.remove(pool).is_some();
        if pools.is_empty() {
            targets.remove(to);
        }
        if targets.is_empty() {
            self.edges.remove(from);
        }
        removed
    }
}

/// Shared, lock-guarded routing graph.
///
/// Built once (discovery, backup restore) and shared as `Arc<RoutingGraph>` between the
/// ingestion tasks and query callers.
pub struct RoutingGraph {
    state: RwLock<GraphState>,
    mappings: Arc<dyn TokenMappings>,
    origin_chain: ChainId,
}

impl RoutingGraph {
    pub fn new(default_fee: U256) -> Self {
        Self::from_state(GraphState::new(default_fee))
    }

    pub fn from_state(state: GraphState) -> Self {
        Self {
            state: RwLock::new(state),
            mappings: Arc::new(NoTokenMappings),
            origin_chain: ChainId::from(DEFAULT_ORIGIN_CHAIN),
        }
    }

    /// Sets the home/remote lookup used when labelling hops.
    pub fn with_mappings(mut self, mappings: Arc<dyn TokenMappings>) -> Self {
        self.mappings = mappings;
        self
    }

    /// Sets the chain reported for the source of every search.
    pub fn with_origin_chain(mut self, chain: ChainId) -> Self {
        self.origin_chain = chain;
        self
    }

    pub fn origin_chain(&self) -> &ChainId {
        &self.origin_chain
    }

    pub fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write()
    }

    /// Replaces the whole state, e.g. after restoring a backup.
    pub fn replace_state(&self, state: GraphState) {
        *self.state.write() = state;
    }

    pub fn new_pool(&self, pool: Pool) {
        self.state.write().new_pool(pool);
    }

    pub fn new_edge(
        &self,
        from: TokenId,
        to: TokenId,
        pool: PoolId,
        chain: ChainId,
        edge: impl Into<Arc<Edge>>,
    ) {
        self.state.write().new_edge(from, to, pool, chain, edge);
    }

    pub fn get_pool(&self, pool: &PoolId) -> Option<Pool> {
        self.state.read().get_pool(pool).cloned()
    }

    pub fn has_pool(&self, pool: &PoolId) -> bool {
        self.state.read().has_pool(pool)
    }

    pub fn get_edge(
        &self,
        from: &TokenId,
        to: &TokenId,
        pool: &PoolId,
        chain: &ChainId,
    ) -> Option<Arc<Edge>> {
        self.state.read().get_edge(from, to, pool, chain).cloned()
    }

    pub fn delete_edge(&self, a: &TokenId, b: &TokenId, pool: &PoolId) -> bool {
        self.state.write().delete_edge(a, b, pool)
    }

    pub fn delete_pool(&self, pool: &PoolId) -> Result<Pool, GraphError> {
        let removed = self.state.write().delete_pool(pool)?;
        info!("[Graph] Deleted pool {} ({} / {})", pool, removed.token0, removed.token1);
        Ok(removed)
    }

    pub fn pool_fee(&self, pool: &PoolId) -> U256 {
        self.state.read().pool_fee(pool)
    }

    pub fn set_pool_fee(&self, pool: PoolId, fee: U256) {
        self.state.write().set_pool_fee(pool, fee);
    }

    /// Best route from `source` to `dest` for `amount_in`.
    ///
    /// Holds the read lock for the whole search. `_update_threshold` is accepted for API
    /// compatibility and has no effect.
    pub fn best_paths(
        &self,
        source: &TokenId,
        dest: &TokenId,
        amount_in: U256,
        _update_threshold: f64,
    ) -> Vec<RouteHop> {
        let started = Instant::now();
        let state = self.state.read();
        let hops = router::best_paths(
            &state,
            self.mappings.as_ref(),
            &self.origin_chain,
            source,
            dest,
            amount_in,
        );
        drop(state);

        crate::metrics::record_route_query(started.elapsed(), !hops.is_empty());
        debug!(
            "[Graph] best_paths {} -> {}: {} hops in {:?}",
            source,
            dest,
            hops.len(),
            started.elapsed()
        );
        hops
    }

    /// Applies a pool log to both directions of the pool on `ctx.chain`.
    ///
    /// Edges are cloned under the read lock, updated outside it and swapped in under the
    /// write lock. A decode failure on either direction leaves both untouched. If another
    /// writer replaced one of the edges in between, the log is re-applied to the newer
    /// edges; if the pool was deleted, nothing is written.
    pub fn apply_log(
        &self,
        log: &Log,
        ctx: &UpdateContext,
    ) -> Result<Vec<PriceObservation>, GraphError> {
        let pool_id = PoolId::from(log.address);

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let current = self.pool_edges(&pool_id, &ctx.chain)?;

            let mut observations = Vec::new();
            let mut updated = Vec::new();
            for (from, to, edge) in current {
                let mut next = Edge::clone(&edge);
                let observation = next.update_edge(log, ctx).map_err(|source| GraphError::Edge {
                    pool: pool_id.clone(),
                    source,
                })?;
                if let Some(observation) = observation {
                    observations.push(observation);
                    updated.push(EdgeUpdate {
                        from,
                        to,
                        base: edge,
                        next: Arc::new(next),
                    });
                }
            }

            if updated.is_empty() {
                return Ok(observations);
            }
            let outcome = self.state.write().commit(&pool_id, &ctx.chain, updated);
            match outcome {
                Commit::Applied => return Ok(observations),
                Commit::PoolGone => return Err(GraphError::UnknownPool(pool_id)),
                Commit::Stale => {
                    debug!("[Graph] Edges of {} changed during update, re-applying log", pool_id);
                }
            }
        }

        warn!(
            "[Graph] Dropping log for {} after {} conflicting updates",
            pool_id, MAX_COMMIT_ATTEMPTS
        );
        Ok(Vec::new())
    }

    // Both directions of `pool` on `chain`, as (from, to, edge) under the read lock.
    fn pool_edges(
        &self,
        pool_id: &PoolId,
        chain: &ChainId,
    ) -> Result<Vec<(TokenId, TokenId, Arc<Edge>)>, GraphError> {
        let state = self.state.read();
        let pool = state
            .get_pool(pool_id)
            .ok_or_else(|| GraphError::UnknownPool(pool_id.clone()))?;
        Ok([
            (pool.token0.clone(), pool.token1.clone()),
            (pool.token1.clone(), pool.token0.clone()),
        ]
        .into_iter()
        .filter_map(|(from, to)| {
            let edge = state.get_edge(&from, &to, pool_id, chain)?.clone();
            Some((from, to, edge))
        })
        .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::{BridgeEdge, ConstantProductEdge, SYNC_TOPIC};
    use ethers::types::{Address, Bytes};

    fn pool(address: Address, token0: &str, token1: &str) -> Pool {
        Pool {
            token0: token0.into(),
            token1: token1.into(),
            pair: address.into(),
            factory: "factory".into(),
            chain: "avalanche".into(),
        }
    }

    fn graph_with_v2_pool(address: Address) -> RoutingGraph {
        let graph = RoutingGraph::new(U256::from(30));
        let record = pool(address, "A", "B");
        let (forward, backward) = ConstantProductEdge::pair(
            "A".into(),
            "B".into(),
            U256::from(1_000_000_000u64),
            U256::from(2_000_000_000u64),
        );
        graph.new_edge(
            "A".into(),
            "B".into(),
            record.pair.clone(),
            "avalanche".into(),
            Edge::from(forward),
        );
        graph.new_edge(
            "B".into(),
            "A".into(),
            record.pair.clone(),
            "avalanche".into(),
            Edge::from(backward),
        );
        graph.new_pool(record);
        graph
    }

    fn sync_log(address: Address, r0: u64, r1: u64) -> Log {
        let mut data = vec![0u8; 64];
        U256::from(r0).to_big_endian(&mut data[0..32]);
        U256::from(r1).to_big_endian(&mut data[32..64]);
        Log {
            address,
            topics: vec![*SYNC_TOPIC],
            data: Bytes::from(data),
            ..Default::default()
        }
    }

    #[test]
    fn new_pool_is_idempotent() {
        let mut state = GraphState::new(U256::zero());
        let address = Address::repeat_byte(1);
        state.new_pool(pool(address, "A", "B"));
        state.new_pool(pool(address, "X", "Y"));
        assert_eq!(state.pool_count(), 1);
        assert_eq!(state.get_pool(&address.into()).unwrap().token0.as_str(), "A");
    }

    #[test]
    fn new_edge_overwrites_same_key() {
        let mut state = GraphState::new(U256::zero());
        let first = Edge::from(BridgeEdge::new("A".into(), "B".into()));
        let second = Edge::from(BridgeEdge::new("A".into(), "C".into()));
        state.new_edge("A".into(), "B".into(), "p".into(), "c".into(), first);
        state.new_edge("A".into(), "B".into(), "p".into(), "c".into(), second.clone());
        assert_eq!(state.edge_count(), 1);
        assert_eq!(
            **state
                .get_edge(&"A".into(), &"B".into(), &"p".into(), &"c".into())
                .unwrap(),
            second
        );
    }

    #[test]
    fn delete_pool_removes_both_directions() {
        let address = Address::repeat_byte(7);
        let graph = graph_with_v2_pool(address);
        let pool_id = PoolId::from(address);

        let removed = graph.delete_pool(&pool_id).unwrap();
        assert_eq!(removed.token0.as_str(), "A");
        assert!(!graph.has_pool(&pool_id));
        let state = graph.read();
        assert!(state.pools_between(&"A".into(), &"B".into()).is_none());
        assert!(state.pools_between(&"B".into(), &"A".into()).is_none());
        assert_eq!(state.edge_count(), 0);
    }

    #[test]
    fn delete_unknown_pool_is_an_error() {
        let graph = RoutingGraph::new(U256::zero());
        assert!(matches!(
            graph.delete_pool(&"missing".into()),
            Err(GraphError::UnknownPool(_))
        ));
    }

    #[test]
    fn delete_edge_keeps_other_pools() {
        let mut state = GraphState::new(U256::zero());
        for id in ["p1", "p2"] {
            let edge = Edge::from(BridgeEdge::new("A".into(), "B".into()));
            state.new_edge("A".into(), "B".into(), id.into(), "c".into(), edge.clone());
            state.new_edge("B".into(), "A".into(), id.into(), "c".into(), edge);
        }
        assert!(state.delete_edge(&"A".into(), &"B".into(), &"p1".into()));
        assert!(!state.delete_edge(&"A".into(), &"B".into(), &"p1".into()));
        let remaining = state.pools_between(&"B".into(), &"A".into()).unwrap();
        assert_eq!(remaining.keys().map(PoolId::as_str).collect::<Vec<_>>(), ["p2"]);
    }

    #[test]
    fn pool_fee_falls_back_to_default() {
        let graph = RoutingGraph::new(U256::from(30));
        graph.set_pool_fee("p1".into(), U256::from(5));
        assert_eq!(graph.pool_fee(&"p1".into()), U256::from(5));
        assert_eq!(graph.pool_fee(&"p2".into()), U256::from(30));
    }

    #[test]
    fn apply_log_updates_both_directions() {
        let address = Address::repeat_byte(9);
        let graph = graph_with_v2_pool(address);
        let before = graph
            .get_edge(&"A".into(), &"B".into(), &address.into(), &"avalanche".into())
            .unwrap();
        let ctx = UpdateContext::new("avalanche".into(), U256::from(1_000_000u64));

        let observations = graph
            .apply_log(&sync_log(address, 2_000_000_000, 1_000_000_000), &ctx)
            .unwrap();
        assert_eq!(observations.len(), 2);

        let forward = graph
            .get_edge(&"A".into(), &"B".into(), &address.into(), &"avalanche".into())
            .unwrap();
        let backward = graph
            .get_edge(&"B".into(), &"A".into(), &address.into(), &"avalanche".into())
            .unwrap();
        assert_eq!(
            forward.compute_exact_amount_out(U256::from(1_000_000u64)),
            U256::from(498_251u64)
        );
        assert_eq!(
            backward.compute_exact_amount_out(U256::from(1_000_000u64)),
            U256::from(1_992_013u64)
        );
        // the snapshot taken before the update is untouched
        assert_eq!(
            before.compute_exact_amount_out(U256::from(1_000_000u64)),
            U256::from(1_992_013u64)
        );
    }

    fn prepare_updates(graph: &RoutingGraph, log: &Log, ctx: &UpdateContext) -> Vec<EdgeUpdate> {
        graph
            .pool_edges(&PoolId::from(log.address), &ctx.chain)
            .unwrap()
            .into_iter()
            .map(|(from, to, base)| {
                let mut next = Edge::clone(&base);
                next.update_edge(log, ctx).unwrap();
                EdgeUpdate {
                    from,
                    to,
                    base,
                    next: Arc::new(next),
                }
            })
            .collect()
    }

    #[test]
    fn commit_after_pool_deletion_writes_nothing() {
        let address = Address::repeat_byte(9);
        let graph = graph_with_v2_pool(address);
        let ctx = UpdateContext::new("avalanche".into(), U256::from(1_000_000u64));
        let pool_id = PoolId::from(address);

        let updates = prepare_updates(&graph, &sync_log(address, 2_000_000_000, 1_000_000_000), &ctx);
        assert_eq!(updates.len(), 2);
        graph.delete_pool(&pool_id).unwrap();

        assert_eq!(graph.write().commit(&pool_id, &ctx.chain, updates), Commit::PoolGone);
        assert_eq!(graph.read().edge_count(), 0);
        assert!(graph
            .best_paths(&"A".into(), &"B".into(), U256::from(1_000_000u64), 0.0)
            .is_empty());
    }

    #[test]
    fn commit_rejects_updates_cloned_from_replaced_edges() {
        let address = Address::repeat_byte(9);
        let graph = graph_with_v2_pool(address);
        let ctx = UpdateContext::new("avalanche".into(), U256::from(1_000_000u64));
        let pool_id = PoolId::from(address);

        let stale = prepare_updates(&graph, &sync_log(address, 4_000_000_000, 1_000_000_000), &ctx);
        graph
            .apply_log(&sync_log(address, 2_000_000_000, 1_000_000_000), &ctx)
            .unwrap();

        assert_eq!(graph.write().commit(&pool_id, &ctx.chain, stale), Commit::Stale);
        let forward = graph
            .get_edge(&"A".into(), &"B".into(), &pool_id, &"avalanche".into())
            .unwrap();
        assert_eq!(
            forward.compute_exact_amount_out(U256::from(1_000_000u64)),
            U256::from(498_251u64)
        );
    }

    #[test]
    fn commit_applies_fresh_updates() {
        let address = Address::repeat_byte(9);
        let graph = graph_with_v2_pool(address);
        let ctx = UpdateContext::new("avalanche".into(), U256::from(1_000_000u64));
        let pool_id = PoolId::from(address);

        let updates = prepare_updates(&graph, &sync_log(address, 2_000_000_000, 1_000_000_000), &ctx);
        assert_eq!(graph.write().commit(&pool_id, &ctx.chain, updates), Commit::Applied);
        let backward = graph
            .get_edge(&"B".into(), &"A".into(), &pool_id, &"avalanche".into())
            .unwrap();
        assert_eq!(
            backward.compute_exact_amount_out(U256::from(1_000_000u64)),
            U256::from(1_992_013u64)
        );
    }

    #[test]
    fn apply_log_for_unknown_pool_is_rejected() {
        let graph = graph_with_v2_pool(Address::repeat_byte(9));
        let ctx = UpdateContext::new("avalanche".into(), U256::one());
        assert!(matches!(
            graph.apply_log(&sync_log(Address::repeat_byte(3), 1, 1), &ctx),
            Err(GraphError::UnknownPool(_))
        ));
    }

    #[test]
    fn malformed_log_leaves_edges_untouched() {
        let address = Address::repeat_byte(9);
        let graph = graph_with_v2_pool(address);
        let mut log = sync_log(address, 1, 1);
        log.data = Bytes::from(vec![0u8; 10]);
        let ctx = UpdateContext::new("avalanche".into(), U256::from(1_000_000u64));
        assert!(matches!(
            graph.apply_log(&log, &ctx),
            Err(GraphError::Edge { .. })
        ));
        let edge = graph
            .get_edge(&"A".into(), &"B".into(), &address.into(), &"avalanche".into())
            .unwrap();
        assert_eq!(
            edge.compute_exact_amount_out(U256::from(1_000_000u64)),
            U256::from(1_992_013u64)
        );
    }
}
