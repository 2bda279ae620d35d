//! Label-setting best-path search.
//!
//! Breadth-first relaxation from the source: each dequeued token picks, per target, the
//! single best `(pool, chain)` edge among pools not yet used anywhere in this search.
//! Labels only improve strictly. The route is then read backwards from the destination.

use std::collections::{HashMap, HashSet, VecDeque};

use ethers::types::U256;
use tracing::trace;

use super::{RouteHop, TokenMappings};
use crate::edges::PricingEdge;
use crate::graph::GraphState;
use crate::types::{ChainId, PoolId, TokenId};

/// Best hop sequence from `source` to `dest`; empty when no route exists.
pub fn best_paths(
    state: &GraphState,
    mappings: &dyn TokenMappings,
    origin_chain: &ChainId,
    source: &TokenId,
    dest: &TokenId,
    amount_in: U256,
) -> Vec<RouteHop> {
    if source == dest {
        return Vec::new();
    }

    let mut labels: HashMap<TokenId, RouteHop> = HashMap::new();
    let mut visited_pools: HashSet<PoolId> = HashSet::new();
    let mut queue: VecDeque<TokenId> = VecDeque::new();

    labels.insert(
        source.clone(),
        RouteHop {
            token_in: source.clone(),
            pool: PoolId::default(),
            amount_out: amount_in,
            chain: origin_chain.clone(),
            token_out: TokenId::default(),
            token_home: String::new(),
            token_remote: String::new(),
        },
    );
    queue.push_back(source.clone());

    while let Some(current) = queue.pop_front() {
        let current_amount = match labels.get(&current) {
            Some(label) => label.amount_out,
            None => continue,
        };
        let Some(targets) = state.neighbors(&current) else {
            continue;
        };

        for (target, pools) in targets {
            let mut best: Option<(U256, &PoolId, &ChainId)> = None;

            for (pool, chains) in pools {
                if visited_pools.contains(pool) {
                    continue;
                }
                for (chain, edge) in chains {
                    let amount_out = edge.compute_exact_amount_out(current_amount);
                    if amount_out.is_zero() {
                        continue;
                    }
                    if best.map_or(true, |(best_amount, _, _)| amount_out > best_amount) {
                        best = Some((amount_out, pool, chain));
                    }
                }
            }

            let Some((amount_out, pool, chain)) = best else {
                continue;
            };
            visited_pools.insert(pool.clone());
            queue.push_back(target.clone());

            let improves = labels
                .get(target)
                .map_or(true, |existing| amount_out > existing.amount_out);
            if improves {
                trace!(
                    "[Search] label {} <- {} via {} on {}: {}",
                    target,
                    current,
                    pool,
                    chain,
                    amount_out
                );
                let (token_home, token_remote) = mappings.token_mappings(target, chain);
                labels.insert(
                    target.clone(),
                    RouteHop {
                        token_in: current.clone(),
                        pool: pool.clone(),
                        amount_out,
                        chain: chain.clone(),
                        token_out: target.clone(),
                        token_home,
                        token_remote,
                    },
                );
            }
        }
    }

    build_path(&labels, source, dest)
}

fn build_path(labels: &HashMap<TokenId, RouteHop>, source: &TokenId, dest: &TokenId) -> Vec<RouteHop> {
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut current = dest;

    while current != source {
        if !seen.insert(current) {
            // label replacement closed a cycle
            break;
        }
        let Some(hop) = labels.get(current) else {
            break;
        };
        path.push(hop.clone());
        current = &hop.token_in;
    }

    path.reverse();
    path
}
