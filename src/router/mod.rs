//! # Router Module
//!
//! Best-path search over the routing graph and the types describing its result.
//!
//! A path is a list of [`RouteHop`]s: each hop names the pool and chain used, the amount
//! received and, for tokens that live on several chains, the bridge home/remote contracts.
//! [`RouteResponse`] is the shape served to API clients.

pub mod search;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::types::conversions::u256_dec;
use crate::types::{ChainId, PoolId, TokenId};

pub use search::best_paths;

/// Message carried by a response with no route.
pub const NO_PATH_ERROR: &str = "no valid path found";

/// One hop of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteHop {
    pub token_in: TokenId,
    pub pool: PoolId,
    /// Amount of `token_out` received after this hop
    #[serde(with = "u256_dec")]
    pub amount_out: U256,
    pub chain: ChainId,
    pub token_out: TokenId,
    /// Bridge home contract of `token_out` on `chain`, empty when not bridged
    pub token_home: String,
    pub token_remote: String,
}

/// Resolves the bridge contracts configured for a token on a chain.
pub trait TokenMappings: Send + Sync {
    /// `(home, remote)`; both empty when the token is unknown on that chain.
    fn token_mappings(&self, token: &TokenId, chain: &ChainId) -> (String, String);
}

/// Mapping source that knows no tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTokenMappings;

impl TokenMappings for NoTokenMappings {
    fn token_mappings(&self, _token: &TokenId, _chain: &ChainId) -> (String, String) {
        (String::new(), String::new())
    }
}

/// API response for a route query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub path: Vec<RouteHop>,
    pub amount_in: String,
    pub amount_out: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RouteResponse {
    pub fn from_hops(amount_in: U256, hops: Vec<RouteHop>) -> Self {
        match hops.last().map(|hop| hop.amount_out) {
            Some(amount_out) => Self {
                amount_out: amount_out.to_string(),
                amount_in: amount_in.to_string(),
                success: true,
                error: None,
                path: hops,
            },
            None => Self {
                path: Vec::new(),
                amount_in: amount_in.to_string(),
                amount_out: String::new(),
                success: false,
                error: Some(NO_PATH_ERROR.to_string()),
            },
        }
    }
}
