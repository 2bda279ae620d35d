//! # MIG Routing SDK
//!
//! A Rust library for routing token swaps across DEX liquidity on several EVM chains. It
//! keeps an in-memory multigraph of tokens connected by pool edges, prices every edge with
//! the exact integer math of the underlying protocol, and answers best-path queries.
//!
//! ## Overview
//!
//! - **Edges**: constant-product (Uniswap V2), concentrated-liquidity (Uniswap V3, tick
//!   crossing included) and bridge edges between the same asset on two chains
//! - **Graph**: pools and directed, chain-tagged edges behind one read/write lock
//! - **Search**: breadth-first best-path search with per-query pool exclusivity
//! - **Discovery**: reads pools and tick sets from each chain before the graph is shared
//! - **Ingestion**: per-chain listeners apply `Sync`/`Swap` logs to live edges
//!
//! ## Architecture
//!
//! ### Math Layer
//! `v3_math` and `tick_provider` hold the 256-bit fixed-point routines and the sparse tick
//! sets the concentrated-liquidity swap loop walks.
//!
//! ### Graph & Routing Layer
//! `edges`, `graph` and `router` model pools as edges, store them and search them.
//!
//! ### Chain Layer
//! `contracts`, `adapters`, `discovery` and `ingestion` talk to RPC nodes.
//!
//! ### Storage Layer
//! `persistence`, `database`, `postgres_async_writer` and `backup` keep snapshots,
//! checkpoints and the price-tick series.

// Core Types
/// Identifiers and on-chain value conversions
pub mod types;
/// Fixed-point and tick math of concentrated-liquidity pools
pub mod v3_math;
/// Sorted initialized-tick sets
pub mod tick_provider;

// Graph & Routing
/// Edge models and the pricing capability they share
pub mod edges;
/// The shared routing graph
pub mod graph;
/// Best-path search and route response types
pub mod router;
/// Configured tokens and their bridge contracts
pub mod token_registry;

// Chain Layer
/// Public contract ABIs
pub mod contracts;
/// Trait for DEX-specific adapters
pub mod dex_adapter;
/// Protocol-specific adapters (Uniswap V2/V3)
pub mod adapters;
/// Graph construction from discovered pools and bridge links
pub mod discovery;
/// Per-chain log listeners
pub mod ingestion;

// Storage
/// Storage traits and the in-memory store
pub mod persistence;
/// Postgres snapshot store
pub mod database;
/// Batched Postgres price-tick writer
pub mod postgres_async_writer;
/// Bincode graph backups
pub mod backup;

// Infrastructure
/// Configuration management
pub mod settings;
/// Prometheus metrics (feature `observability`)
pub mod metrics;

pub use graph::{GraphError, GraphState, Pool, RoutingGraph};
pub use router::{RouteHop, RouteResponse, TokenMappings};
pub use settings::Settings;
pub use types::{ChainId, PoolId, TokenId};
