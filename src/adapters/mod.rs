// DEX Adapters Module
// Reads pools of each supported protocol from a chain

pub mod uniswap_v2;
pub mod uniswap_v3;

pub use uniswap_v2::UniswapV2Adapter;
pub use uniswap_v3::UniswapV3Adapter;

// Re-export the trait
pub use crate::dex_adapter::{DexAdapter, DiscoveredPool};
