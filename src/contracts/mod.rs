// Contracts Module - Public ABIs Only

pub mod i_uniswap_v2_factory;
pub mod i_uniswap_v2_pair;
pub mod i_uniswap_v3_factory;
pub mod i_uniswap_v3_pool;

// Public exports
pub use i_uniswap_v2_factory::IUniswapV2Factory;
pub use i_uniswap_v2_pair::IUniswapV2Pair;
pub use i_uniswap_v3_factory::IUniswapV3Factory;
pub use i_uniswap_v3_pool::IUniswapV3Pool;
