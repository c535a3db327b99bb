pub mod erc20;
pub mod v3;

pub use erc20::IERC20;
pub use v3::{IUniswapV3Pool, Swap};
