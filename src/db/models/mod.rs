mod daily_metric;
mod pool;
mod swap_event;

pub use daily_metric::DailyMetric;
pub use pool::{Pool, PoolType};
pub use swap_event::SwapEvent;
