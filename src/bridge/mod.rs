//! Async access to blocking backends.
//!
//! Backend reads block, so the bridge runs them on a small pool of
//! dedicated threads and hands back futures. A single worker (the default)
//! serves requests strictly in submission order.

mod async_bridge;
mod pool;
mod task;

pub use async_bridge::{AsyncBridge, DEFAULT_WORKERS};
pub use task::{CancelHandle, EntropyTask};
