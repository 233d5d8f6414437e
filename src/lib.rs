//! RNG Devices Library
//!
//! Uniform access to heterogeneous entropy sources: hardware TRNG devices,
//! the RDSEED instruction and a seeded software fallback. Each backend is
//! reduced to a raw byte stream; shaping, whitening, unbiased sampling,
//! lifecycle and async dispatch are shared by all of them.
//!
//! # Architecture
//!
//! ```text
//! backend (raw_read / probe / teardown)
//!     ↓
//! lifecycle (lazy build, reset, close)
//!     ↓
//! shaping (fold whitening → bits / exact bits / ranged integers)
//!     ↓
//! source (blocking API)  →  bridge (worker pool, async tasks)
//! ```
//!
//! # Design Principles
//!
//! - **No hidden globals**: every source owns its lifecycle manager
//! - **Fail loudly**: no fallback between backends, no silent retries
//! - **Exact uniformity**: ranged integers use rejection, never modulo
//! - **Serialized devices**: one lock per backend, held for the whole request
//!
//! # Example
//!
//! ```no_run
//! use rng_devices::{backend::PseudoConfig, AsyncBridge, EntropySource};
//!
//! let source = EntropySource::new(PseudoConfig::new());
//! let key = source.read_bytes(32).unwrap();
//! let die = source.sample_int(1, Some(7)).unwrap();
//! assert_eq!(key.len(), 32);
//! assert!((1..7).contains(&die));
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let bridge = AsyncBridge::new(source).unwrap();
//! runtime.block_on(async {
//!     let nonce = bridge.read_bytes(16).await;
//!     println!("{nonce:?}");
//!     bridge.shutdown().await;
//! });
//! ```

#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod shaping;
pub mod source;

// Re-export commonly used types at crate root
pub use analysis::{QualityThresholds, StatisticalTests};
pub use backend::{Backend, BackendFactory, Capabilities, ExactBitsPolicy};
pub use bridge::{AsyncBridge, EntropyTask};
pub use config::FileConfig;
pub use error::{EntropyError, Result};
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use metrics::MetricsRegistry;
pub use shaping::{EntropyRequest, RangeRequest};
pub use source::{EntropyRng, EntropySource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
