//! The uniform entropy surface every backend variant exposes.
//!
//! [`EntropySource`] wires a [`LifecycleManager`](crate::lifecycle::LifecycleManager)
//! to the shaping pipeline and offers the same operations whatever the
//! backend: probe, bytes, bits, exact bits, ranged integers, their
//! fold-aware variants, and reset. [`EntropyRng`] adapts a source to
//! `rand_core`.

mod entropy_source;
mod rng;

pub use entropy_source::EntropySource;
pub use rng::EntropyRng;
