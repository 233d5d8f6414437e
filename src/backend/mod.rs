//! Backend handles: the transport primitives every entropy source builds on.
//!
//! A backend is reduced to three operations (`raw_read`, `probe`,
//! `teardown`). Everything above it (bit shaping, whitening, sampling,
//! lifecycle and async dispatch) is identical for every variant. Backends are
//! constructed through a [`BackendFactory`], which also declares the
//! variant's [`Capabilities`] so requests can be validated before any device
//! is touched.

mod device;
mod mock;
mod pseudo;
mod rdseed;

pub use device::{DeviceBackend, DeviceConfig, NoHooks, PlatformHooks, SttyMinOne};
pub use mock::{MockBackend, MockFactory, MockStats};
pub use pseudo::{PseudoBackend, PseudoConfig};
pub use rdseed::{RdseedBackend, RdseedConfig};

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// How a backend treats exact-bit requests that are not a multiple of 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExactBitsPolicy {
    /// Any bit count; unused high bits of the final byte are zeroed.
    #[default]
    Masked,
    /// Only multiples of 8 are accepted.
    ByteAligned,
}

/// Static capabilities of a backend variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Exact-bit alignment rule.
    pub exact_bits: ExactBitsPolicy,
    /// Whether fold-aware (XOR-whitened) requests are accepted.
    pub folding: bool,
}

impl Capabilities {
    /// Creates a capability set.
    pub const fn new(exact_bits: ExactBitsPolicy, folding: bool) -> Self {
        Self {
            exact_bits,
            folding,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new(ExactBitsPolicy::Masked, false)
    }
}

/// A live handle on one entropy transport.
///
/// Handles are owned by a [`LifecycleManager`](crate::lifecycle::LifecycleManager)
/// and only ever lent out under its lock, so implementations need `Send` but
/// not `Sync`.
pub trait Backend: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Non-destructive liveness check. Never errors; absence is `false`.
    fn probe(&mut self) -> bool;

    /// Reads exactly `n` unprocessed bytes.
    ///
    /// Fails with `IoFailure` on a short read or transport error and with
    /// `DeviceUnavailable` if the device vanished. Never returns fewer bytes.
    fn raw_read(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Releases the underlying resources. Must be idempotent.
    fn teardown(&mut self);
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn probe(&mut self) -> bool {
        (**self).probe()
    }

    fn raw_read(&mut self, n: usize) -> Result<Vec<u8>> {
        (**self).raw_read(n)
    }

    fn teardown(&mut self) {
        (**self).teardown()
    }
}

/// Builds backend handles of one variant.
pub trait BackendFactory: Send + Sync {
    /// The handle type produced.
    type Backend: Backend;

    /// Capabilities of every handle this factory builds.
    fn capabilities(&self) -> Capabilities;

    /// Opens a new handle. Absent hardware is `DeviceUnavailable`.
    fn build(&self) -> Result<Self::Backend>;
}
