//! RDSEED hardware instruction backend.
//!
//! This is the only module that touches `unsafe`: the instruction wrapper is
//! confined to the private `ffi` module and reachable only through a proof
//! token that CPU support was detected at runtime.

#![allow(unsafe_code)]

use super::{Backend, BackendFactory, Capabilities, ExactBitsPolicy};
use crate::error::{EntropyError, Result};

/// Configuration for the RDSEED backend.
#[derive(Debug, Clone)]
pub struct RdseedConfig {
    /// Attempts per 64-bit step before the read is reported as failed.
    /// RDSEED legitimately underflows under contention.
    pub retries: u32,
}

impl Default for RdseedConfig {
    fn default() -> Self {
        Self { retries: 128 }
    }
}

impl BackendFactory for RdseedConfig {
    type Backend = RdseedBackend;

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(ExactBitsPolicy::Masked, false)
    }

    fn build(&self) -> Result<RdseedBackend> {
        let support = ffi::detect().ok_or_else(|| {
            EntropyError::DeviceUnavailable("RDSEED instruction not available on this CPU".into())
        })?;
        let mut backend = RdseedBackend {
            support,
            retries: self.retries.max(1),
        };
        // A one-byte handshake catches CPUs that advertise but never deliver.
        backend.raw_read(1).map_err(|e| {
            EntropyError::DeviceUnavailable(format!("RDSEED handshake failed: {e}"))
        })?;
        tracing::info!(retries = backend.retries, "RDSEED backend ready");
        Ok(backend)
    }
}

/// Handle on the CPU's RDSEED instruction.
pub struct RdseedBackend {
    support: ffi::Support,
    retries: u32,
}

impl Backend for RdseedBackend {
    fn name(&self) -> &'static str {
        "rdseed"
    }

    fn probe(&mut self) -> bool {
        ffi::fill(self.support, &mut [0u8; 1], self.retries) == 1
    }

    fn raw_read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let written = ffi::fill(self.support, &mut buf, self.retries);
        if written != n {
            return Err(EntropyError::IoFailure(format!(
                "RDSEED failed: wrote {written}/{n} bytes"
            )));
        }
        Ok(buf)
    }

    fn teardown(&mut self) {}
}

#[cfg(target_arch = "x86_64")]
mod ffi {
    use core::arch::x86_64::_rdseed64_step;

    /// Proof that RDSEED is supported by the running CPU.
    #[derive(Debug, Clone, Copy)]
    pub struct Support(());

    pub fn detect() -> Option<Support> {
        std::arch::is_x86_feature_detected!("rdseed").then_some(Support(()))
    }

    #[target_feature(enable = "rdseed")]
    unsafe fn step() -> Option<u64> {
        let mut value = 0u64;
        (_rdseed64_step(&mut value) == 1).then_some(value)
    }

    /// Fills `buf` and returns how many bytes were written before the retry
    /// budget ran out.
    pub fn fill(_support: Support, buf: &mut [u8], retries: u32) -> usize {
        let mut written = 0;
        for chunk in buf.chunks_mut(8) {
            let mut value = None;
            for _ in 0..retries {
                // SAFETY: a `Support` token only exists once runtime detection
                // confirmed the instruction.
                value = unsafe { step() };
                if value.is_some() {
                    break;
                }
                std::hint::spin_loop();
            }
            match value {
                Some(v) => {
                    chunk.copy_from_slice(&v.to_le_bytes()[..chunk.len()]);
                    written += chunk.len();
                }
                None => break,
            }
        }
        written
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod ffi {
    #[derive(Debug, Clone, Copy)]
    pub enum Support {}

    pub fn detect() -> Option<Support> {
        None
    }

    pub fn fill(support: Support, _buf: &mut [u8], _retries: u32) -> usize {
        match support {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_matches_cpu_support() {
        // Either outcome is legitimate; absence must be reported as unavailable.
        match RdseedConfig::default().build() {
            Ok(mut backend) => {
                assert_eq!(backend.raw_read(33).unwrap().len(), 33);
                assert!(backend.probe());
            }
            Err(e) => assert!(e.is_unavailable()),
        }
    }
}
