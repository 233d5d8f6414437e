//! Character-device and serial TRNG backend.
//!
//! Covers generators that present themselves as a readable device node:
//! the kernel's `/dev/hwrng`, USB-serial generators such as TrueRNG, or
//! whitening devices exposed as a tty. Discovery is the caller's business;
//! this backend opens the path it is given.

use super::{Backend, BackendFactory, Capabilities, ExactBitsPolicy};
use crate::error::{EntropyError, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Platform-specific fix-ups applied around a device session.
pub trait PlatformHooks: Send + Sync {
    /// Called once after the device node has been opened.
    fn on_open(&self, _path: &Path) {}

    /// Called once while tearing the session down.
    fn on_teardown(&self, _path: &Path) {}
}

/// No fix-ups.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl PlatformHooks for NoHooks {}

/// Restores `min 1` on a serial line after use.
///
/// Some USB-serial generators leave the tty in a state where later readers
/// return immediately with no data. Failures are logged and ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SttyMinOne;

impl PlatformHooks for SttyMinOne {
    fn on_teardown(&self, path: &Path) {
        if !cfg!(unix) {
            return;
        }
        let status = std::process::Command::new("stty")
            .arg("-F")
            .arg(path)
            .args(["min", "1"])
            .output();
        match status {
            Ok(out) if out.status.success() => {
                tracing::debug!(path = %path.display(), "Restored stty min 1");
            }
            Ok(out) => tracing::warn!(
                path = %path.display(),
                code = ?out.status.code(),
                "stty fix-up failed"
            ),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "stty not runnable"),
        }
    }
}

/// Configuration for a device backend.
#[derive(Clone)]
pub struct DeviceConfig {
    path: PathBuf,
    capabilities: Capabilities,
    hooks: Arc<dyn PlatformHooks>,
}

impl DeviceConfig {
    /// A device at `path` with byte-aligned exact bits and folding enabled.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capabilities: Capabilities::new(ExactBitsPolicy::ByteAligned, true),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Overrides the alignment and folding capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Installs platform hooks run on open and teardown.
    pub fn with_hooks(mut self, hooks: impl PlatformHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Device path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("path", &self.path)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl BackendFactory for DeviceConfig {
    type Backend = DeviceBackend;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn build(&self) -> Result<DeviceBackend> {
        let file = File::open(&self.path).map_err(|e| {
            EntropyError::DeviceUnavailable(format!("open {}: {e}", self.path.display()))
        })?;
        self.hooks.on_open(&self.path);
        tracing::info!(path = %self.path.display(), "Entropy device opened");
        Ok(DeviceBackend {
            path: self.path.clone(),
            file: Some(file),
            hooks: Arc::clone(&self.hooks),
        })
    }
}

/// An open device session.
pub struct DeviceBackend {
    path: PathBuf,
    file: Option<File>,
    hooks: Arc<dyn PlatformHooks>,
}

impl Backend for DeviceBackend {
    fn name(&self) -> &'static str {
        "device"
    }

    fn probe(&mut self) -> bool {
        self.file.is_some() && self.path.exists()
    }

    fn raw_read(&mut self, n: usize) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or_else(|| {
            EntropyError::DeviceUnavailable(format!("{} is closed", self.path.display()))
        })?;

        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match file.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(EntropyError::IoFailure(format!(
                        "short read from {}: expected {n} bytes, got {filled}",
                        self.path.display()
                    )))
                }
                Ok(read) => filled += read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(EntropyError::from_io(
                        &format!("read {}", self.path.display()),
                        &e,
                    ))
                }
            }
        }
        Ok(buf)
    }

    fn teardown(&mut self) {
        if self.file.take().is_some() {
            self.hooks.on_teardown(&self.path);
            tracing::info!(path = %self.path.display(), "Entropy device closed");
        }
    }
}

impl Drop for DeviceBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}
