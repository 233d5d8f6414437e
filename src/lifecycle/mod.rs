//! Backend lifecycle management.
//!
//! A [`LifecycleManager`] is the sole owner of at most one live backend
//! handle. It builds the handle lazily, serialises every access through one
//! lock, and tears it down on reset or close. Managers are explicit
//! instances owned by the caller's composition root; there is no global.

mod manager;

pub use manager::{LifecycleManager, LifecycleState};
