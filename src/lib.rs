//! Tree Sync workspace facade.
//!
//! Re-exports the workspace crates under short names and, with the
//! `desktop` feature, hosts the wiring used by the `treesync` binary.

pub use bridge_traits as bridge;
pub use core_async as runtime;
pub use core_runtime as core;
pub use core_sync as sync;

#[cfg(feature = "desktop")]
pub use bridge_desktop as desktop;

#[cfg(feature = "desktop")]
pub mod app;
