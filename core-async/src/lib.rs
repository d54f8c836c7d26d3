//! Async abstraction layer for Tree Sync.
//!
//! Every other crate in the workspace goes through this crate instead of
//! depending on Tokio directly. Keeping the executor behind one seam means the
//! reconciliation engine only sees the primitives it actually needs:
//!
//! - `task`: task spawning and join handles
//! - `time`: sleeping, timeouts, intervals and the cancellable [`time::DebounceTimer`]
//! - `sync`: async-aware locks and channels
//! - `io`: async read/write traits
//! - `runtime`: a small `block_on` used by the attribute macros
//! - `signal`: process signals for graceful shutdown
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, DebounceTimer, Duration, Instant};
pub use tokio::select;

/// Process signal handling.
pub mod signal {
    pub use tokio::signal::ctrl_c;
}
