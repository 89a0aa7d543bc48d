//! # Boundpool
//!
//! A bounded-concurrency batch executor for async work.
//!
//! ## Features
//!
//! - **Bounded concurrency**: at most `limit` producer invocations run at once
//! - **FIFO admission**: the earliest submitted, not-yet-started task runs next
//! - **Ordered results**: a batch resolves in submission order, not completion order
//! - **Fail-fast batches**: the first producer error rejects the batch and
//!   drops its queued tasks; tasks already running finish in the background
//! - **Adjustable limit**: the limit can change at any time and applies to the
//!   next admission pass
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Pool::run(items)                         │
//! │  (assigns task ids, queues a batch, awaits its outcome)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              PoolState (behind one mutex)                    │
//! │  pending queue ─► admission pass ─► in-flight set            │
//! │  batches: task id -> result, settled exactly once            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Producer invocations (tokio tasks)               │
//! │  [Task 1] [Task 2] ... [Task N]   N <= concurrency limit    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use boundpool::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = Pool::with_config(
//!     |path: String| async move { Ok::<_, std::io::Error>(path.len()) },
//!     PoolConfig::new().with_name("lengths").with_max_concurrency(2),
//! );
//!
//! let lengths = pool
//!     .run(vec!["a.mkv".to_string(), "episode-02.mkv".to_string()])
//!     .await
//!     .unwrap();
//! assert_eq!(lengths, vec![5, 14]);
//! # }
//! ```

mod batch;
pub mod config;
pub mod pool;
mod state;
pub mod task;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{PoolConfig, AUTO_CONCURRENCY};
    pub use crate::pool::{Pool, Producer, ProducerFuture};
    pub use crate::state::PoolStats;
    pub use crate::task::{BatchId, TaskId};
}

// Re-export key types at crate root
pub use config::{available_parallelism, resolve_concurrency, PoolConfig, AUTO_CONCURRENCY};
pub use pool::{Pool, Producer, ProducerFuture};
pub use state::PoolStats;
pub use task::{BatchId, TaskId};
