//! # Attendance Runtime
//!
//! Imperative shell around the pure planners in `attendance-core`.
//!
//! ## Core Components
//!
//! - **`BookingEngine`**: runs join, leave, removal and update transactions as
//!   bounded optimistic retry loops against a `LedgerStore`
//! - **`NotificationDispatcher`**: bounded, non-blocking hand-off of committed
//!   notices to a `NotificationSink`
//! - **Retry**: exponential backoff with jitter, retrying conflicts only
//! - **Metrics**: Prometheus counters and histograms for transactions and notices
//!
//! ## Example
//!
//! ```ignore
//! use attendance_runtime::{BookingEngine, NotificationDispatcher};
//!
//! let (notifier, worker) = NotificationDispatcher::spawn(sink);
//! let engine = BookingEngine::new(store, notifier);
//!
//! let booking = engine.join_event(event_id, &caller, guests).await?;
//! ```

/// Booking engine and transaction policy
pub mod engine;

/// Post-commit notification dispatch
pub mod dispatcher;

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub use dispatcher::{DispatchWorker, NotificationDispatcher};
pub use engine::{BookingEngine, TransactionPolicy};
pub use retry::RetryPolicy;
