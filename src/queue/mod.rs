//! Throttled, concurrency-limited task queue.
//!
//! # Data Flow
//! ```text
//! submit(start, metadata)
//!     → pending list (front = newest, back = next to run)
//!     → drain step (window.rs evicts expired starts, computes quota)
//!     → dispatched task runs on the Tokio runtime
//!     → completion re-enters the drain step
//!
//! Throttle-bound backlog:
//!     drain step arms a single timer (clock.rs) for the moment the oldest
//!     start leaves the window
//! ```
//!
//! # Design Decisions
//! - All queue state is owned by one `RateLimitedScheduler`; independent
//!   queues never share windows or counters
//! - Time is read through the `Clock` trait so throttle behaviour can be
//!   driven by Tokio's paused test clock
//! - Removed tasks are dropped, which resolves their handle with
//!   `QueueError::Cancelled`

pub mod clock;
pub mod scheduler;
pub mod types;
pub mod window;

pub use clock::{Clock, TokioClock};
pub use scheduler::{RateLimitedScheduler, TaskHandle};
pub use types::{QueueError, QueueResult, SchedulerConfig};
pub use window::ExecutionWindow;
