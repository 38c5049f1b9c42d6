//! Time source used by the scheduler and the nonce allocator.

use futures_util::future::BoxFuture;
use tokio::time::Instant;

/// Source of monotonic time and timers.
pub trait Clock: Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Future that completes once `deadline` has been reached.
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()>;
}

/// Clock backed by the Tokio timer.
///
/// Honours `tokio::time::pause`, which makes it deterministic under
/// `#[tokio::test(start_paused = true)]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}
