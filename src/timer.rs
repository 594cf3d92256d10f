//! Bounded waits on async primitives from synchronous threads.
//!
//! The actuator control thread, the broker and the link mailboxes all
//! park on `embassy-sync` futures.  These helpers race such a future
//! against an `async-io-mini` reactor timer and drive the pair with
//! `futures_lite::future::block_on`, so no wait is ever unbounded unless
//! the caller explicitly asks for it.

use core::future::Future;
use core::time::Duration;

use futures_lite::future;

/// Block the current thread on `fut` for at most `timeout`.
///
/// Returns `None` if the timer fired first.
pub fn block_on_timeout<F: Future>(fut: F, timeout: Duration) -> Option<F::Output> {
    future::block_on(future::or(async { Some(fut.await) }, async {
        async_io_mini::Timer::after(timeout).await;
        None
    }))
}

/// Block the current thread on `fut` until it completes.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    future::block_on(fut)
}

/// Sleep the calling thread on the reactor timer.
pub fn sleep(duration: Duration) {
    future::block_on(async_io_mini::Timer::after(duration));
}
