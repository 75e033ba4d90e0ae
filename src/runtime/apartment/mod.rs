//! Apartments: executors that run scheduled work
//!
//! An apartment accepts `schedule(work, priority)` and runs `work`
//! asynchronously. Priority is a hint; ordering is otherwise unspecified.
//!
//! - [`ThreadPoolApartment`] - fixed worker threads over a priority queue
//! - [`InlineApartment`] - runs work on the calling thread, without nesting
//! - [`default_apartment`] - shared pool used by `TaskFlow::new`

pub mod pool;
pub mod queue;

pub use pool::{ApartmentConfig, ApartmentStats, ThreadPoolApartment};
pub use queue::PriorityWorkQueue;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::error;

use crate::runtime::priority::Priority;

/// Process-wide pool used when no apartment is given.
static DEFAULT_APARTMENT: Lazy<SharedApartment> = Lazy::new(|| {
    match ThreadPoolApartment::new() {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            error!(error = %e, "failed to start default thread pool, running work inline");
            InlineApartment::shared()
        }
    }
});

/// The process-wide default apartment, started on first use.
pub fn default_apartment() -> SharedApartment {
    DEFAULT_APARTMENT.clone()
}

/// A unit of scheduled work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to an apartment.
pub type SharedApartment = Arc<dyn Apartment>;

/// Executor abstraction.
pub trait Apartment: Send + Sync {
    /// Run `work` at some later point; fire and forget.
    fn schedule(
        &self,
        work: Work,
        priority: Priority,
    );
}

/// Apartment that runs work on the thread calling `schedule`.
///
/// The outermost `schedule` on a thread runs the work before returning.
/// Work scheduled while that runs is queued and executed by the same
/// outermost call in FIFO order, so long chains of continuations run in
/// constant stack depth. Priority is ignored.
///
/// Useful for deterministic tests and single-threaded tools. Blocking on a
/// future from inside inline work deadlocks when that future is completed
/// by work queued behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineApartment;

thread_local! {
    static INLINE_QUEUE: RefCell<VecDeque<Work>> = const { RefCell::new(VecDeque::new()) };
    static INLINE_DRAINING: Cell<bool> = const { Cell::new(false) };
}

impl InlineApartment {
    /// Shared handle to an inline apartment.
    #[inline]
    pub fn shared() -> SharedApartment {
        Arc::new(InlineApartment)
    }

    /// Number of items queued on this thread behind the running one.
    pub fn queued() -> usize {
        INLINE_QUEUE.with(|queue| queue.borrow().len())
    }
}

impl Apartment for InlineApartment {
    fn schedule(
        &self,
        work: Work,
        _priority: Priority,
    ) {
        INLINE_QUEUE.with(|queue| queue.borrow_mut().push_back(work));
        if INLINE_DRAINING.with(|draining| draining.replace(true)) {
            return;
        }

        while let Some(work) = INLINE_QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
            if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                error!("inline work panicked");
            }
        }
        INLINE_DRAINING.with(|draining| draining.set(false));
    }
}

#[cfg(test)]
mod tests;
