//! Hierarchical cancellation controller
//!
//! A `Controller` is a cancel flag plus a count of the execution contexts
//! currently bound to it. Children observe cancellation of any ancestor.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct ControllerData {
    cancelled: AtomicBool,
    pending: AtomicUsize,
    parent: Option<Arc<ControllerData>>,
}

impl ControllerData {
    fn is_cancelled(&self) -> bool {
        let mut node = Some(self);
        while let Some(current) = node {
            if current.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            node = current.parent.as_deref();
        }
        false
    }
}

/// Cancellation flag shared by every context bound to it.
#[derive(Debug, Clone, Default)]
pub struct Controller {
    data: Arc<ControllerData>,
}

impl Controller {
    /// Create a root controller.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller that is also cancelled when `self` is.
    pub fn child(&self) -> Self {
        Self {
            data: Arc::new(ControllerData {
                parent: Some(self.data.clone()),
                ..ControllerData::default()
            }),
        }
    }

    /// Cancel this controller and, transitively, all its children.
    pub fn cancel(&self) {
        if !self.data.cancelled.swap(true, Ordering::SeqCst) {
            debug!(pending = self.pending_count(), "controller cancelled");
        }
    }

    /// Whether this controller or any ancestor was cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.data.is_cancelled()
    }

    /// Number of context bindings currently holding this controller.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.data.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn bind(&self) -> ControllerBinding {
        ControllerBinding::new(self.data.clone())
    }
}

/// One context's hold on a controller; counted in `pending_count`.
#[derive(Debug)]
pub(crate) struct ControllerBinding {
    data: Arc<ControllerData>,
}

impl ControllerBinding {
    fn new(data: Arc<ControllerData>) -> Self {
        data.pending.fetch_add(1, Ordering::SeqCst);
        Self { data }
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.data.is_cancelled()
    }
}

impl Clone for ControllerBinding {
    fn clone(&self) -> Self {
        Self::new(self.data.clone())
    }
}

impl Drop for ControllerBinding {
    fn drop(&mut self) {
        self.data.pending.fetch_sub(1, Ordering::SeqCst);
    }
}
