//! Owner bindings and the all-or-nothing owner lock

use std::any::Any;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use super::FatData;

/// Keeps one owner alive while held.
pub type OwnerGrip = Box<dyn Any + Send>;

/// Liveness capability of a weakly bound owner.
pub trait WeakOwner: Send + Sync {
    /// Whether the owner is gone.
    fn is_expired(&self) -> bool;

    /// Keep the owner alive until the returned grip drops, or `None` if it is
    /// already gone.
    fn try_lock(&self) -> Option<OwnerGrip>;
}

impl<T> WeakOwner for Weak<T>
where
    T: Send + Sync + 'static,
{
    #[inline]
    fn is_expired(&self) -> bool {
        self.strong_count() == 0
    }

    fn try_lock(&self) -> Option<OwnerGrip> {
        self.upgrade().map(|owner| Box::new(owner) as OwnerGrip)
    }
}

/// How a context is tied to the lifetime of its owner.
#[derive(Clone, Default)]
pub(crate) enum OwnerBinding {
    #[default]
    None,
    /// Kept alive by the context itself.
    Strong(Arc<dyn Any + Send + Sync>),
    /// Observed; must be locked around each invocation.
    Weak(Arc<dyn WeakOwner>),
}

impl OwnerBinding {
    #[inline]
    pub(crate) fn is_expired(&self) -> bool {
        match self {
            OwnerBinding::Weak(owner) => owner.is_expired(),
            OwnerBinding::None | OwnerBinding::Strong(_) => false,
        }
    }

    #[inline]
    pub(crate) fn is_bound(&self) -> bool {
        !matches!(self, OwnerBinding::None)
    }
}

/// Grips taken while locking one chain.
pub(super) type Grips = SmallVec<[OwnerGrip; 4]>;

/// Grips on every weak owner of a context chain.
///
/// Dropping the lock releases the grips innermost first, the reverse of the
/// order they were taken in.
#[derive(Default)]
pub struct OwnerLock {
    grips: Grips,
}

impl OwnerLock {
    pub(super) fn from_grips(grips: Grips) -> Self {
        Self { grips }
    }

    /// Number of owners held alive.
    #[inline]
    pub fn len(&self) -> usize {
        self.grips.len()
    }

    /// Whether no owner needed locking.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.grips.is_empty()
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        while let Some(grip) = self.grips.pop() {
            drop(grip);
        }
    }
}

impl std::fmt::Debug for OwnerLock {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("OwnerLock")
            .field("grips", &self.grips.len())
            .finish()
    }
}

/// Result of locking a context chain.
#[derive(Debug)]
pub enum LockOutcome {
    /// Every weak owner in the chain is held until the lock drops.
    Locked(OwnerLock),
    /// Some owner in the chain is gone; nothing is held.
    Expired,
}

impl LockOutcome {
    /// Whether the chain was locked.
    #[inline]
    pub fn is_locked(&self) -> bool {
        matches!(self, LockOutcome::Locked(_))
    }
}

/// Lock `node` and all its ancestors, root first.
///
/// On failure every grip taken by this call is released again, nearest
/// ancestor first, and `grips` is left as it was on entry.
pub(super) fn lock_chain(
    node: &FatData,
    grips: &mut Grips,
) -> bool {
    let base = grips.len();
    if let Some(parent) = node.parent.as_deref() {
        if !lock_chain(parent, grips) {
            return false;
        }
    }

    let OwnerBinding::Weak(owner) = &node.owner else {
        return true;
    };
    match owner.try_lock() {
        Some(grip) => {
            grips.push(grip);
            true
        }
        None => {
            release_to(grips, base);
            false
        }
    }
}

fn release_to(
    grips: &mut Grips,
    base: usize,
) {
    while grips.len() > base {
        drop(grips.pop());
    }
}
