//! Execution contexts
//!
//! An [`ExecutionContext`] travels with every continuation and decides whether
//! it should run at all and at which priority:
//!
//! - an optional owner, bound strongly (kept alive) or weakly (observed)
//! - an optional [`Controller`] whose cancellation skips the continuation
//! - an optional parent context whose bindings apply transitively
//! - a priority, which lives on the handle and is never inherited implicitly
//!
//! The bindings live in reference-counted "fat data" shared between copies of
//! a context. Setters copy the fat data first when it is shared, so a context
//! handed to another thread never changes under it. A context that never had
//! anything bound carries no allocation at all.

mod owner;

pub use owner::{LockOutcome, OwnerGrip, OwnerLock, WeakOwner};

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use owner::{lock_chain, Grips, OwnerBinding};

use crate::runtime::controller::{Controller, ControllerBinding};
use crate::runtime::priority::Priority;

#[derive(Clone, Default)]
pub(crate) struct FatData {
    owner: OwnerBinding,
    controller: Option<ControllerBinding>,
    parent: Option<Arc<FatData>>,
    location: Option<&'static Location<'static>>,
}

/// Cancellation- and lifetime-aware context attached to continuations.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    fat: Option<Arc<FatData>>,
    priority: Priority,
}

impl ExecutionContext {
    /// A context with nothing bound and normal priority.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_priority`](Self::set_priority).
    #[inline]
    pub fn with_priority(
        mut self,
        priority: Priority,
    ) -> Self {
        self.priority = priority;
        self
    }

    /// Builder form of [`bind_controller`](Self::bind_controller).
    pub fn with_controller(
        mut self,
        controller: &Controller,
    ) -> Self {
        self.bind_controller(controller);
        self
    }

    /// Builder form of [`bind_weak_owner`](Self::bind_weak_owner).
    pub fn with_weak_owner<T>(
        mut self,
        owner: &Arc<T>,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.bind_weak_owner(owner);
        self
    }

    /// Builder form of [`bind_strong_owner`](Self::bind_strong_owner).
    pub fn with_strong_owner<T>(
        mut self,
        owner: Arc<T>,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.bind_strong_owner(owner);
        self
    }

    /// Builder form of [`set_parent`](Self::set_parent).
    pub fn with_parent(
        mut self,
        parent: &ExecutionContext,
        inherit_attributes: bool,
    ) -> Self {
        self.set_parent(parent, inherit_attributes);
        self
    }

    /// Keep `owner` alive for as long as this context exists.
    pub fn bind_strong_owner<T>(
        &mut self,
        owner: Arc<T>,
    ) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.fat_mut().owner = OwnerBinding::Strong(owner);
        self
    }

    /// Skip continuations once `owner` is dropped, and keep it alive while
    /// one runs.
    pub fn bind_weak_owner<T>(
        &mut self,
        owner: &Arc<T>,
    ) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.bind_weak_owner_with(Arc::downgrade(owner))
    }

    /// Bind any weak owner implementation.
    pub fn bind_weak_owner_with<W>(
        &mut self,
        owner: W,
    ) -> &mut Self
    where
        W: WeakOwner + 'static,
    {
        self.fat_mut().owner = OwnerBinding::Weak(Arc::new(owner));
        self
    }

    /// Remove this context's own owner binding. Ancestors are unaffected.
    pub fn unbind_owner(&mut self) -> &mut Self {
        if self.fat.as_ref().is_some_and(|fat| fat.owner.is_bound()) {
            self.fat_mut().owner = OwnerBinding::None;
        }
        self
    }

    /// Skip continuations once `controller` (or an ancestor of it) is
    /// cancelled.
    pub fn bind_controller(
        &mut self,
        controller: &Controller,
    ) -> &mut Self {
        self.fat_mut().controller = Some(controller.bind());
        self
    }

    /// Remove this context's own controller binding.
    pub fn unbind_controller(&mut self) -> &mut Self {
        if self.fat.as_ref().is_some_and(|fat| fat.controller.is_some()) {
            self.fat_mut().controller = None;
        }
        self
    }

    /// Chain this context under `parent`; the parent's owner and controller
    /// bindings then apply to this context as well.
    ///
    /// Priority is copied from the parent only when `inherit_attributes` is
    /// set.
    pub fn set_parent(
        &mut self,
        parent: &ExecutionContext,
        inherit_attributes: bool,
    ) -> &mut Self {
        if inherit_attributes {
            self.priority = parent.priority;
        }
        match &parent.fat {
            Some(parent_fat) => self.fat_mut().parent = Some(parent_fat.clone()),
            None => {
                if self.fat.as_ref().is_some_and(|fat| fat.parent.is_some()) {
                    self.fat_mut().parent = None;
                }
            }
        }
        self
    }

    /// Set the scheduling priority of this handle.
    #[inline]
    pub fn set_priority(
        &mut self,
        priority: Priority,
    ) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Scheduling priority of this handle.
    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Record the caller's source location for diagnostics.
    #[track_caller]
    pub fn tag_location(&mut self) -> &mut Self {
        self.fat_mut().location = Some(Location::caller());
        self
    }

    /// Source location recorded by [`tag_location`](Self::tag_location).
    #[inline]
    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.fat.as_ref().and_then(|fat| fat.location)
    }

    /// Whether any binding was ever made (i.e. fat data is allocated).
    #[inline]
    pub fn has_fat_data(&self) -> bool {
        self.fat.is_some()
    }

    /// Number of linked fat data records, this context included.
    pub fn depth(&self) -> usize {
        self.chain().count()
    }

    /// Whether this context or any ancestor binds a weak owner that is gone.
    pub fn check_owner_expired(&self) -> bool {
        self.chain().any(|node| node.owner.is_expired())
    }

    /// Whether this context or any ancestor binds a cancelled controller.
    pub fn check_controller_cancelled(&self) -> bool {
        self.chain().any(|node| {
            node.controller
                .as_ref()
                .is_some_and(ControllerBinding::is_cancelled)
        })
    }

    /// Whether a continuation bound to this context must not run.
    #[inline]
    pub fn should_skip(&self) -> bool {
        self.check_controller_cancelled() || self.check_owner_expired()
    }

    /// Lock every weak owner in the chain, all or nothing.
    pub fn lock_owners(&self) -> LockOutcome {
        let Some(fat) = self.fat.as_deref() else {
            return LockOutcome::Locked(OwnerLock::default());
        };
        let mut grips = Grips::new();
        if lock_chain(fat, &mut grips) {
            LockOutcome::Locked(OwnerLock::from_grips(grips))
        } else {
            LockOutcome::Expired
        }
    }

    /// Gate one invocation of a continuation bound to this context.
    ///
    /// Returns the owner lock to hold for the duration of the call, or `None`
    /// when the continuation must be skipped.
    pub fn enter(&self) -> Option<OwnerLock> {
        if self.check_controller_cancelled() {
            return None;
        }
        match self.lock_owners() {
            LockOutcome::Locked(lock) => Some(lock),
            LockOutcome::Expired => None,
        }
    }

    /// Whether two handles share the same fat data record.
    pub fn shares_data_with(
        &self,
        other: &ExecutionContext,
    ) -> bool {
        match (&self.fat, &other.fat) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn fat_mut(&mut self) -> &mut FatData {
        Arc::make_mut(self.fat.get_or_insert_with(Default::default))
    }

    fn chain(&self) -> impl Iterator<Item = &FatData> {
        std::iter::successors(self.fat.as_deref(), |node| node.parent.as_deref())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("priority", &self.priority)
            .field("depth", &self.depth())
            .field("location", &self.location())
            .finish()
    }
}
