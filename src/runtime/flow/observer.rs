//! Flow and task observers
//!
//! Observers are kept in insertion order under a stable [`ObserverId`]. When
//! an observer's context is cancelled or its owner gone, it is dropped the
//! next time it would fire.

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::pattern::NamePattern;
use super::TaskFlow;
use crate::runtime::apartment::SharedApartment;
use crate::runtime::context::ExecutionContext;
use crate::runtime::error::FlowResult;

/// Callback receiving the flow.
pub type FlowCallback = Arc<dyn Fn(&TaskFlow) + Send + Sync>;

/// Callback receiving the flow and a task name.
pub type TaskCallback = Arc<dyn Fn(&TaskFlow, &str) + Send + Sync>;

/// Handle returned when registering an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

impl std::fmt::Display for ObserverId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Observer({})", self.0)
    }
}

/// Which transition an observer is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Running,
    Completed,
}

/// Flow-level observer registration.
#[derive(Clone, Default)]
pub struct FlowObserver {
    pub(crate) apartment: Option<SharedApartment>,
    pub(crate) on_running: Option<FlowCallback>,
    pub(crate) on_completed: Option<FlowCallback>,
    pub(crate) context: ExecutionContext,
}

impl FlowObserver {
    /// An observer with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the flow starts running.
    pub fn on_running<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(&TaskFlow) + Send + Sync + 'static,
    {
        self.on_running = Some(Arc::new(f));
        self
    }

    /// Called when the flow reaches a terminal state.
    pub fn on_completed<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(&TaskFlow) + Send + Sync + 'static,
    {
        self.on_completed = Some(Arc::new(f));
        self
    }

    /// Run callbacks on `apartment` instead of the flow's default.
    pub fn on(
        mut self,
        apartment: SharedApartment,
    ) -> Self {
        self.apartment = Some(apartment);
        self
    }

    /// Bind the observer's lifetime and priority to `context`.
    pub fn with_context(
        mut self,
        context: ExecutionContext,
    ) -> Self {
        self.context = context;
        self
    }

    fn callback(
        &self,
        phase: Phase,
    ) -> Option<&FlowCallback> {
        match phase {
            Phase::Running => self.on_running.as_ref(),
            Phase::Completed => self.on_completed.as_ref(),
        }
    }
}

/// Task-level observer registration, filtered by a name pattern.
#[derive(Clone)]
pub struct TaskObserver {
    pub(crate) pattern: String,
    pub(crate) apartment: Option<SharedApartment>,
    pub(crate) on_running: Option<TaskCallback>,
    pub(crate) on_completed: Option<TaskCallback>,
    pub(crate) context: ExecutionContext,
}

impl TaskObserver {
    /// An observer of the tasks matching `pattern`.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            apartment: None,
            on_running: None,
            on_completed: None,
            context: ExecutionContext::default(),
        }
    }

    /// Called when a matching task starts running.
    pub fn on_running<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(&TaskFlow, &str) + Send + Sync + 'static,
    {
        self.on_running = Some(Arc::new(f));
        self
    }

    /// Called when a matching task finishes.
    pub fn on_completed<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(&TaskFlow, &str) + Send + Sync + 'static,
    {
        self.on_completed = Some(Arc::new(f));
        self
    }

    /// Run callbacks on `apartment` instead of the flow's default.
    pub fn on(
        mut self,
        apartment: SharedApartment,
    ) -> Self {
        self.apartment = Some(apartment);
        self
    }

    /// Bind the observer's lifetime and priority to `context`.
    pub fn with_context(
        mut self,
        context: ExecutionContext,
    ) -> Self {
        self.context = context;
        self
    }

    pub(crate) fn compile(self) -> FlowResult<CompiledTaskObserver> {
        let pattern = NamePattern::compile(&self.pattern)?;
        Ok(CompiledTaskObserver {
            pattern,
            observer: self,
        })
    }
}

/// A task observer with its pattern compiled.
pub(crate) struct CompiledTaskObserver {
    pattern: NamePattern,
    observer: TaskObserver,
}

impl CompiledTaskObserver {
    fn callback(
        &self,
        phase: Phase,
    ) -> Option<&TaskCallback> {
        match phase {
            Phase::Running => self.observer.on_running.as_ref(),
            Phase::Completed => self.observer.on_completed.as_ref(),
        }
    }
}

/// A callback ready to be scheduled once the flow lock is released.
pub(crate) struct Notification {
    apartment: SharedApartment,
    context: ExecutionContext,
    call: Box<dyn FnOnce() + Send>,
}

impl Notification {
    /// Schedule the callback; it runs only if the context still admits it.
    pub(crate) fn dispatch(self) {
        let Notification {
            apartment,
            context,
            call,
        } = self;
        let priority = context.priority();
        apartment.schedule(
            Box::new(move || {
                let Some(_lock) = context.enter() else {
                    warn!("observer skipped: context cancelled or owner expired");
                    return;
                };
                call();
            }),
            priority,
        );
    }
}

/// Notifications produced by one state change.
pub(crate) type Notifications = SmallVec<[Notification; 4]>;

/// Collect notifications for every live flow observer with a `phase`
/// callback; expired observers are removed.
pub(crate) fn notify_flow_observers(
    observers: &mut IndexMap<ObserverId, FlowObserver>,
    phase: Phase,
    flow: &TaskFlow,
    default_apartment: &SharedApartment,
    out: &mut Notifications,
) {
    observers.retain(|id, observer| {
        let Some(callback) = observer.callback(phase) else {
            return true;
        };
        if observer.context.should_skip() {
            warn!(%id, "flow observer removed: context cancelled or owner expired");
            return false;
        }
        let callback = callback.clone();
        let flow = flow.clone();
        out.push(Notification {
            apartment: observer
                .apartment
                .clone()
                .unwrap_or_else(|| default_apartment.clone()),
            context: observer.context.clone(),
            call: Box::new(move || callback(&flow)),
        });
        true
    });
}

/// Collect notifications for every live task observer whose pattern matches
/// `task`; expired observers are removed.
pub(crate) fn notify_task_observers(
    observers: &mut IndexMap<ObserverId, CompiledTaskObserver>,
    phase: Phase,
    task: &str,
    flow: &TaskFlow,
    default_apartment: &SharedApartment,
    out: &mut Notifications,
) {
    observers.retain(|id, compiled| {
        let Some(callback) = compiled.callback(phase) else {
            return true;
        };
        if !compiled.pattern.matches(task) {
            return true;
        }
        if compiled.observer.context.should_skip() {
            warn!(%id, task, "task observer removed: context cancelled or owner expired");
            return false;
        }
        debug!(%id, task, ?phase, "task observer notified");
        let callback = callback.clone();
        let flow = flow.clone();
        let task = task.to_string();
        out.push(Notification {
            apartment: compiled
                .observer
                .apartment
                .clone()
                .unwrap_or_else(|| default_apartment.clone()),
            context: compiled.observer.context.clone(),
            call: Box::new(move || callback(&flow, task.as_str())),
        });
        true
    });
}
