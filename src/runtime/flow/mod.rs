//! DAG task flow
//!
//! A [`TaskFlow`] runs named tasks whose declarations list the tasks they
//! depend on. A task becomes ready once every dependency finished, and at
//! most `concurrency_limit` tasks run at the same time.
//!
//! # Execution model
//!
//! One mutex guards all flow bookkeeping. Entry points update the
//! bookkeeping under the lock and collect what has to happen next (trigger
//! an evaluator, notify an observer, complete the flow future); that work is
//! performed after the lock is released, so no evaluator or observer ever
//! runs under it. Each task's completion handler re-enters the flow through
//! the same path.
//!
//! # Example
//!
//! ```
//! use flowrt::runtime::apartment::InlineApartment;
//! use flowrt::runtime::context::ExecutionContext;
//! use flowrt::runtime::error::FlowResult;
//! use flowrt::runtime::flow::{FlowStatus, TaskFlow};
//! use flowrt::runtime::value::AnyValue;
//!
//! let flow = TaskFlow::with_apartment(InlineApartment::shared());
//! flow.add_task(
//!     "fetch",
//!     |_| -> FlowResult<AnyValue> { Ok(AnyValue::new(2u32)) },
//!     ExecutionContext::new(),
//! )?;
//! flow.add_task(
//!     "double:fetch",
//!     |input: AnyValue| -> FlowResult<AnyValue> { Ok(AnyValue::new(input.get::<u32>() * 2)) },
//!     ExecutionContext::new(),
//! )?;
//! flow.start()?;
//! assert_eq!(flow.wait(), FlowStatus::Succeeded);
//! assert_eq!(flow.task_result("double").unwrap()?.get::<u32>(), &4);
//! # Ok::<(), flowrt::runtime::error::FlowError>(())
//! ```

mod graph;
mod observer;
mod pattern;
mod spec;
mod task;

pub use graph::compute_levels;
pub use observer::{FlowCallback, FlowObserver, ObserverId, TaskCallback, TaskObserver};
pub use pattern::NamePattern;
pub use spec::{is_valid_name, TaskSpec};
pub use task::TaskStatus;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use observer::{
    notify_flow_observers, notify_task_observers, CompiledTaskObserver, Notifications, Phase,
};
use task::TaskItem;

use crate::runtime::apartment::{default_apartment, SharedApartment};
use crate::runtime::context::ExecutionContext;
use crate::runtime::error::{FlowError, FlowResult};
use crate::runtime::future::{Future, IntoFlowFuture, Promise};
use crate::runtime::priority::Priority;
use crate::runtime::value::AnyValue;

/// Flow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Maximum number of tasks running at once; unbounded when absent.
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
}

impl FlowConfig {
    /// Check the settings [`TaskFlow::set_concurrency_limit`] would reject.
    pub fn validate(&self) -> FlowResult<()> {
        if self.concurrency_limit == Some(0) {
            return Err(FlowError::validation("concurrency limit must be at least 1"));
        }
        Ok(())
    }
}

/// Flow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStatus {
    /// Tasks may still be added.
    NotStarted,
    /// Tasks are executing.
    Running,
    /// Every task succeeded.
    Succeeded,
    /// At least one task failed.
    Failed,
}

impl FlowStatus {
    /// Whether the flow reached a final state.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowStatus::Succeeded | FlowStatus::Failed)
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            FlowStatus::NotStarted => "not-started",
            FlowStatus::Running => "running",
            FlowStatus::Succeeded => "succeeded",
            FlowStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Number of tasks in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowCounts {
    pub total: usize,
    pub not_started: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

struct FlowState {
    status: FlowStatus,
    tasks: IndexMap<String, TaskItem>,
    /// Ready tasks waiting for a free slot, in arrival order.
    pending: VecDeque<String>,
    /// Task name to the tasks that depend on it; built at start.
    dependents: HashMap<String, Vec<String>>,
    running: usize,
    succeeded: usize,
    failed: usize,
    first_failure: Option<(String, FlowError)>,
    flow_observers: IndexMap<ObserverId, FlowObserver>,
    task_observers: IndexMap<ObserverId, CompiledTaskObserver>,
    next_observer: u64,
    /// Completion promise; only present while someone asked for it and the
    /// flow has not completed.
    completion: Option<Promise<TaskFlow>>,
    user_data: AnyValue,
    concurrency_limit: Option<usize>,
}

impl FlowState {
    fn new(concurrency_limit: Option<usize>) -> Self {
        Self {
            status: FlowStatus::NotStarted,
            tasks: IndexMap::new(),
            pending: VecDeque::new(),
            dependents: HashMap::new(),
            running: 0,
            succeeded: 0,
            failed: 0,
            first_failure: None,
            flow_observers: IndexMap::new(),
            task_observers: IndexMap::new(),
            next_observer: 0,
            completion: None,
            user_data: AnyValue::empty(),
            concurrency_limit,
        }
    }

    fn levels(&self) -> FlowResult<Vec<usize>> {
        compute_levels(self.tasks.values().map(|task| {
            (
                task.name.as_str(),
                task.dependencies.iter().map(String::as_str),
            )
        }))
    }

    fn index_dependents(&mut self) {
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for task in self.tasks.values() {
            for dependency in &task.dependencies {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(task.name.clone());
            }
        }
        self.dependents = dependents;
    }

    fn next_observer_id(&mut self) -> ObserverId {
        self.next_observer += 1;
        ObserverId(self.next_observer)
    }

    /// Move every piece of bookkeeping out, to be dropped after unlocking.
    fn release(&mut self) -> Released {
        self.dependents.clear();
        Released {
            tasks: std::mem::take(&mut self.tasks),
            pending: std::mem::take(&mut self.pending),
            flow_observers: std::mem::take(&mut self.flow_observers),
            task_observers: std::mem::take(&mut self.task_observers),
            user_data: self.user_data.take(),
        }
    }
}

/// Bookkeeping released by a cleanup; dropped outside the flow lock because
/// dropping unresolved triggers runs their continuations.
struct Released {
    tasks: IndexMap<String, TaskItem>,
    pending: VecDeque<String>,
    flow_observers: IndexMap<ObserverId, FlowObserver>,
    task_observers: IndexMap<ObserverId, CompiledTaskObserver>,
    user_data: AnyValue,
}

/// Work collected under the flow lock and performed after it is released.
#[derive(Default)]
struct Effects {
    notifications: Notifications,
    triggers: SmallVec<[(Promise<AnyValue>, FlowResult<AnyValue>); 2]>,
    completion: Option<(Promise<TaskFlow>, FlowResult<TaskFlow>)>,
    released: Option<Released>,
}

impl Effects {
    fn run(self) {
        for notification in self.notifications {
            notification.dispatch();
        }
        for (trigger, argument) in self.triggers {
            trigger.complete(argument);
        }
        if let Some((promise, result)) = self.completion {
            promise.complete(result);
        }
        if let Some(released) = self.released {
            debug!(
                tasks = released.tasks.len(),
                queued = released.pending.len(),
                observers = released.flow_observers.len() + released.task_observers.len(),
                user_data = released.user_data.has_value(),
                "flow bookkeeping released"
            );
        }
    }
}

struct FlowInner {
    state: Mutex<FlowState>,
    finished: Condvar,
    cancel_requested: AtomicBool,
    cleanup_requested: AtomicBool,
    apartment: SharedApartment,
}

impl FlowInner {
    /// Whether evaluators that have not started yet must be skipped.
    #[inline]
    fn is_short_circuited(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst) || self.cleanup_requested.load(Ordering::SeqCst)
    }
}

/// A DAG of named tasks run with bounded concurrency.
///
/// Cloning yields another handle to the same flow.
#[derive(Clone)]
pub struct TaskFlow {
    inner: Arc<FlowInner>,
}

impl TaskFlow {
    /// A flow on the process-wide default apartment.
    pub fn new() -> Self {
        Self::with_apartment(default_apartment())
    }

    /// A flow whose tasks and observers run on `apartment` by default.
    pub fn with_apartment(apartment: SharedApartment) -> Self {
        Self::with_config(apartment, &FlowConfig::default())
    }

    /// A flow configured from `config`.
    ///
    /// A zero concurrency limit is invalid; it is logged and ignored, leaving
    /// the flow unbounded. [`FlowConfig::validate`] reports it up front.
    pub fn with_config(
        apartment: SharedApartment,
        config: &FlowConfig,
    ) -> Self {
        let limit = match config.concurrency_limit {
            Some(0) => {
                warn!("concurrency limit 0 in flow configuration ignored");
                None
            }
            limit => limit,
        };
        Self {
            inner: Arc::new(FlowInner {
                state: Mutex::new(FlowState::new(limit)),
                finished: Condvar::new(),
                cancel_requested: AtomicBool::new(false),
                cleanup_requested: AtomicBool::new(false),
                apartment,
            }),
        }
    }

    /// Default apartment of this flow.
    #[inline]
    pub fn apartment(&self) -> &SharedApartment {
        &self.inner.apartment
    }

    /// Add a task running on the flow's default apartment.
    ///
    /// See [`add_task_on`](Self::add_task_on).
    pub fn add_task<F, R>(
        &self,
        spec: &str,
        evaluator: F,
        context: ExecutionContext,
    ) -> FlowResult<()>
    where
        F: FnOnce(AnyValue) -> R + Send + 'static,
        R: IntoFlowFuture<AnyValue>,
    {
        self.add_task_on(spec, self.inner.apartment.clone(), evaluator, context)
    }

    /// Add a task declared as `name` or `name:dep1,dep2,...`.
    ///
    /// The evaluator receives the result of the last dependency to finish
    /// (an empty value for tasks without dependencies) and runs on
    /// `apartment` under `context`. It is never invoked when a dependency
    /// failed, when the flow was cancelled or cleaned up first, or when
    /// `context` no longer admits it; the task then fails with
    /// [`FlowError::Cancelled`].
    pub fn add_task_on<F, R>(
        &self,
        spec: &str,
        apartment: SharedApartment,
        evaluator: F,
        context: ExecutionContext,
    ) -> FlowResult<()>
    where
        F: FnOnce(AnyValue) -> R + Send + 'static,
        R: IntoFlowFuture<AnyValue>,
    {
        let TaskSpec { name, dependencies } = TaskSpec::parse(spec)?;

        let mut state = self.inner.state.lock();
        if state.status != FlowStatus::NotStarted {
            return Err(FlowError::validation(format!(
                "cannot add task `{}`: flow already started",
                name
            )));
        }
        if state.tasks.contains_key(&name) {
            return Err(FlowError::validation(format!("duplicate task `{}`", name)));
        }

        let trigger = Promise::new();
        let flow = Arc::downgrade(&self.inner);
        let gated = move |argument: AnyValue| -> Future<AnyValue> {
            let stopped = flow
                .upgrade()
                .map_or(true, |inner| inner.is_short_circuited());
            if stopped {
                return Future::failed(FlowError::cancelled("flow stopped before the task ran"));
            }
            evaluator(argument).into_flow_future()
        };
        let result = trigger.future().then(&apartment, gated, context);

        let flow = Arc::downgrade(&self.inner);
        let finished = name.clone();
        result.on_completion(
            &apartment,
            move |outcome| {
                if let Some(inner) = flow.upgrade() {
                    TaskFlow { inner }.finish_task(&finished, outcome);
                }
            },
            ExecutionContext::new().with_priority(Priority::High),
        );

        debug!(task = %name, dependencies = ?dependencies, "task added");
        state.tasks.insert(
            name.clone(),
            TaskItem::new(name, dependencies, apartment, trigger, result),
        );
        Ok(())
    }

    /// Bound the number of simultaneously running tasks. Only before start.
    pub fn set_concurrency_limit(
        &self,
        limit: usize,
    ) -> FlowResult<()> {
        if limit == 0 {
            return Err(FlowError::validation("concurrency limit must be at least 1"));
        }
        let mut state = self.inner.state.lock();
        if state.status != FlowStatus::NotStarted {
            return Err(FlowError::validation(
                "concurrency limit cannot change after start",
            ));
        }
        state.concurrency_limit = Some(limit);
        Ok(())
    }

    /// Current concurrency limit; `None` means unbounded.
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.inner.state.lock().concurrency_limit
    }

    /// Validate the graph and compute levels without starting.
    ///
    /// Returns `(name, level)` in registration order.
    pub fn plan(&self) -> FlowResult<Vec<(String, usize)>> {
        let state = self.inner.state.lock();
        let levels = state.levels()?;
        Ok(state.tasks.keys().cloned().zip(levels).collect())
    }

    /// Validate the graph and start every task without dependencies.
    ///
    /// On error the flow stays not started.
    pub fn start(&self) -> FlowResult<()> {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            if state.status != FlowStatus::NotStarted {
                return Err(FlowError::validation("flow already started"));
            }
            let levels = state.levels()?;
            for (task, level) in state.tasks.values_mut().zip(levels) {
                task.level = level;
            }
            state.index_dependents();

            state.status = FlowStatus::Running;
            info!(
                tasks = state.tasks.len(),
                limit = ?state.concurrency_limit,
                "flow started"
            );
            self.notify_flow(&mut state, Phase::Running, &mut effects);

            let FlowState { tasks, pending, .. } = &mut *state;
            for task in tasks.values_mut().filter(|task| task.dependencies.is_empty()) {
                task.make_pending(Ok(AnyValue::empty()));
                pending.push_back(task.name.clone());
            }

            if state.tasks.is_empty() {
                self.complete(&mut state, &mut effects);
            } else {
                self.drain(&mut state, &mut effects);
            }
        }
        effects.run();
        Ok(())
    }

    /// Ask the flow to stop: evaluators that have not started are skipped and
    /// their tasks fail with a cancellation error. Running evaluators finish.
    pub fn try_cancel(&self) {
        if !self.inner.cancel_requested.swap(true, Ordering::SeqCst) {
            info!("flow cancellation requested");
        }
    }

    /// Whether [`try_cancel`](Self::try_cancel) was called.
    #[inline]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }

    /// Release tasks, observers and user data.
    ///
    /// Immediate when the flow is not running, otherwise deferred until it
    /// completes. Safe to call any number of times.
    pub fn force_cleanup(&self) {
        self.inner.cleanup_requested.store(true, Ordering::SeqCst);
        let released = {
            let mut state = self.inner.state.lock();
            if state.status == FlowStatus::Running {
                debug!("flow cleanup deferred until completion");
                return;
            }
            state.release()
        };
        Effects {
            released: Some(released),
            ..Effects::default()
        }
        .run();
    }

    /// Block until the flow reaches a terminal state.
    ///
    /// Called before [`start`](Self::start), this waits for some other
    /// thread to start the flow and for it to finish.
    pub fn wait(&self) -> FlowStatus {
        let mut state = self.inner.state.lock();
        while !state.status.is_terminal() {
            self.inner.finished.wait(&mut state);
        }
        state.status
    }

    /// Block for at most `timeout`; returns whether the flow finished.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.status.is_terminal() {
            if self
                .inner
                .finished
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.status.is_terminal();
            }
        }
        true
    }

    /// Future completed with this flow on success, or with the first task
    /// error on failure.
    pub fn flow_future(&self) -> Future<TaskFlow> {
        let mut state = self.inner.state.lock();
        match state.status {
            FlowStatus::Succeeded => Future::ready(self.clone()),
            FlowStatus::Failed => Future::failed(first_error(&state)),
            FlowStatus::NotStarted | FlowStatus::Running => {
                state.completion.get_or_insert_with(Promise::new).future()
            }
        }
    }

    /// Register a flow observer.
    pub fn add_flow_observer(
        &self,
        observer: FlowObserver,
    ) -> ObserverId {
        let mut state = self.inner.state.lock();
        let id = state.next_observer_id();
        state.flow_observers.insert(id, observer);
        debug!(%id, "flow observer added");
        id
    }

    /// Register a task observer; fails when its pattern is empty or invalid.
    pub fn add_task_observer(
        &self,
        observer: TaskObserver,
    ) -> FlowResult<ObserverId> {
        let compiled = observer.compile()?;
        let mut state = self.inner.state.lock();
        let id = state.next_observer_id();
        state.task_observers.insert(id, compiled);
        debug!(%id, "task observer added");
        Ok(id)
    }

    /// Remove an observer; returns whether it was registered.
    pub fn remove_observer(
        &self,
        id: ObserverId,
    ) -> bool {
        let (flow_observer, task_observer) = {
            let mut state = self.inner.state.lock();
            (
                state.flow_observers.shift_remove(&id),
                state.task_observers.shift_remove(&id),
            )
        };
        flow_observer.is_some() || task_observer.is_some()
    }

    /// Attach auxiliary data, released by [`force_cleanup`](Self::force_cleanup).
    pub fn set_user_data(
        &self,
        value: AnyValue,
    ) {
        let previous = std::mem::replace(&mut self.inner.state.lock().user_data, value);
        drop(previous);
    }

    /// The attached auxiliary data; empty when none.
    pub fn user_data(&self) -> AnyValue {
        self.inner.state.lock().user_data.clone()
    }

    /// Current flow status.
    pub fn status(&self) -> FlowStatus {
        self.inner.state.lock().status
    }

    /// Whether the flow reached a terminal state.
    pub fn is_flow_completed(&self) -> bool {
        self.status().is_terminal()
    }

    /// Whether task `name` reached a terminal state; `false` if unknown.
    pub fn is_task_completed(
        &self,
        name: &str,
    ) -> bool {
        self.task_status(name).is_some_and(TaskStatus::is_terminal)
    }

    pub fn task_status(
        &self,
        name: &str,
    ) -> Option<TaskStatus> {
        self.inner.state.lock().tasks.get(name).map(|task| task.status)
    }

    /// Level of task `name`; `0` until the flow started.
    pub fn task_level(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.inner.state.lock().tasks.get(name).map(|task| task.level)
    }

    /// Outcome of task `name` once it finished.
    pub fn task_result(
        &self,
        name: &str,
    ) -> Option<FlowResult<AnyValue>> {
        self.inner
            .state
            .lock()
            .tasks
            .get(name)
            .and_then(|task| task.last_result.clone())
    }

    /// Future of task `name`'s outcome.
    pub fn task_future(
        &self,
        name: &str,
    ) -> Option<Future<AnyValue>> {
        self.inner
            .state
            .lock()
            .tasks
            .get(name)
            .map(|task| task.result.clone())
    }

    /// Task names in registration order.
    pub fn task_names(&self) -> Vec<String> {
        self.inner.state.lock().tasks.keys().cloned().collect()
    }

    pub fn counts(&self) -> FlowCounts {
        let state = self.inner.state.lock();
        let total = state.tasks.len();
        let pending = state.pending.len();
        FlowCounts {
            total,
            not_started: total.saturating_sub(pending + state.running + state.succeeded + state.failed),
            pending,
            running: state.running,
            succeeded: state.succeeded,
            failed: state.failed,
        }
    }

    /// Error of the first task that failed.
    pub fn last_error(&self) -> Option<FlowError> {
        self.inner
            .state
            .lock()
            .first_failure
            .as_ref()
            .map(|(_, error)| error.clone())
    }

    /// Name of the first task that failed.
    pub fn failed_task_name(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .first_failure
            .as_ref()
            .map(|(name, _)| name.clone())
    }

    /// Record the outcome of task `name` and advance the graph.
    fn finish_task(
        &self,
        name: &str,
        outcome: FlowResult<AnyValue>,
    ) {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            if state.status != FlowStatus::Running {
                debug!(task = name, status = %state.status, "late task completion ignored");
                return;
            }
            match state.tasks.get_mut(name) {
                Some(task) if task.status == TaskStatus::Running => {
                    task.status = if outcome.is_ok() {
                        TaskStatus::Succeeded
                    } else {
                        TaskStatus::Failed
                    };
                    task.last_result = Some(outcome.clone());
                }
                _ => {
                    debug!(task = name, "completion for a task that is not running ignored");
                    return;
                }
            }

            state.running -= 1;
            match &outcome {
                Ok(_) => {
                    state.succeeded += 1;
                    debug!(task = name, "task succeeded");
                }
                Err(error) => {
                    state.failed += 1;
                    debug!(task = name, %error, "task failed");
                    if state.first_failure.is_none() {
                        state.first_failure = Some((name.to_string(), error.clone()));
                    }
                }
            }

            self.notify_task(&mut state, Phase::Completed, name, &mut effects);
            release_dependents(&mut state, name, &outcome);
            self.drain(&mut state, &mut effects);
            self.drain_stuck(&mut state, &mut effects);

            if state.succeeded + state.failed == state.tasks.len() {
                self.complete(&mut state, &mut effects);
            }
        }
        effects.run();
    }

    /// Promote queued tasks while slots are free.
    fn drain(
        &self,
        state: &mut FlowState,
        effects: &mut Effects,
    ) {
        let limit = state.concurrency_limit.unwrap_or(usize::MAX);
        while state.running < limit {
            let Some(name) = state.pending.pop_front() else {
                break;
            };
            let Some(task) = state.tasks.get_mut(&name) else {
                continue;
            };
            task.status = TaskStatus::Running;
            if let (Some(trigger), Some(argument)) = (task.trigger.take(), task.argument.take()) {
                effects.triggers.push((trigger, argument));
            }
            state.running += 1;
            debug!(task = %name, running = state.running, "task running");
            self.notify_task(state, Phase::Running, &name, effects);
        }
    }

    /// Fail tasks that can no longer become ready instead of hanging.
    fn drain_stuck(
        &self,
        state: &mut FlowState,
        effects: &mut Effects,
    ) {
        if !state.pending.is_empty() || state.running > 0 {
            return;
        }
        let FlowState { tasks, pending, .. } = &mut *state;
        let mut forced = 0usize;
        for task in tasks
            .values_mut()
            .filter(|task| task.status == TaskStatus::NotStarted)
        {
            let error = FlowError::cancelled(format!(
                "task `{}` forced to finish: dependencies never resolved",
                task.name
            ));
            task.make_pending(Err(error));
            pending.push_back(task.name.clone());
            forced += 1;
        }
        if forced > 0 {
            error!(forced, "no task pending or running; failing stuck tasks");
            self.drain(state, effects);
        }
    }

    fn complete(
        &self,
        state: &mut FlowState,
        effects: &mut Effects,
    ) {
        let result = if state.first_failure.is_none() {
            state.status = FlowStatus::Succeeded;
            Ok(self.clone())
        } else {
            state.status = FlowStatus::Failed;
            Err(first_error(state))
        };
        info!(
            status = %state.status,
            succeeded = state.succeeded,
            failed = state.failed,
            "flow finished"
        );

        self.notify_flow(state, Phase::Completed, effects);
        self.inner.finished.notify_all();
        if let Some(promise) = state.completion.take() {
            effects.completion = Some((promise, result));
        }
        if self.inner.cleanup_requested.load(Ordering::SeqCst) {
            effects.released = Some(state.release());
        }
    }

    fn notify_flow(
        &self,
        state: &mut FlowState,
        phase: Phase,
        effects: &mut Effects,
    ) {
        notify_flow_observers(
            &mut state.flow_observers,
            phase,
            self,
            &self.inner.apartment,
            &mut effects.notifications,
        );
    }

    fn notify_task(
        &self,
        state: &mut FlowState,
        phase: Phase,
        task: &str,
        effects: &mut Effects,
    ) {
        notify_task_observers(
            &mut state.task_observers,
            phase,
            task,
            self,
            &self.inner.apartment,
            &mut effects.notifications,
        );
    }
}

impl Default for TaskFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskFlow {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TaskFlow")
            .field("status", &self.status())
            .field("counts", &self.counts())
            .finish()
    }
}

/// Drop `finished` from every waiting task and queue those left with no
/// dependency.
fn release_dependents(
    state: &mut FlowState,
    finished: &str,
    outcome: &FlowResult<AnyValue>,
) {
    let FlowState {
        tasks,
        pending,
        dependents,
        ..
    } = state;
    let Some(names) = dependents.get(finished) else {
        return;
    };
    for name in names {
        let Some(task) = tasks.get_mut(name) else {
            continue;
        };
        if task.status != TaskStatus::NotStarted {
            continue;
        }
        if task.dependency_finished(finished, outcome.is_err()) {
            let argument = match task.dependency_failure.take() {
                Some(error) => Err(error),
                None => outcome.clone(),
            };
            task.make_pending(argument);
            pending.push_back(task.name.clone());
        }
    }
}

fn first_error(state: &FlowState) -> FlowError {
    state
        .first_failure
        .as_ref()
        .map(|(_, error)| error.clone())
        .unwrap_or_else(|| FlowError::cancelled("flow failed"))
}

#[cfg(test)]
mod tests;
