//! Task bookkeeping for a [`TaskFlow`](super::TaskFlow).

use std::collections::HashSet;

use crate::runtime::apartment::SharedApartment;
use crate::runtime::error::{FlowError, FlowResult};
use crate::runtime::future::{Future, Promise};
use crate::runtime::value::AnyValue;

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Waiting for dependencies.
    NotStarted,
    /// Ready, queued behind the concurrency limit.
    Pending,
    /// Evaluator triggered.
    Running,
    /// Finished with a value.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Whether the task reached a final state.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            TaskStatus::NotStarted => "not-started",
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One task registered with a flow.
pub(crate) struct TaskItem {
    pub(crate) name: String,
    /// Declared dependencies, in declaration order.
    pub(crate) dependencies: Vec<String>,
    /// Topological depth; `0` until the flow starts.
    pub(crate) level: usize,
    pub(crate) status: TaskStatus,
    pub(crate) apartment: SharedApartment,
    /// Kicks off the evaluator; taken when the task is promoted to running.
    pub(crate) trigger: Option<Promise<AnyValue>>,
    /// Argument for the trigger, set when the task becomes pending.
    pub(crate) argument: Option<FlowResult<AnyValue>>,
    /// Eventual outcome of the evaluator.
    pub(crate) result: Future<AnyValue>,
    pub(crate) last_result: Option<FlowResult<AnyValue>>,
    /// Dependencies that have not finished yet.
    pub(crate) waiting: HashSet<String>,
    /// Set once any dependency failed.
    pub(crate) dependency_failure: Option<FlowError>,
}

impl TaskItem {
    pub(crate) fn new(
        name: String,
        dependencies: Vec<String>,
        apartment: SharedApartment,
        trigger: Promise<AnyValue>,
        result: Future<AnyValue>,
    ) -> Self {
        let waiting = dependencies.iter().cloned().collect();
        Self {
            name,
            dependencies,
            level: 0,
            status: TaskStatus::NotStarted,
            apartment,
            trigger: Some(trigger),
            argument: None,
            result,
            last_result: None,
            waiting,
            dependency_failure: None,
        }
    }

    /// Move to pending with the argument the evaluator will receive.
    pub(crate) fn make_pending(
        &mut self,
        argument: FlowResult<AnyValue>,
    ) {
        self.status = TaskStatus::Pending;
        self.argument = Some(argument);
    }

    /// Record that dependency `name` finished; returns `true` once none is
    /// left.
    pub(crate) fn dependency_finished(
        &mut self,
        name: &str,
        failed: bool,
    ) -> bool {
        if !self.waiting.remove(name) {
            return false;
        }
        if failed && self.dependency_failure.is_none() {
            self.dependency_failure = Some(FlowError::cancelled(format!(
                "dependency `{}` of `{}` failed",
                name, self.name
            )));
        }
        self.waiting.is_empty()
    }
}

impl std::fmt::Debug for TaskItem {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TaskItem")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("level", &self.level)
            .field("status", &self.status)
            .finish()
    }
}
