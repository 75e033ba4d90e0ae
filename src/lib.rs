//! flowrt: an in-process asynchronous execution runtime
//!
//! - [`runtime::context::ExecutionContext`] carries owner and cancellation
//!   bindings through chains of continuations
//! - [`runtime::flow::TaskFlow`] runs a DAG of named tasks with bounded
//!   concurrency
//! - [`runtime::value::AnyValue`] moves results between tasks without
//!   knowing their types
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use flowrt::util::config::RuntimeConfig;
//! use flowrt::{run_file, Result, RunOptions};
//!
//! fn main() -> Result<()> {
//!     let report = run_file(
//!         Path::new("build.toml"),
//!         &RuntimeConfig::default(),
//!         &RunOptions::default(),
//!         |event| println!("{:?}", event),
//!     )?;
//!     println!("{} in {:?}", report.status, report.elapsed);
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/flowrt")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod flowfile;
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel;
use tracing::debug;

use crate::flowfile::FlowFile;
use crate::runtime::apartment::{InlineApartment, SharedApartment, ThreadPoolApartment};
use crate::runtime::flow::{FlowObserver, FlowStatus, TaskFlow, TaskObserver, TaskStatus};
use crate::util::config::RuntimeConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "flowrt";

/// Overrides applied on top of the configuration when running a flow file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker thread count.
    pub workers: Option<usize>,
    /// Concurrency limit.
    pub limit: Option<usize>,
    /// Run every task on the calling thread.
    pub inline: bool,
}

/// Progress reported while a flow file runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    TaskStarted(String),
    TaskFinished(String),
    FlowFinished(FlowStatus),
}

/// Final state of one task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub level: usize,
    pub status: TaskStatus,
    pub error: Option<String>,
}

/// Outcome of [`run_file`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: FlowStatus,
    pub tasks: Vec<TaskReport>,
    pub failed_task: Option<String>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Run the flow described in `path`, reporting progress to `on_event`.
pub fn run_file<F>(
    path: &Path,
    config: &RuntimeConfig,
    options: &RunOptions,
    mut on_event: F,
) -> Result<RunReport>
where
    F: FnMut(&FlowEvent),
{
    let file = FlowFile::load(path)?;
    debug!(path = %path.display(), tasks = file.tasks.len(), "flow file loaded");

    let apartment: SharedApartment = if options.inline {
        InlineApartment::shared()
    } else {
        let mut apartment_config = config.apartment.clone();
        if let Some(workers) = options.workers {
            apartment_config.num_workers = workers;
        }
        Arc::new(
            ThreadPoolApartment::with_config(apartment_config)
                .context("Failed to start worker threads")?,
        )
    };
    let mut flow_config = config.flow.clone();
    if options.limit.is_some() {
        flow_config.concurrency_limit = options.limit;
    }

    let flow = TaskFlow::with_config(apartment, &flow_config);
    file.build(&flow)?;

    let (tx, rx) = channel::unbounded();
    let started = tx.clone();
    let finished = tx.clone();
    flow.add_task_observer(
        TaskObserver::new("*")
            .on_running(move |_, task| {
                let _ = started.send(FlowEvent::TaskStarted(task.to_string()));
            })
            .on_completed(move |_, task| {
                let _ = finished.send(FlowEvent::TaskFinished(task.to_string()));
            }),
    )?;
    flow.add_flow_observer(FlowObserver::new().on_completed(move |flow| {
        let _ = tx.send(FlowEvent::FlowFinished(flow.status()));
    }));

    let total = file.tasks.len();
    let clock = Instant::now();
    flow.start()?;

    // Notifications may arrive out of order on a pool; stop once all are in.
    let (mut started_count, mut finished_count, mut flow_done) = (0, 0, false);
    while started_count < total || finished_count < total || !flow_done {
        let event = rx.recv().context("Flow event channel closed")?;
        match &event {
            FlowEvent::TaskStarted(_) => started_count += 1,
            FlowEvent::TaskFinished(_) => finished_count += 1,
            FlowEvent::FlowFinished(_) => flow_done = true,
        }
        on_event(&event);
    }
    let status = flow.wait();
    let elapsed = clock.elapsed();

    let tasks = flow
        .task_names()
        .into_iter()
        .map(|name| TaskReport {
            level: flow.task_level(&name).unwrap_or(0),
            status: flow.task_status(&name).unwrap_or(TaskStatus::NotStarted),
            error: flow
                .task_result(&name)
                .and_then(|result| result.err())
                .map(|error| error.to_string()),
            name,
        })
        .collect();
    let report = RunReport {
        status,
        tasks,
        failed_task: flow.failed_task_name(),
        error: flow.last_error().map(|error| error.to_string()),
        elapsed,
    };
    flow.force_cleanup();
    Ok(report)
}

/// Validate the flow described in `path` and return each task's level.
pub fn plan_file(path: &Path) -> Result<Vec<(String, usize)>> {
    let file = FlowFile::load(path)?;
    let flow = TaskFlow::with_apartment(InlineApartment::shared());
    file.build(&flow)?;
    let plan = flow.plan()?;
    flow.force_cleanup();
    Ok(plan)
}
