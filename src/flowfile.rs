//! Flow description files
//!
//! A flow file is TOML with one `[[task]]` table per task:
//!
//! ```toml
//! [[task]]
//! spec = "fetch"
//! sleep_ms = 20
//!
//! [[task]]
//! spec = "report:fetch"
//! fail = "report service unavailable"
//! priority = "high"
//! ```
//!
//! Each task sleeps for `sleep_ms`, then fails with `fail` when given, or
//! succeeds with the time it slept.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::runtime::context::ExecutionContext;
use crate::runtime::error::{FlowError, FlowResult};
use crate::runtime::flow::TaskFlow;
use crate::runtime::priority::Priority;
use crate::runtime::value::AnyValue;

/// Parsed flow file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowFile {
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskDecl>,
}

/// One `[[task]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDecl {
    /// `name` or `name:dep1,dep2,...`
    pub spec: String,
    #[serde(default)]
    pub sleep_ms: u64,
    /// Fail with this message instead of succeeding.
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl FlowFile {
    /// Parse flow file contents.
    pub fn parse(source: &str) -> Result<Self> {
        toml::from_str(source).context("Invalid flow file")
    }

    /// Read and parse a flow file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read flow file: {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("Failed to parse: {}", path.display()))
    }

    /// Add every declared task to `flow`.
    pub fn build(
        &self,
        flow: &TaskFlow,
    ) -> FlowResult<()> {
        for decl in &self.tasks {
            let sleep = Duration::from_millis(decl.sleep_ms);
            let fail = decl.fail.clone();
            flow.add_task(
                &decl.spec,
                move |_| -> FlowResult<AnyValue> {
                    if !sleep.is_zero() {
                        thread::sleep(sleep);
                    }
                    match fail {
                        Some(message) => Err(FlowError::evaluation(message)),
                        None => Ok(AnyValue::new(sleep.as_millis() as u64)),
                    }
                },
                ExecutionContext::new().with_priority(decl.priority),
            )?;
        }
        Ok(())
    }
}
