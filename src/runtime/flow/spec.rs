//! Task declaration parsing: `name` or `name:dep1,dep2,...`

use once_cell::sync::Lazy;
use regex::Regex;

use crate::runtime::error::{FlowError, FlowResult};

/// Valid task name: no whitespace, separators or wildcards.
static TASK_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s,;:&|!()\[\]*?]+$").expect("task name pattern is valid")
});

/// A parsed task declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Task name.
    pub name: String,
    /// Dependency names, first occurrence order, duplicates removed.
    pub dependencies: Vec<String>,
}

impl TaskSpec {
    /// Parse a declaration.
    pub fn parse(spec: &str) -> FlowResult<Self> {
        let (name, deps) = match spec.split_once(':') {
            Some((name, deps)) => (name, Some(deps)),
            None => (spec, None),
        };
        check_name(name, spec)?;

        let mut dependencies: Vec<String> = Vec::new();
        if let Some(deps) = deps {
            for dep in deps.split(',') {
                check_name(dep, spec)?;
                if dep == name {
                    return Err(FlowError::validation(format!(
                        "task `{}` depends on itself",
                        name
                    )));
                }
                if !dependencies.iter().any(|known| known == dep) {
                    dependencies.push(dep.to_string());
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            dependencies,
        })
    }
}

/// Whether `name` is usable as a task name.
#[inline]
pub fn is_valid_name(name: &str) -> bool {
    TASK_NAME.is_match(name)
}

fn check_name(
    name: &str,
    spec: &str,
) -> FlowResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(FlowError::validation(format!(
            "invalid task name `{}` in declaration `{}`",
            name, spec
        )))
    }
}
