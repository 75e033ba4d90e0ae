//! Task leveling
//!
//! `level(t) = 1` without dependencies, else `1 + max(level(d))`. Levels are
//! found by relaxing every task until a full pass changes nothing. A level
//! exceeding twice the task count means a cycle feeds back into itself; a
//! task that never leaves level 0 only depends on such unresolved tasks.

use std::collections::HashMap;

use crate::runtime::error::{FlowError, FlowResult};

/// Compute the level of every task.
///
/// `tasks` yields `(name, dependencies)` in registration order; the returned
/// levels follow the same order.
pub fn compute_levels<'a, I, D>(tasks: I) -> FlowResult<Vec<usize>>
where
    I: IntoIterator<Item = (&'a str, D)>,
    D: IntoIterator<Item = &'a str>,
{
    let tasks: Vec<(&str, Vec<&str>)> = tasks
        .into_iter()
        .map(|(name, deps)| (name, deps.into_iter().collect()))
        .collect();

    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (*name, i))
        .collect();

    let mut edges: Vec<Vec<usize>> = Vec::with_capacity(tasks.len());
    for (name, deps) in &tasks {
        let mut resolved = Vec::with_capacity(deps.len());
        for dep in deps {
            match index.get(dep) {
                Some(&i) => resolved.push(i),
                None => {
                    return Err(FlowError::validation(format!(
                        "task `{}` depends on unknown task `{}`",
                        name, dep
                    )))
                }
            }
        }
        edges.push(resolved);
    }

    let cap = 2 * tasks.len();
    let mut levels: Vec<usize> = edges
        .iter()
        .map(|deps| usize::from(deps.is_empty()))
        .collect();

    loop {
        let mut changed = false;
        for (i, deps) in edges.iter().enumerate() {
            let Some(deepest) = deps.iter().map(|&d| levels[d]).filter(|&l| l > 0).max() else {
                continue;
            };
            let target = deepest + 1;
            if levels[i] < target {
                if target > cap {
                    return Err(FlowError::graph(format!(
                        "dependency cycle through task `{}`",
                        tasks[i].0
                    )));
                }
                levels[i] = target;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    if let Some(i) = levels.iter().position(|&level| level == 0) {
        return Err(FlowError::graph(format!(
            "task `{}` is unreachable: its dependencies never resolve",
            tasks[i].0
        )));
    }
    Ok(levels)
}
