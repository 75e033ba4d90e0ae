//! Running flow files end to end

use std::fs;
use std::path::PathBuf;

use flowrt::runtime::flow::{FlowStatus, TaskStatus};
use flowrt::util::config::RuntimeConfig;
use flowrt::{plan_file, run_file, FlowEvent, RunOptions};
use tempfile::TempDir;

fn write_flow(
    dir: &TempDir,
    contents: &str,
) -> PathBuf {
    let path = dir.path().join("flow.toml");
    fs::write(&path, contents).unwrap();
    path
}

const PIPELINE: &str = r#"
[[task]]
spec = "fetch"
sleep_ms = 2

[[task]]
spec = "parse:fetch"

[[task]]
spec = "index:fetch"
priority = "high"

[[task]]
spec = "publish:parse,index"
"#;

#[test]
fn test_run_pipeline_on_pool() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_flow(&dir, PIPELINE);

    let mut events = Vec::new();
    let options = RunOptions {
        workers: Some(2),
        limit: Some(2),
        inline: false,
    };
    let report = run_file(&path, &RuntimeConfig::default(), &options, |event| {
        events.push(event.clone())
    })
    .unwrap();

    assert_eq!(report.status, FlowStatus::Succeeded);
    assert!(report.error.is_none());
    let levels: Vec<(&str, usize)> = report
        .tasks
        .iter()
        .map(|task| (task.name.as_str(), task.level))
        .collect();
    assert_eq!(levels, [("fetch", 1), ("parse", 2), ("index", 2), ("publish", 3)]);
    assert!(report
        .tasks
        .iter()
        .all(|task| task.status == TaskStatus::Succeeded));

    let started = events
        .iter()
        .filter(|event| matches!(event, FlowEvent::TaskStarted(_)))
        .count();
    assert_eq!(started, 4);
    assert!(events.contains(&FlowEvent::FlowFinished(FlowStatus::Succeeded)));
}

#[test]
fn test_run_reports_failure_inline() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_flow(
        &dir,
        "[[task]]\nspec = \"a\"\n\n[[task]]\nspec = \"b:a\"\nfail = \"quota exceeded\"\n\n[[task]]\nspec = \"c:b\"\n",
    );
    let options = RunOptions {
        inline: true,
        ..RunOptions::default()
    };

    let report = run_file(&path, &RuntimeConfig::default(), &options, |_| {}).unwrap();
    assert_eq!(report.status, FlowStatus::Failed);
    assert_eq!(report.failed_task.as_deref(), Some("b"));
    assert_eq!(report.error.as_deref(), Some("Evaluation error: quota exceeded"));
    let c = report.tasks.iter().find(|task| task.name == "c").unwrap();
    assert_eq!(c.status, TaskStatus::Failed);
    assert!(c.error.as_deref().unwrap().starts_with("Cancelled:"));
}

#[test]
fn test_plan_orders_by_registration() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_flow(&dir, PIPELINE);
    let plan = plan_file(&path).unwrap();
    assert_eq!(
        plan,
        [
            ("fetch".to_string(), 1),
            ("parse".to_string(), 2),
            ("index".to_string(), 2),
            ("publish".to_string(), 3),
        ]
    );
}

#[test]
fn test_plan_rejects_cycle_and_unknown_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let cycle = write_flow(
        &dir,
        "[[task]]\nspec = \"r\"\n\n[[task]]\nspec = \"a:r,b\"\n\n[[task]]\nspec = \"b:a\"\n",
    );
    let error = format!("{:#}", plan_file(&cycle).unwrap_err());
    assert!(error.contains("cycle"), "{}", error);

    let missing = write_flow(&dir, "[[task]]\nspec = \"a:ghost\"\n");
    let error = format!("{:#}", plan_file(&missing).unwrap_err());
    assert!(error.contains("ghost"), "{}", error);
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let error = plan_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(error.to_string().starts_with("Failed to read flow file"));
}
