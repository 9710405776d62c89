use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use runjs::janitor;
use runjs::runner::{ExecuteError, RunError, Runner};
use runjs::types::{ErrorKind, ExecutionRequest};
use runjs::{ModuleFlavor, WorkspaceStore};

use super::{fixture_source, test_config};

fn runner(root: &Path) -> Runner {
    Runner::new(&test_config(root))
}

#[tokio::test]
async fn test_run_hello_esm() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new(fixture_source("hello.mjs"), ModuleFlavor::Esm);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(result.output, "hi\n");
    assert!(result.installed_packages.is_empty());
    assert_eq!(result.flavor, ModuleFlavor::Esm);
    assert!(result.is_success());
}

#[tokio::test]
async fn test_run_hello_commonjs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new("console.log('hi', 1 + 1)", ModuleFlavor::CommonJs);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(result.output, "hi 2\n");
}

#[tokio::test]
async fn test_objects_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new(fixture_source("objects.cjs"), ModuleFlavor::CommonJs);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(
        result.output,
        "{\n  \"a\": 1\n} [\n  1,\n  2\n] text 42\n[object Object]\n"
    );
}

#[tokio::test]
async fn test_thrown_error_is_reported_in_output() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new(fixture_source("throws.mjs"), ModuleFlavor::Esm);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert!(result.output.contains("Error: boom"));
}

#[tokio::test]
async fn test_empty_program_reports_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new("const x = 1;", ModuleFlavor::Esm);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(result.output, "No output");
}

#[tokio::test]
async fn test_stderr_is_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new(fixture_source("stderr.cjs"), ModuleFlavor::CommonJs);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(result.output, "Error: something went wrong");
    assert_eq!(result.error_kind, Some(ErrorKind::RuntimeError));
}

#[tokio::test]
async fn test_silent_exit_is_process_error() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request =
        ExecutionRequest::new(fixture_source("exit_silently.cjs"), ModuleFlavor::CommonJs);
    let err = runner.execute(&request).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Execute(ExecuteError::Exited { exit_code: Some(3) })
    ));
    assert_eq!(err.kind(), ErrorKind::ProcessError);
}

#[tokio::test]
async fn test_runaway_program_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.limits.run_timeout = 1.0;
    let runner = Runner::new(&config);

    let started = Instant::now();
    let request = ExecutionRequest::new(fixture_source("forever.mjs"), ModuleFlavor::Esm);
    let err = runner.execute(&request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_node_path_with_relative_root() {
    let dir = tempfile::tempdir_in(".").unwrap();
    let relative = Path::new(dir.path().file_name().unwrap());
    let runner = Runner::new(&test_config(relative));

    let source = r#"
const fs = require('fs');
const path = require('path');
const nodePath = process.env.NODE_PATH;
console.log(path.isAbsolute(nodePath));
console.log(fs.realpathSync(path.dirname(nodePath)) === fs.realpathSync(process.cwd()));
"#;
    let request = ExecutionRequest::new(source, ModuleFlavor::CommonJs);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(result.output, "true\ntrue\n");
}

#[tokio::test]
async fn test_flavor_workspaces_are_created() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    for flavor in ModuleFlavor::ALL {
        runner
            .execute(&ExecutionRequest::new("console.log(1)", flavor))
            .await
            .expect("Execution failed");
    }

    let esm = std::fs::read_to_string(dir.path().join("esm/package.json")).unwrap();
    assert!(esm.contains("\"type\": \"module\""));
    let cjs = std::fs::read_to_string(dir.path().join("cjs/package.json")).unwrap();
    assert!(!cjs.contains("\"type\""));
    assert!(dir.path().join("esm/setup.mjs").exists());
    assert!(dir.path().join("cjs/setup.cjs").exists());
}

#[tokio::test]
async fn test_concurrent_same_flavor_runs() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(runner(dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                let request = ExecutionRequest::new(format!("console.log({i})"), ModuleFlavor::Esm);
                (i, runner.execute(&request).await)
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert_eq!(result.expect("Execution failed").output, format!("{i}\n"));
    }
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_install_left_pad() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new(fixture_source("left_pad.cjs"), ModuleFlavor::CommonJs);
    let result = runner.execute(&request).await.expect("Execution failed");

    assert_eq!(result.output, "007\n");
    assert!(result.installed_packages.iter().any(|p| p.name == "left-pad"));

    // Already installed: the second run does not reach npm and still works
    let again = runner.execute(&request).await.expect("Execution failed");
    assert_eq!(again.output, "007\n");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_install_failure_is_install_error() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new(
        "require('this-package-should-not-exist-runjs-xyz')",
        ModuleFlavor::CommonJs,
    );
    let err = runner.execute(&request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InstallError);
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_janitor_removes_installed_packages() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner(dir.path());

    let request = ExecutionRequest::new(fixture_source("left_pad.cjs"), ModuleFlavor::CommonJs);
    runner.execute(&request).await.expect("Execution failed");
    assert!(!runner.installed_packages().await.is_empty());

    let reports = janitor::run_once(runner.store(), runner.package_manager()).await;
    assert!(reports.iter().all(|r| r.is_success()));

    let store = WorkspaceStore::new(dir.path());
    assert!(store.installed_packages().await.is_empty());
}
