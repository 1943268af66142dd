//! Session controller tests over a temp-dir script library. The run test
//! swaps the interpreter for `/bin/echo` so no PowerShell is needed; it
//! only exercises the launch/stream/reset plumbing.

use std::fs;
use std::sync::Arc;

use scriptdeck::config::Config;
use scriptdeck::controller::SessionController;
use scriptdeck::error::EngineError;
use scriptdeck::errorlog::NullErrorLog;
use scriptdeck::library::DirLibrary;
use scriptdeck::session::ExecutionState;
use tempfile::TempDir;

const NEW_USER: &str = r#"<#
Description = "Creates a user account"
Header = "New user"
Output = "True"
[string]Name = "Account name"
[checkbox]Notify = "Send a mail afterwards"
#>
Write-Output "body"
"#;

fn library_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("accounts")).unwrap();
    fs::create_dir(dir.path().join("network")).unwrap();
    fs::write(dir.path().join("accounts/new-user.ps1"), NEW_USER).unwrap();
    dir
}

fn controller(dir: &TempDir) -> SessionController {
    let mut cfg = Config::load();
    cfg.set("SCRIPT_ROOT", dir.path().to_string_lossy());
    cfg.set("PWSH_BIN", "/bin/echo");
    let library = Arc::new(DirLibrary::from_config(&cfg));
    SessionController::new(cfg, library, Arc::new(NullErrorLog))
}

#[tokio::test]
async fn initial_category_is_first_in_library_order() {
    let dir = library_dir();
    let controller = controller(&dir);

    assert_eq!(controller.selected_category(), Some("accounts"));
    assert_eq!(controller.scripts(), ["new-user"]);
    assert!(!controller.is_script_selected());
    assert!(!controller.readiness());
}

#[tokio::test]
async fn selecting_a_script_populates_empty_arguments() {
    let dir = library_dir();
    let mut controller = controller(&dir);
    controller.select_script("new-user").unwrap();

    assert!(controller.is_script_selected());
    let descriptor = controller.descriptor().unwrap();
    assert_eq!(descriptor.title, "New user");
    assert!(descriptor.produces_output);

    assert_eq!(controller.store().len(), 2);
    assert!(controller.store().values().iter().all(|v| v.is_empty()));
}

#[tokio::test]
async fn readiness_follows_committed_values() {
    let dir = library_dir();
    let mut controller = controller(&dir);
    controller.select_script("new-user").unwrap();

    assert!(!controller.readiness());
    assert!(!controller.set_argument("NoSuchKey", "x"));
    assert!(controller.set_argument("Name", "Alice"));
    assert!(controller.readiness());
}

#[tokio::test]
async fn selecting_a_category_drops_script_and_arguments() {
    let dir = library_dir();
    let mut controller = controller(&dir);
    controller.select_script("new-user").unwrap();
    controller.set_argument("Name", "Alice");

    controller.select_category("network");
    assert_eq!(controller.selected_category(), Some("network"));
    assert!(!controller.is_script_selected());
    assert!(controller.store().is_empty());
    assert!(controller.scripts().is_empty());
}

#[tokio::test]
async fn missing_script_is_descriptor_unreadable() {
    let dir = library_dir();
    let mut controller = controller(&dir);
    assert!(matches!(
        controller.select_script("does-not-exist"),
        Err(EngineError::DescriptorUnreadable { .. })
    ));
    assert!(!controller.is_script_selected());
}

#[tokio::test]
async fn start_is_rejected_until_ready() {
    let dir = library_dir();
    let mut controller = controller(&dir);
    assert!(matches!(controller.start(), Err(EngineError::NotReady)));

    controller.select_script("new-user").unwrap();
    assert!(matches!(controller.start(), Err(EngineError::NotReady)));
}

#[tokio::test]
async fn run_streams_output_and_clear_session_resets_everything() {
    let dir = library_dir();
    let mut controller = controller(&dir);
    controller.select_script("new-user").unwrap();
    controller.set_argument("Name", "Alice");

    let mut handle = controller.start().unwrap();
    assert_eq!(controller.execution_state(), ExecutionState::Running);

    // /bin/echo prints the would-be pwsh arguments and exits 0.
    let mut saw_output = false;
    while let Some(record) = handle.records.recv().await {
        if let scriptdeck::session::stream::OutputRecord::Raw(line) = record {
            saw_output |= line.contains("-Name 'Alice'");
        }
    }
    let outcome = handle.done.await.unwrap();
    assert!(saw_output);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(controller.execution_state(), ExecutionState::Idle);
    assert!(controller.buffers().lock().contains_data());

    controller.clear_session().await;
    assert!(!controller.buffers().lock().contains_data());
    assert!(controller.store().is_empty());
    assert!(!controller.is_script_selected());
    assert_eq!(controller.selected_category(), Some("accounts"));
    assert!(!controller.readiness());
}

#[tokio::test]
async fn cancel_while_idle_leaves_controller_usable() {
    let dir = library_dir();
    let mut controller = controller(&dir);
    controller.cancel();
    assert_eq!(controller.execution_state(), ExecutionState::Idle);

    controller.select_script("new-user").unwrap();
    controller.set_argument("Name", "Alice");
    assert!(controller.readiness());
}
