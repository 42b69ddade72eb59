//! Mock-based command tests.
//!
//! These tests call command functions directly with a `Coordinator`
//! backed by a `MockProvider` and `MockLauncher`, avoiding any real
//! container runtime or terminal.

use dbin_cli::commands;
use dbin_config::Catalog;
use dbin_core::test_support::{MockCall, MockLauncher, MockProvider};
use dbin_core::{Coordinator, RunRequest};
use dbin_provider::{
    ContainerId, ContainerInfo, ContainerStatus, NetworkId, NetworkSummary, ProviderError,
    ProviderType, MANAGED_LABEL,
};
use std::collections::HashMap;
use std::time::Duration;

fn container(id: &str, name: &str, managed: bool) -> ContainerInfo {
    let mut labels = HashMap::new();
    if managed {
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    }
    ContainerInfo {
        id: ContainerId::new(id),
        name: name.to_string(),
        image: "redis:latest".to_string(),
        status: ContainerStatus::Running,
        created: 0,
        labels,
    }
}

fn removed_ids(mock: &MockProvider) -> Vec<String> {
    mock.get_calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::Remove { id, .. } => Some(id),
            _ => None,
        })
        .collect()
}

fn never() -> std::future::Pending<()> {
    std::future::pending()
}

// ---- list ----

#[test]
fn test_list_prints_every_database() {
    let catalog = Catalog::builtin();
    let mut out = Vec::new();
    commands::list(&catalog, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();

    assert_eq!(out.lines().count(), catalog.len());
    assert!(out.lines().any(|l| l.starts_with("postgres ")));
    assert!(out.contains("[pd + tikv + tidb]"));
}

#[test]
fn test_list_marks_web_clients() {
    let mut out = Vec::new();
    commands::list(&Catalog::builtin(), &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();

    let dgraph = out.lines().find(|l| l.starts_with("dgraph")).unwrap();
    assert!(dgraph.contains("web"), "{}", dgraph);
}

// ---- data directory ----

#[test]
fn test_resolve_data_dir_creates_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("nested").join("pgdata");

    let resolved = commands::resolve_data_dir(target.to_str().unwrap()).unwrap();
    assert_eq!(resolved, target);
    assert!(target.is_dir());
}

#[test]
fn test_resolve_data_dir_rejects_empty() {
    assert!(commands::resolve_data_dir("").is_err());
    assert!(commands::resolve_data_dir("   ").is_err());
}

#[test]
fn test_run_request_from_flags() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("data");

    let request =
        commands::run_request("mysql", Some(dir.to_str().unwrap()), true, Some(13306)).unwrap();
    assert_eq!(request.database, "mysql");
    assert_eq!(request.data_dir.as_deref(), Some(dir.as_path()));
    assert!(request.debug);
    assert_eq!(request.host_port, Some(13306));

    let request = commands::run_request("redis", None, false, None).unwrap();
    assert!(request.data_dir.is_none());
    assert!(request.host_port.is_none());
}

// ---- cleanup ----

#[tokio::test]
async fn test_cleanup_nothing_to_do() {
    let mock = MockProvider::new(ProviderType::Docker);
    commands::cleanup(&mock, true, 10).await.unwrap();
    assert!(removed_ids(&mock).is_empty());
}

#[tokio::test]
async fn test_cleanup_removes_only_managed_resources() {
    let mock = MockProvider::new(ProviderType::Docker);
    *mock.list_result.lock().unwrap() = Ok(vec![
        container("c1", "dbin-redis-1a2b3c4d-redis", true),
        container("c2", "someone-elses-redis", false),
    ]);
    *mock.list_networks_result.lock().unwrap() = Ok(vec![NetworkSummary {
        id: NetworkId::new("n1"),
        name: "dbin-tidb-1a2b3c4d".to_string(),
        labels: HashMap::new(),
    }]);

    commands::cleanup(&mock, true, 10).await.unwrap();

    assert_eq!(removed_ids(&mock), vec!["c1".to_string()]);
    assert!(mock.was_called(&MockCall::RemoveNetwork {
        id: "n1".to_string()
    }));
}

#[tokio::test]
async fn test_cleanup_reports_failures() {
    let mock = MockProvider::new(ProviderType::Docker);
    *mock.list_result.lock().unwrap() =
        Ok(vec![container("c1", "dbin-redis-1a2b3c4d-redis", true)]);
    *mock.remove_result.lock().unwrap() = Err(ProviderError::RuntimeError("device busy".into()));

    let result = commands::cleanup(&mock, true, 10).await;
    assert!(result.is_err());
}

// ---- start ----

#[tokio::test(start_paused = true)]
async fn test_start_clean_exit() {
    let mock = MockProvider::new(ProviderType::Docker);
    let calls = mock.calls.clone();
    let coordinator = Coordinator::new(
        Box::new(mock),
        Box::new(MockLauncher::new()),
        Catalog::builtin(),
    );

    let code = commands::start(&coordinator, &RunRequest::new("redis"), never()).await;

    assert_eq!(code, 0);
    let calls = calls.lock().unwrap();
    assert!(calls.contains(&MockCall::Remove {
        id: "mock-1".to_string(),
        force: true
    }));
}

#[tokio::test(start_paused = true)]
async fn test_start_unknown_database() {
    let mock = MockProvider::new(ProviderType::Docker);
    let calls = mock.calls.clone();
    let coordinator = Coordinator::new(
        Box::new(mock),
        Box::new(MockLauncher::new()),
        Catalog::builtin(),
    );

    let code = commands::start(&coordinator, &RunRequest::new("nosuchdb"), never()).await;

    assert_eq!(code, 1);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_client_never_connects() {
    let mock = MockProvider::new(ProviderType::Docker);
    let launcher = MockLauncher::with_exit_codes(std::iter::repeat(1).take(10));
    let launches = launcher.calls.clone();
    let coordinator = Coordinator::new(Box::new(mock), Box::new(launcher), Catalog::builtin());

    let code = commands::start(&coordinator, &RunRequest::new("redis"), never()).await;

    assert_eq!(code, 1);
    assert_eq!(launches.lock().unwrap().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_start_interrupted() {
    let mock = MockProvider::new(ProviderType::Docker);
    let calls = mock.calls.clone();
    let launcher = MockLauncher::new();
    *launcher.session_delay.lock().unwrap() = Duration::from_secs(3600);
    let coordinator = Coordinator::new(Box::new(mock), Box::new(launcher), Catalog::builtin());

    let code = commands::start(
        &coordinator,
        &RunRequest::new("redis"),
        tokio::time::sleep(Duration::from_secs(1)),
    )
    .await;

    assert_eq!(code, 130);
    assert!(calls.lock().unwrap().contains(&MockCall::Remove {
        id: "mock-1".to_string(),
        force: true
    }));
}
