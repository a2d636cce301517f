#![cfg(unix)]

use std::os::unix::process::ExitStatusExt;
use std::sync::Arc;
use std::time::Duration;

use nodevisor::launcher::{run_service, run_service_until, service_role, SERVICE_ENV};
use nodevisor::{
    LaunchError, Launcher, LocalBus, MemoryRegistry, NodeService, NoopManager, ServiceCommand,
};

/// Name of the test that doubles as the service process body.
const SERVICE_BODY: &str = "service_process_body";

/// Body of a launched child: this test binary re-executed with a role.
///
/// `compute` runs until killed; `network` stops by itself shortly after
/// starting. Without a role (a normal test run) it does nothing.
#[tokio::test]
async fn service_process_body() {
    let Some(role) = service_role() else {
        return;
    };
    let service = NodeService::builder(Arc::new(MemoryRegistry::new()), Arc::new(LocalBus::new()))
        .host("node-1")
        .binary(format!("nodevisor-{role}"))
        .manager(Arc::new(NoopManager))
        .report_interval(Duration::from_secs(1))
        .without_log_writer()
        .build()
        .unwrap();
    assert_eq!(service.topic(), role);

    match role.as_str() {
        "network" => run_service_until(service, tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap(),
        _ => run_service(service).await.unwrap(),
    }
}

fn service_command(role: &str) -> ServiceCommand {
    ServiceCommand::new(role).args([SERVICE_BODY, "--exact", "--test-threads=1"])
}

#[tokio::test]
async fn stop_kills_running_services_and_joins_exited_ones() {
    if service_role().is_some() {
        return;
    }
    let mut launcher = Launcher::new();
    launcher.launch_service(&service_command("compute")).unwrap();
    launcher.launch_service(&service_command("network")).unwrap();
    assert_eq!(launcher.len(), 2);

    // network finishes on its own long before this
    tokio::time::sleep(Duration::from_secs(3)).await;
    launcher.stop();

    let exits = tokio::time::timeout(Duration::from_secs(10), launcher.wait())
        .await
        .expect("both services exit after stop")
        .unwrap();
    assert_eq!(exits.len(), 2);
    assert_eq!(exits[0].role, "compute");
    assert_eq!(exits[0].status.signal(), Some(9));
    assert_eq!(exits[1].role, "network");
    assert!(exits[1].status.success());
}

#[tokio::test]
async fn stop_kills_live_children_and_skips_exited_ones() {
    let mut launcher = Launcher::new();
    let long = ServiceCommand::new("compute").program("sleep").arg("30");
    let short = ServiceCommand::new("network").program("true");

    assert!(launcher.launch_service(&long).unwrap().is_some());
    launcher.launch_service(&short).unwrap();
    assert_eq!(launcher.roles(), vec!["compute", "network"]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    launcher.stop();
    launcher.stop();

    let exits = tokio::time::timeout(Duration::from_secs(10), launcher.wait())
        .await
        .expect("children exit after stop")
        .unwrap();
    assert_eq!(exits.len(), 2);
    assert_eq!(exits[0].role, "compute");
    assert_eq!(exits[0].status.signal(), Some(9));
    assert_eq!(exits[1].role, "network");
    assert!(exits[1].status.success());
}

#[tokio::test]
async fn spawn_failure_names_the_role() {
    let mut launcher = Launcher::new();
    let missing = ServiceCommand::new("scheduler").program("/nonexistent/nodevisor-scheduler");

    let err = launcher.launch_service(&missing).unwrap_err();
    assert!(matches!(err, LaunchError::Spawn { ref role, .. } if role == "scheduler"));
    assert_eq!(err.as_label(), "launch_spawn_failed");
    assert!(launcher.is_empty());
}

#[tokio::test]
async fn child_sees_its_role() {
    let mut launcher = Launcher::new();
    let script = format!("test \"${SERVICE_ENV}\" = compute && test \"$ZONE\" = a");
    let check = ServiceCommand::new("compute")
        .program("sh")
        .args(["-c", script.as_str()])
        .env("ZONE", "a");

    launcher.launch_service(&check).unwrap();
    let exits = launcher.wait().await.unwrap();
    assert!(exits[0].status.success());
}
