//! # Demo: node_service
//!
//! Launches two node services (`compute`, `network`) as separate processes by
//! re-executing this binary, lets them heartbeat and answer calls for a few
//! seconds, then hard-stops both.
//!
//! Each child runs its own in-process registry and bus, plus a small client
//! task that calls its service over the bus.
//!
//! ## Flow
//! ```text
//! parent: Launcher::launch_service(compute), launch_service(network)
//!           └─► sleep 4s ─► Launcher::stop() ─► Launcher::wait()
//! child:  service_role() = "compute"
//!           ├─► NodeService::create(config, factories, registry, bus)
//!           ├─► client: call("compute.<host>", "ping") every 500ms
//!           └─► run_service(service)  (until killed or SIGINT)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example node_service
//! cargo run --example node_service -- --serve   # both services in one process
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use nodevisor::launcher::service_role;
use nodevisor::rpc::node_key;
use nodevisor::{
    run_service, serve, DispatchError, Envelope, Handlers, Launcher, LocalBus, Manager,
    ManagerError, ManagerFactories, MemoryRegistry, NodeService, ServiceCommand, ServiceConfig,
};
use serde_json::json;
use tracing::{info, warn};

const ROLES: [&str; 2] = ["compute", "network"];

fn factories() -> ManagerFactories {
    ManagerFactories::new()
        .register("compute", |host| {
            let host = host.to_string();
            let pings = Arc::new(AtomicU64::new(0));
            let manager = Handlers::new()
                .on("ping", move |_ctx, _args| {
                    let pings = Arc::clone(&pings);
                    let host = host.clone();
                    async move {
                        let n = pings.fetch_add(1, Ordering::Relaxed) + 1;
                        Ok::<_, DispatchError>(json!({ "pong": n, "host": host }))
                    }
                })
                .on_periodic(|_ctx| async {
                    info!("compute: auditing instances");
                    Ok::<(), ManagerError>(())
                });
            Arc::new(manager) as Arc<dyn Manager>
        })
        .register("network", |_host| {
            let manager = Handlers::new()
                .on("ping", |_ctx, _args| async {
                    Ok::<_, DispatchError>(json!({ "pong": "network" }))
                })
                .on_periodic(|_ctx| async {
                    info!("network: refreshing routes");
                    Ok::<(), ManagerError>(())
                });
            Arc::new(manager) as Arc<dyn Manager>
        })
}

fn config() -> ServiceConfig {
    ServiceConfig {
        report_interval: Duration::from_secs(1),
        periodic_interval: Duration::from_secs(2),
        ..ServiceConfig::default()
    }
}

fn build(role: &str, registry: Arc<MemoryRegistry>, bus: LocalBus) -> anyhow::Result<NodeService> {
    let service = NodeService::builder(registry, Arc::new(bus))
        .config(config())
        .factories(factories())
        .binary(format!("nodevisor-{role}"))
        .build()
        .with_context(|| format!("building {role} service"))?;
    Ok(service)
}

/// Calls `ping` on the service every 500ms.
fn spawn_client(bus: LocalBus, topic: String, host: String) {
    tokio::spawn(async move {
        let key = node_key(&topic, &host);
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            match bus.call(&key, Envelope::new("ping", json!({}))).await {
                Ok(Ok(reply)) => info!(%key, %reply, "client got reply"),
                Ok(Err(e)) => warn!(%key, error = %e, "call failed"),
                Err(e) => {
                    warn!(%key, error = %e, "bus gone");
                    return;
                }
            }
        }
    });
}

async fn child(role: &str) -> anyhow::Result<()> {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let service = build(role, Arc::clone(&registry), bus.clone())?;

    spawn_client(bus, service.topic().to_string(), service.host().to_string());
    run_service(service).await?;

    for record in registry.list().await {
        info!(
            id = record.id,
            report_count = record.report_count,
            up = record.is_up(config().report_interval * 2),
            "final record"
        );
    }
    Ok(())
}

async fn parent() -> anyhow::Result<()> {
    let mut launcher = Launcher::new();
    for role in ROLES {
        launcher.launch_service(&ServiceCommand::new(role))?;
    }

    tokio::time::sleep(Duration::from_secs(4)).await;
    launcher.stop();

    for exit in launcher.wait().await? {
        info!(role = %exit.role, status = %exit.status, "service exited");
    }
    Ok(())
}

async fn in_process() -> anyhow::Result<()> {
    let registry = Arc::new(MemoryRegistry::new());
    let bus = LocalBus::new();
    let services = ROLES
        .iter()
        .map(|role| build(role, Arc::clone(&registry), bus.clone()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    for service in &services {
        spawn_client(bus.clone(), service.topic().to_string(), service.host().to_string());
    }
    serve(services).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Some(role) = service_role() {
        return child(&role).await;
    }
    if std::env::args().any(|a| a == "--serve") {
        return in_process().await;
    }
    parent().await
}
