//! Process bodies: run one service, or serve several in-process.

use std::future::Future;

use tracing::{info, warn};

use crate::error::ServiceError;
use crate::launcher::signal::{wait_for_shutdown_signal, ShutdownSignal};
use crate::service::NodeService;

/// Starts `service` and blocks until it ends or a termination signal arrives.
///
/// On a signal the service is stopped and joined in order. Start failures
/// are returned; the caller usually exits the process with them.
pub async fn run_service(service: NodeService) -> Result<(), ServiceError> {
    run_service_until(service, shutdown_signal()).await
}

/// [`run_service`] with a custom shutdown trigger.
pub async fn run_service_until<F>(service: NodeService, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()>,
{
    service.start().await?;
    tokio::select! {
        _ = service.wait() => {}
        _ = shutdown => {
            info!(service = service.label(), "shutting down");
            service.stop().await;
            service.wait().await;
        }
    }
    Ok(())
}

/// Runs `services` inside this process until a termination signal arrives.
pub async fn serve(services: Vec<NodeService>) -> Result<(), ServiceError> {
    serve_until(services, shutdown_signal()).await
}

/// [`serve`] with a custom shutdown trigger.
///
/// If one service fails to start, those already started are stopped and the
/// error is returned.
pub async fn serve_until<F>(services: Vec<NodeService>, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()>,
{
    let name = services
        .iter()
        .map(NodeService::binary)
        .collect::<Vec<_>>()
        .join("_");
    info!("Serving {name}");

    for (started, service) in services.iter().enumerate() {
        if let Err(e) = service.start().await {
            warn!(service = service.label(), error = %e, "service failed to start");
            for running in &services[..started] {
                running.stop().await;
                running.wait().await;
            }
            return Err(e);
        }
    }

    shutdown.await;

    for service in &services {
        service.stop().await;
    }
    for service in &services {
        service.wait().await;
    }
    info!("Stopped serving {name}");
    Ok(())
}

/// Resolves on the first termination signal; never if listeners cannot be installed.
async fn shutdown_signal() {
    match wait_for_shutdown_signal().await {
        Ok(signal) => log_signal(signal),
        Err(e) => {
            warn!(error = %e, "cannot listen for termination signals");
            std::future::pending::<()>().await;
        }
    }
}

fn log_signal(signal: ShutdownSignal) {
    info!(%signal, "termination signal received");
}
