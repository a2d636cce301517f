//! Service process supervision and process bodies.

mod process;
mod run;
mod signal;

pub use process::{service_role, Launcher, ServiceCommand, ServiceExit, SERVICE_ENV};
pub use run::{run_service, run_service_until, serve, serve_until};
pub use signal::{wait_for_shutdown_signal, ShutdownSignal};
