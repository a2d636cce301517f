//! # Launcher: one OS process per node service.
//!
//! ```text
//! Launcher::launch_service(cmd) ──► spawn <program> <args>  (NODEVISOR_SERVICE=<role>)
//!                                     └─ child: service_role() ─► build service ─► run_service()
//! Launcher::stop()  ──► SIGKILL every child still alive (exited ones are skipped)
//! Launcher::wait()  ──► join every child, exit statuses in launch order
//! ```
//!
//! A crashing service takes only its own process down. `stop()` is a hard
//! stop: the service logic inside gets no chance to clean up. Children are
//! also killed if the launcher is dropped.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::LaunchError;

/// Environment variable carrying the service role into a child process.
pub const SERVICE_ENV: &str = "NODEVISOR_SERVICE";

/// Role this process was launched for, if it is a launcher child.
pub fn service_role() -> Option<String> {
    std::env::var(SERVICE_ENV).ok().filter(|role| !role.is_empty())
}

/// How to start one service process.
#[derive(Debug, Clone)]
pub struct ServiceCommand {
    role: String,
    program: Option<PathBuf>,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl ServiceCommand {
    /// Re-executes the current program with `NODEVISOR_SERVICE=<role>`.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            program: None,
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Runs `program` instead of the current executable.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    fn command(&self) -> Result<Command, LaunchError> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(LaunchError::CurrentExe)?,
        };
        let mut cmd = Command::new(program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .env(SERVICE_ENV, &self.role)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// Exit of one launched service.
#[derive(Debug, Clone)]
pub struct ServiceExit {
    pub role: String,
    pub status: ExitStatus,
}

struct ServiceProcess {
    role: String,
    child: Child,
    status: Option<ExitStatus>,
}

/// Supervises service processes as a unit. No automatic restarts.
#[derive(Default)]
pub struct Launcher {
    processes: Vec<ServiceProcess>,
}

impl Launcher {
    pub fn new() -> Self {
        info!(version = env!("CARGO_PKG_VERSION"), "nodevisor launcher");
        Self::default()
    }

    /// Spawns one service process and tracks it. Returns its pid.
    ///
    /// Must be called inside a tokio runtime.
    pub fn launch_service(&mut self, service: &ServiceCommand) -> Result<Option<u32>, LaunchError> {
        let child = service
            .command()?
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                role: service.role.clone(),
                source,
            })?;
        let pid = child.id();
        info!(role = %service.role, pid, "service process launched");

        self.processes.push(ServiceProcess {
            role: service.role.clone(),
            child,
            status: None,
        });
        Ok(pid)
    }

    /// Kills every process that is still alive.
    ///
    /// Processes that already exited are skipped; per-process failures are
    /// logged and do not stop the others from being killed.
    pub fn stop(&mut self) {
        for process in &mut self.processes {
            if process.status.is_some() {
                continue;
            }
            match process.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(role = %process.role, %status, "service process already exited");
                    process.status = Some(status);
                }
                Ok(None) => match process.child.start_kill() {
                    Ok(()) => info!(role = %process.role, "service process killed"),
                    Err(e) => warn!(role = %process.role, error = %e, "failed to kill service process"),
                },
                Err(e) => warn!(role = %process.role, error = %e, "failed to poll service process"),
            }
        }
    }

    /// Joins every process; exit statuses come back in launch order.
    pub async fn wait(&mut self) -> Result<Vec<ServiceExit>, LaunchError> {
        let mut exits = Vec::with_capacity(self.processes.len());
        for process in &mut self.processes {
            let status = match process.status {
                Some(status) => status,
                None => {
                    let status = process.child.wait().await.map_err(|source| LaunchError::Wait {
                        role: process.role.clone(),
                        source,
                    })?;
                    process.status = Some(status);
                    status
                }
            };
            debug!(role = %process.role, %status, "service process joined");
            exits.push(ServiceExit {
                role: process.role.clone(),
                status,
            });
        }
        Ok(exits)
    }

    /// Roles of launched services, in launch order.
    pub fn roles(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.role.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_reaches_child_environment() {
        let cmd = ServiceCommand::new("compute")
            .program("env")
            .env("EXTRA", "1")
            .command()
            .unwrap();
        let envs: Vec<_> = cmd.as_std().get_envs().collect();
        assert!(envs
            .iter()
            .any(|(k, v)| *k == SERVICE_ENV && v.map(|v| v == "compute").unwrap_or(false)));
        assert!(envs.iter().any(|(k, _)| *k == "EXTRA"));
    }

    #[test]
    fn default_program_is_current_executable() {
        let cmd = ServiceCommand::new("compute").command().unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(cmd.as_std().get_program(), exe.as_os_str());
    }

    #[tokio::test]
    async fn empty_launcher_waits_immediately() {
        let mut launcher = Launcher::new();
        launcher.stop();
        assert!(launcher.wait().await.unwrap().is_empty());
        assert!(launcher.is_empty());
    }
}
