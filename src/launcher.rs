//! Launching external programs.
//!
//! Everything the orchestrator starts is detached: it gets its own process
//! group, nothing waits on it for scheduling, and a reaper task logs the exit
//! status once it ends.

use crate::errors::LaunchError;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment overlay applied to every launched program.
///
/// Variables set here are visible to every child spawned afterwards. The
/// orchestrator's own environment is left alone.
#[derive(Debug, Clone, Default)]
pub struct LaunchEnv {
    vars: Arc<RwLock<BTreeMap<String, String>>>,
}

impl LaunchEnv {
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut vars = self.vars.write().unwrap_or_else(|e| e.into_inner());
        vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let vars = self.vars.read().unwrap_or_else(|e| e.into_inner());
        vars.get(key).cloned()
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        let vars = self.vars.read().unwrap_or_else(|e| e.into_inner());
        vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Starts programs without waiting for them.
pub trait Launcher: Send + Sync {
    /// Start `program` detached. Returns once the process is spawned.
    fn launch(&self, program: &str, args: &[String]) -> Result<(), LaunchError>;
}

/// [`Launcher`] backed by `tokio::process`. Must be used inside a runtime.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    env: LaunchEnv,
}

impl ProcessLauncher {
    pub fn new(env: LaunchEnv) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &LaunchEnv {
        &self.env
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        if program.is_empty() {
            return Err(LaunchError::EmptyCommand {
                name: args.join(" "),
            });
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(self.env.snapshot())
            .stdin(Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| LaunchError::SpawnFailed {
            program: program.to_string(),
            source,
        })?;
        debug!(program, pid = child.id(), "Launched");

        let program = program.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(
                    program = %program,
                    exit_code = status.code(),
                    "{} finished with exit code {}",
                    program,
                    status.code().map_or_else(|| "none".to_string(), |c| c.to_string())
                ),
                Err(e) => warn!(program = %program, error = %e, "Waiting for process failed"),
            }
        });
        Ok(())
    }
}
