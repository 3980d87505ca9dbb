//! Typed error hierarchy for the startup orchestrator.
//!
//! Two top-level enums cover the two external boundaries:
//! - `LaunchError`: spawning external programs
//! - `BusError`: session bus calls, waits and subscriptions
//!
//! Neither ever aborts the pipeline. Jobs log them and carry on.

use std::time::Duration;
use thiserror::Error;

/// Errors from launching an external program.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Empty command line for {name}")]
    EmptyCommand { name: String },

    #[error("Failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the session bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Failed to run bus tool {program}: {source}")]
    ToolFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Call to {method} failed: {message}")]
    CallFailed { method: String, message: String },

    #[error("Call to {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Waiting for service {service} failed: {message}")]
    WaitFailed { service: String, message: String },

    #[error("Bus connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_error_spawn_failed_carries_program() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = LaunchError::SpawnFailed {
            program: "ksmserver".to_string(),
            source: io_err,
        };
        match &err {
            LaunchError::SpawnFailed { program, source } => {
                assert_eq!(program, "ksmserver");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected SpawnFailed variant"),
        }
        assert!(err.to_string().contains("ksmserver"));
    }

    #[test]
    fn bus_error_timeout_mentions_method() {
        let err = BusError::Timeout {
            method: "org.kde.KCMInit.runPhase1".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("runPhase1"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&LaunchError::EmptyCommand { name: "x".into() });
        assert_std_error(&BusError::Closed);
    }
}
