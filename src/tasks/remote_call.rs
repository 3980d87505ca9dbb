use crate::bus::{MethodCall, SessionBus, names};
use crate::errors::BusError;
use crate::job::{Completion, Job};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for the settings-module init calls.
pub const INIT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// One bus call; completes when it answers, fails, or times out.
///
/// The outcome is only logged. A slow or absent callee must not hold the
/// phase back.
pub struct RemoteCallJob {
    name: String,
    bus: Arc<dyn SessionBus>,
    call: MethodCall,
}

impl RemoteCallJob {
    pub fn new(name: impl Into<String>, bus: Arc<dyn SessionBus>, call: MethodCall) -> Self {
        Self {
            name: name.into(),
            bus,
            call,
        }
    }

    /// `org.kde.KCMInit.runPhase1` / `runPhase2`.
    pub fn kcminit(phase: u32, bus: Arc<dyn SessionBus>) -> Self {
        let member = if phase == 1 { "runPhase1" } else { "runPhase2" };
        let call = MethodCall::new(names::KCMINIT, "/kcminit", "org.kde.KCMInit", member)
            .with_timeout(INIT_CALL_TIMEOUT);
        Self::new(format!("kcminit-phase-{}", phase), bus, call)
    }

    /// `org.kde.kded5.loadSecondPhase`.
    pub fn kded_second_phase(bus: Arc<dyn SessionBus>) -> Self {
        let call = MethodCall::new(names::KDED, "/kded", "org.kde.kded5", "loadSecondPhase");
        Self::new("kded-second-phase", bus, call)
    }

    /// `org.kde.KSMServerInterface.restoreSession`.
    pub fn restore_session(bus: Arc<dyn SessionBus>) -> Self {
        let call = MethodCall::new(
            names::SESSION_MANAGER,
            "/KSMServer",
            "org.kde.KSMServerInterface",
            "restoreSession",
        );
        Self::new("restore-session", bus, call)
    }

    /// Replace the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call.timeout = timeout;
        self
    }

    pub fn call(&self) -> &MethodCall {
        &self.call
    }
}

impl Job for RemoteCallJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, done: Completion) {
        let bus = Arc::clone(&self.bus);
        let call = self.call.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(call.timeout, bus.call(&call)).await {
                Ok(result) => result,
                Err(_) => Err(BusError::Timeout {
                    method: call.method(),
                    timeout: call.timeout,
                }),
            };
            match result {
                Ok(()) => debug!(job = %name, method = %call.method(), "Call finished"),
                Err(e) => warn!(job = %name, error = %e, "Call failed, continuing"),
            }
            done.complete();
        });
    }
}
