use crate::bus::SessionBus;
use crate::job::{Completion, Job};
use crate::launcher::Launcher;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Launches a daemon and completes once its service is reachable on the bus.
///
/// Completion is tied to the service registration, not to the process: the
/// service may already be up, or be started by someone else. There is no
/// timeout; if the service never shows up the job never completes.
pub struct StartServiceJob {
    name: String,
    program: String,
    args: Vec<String>,
    service: String,
    bus: Arc<dyn SessionBus>,
    launcher: Arc<dyn Launcher>,
}

impl StartServiceJob {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        service: impl Into<String>,
        bus: Arc<dyn SessionBus>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let program = program.into();
        Self {
            name: format!("start-{}", program),
            program,
            args,
            service: service.into(),
            bus,
            launcher,
        }
    }
}

impl Job for StartServiceJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, done: Completion) {
        info!(program = %self.program, args = ?self.args, service = %self.service, "Starting service");
        if let Err(e) = self.launcher.launch(&self.program, &self.args) {
            warn!(program = %self.program, error = %e, "Could not start service, still waiting for it");
        }

        // An already registered service resolves the wait at once, so
        // launching before watching cannot miss the registration.
        let bus = Arc::clone(&self.bus);
        let service = self.service.clone();
        tokio::spawn(async move {
            match bus.wait_for_service(&service).await {
                Ok(()) => {
                    info!(service = %service, "Service registered");
                    done.complete();
                }
                Err(e) => error!(service = %service, error = %e, "Lost track of service, startup cannot continue"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, names};
    use crate::tasks::testing::RecordingLauncher;
    use std::time::Duration;

    fn job(bus: &Arc<MemoryBus>, launcher: &Arc<RecordingLauncher>) -> StartServiceJob {
        StartServiceJob::new(
            "ksmserver",
            vec!["--restore".to_string()],
            names::SESSION_MANAGER,
            Arc::clone(bus) as Arc<dyn SessionBus>,
            Arc::clone(launcher) as Arc<dyn Launcher>,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_registration_not_launch() {
        let bus = Arc::new(MemoryBus::new());
        let launcher = Arc::new(RecordingLauncher::default());
        let done = Completion::detached("test");

        job(&bus, &launcher).start(done.clone());
        assert_eq!(
            *launcher.launches.lock().unwrap(),
            vec![vec!["ksmserver".to_string(), "--restore".to_string()]]
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!done.is_complete());

        bus.register_service(names::SESSION_MANAGER);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(done.is_complete());
    }

    #[tokio::test]
    async fn test_already_registered_service_completes() {
        let bus = Arc::new(MemoryBus::new());
        bus.register_service(names::SESSION_MANAGER);
        let launcher = Arc::new(RecordingLauncher::default());
        let done = Completion::detached("test");

        job(&bus, &launcher).start(done.clone());
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(done.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_keeps_waiting() {
        let bus = Arc::new(MemoryBus::new());
        let launcher = Arc::new(RecordingLauncher::failing(&["ksmserver"]));
        let done = Completion::detached("test");

        job(&bus, &launcher).start(done.clone());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!done.is_complete());

        bus.register_service(names::SESSION_MANAGER);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(done.is_complete());
    }
}
