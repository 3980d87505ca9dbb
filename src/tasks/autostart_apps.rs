use crate::autostart::{AutoStartSource, ExecResolver};
use crate::job::{Completion, Job};
use crate::launcher::Launcher;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Starts every autostart service registered for one phase.
///
/// The pull loop runs on its own task and yields after every entry, so a long
/// list never starves the rest of the phase.
pub struct AutoStartAppsJob {
    name: String,
    phase: u32,
    source: Arc<dyn AutoStartSource>,
    resolver: Arc<dyn ExecResolver>,
    launcher: Arc<dyn Launcher>,
}

impl AutoStartAppsJob {
    pub fn new(
        phase: u32,
        source: Arc<dyn AutoStartSource>,
        resolver: Arc<dyn ExecResolver>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            name: format!("autostart-phase-{}", phase),
            phase,
            source,
            resolver,
            launcher,
        }
    }
}

impl Job for AutoStartAppsJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, done: Completion) {
        debug!(phase = self.phase, "Autostart apps");
        let phase = self.phase;
        let source = Arc::clone(&self.source);
        let resolver = Arc::clone(&self.resolver);
        let launcher = Arc::clone(&self.launcher);

        tokio::spawn(async move {
            let mut started = 0usize;
            loop {
                let service = match source.next_service(phase) {
                    Some(service) if !service.is_empty() => service,
                    _ => break,
                };

                let mut argv = resolver.resolve(&service);
                if argv.is_empty() {
                    warn!(phase, service = %service, "Failed to parse {} for autostart", service);
                    tokio::task::yield_now().await;
                    continue;
                }
                let program = argv.remove(0);
                info!(phase, service = %service, program = %program, args = ?argv, "Starting autostart service");
                match launcher.launch(&program, &argv) {
                    Ok(()) => started += 1,
                    Err(e) => warn!(phase, service = %service, error = %e, "Could not start {}", service),
                }
                tokio::task::yield_now().await;
            }

            if !source.phase_done(phase) {
                source.mark_phase_done(phase);
            }
            debug!(phase, started, "Autostart apps done");
            done.complete();
        });
    }
}
