use crate::bus::{SessionBus, SignalMatch, names};
use crate::job::{Completion, Job};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default fallback for the window manager wait.
pub const WINDOW_MANAGER_TIMEOUT: Duration = Duration::from_secs(3);

/// Waits for the compositor to come up, but never longer than the timeout.
///
/// A missing window manager is a degraded session, not a broken one, so the
/// timer always wins eventually.
pub struct WindowManagerWaitJob {
    bus: Arc<dyn SessionBus>,
    timeout: Duration,
}

impl WindowManagerWaitJob {
    pub fn new(bus: Arc<dyn SessionBus>) -> Self {
        Self {
            bus,
            timeout: WINDOW_MANAGER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Job for WindowManagerWaitJob {
    fn name(&self) -> &str {
        "window-manager"
    }

    fn start(&self, done: Completion) {
        let ask_bus = match self.bus.compositing_known() {
            Some(true) => {
                info!("WindowManagerWaitJob: compositor already active, skipping");
                done.complete();
                return;
            }
            Some(false) => false,
            None => true,
        };

        let bus = Arc::clone(&self.bus);
        let timeout = self.timeout;
        tokio::spawn(async move {
            // Whichever branch loses is dropped, so late signals go nowhere.
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    info!(timeout_ms = timeout.as_millis() as u64, "WindowManagerWaitJob: timeout reached");
                }
                _ = compositor_ready(bus.as_ref(), ask_bus) => {
                    info!("WindowManagerWaitJob: compositor active");
                }
            }
            done.complete();
        });
    }
}

/// Resolves once the window manager is registered and has switched
/// compositing on. With `ask_bus`, first asks the bus whether it already has.
/// Never resolves otherwise.
async fn compositor_ready(bus: &dyn SessionBus, ask_bus: bool) {
    if ask_bus && bus.compositing_active().await {
        return;
    }
    if let Err(e) = bus.wait_for_service(names::WINDOW_MANAGER).await {
        debug!(error = %e, "Not watching for the window manager");
        return std::future::pending().await;
    }
    info!("WindowManagerWaitJob: found window manager");

    let mut signals = match bus.subscribe(&SignalMatch::compositing_toggled()).await {
        Ok(signals) => signals,
        Err(e) => {
            debug!(error = %e, "Not watching compositor signals");
            return std::future::pending().await;
        }
    };
    while let Some(signal) = signals.recv().await {
        if signal.first_bool() == Some(true) {
            return;
        }
        debug!(args = ?signal.args, "Compositing toggled off");
    }
    std::future::pending().await
}
