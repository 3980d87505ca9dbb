use crate::bus::{MethodCall, SessionBus, names};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

/// Last stage the splash screen is told about.
pub const READY_STAGE: &str = "ready";

/// Announced as soon as the session manager launch is issued.
pub const SESSION_MANAGER_STAGE: &str = "ksmserver";

/// One-way progress reporting to the splash screen.
///
/// Calls go out on the runtime that was current at construction, or on the
/// caller's runtime when there was none then.
#[derive(Clone)]
pub struct Splash {
    bus: Arc<dyn SessionBus>,
    timeout: Duration,
    runtime: Option<Handle>,
}

impl Splash {
    pub fn new(bus: Arc<dyn SessionBus>, timeout: Duration) -> Self {
        Self {
            bus,
            timeout,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Send `stage` without waiting for an answer. Dropped with a debug log
    /// when no runtime is available.
    pub fn announce_stage(&self, stage: &str) {
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            debug!(stage, "No runtime, splash stage not sent");
            return;
        };
        let call = MethodCall::new(names::SPLASH, "/KSplash", "org.kde.KSplash", "setStage")
            .with_arg(stage)
            .with_timeout(self.timeout);
        let bus = Arc::clone(&self.bus);
        runtime.spawn(async move {
            match tokio::time::timeout(call.timeout, bus.call(&call)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(stage = ?call.args, error = %e, "Splash did not take stage"),
                Err(_) => debug!(stage = ?call.args, "Splash did not answer"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CallReply, MemoryBus};

    #[tokio::test]
    async fn test_announce_calls_set_stage() {
        let bus = Arc::new(MemoryBus::new());
        let splash = Splash::new(Arc::clone(&bus) as Arc<dyn SessionBus>, Duration::from_secs(1));

        splash.announce_stage(READY_STAGE);
        tokio::task::yield_now().await;

        let calls = bus.calls_to("org.kde.KSplash.setStage");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].service, "org.kde.KSplash");
        assert_eq!(calls[0].path, "/KSplash");
        assert_eq!(calls[0].args, vec!["ready"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_does_not_wait_for_missing_splash() {
        let bus = Arc::new(MemoryBus::new());
        bus.set_reply("org.kde.KSplash.setStage", CallReply::Never);
        let splash = Splash::new(Arc::clone(&bus) as Arc<dyn SessionBus>, Duration::from_secs(1));

        // Returns straight away even though the call never answers.
        splash.announce_stage("ksmserver");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(bus.calls().len(), 1);
    }

    #[test]
    fn test_announce_without_runtime_does_not_panic() {
        let bus = Arc::new(MemoryBus::new());
        let splash = Splash::new(Arc::clone(&bus) as Arc<dyn SessionBus>, Duration::from_secs(1));

        splash.announce_stage(READY_STAGE);
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_announce_uses_runtime_from_construction() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let bus = Arc::new(MemoryBus::new());
        let splash = {
            let _guard = runtime.enter();
            Splash::new(Arc::clone(&bus) as Arc<dyn SessionBus>, Duration::from_secs(1))
        };

        // Called from outside the runtime.
        splash.announce_stage(READY_STAGE);
        runtime.block_on(async { tokio::time::sleep(Duration::from_millis(10)).await });

        assert_eq!(bus.calls_to("org.kde.KSplash.setStage").len(), 1);
    }
}
