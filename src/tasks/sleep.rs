use crate::job::{Completion, Job};
use std::time::Duration;

/// Minimum time phase 0 lasts, however fast everything else is.
pub const PHASE0_DWELL: Duration = Duration::from_millis(100);

pub struct SleepJob {
    duration: Duration,
}

impl SleepJob {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for SleepJob {
    fn default() -> Self {
        Self::new(PHASE0_DWELL)
    }
}

impl Job for SleepJob {
    fn name(&self) -> &str {
        "sleep"
    }

    fn start(&self, done: Completion) {
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            done.complete();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_after_dwell() {
        let done = Completion::detached("sleep");
        SleepJob::default().start(done.clone());

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(!done.is_complete());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(done.is_complete());
    }
}
