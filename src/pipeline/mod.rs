//! The startup pipeline.
//!
//! A fixed chain of stages, each started by the completion of the one before:
//!
//! ```text
//! start ksmserver -> window manager wait -> phase 0 -> phase 1 -> restore session -> phase 2 -> ready
//!                                                          \-> login sound (side)        \-> autostart scripts (side)
//! ```
//!
//! Nothing here blocks. Every edge is a [`Completion`] continuation, so the
//! pipeline advances from whatever task finishes the current stage.

mod events;
mod splash;

pub use events::StartupEvent;
pub use splash::{READY_STAGE, SESSION_MANAGER_STAGE, Splash};

use crate::autostart::{AutoStartSource, ExecResolver};
use crate::bus::SessionBus;
use crate::config::SessionConfig;
use crate::job::{Completion, Job, Phase, lock};
use crate::launcher::{LaunchEnv, Launcher};
use crate::tasks::{
    AutoStartAppsJob, AutostartScriptsJob, LoginSoundJob, RemoteCallJob, SleepJob,
    StartServiceJob, WindowManagerWaitJob, legacy_kde_home,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// External collaborators the pipeline talks to.
#[derive(Clone)]
pub struct StartupDeps {
    pub bus: Arc<dyn SessionBus>,
    pub launcher: Arc<dyn Launcher>,
    pub autostart: Arc<dyn AutoStartSource>,
    pub resolver: Arc<dyn ExecResolver>,
    /// Must be the environment `launcher` applies to its children.
    pub launch_env: LaunchEnv,
}

/// A pipeline stage plus the side jobs fired when it finishes.
struct Stage {
    job: Arc<dyn Job>,
    after: Vec<Arc<dyn Job>>,
}

impl Stage {
    fn new(job: impl Job + 'static) -> Self {
        Self {
            job: Arc::new(job),
            after: Vec::new(),
        }
    }

    fn then_start(mut self, job: impl Job + 'static) -> Self {
        self.after.push(Arc::new(job));
        self
    }
}

struct Shared {
    splash: Splash,
    events: Mutex<Option<mpsc::UnboundedSender<StartupEvent>>>,
    ready: watch::Sender<bool>,
}

impl Shared {
    fn emit(&self, event: StartupEvent) {
        if let Some(tx) = lock(&self.events).as_ref() {
            let _ = tx.send(event);
        }
    }

    fn announce(&self, stage: &str) {
        debug!(stage, "Announcing stage");
        self.splash.announce_stage(stage);
        self.emit(StartupEvent::StageAnnounced {
            stage: stage.to_string(),
        });
    }

    fn finish(&self) {
        info!("Finished");
        self.announce(READY_STAGE);
        self.emit(StartupEvent::Ready);
        self.ready.send_replace(true);
    }
}

/// The session startup orchestrator. Built once, started once.
pub struct Startup {
    stages: Arc<[Stage]>,
    shared: Arc<Shared>,
    launch_env: LaunchEnv,
    started: AtomicBool,
}

impl Startup {
    /// Build the pipeline. `args` are forwarded to the session manager.
    pub fn new(config: &SessionConfig, args: Vec<String>, deps: StartupDeps) -> Self {
        let timeouts = &config.timeouts;
        let bus = &deps.bus;
        let autostart_apps = |phase: u32| {
            AutoStartAppsJob::new(
                phase,
                Arc::clone(&deps.autostart),
                Arc::clone(&deps.resolver),
                Arc::clone(&deps.launcher),
            )
        };

        let session_manager = StartServiceJob::new(
            config.session_manager.program.clone(),
            args,
            config.session_manager.service.clone(),
            Arc::clone(bus),
            Arc::clone(&deps.launcher),
        );
        let window_manager =
            WindowManagerWaitJob::new(Arc::clone(bus)).with_timeout(timeouts.window_manager());

        let phase0 = Phase::new(0)
            .with_job(autostart_apps(0))
            .with_job(RemoteCallJob::kcminit(1, Arc::clone(bus)).with_timeout(timeouts.init_call()))
            .with_job(SleepJob::new(timeouts.phase0_dwell()));

        let phase1 = Phase::new(1).with_job(autostart_apps(1));

        let restore_session =
            RemoteCallJob::restore_session(Arc::clone(bus)).with_timeout(timeouts.call());

        let scripts = AutostartScriptsJob::new(config.scripts_dir(), Arc::clone(&deps.launcher))
            .with_legacy_home(legacy_kde_home());
        let phase2 = Phase::new(2)
            .with_job(autostart_apps(2))
            .with_job(RemoteCallJob::kded_second_phase(Arc::clone(bus)).with_timeout(timeouts.call()))
            .with_job(RemoteCallJob::kcminit(2, Arc::clone(bus)).with_timeout(timeouts.init_call()))
            .with_side_job(scripts);

        let stages: Vec<Stage> = vec![
            Stage::new(session_manager),
            Stage::new(window_manager),
            Stage::new(phase0),
            Stage::new(phase1).then_start(LoginSoundJob::new(
                config.login_sound.clone(),
                deps.launch_env.clone(),
            )),
            Stage::new(restore_session),
            Stage::new(phase2),
        ];

        let (ready, _) = watch::channel(false);
        Self {
            stages: stages.into(),
            shared: Arc::new(Shared {
                splash: Splash::new(Arc::clone(bus), timeouts.call()),
                events: Mutex::new(None),
                ready,
            }),
            launch_env: deps.launch_env,
            started: AtomicBool::new(false),
        }
    }

    /// Receive [`StartupEvent`]s on `tx`.
    pub fn with_event_channel(self, tx: mpsc::UnboundedSender<StartupEvent>) -> Self {
        *lock(&self.shared.events) = Some(tx);
        self
    }

    /// Stage names in run order.
    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .map(|s| s.job.name().to_string())
            .collect()
    }

    /// Kick off the pipeline. Only the first call does anything.
    ///
    /// Must be called from within a tokio runtime; jobs spawn their waits on it.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Startup already running");
            return;
        }
        run_stage(Arc::clone(&self.stages), 0, Arc::clone(&self.shared));
        // Announced once the launch is issued, not when the service is up.
        self.shared.announce(SESSION_MANAGER_STAGE);
    }

    /// Set `key=value` for every program launched from now on.
    pub fn update_launch_env(&self, key: &str, value: &str) {
        debug!(key, value, "Updating launch environment");
        self.launch_env.set(key, value);
    }

    /// Send a progress stage to the splash screen. Without a runtime, either
    /// at construction or at the call, the stage is dropped.
    pub fn announce_stage(&self, stage: &str) {
        self.shared.announce(stage);
    }

    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    /// Resolve once every stage has completed.
    pub async fn wait_ready(&self) {
        let mut rx = self.shared.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

fn run_stage(stages: Arc<[Stage]>, index: usize, shared: Arc<Shared>) {
    let Some(stage) = stages.get(index) else {
        shared.finish();
        return;
    };
    let name = stage.job.name().to_string();
    debug!(stage = %name, "Starting stage");
    shared.emit(StartupEvent::StageStarted {
        stage: name.clone(),
    });

    let next_stages = Arc::clone(&stages);
    let next_shared = Arc::clone(&shared);
    let done = Completion::new(name.clone(), move || {
        next_shared.emit(StartupEvent::StageFinished { stage: name });
        for side in &next_stages[index].after {
            side.start(Completion::detached(side.name()));
        }
        run_stage(next_stages, index + 1, next_shared);
    });
    stage.job.start(done);
}
