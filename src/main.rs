use anyhow::{Context, Result};
use session_startup::autostart::{AutoStartList, AutoStartSource, ExecResolver};
use session_startup::bus::{GdbusBus, SessionBus};
use session_startup::launcher::{LaunchEnv, Launcher, ProcessLauncher};
use session_startup::{SessionConfig, Startup, StartupDeps, logging, service};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = SessionConfig::from_env().context("Failed to load session startup config")?;
    for warning in config.validate() {
        warn!("{}", warning);
    }

    // Everything after argv[0] goes to the session manager untouched.
    let args: Vec<String> = std::env::args().skip(1).collect();

    let bus: Arc<dyn SessionBus> = Arc::new(match &config.gdbus_cmd {
        Some(program) => GdbusBus::new(program.clone()),
        None => GdbusBus::default(),
    });
    let launch_env = LaunchEnv::default();
    let launcher: Arc<dyn Launcher> = Arc::new(ProcessLauncher::new(launch_env.clone()));
    let autostart = Arc::new(AutoStartList::from_entries(&config.autostart));

    let startup = Arc::new(Startup::new(
        &config,
        args,
        StartupDeps {
            bus,
            launcher,
            autostart: Arc::clone(&autostart) as Arc<dyn AutoStartSource>,
            resolver: autostart as Arc<dyn ExecResolver>,
            launch_env,
        },
    ));

    // Exported before any stage starts.
    let _service = match service::serve(Arc::clone(&startup)).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            warn!("Could not export {}: {}", service::SERVICE_NAME, e);
            None
        }
    };
    startup.start();

    tokio::select! {
        _ = startup.wait_ready() => info!("Session is up"),
        _ = shutdown_signal() => {
            info!("Interrupted before the session came up");
            return Ok(());
        }
    }

    // Children were spawned by us; stay around to reap them.
    shutdown_signal().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
