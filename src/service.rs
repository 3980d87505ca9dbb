//! The `org.kde.Startup` object other session components call into.
//!
//! The session manager and the window manager push environment variables
//! (display, session type, ...) through `updateLaunchEnv` while startup runs.
//! Everything launched after the call sees them.

use crate::pipeline::Startup;
use std::sync::Arc;
use tracing::{debug, info};
use zbus::{Connection, connection, fdo, interface};

pub const SERVICE_NAME: &str = "org.kde.Startup";
pub const OBJECT_PATH: &str = "/Startup";

/// Bus-facing wrapper around a running [`Startup`].
pub struct StartupService {
    startup: Arc<Startup>,
}

impl StartupService {
    pub fn new(startup: Arc<Startup>) -> Self {
        Self { startup }
    }

    fn set_launch_env(&self, key: &str, value: &str) -> fdo::Result<()> {
        if key.is_empty() || key.contains('=') || key.contains('\0') || value.contains('\0') {
            debug!(key, "Rejecting launch environment update");
            return Err(fdo::Error::InvalidArgs(format!(
                "invalid environment variable name '{}'",
                key.replace('\0', "\\0")
            )));
        }
        self.startup.update_launch_env(key, value);
        Ok(())
    }
}

#[interface(name = "org.kde.Startup")]
impl StartupService {
    #[zbus(name = "updateLaunchEnv")]
    async fn update_launch_env(&self, key: String, value: String) -> fdo::Result<()> {
        self.set_launch_env(&key, &value)
    }
}

/// Claim [`SERVICE_NAME`] on the session bus and serve `startup` at
/// [`OBJECT_PATH`]. The object lives as long as the returned connection.
pub async fn serve(startup: Arc<Startup>) -> zbus::Result<Connection> {
    let connection = connection::Builder::session()?
        .name(SERVICE_NAME)?
        .serve_at(OBJECT_PATH, StartupService::new(startup))?
        .build()
        .await?;
    info!(name = SERVICE_NAME, path = OBJECT_PATH, "Serving startup interface");
    Ok(connection)
}
