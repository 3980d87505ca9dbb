//! Configuration for the startup orchestrator.
//!
//! Read from `$SESSION_STARTUP_CONFIG`, or `session-startup.toml` in the user
//! config directory. A missing file means defaults everywhere.
//!
//! ```toml
//! [session_manager]
//! program = "ksmserver"
//! service = "org.kde.ksmserver"
//!
//! [timeouts]
//! window_manager_ms = 3000
//! init_call_ms = 10000
//! call_ms = 25000
//! phase0_dwell_ms = 100
//!
//! [login_sound]
//! action = "Sound"
//! sound = "Oxygen-Sys-Log-In.ogg"
//! player = "paplay"
//!
//! [scripts]
//! dir = "/home/me/.config/autostart-scripts"
//!
//! [[autostart]]
//! name = "org.kde.klipper"
//! phase = 1
//! exec = ["klipper"]
//! ```
//!
//! Environment overrides: `SESSION_MANAGER_PROGRAM`, `GDBUS_CMD`.

use crate::autostart::AutoStartEntry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "SESSION_STARTUP_CONFIG";
pub const CONFIG_FILE: &str = "session-startup.toml";

/// Highest phase number the pipeline runs.
pub const LAST_PHASE: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionManagerConfig {
    #[serde(default = "default_session_manager_program")]
    pub program: String,
    #[serde(default = "default_session_manager_service")]
    pub service: String,
}

fn default_session_manager_program() -> String {
    "ksmserver".to_string()
}

fn default_session_manager_service() -> String {
    crate::bus::names::SESSION_MANAGER.to_string()
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            program: default_session_manager_program(),
            service: default_session_manager_service(),
        }
    }
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Fallback for the window manager wait
    #[serde(default = "default_window_manager_ms")]
    pub window_manager_ms: u64,
    /// Reply timeout for the settings-module init calls
    #[serde(default = "default_init_call_ms")]
    pub init_call_ms: u64,
    /// Reply timeout for every other bus call
    #[serde(default = "default_call_ms")]
    pub call_ms: u64,
    /// Minimum duration of phase 0
    #[serde(default = "default_phase0_dwell_ms")]
    pub phase0_dwell_ms: u64,
}

fn default_window_manager_ms() -> u64 {
    3_000
}

fn default_init_call_ms() -> u64 {
    10_000
}

fn default_call_ms() -> u64 {
    25_000
}

fn default_phase0_dwell_ms() -> u64 {
    100
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            window_manager_ms: default_window_manager_ms(),
            init_call_ms: default_init_call_ms(),
            call_ms: default_call_ms(),
            phase0_dwell_ms: default_phase0_dwell_ms(),
        }
    }
}

impl TimeoutsConfig {
    pub fn window_manager(&self) -> Duration {
        Duration::from_millis(self.window_manager_ms)
    }

    pub fn init_call(&self) -> Duration {
        Duration::from_millis(self.init_call_ms)
    }

    pub fn call(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }

    pub fn phase0_dwell(&self) -> Duration {
        Duration::from_millis(self.phase0_dwell_ms)
    }
}

/// Login sound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSoundConfig {
    /// `|`-separated notification actions; the sound plays only with `Sound`
    #[serde(default)]
    pub action: String,
    /// Absolute path, or a name looked up under `sounds/` in the data dirs
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default = "default_player")]
    pub player: String,
}

fn default_player() -> String {
    "paplay".to_string()
}

impl Default for LoginSoundConfig {
    fn default() -> Self {
        Self {
            action: String::new(),
            sound: None,
            player: default_player(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Overrides `<config dir>/autostart-scripts`
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub session_manager: SessionManagerConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub login_sound: LoginSoundConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub autostart: Vec<AutoStartEntry>,
    /// Bus tool, from `GDBUS_CMD`
    #[serde(skip)]
    pub gdbus_cmd: Option<String>,
}

impl SessionConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse session startup config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Where the config file lives: `$SESSION_STARTUP_CONFIG`, else the user
    /// config directory.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_FILE)
    }

    /// Load from the default location and apply environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::load_or_default(&Self::default_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(program) = var("SESSION_MANAGER_PROGRAM").filter(|v| !v.is_empty()) {
            self.session_manager.program = program;
        }
        if let Some(gdbus) = var("GDBUS_CMD").filter(|v| !v.is_empty()) {
            self.gdbus_cmd = Some(gdbus);
        }
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts
            .dir
            .clone()
            .unwrap_or_else(crate::tasks::AutostartScriptsJob::default_dir)
    }

    /// Human-readable problems with the configuration. None of them is fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.session_manager.program.trim().is_empty() {
            warnings.push("session_manager.program is empty".to_string());
        }
        if self.timeouts.window_manager_ms == 0 {
            warnings.push(
                "timeouts.window_manager_ms is 0; the window manager will never be waited for"
                    .to_string(),
            );
        }

        let mut seen = HashSet::new();
        for entry in &self.autostart {
            if !seen.insert(entry.name.as_str()) {
                warnings.push(format!("autostart entry '{}' is listed twice", entry.name));
            }
            if entry.phase > LAST_PHASE {
                warnings.push(format!(
                    "autostart entry '{}' has phase {}, only phases 0-{} run",
                    entry.name, entry.phase, LAST_PHASE
                ));
            }
            if entry.exec.is_empty() {
                warnings.push(format!(
                    "autostart entry '{}' has no exec and will be skipped",
                    entry.name
                ));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.session_manager.program, "ksmserver");
        assert_eq!(config.session_manager.service, "org.kde.ksmserver");
        assert_eq!(config.timeouts.window_manager(), Duration::from_secs(3));
        assert_eq!(config.timeouts.init_call(), Duration::from_secs(10));
        assert_eq!(config.timeouts.call(), Duration::from_secs(25));
        assert_eq!(config.timeouts.phase0_dwell(), Duration::from_millis(100));
        assert_eq!(config.login_sound.player, "paplay");
        assert!(config.autostart.is_empty());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full() {
        let config = SessionConfig::parse(
            r#"
            [session_manager]
            program = "/usr/bin/ksmserver"

            [timeouts]
            window_manager_ms = 5000

            [login_sound]
            action = "Popup|Sound"
            sound = "login.ogg"

            [scripts]
            dir = "/tmp/scripts"

            [[autostart]]
            name = "org.kde.klipper"
            phase = 1
            exec = ["klipper"]

            [[autostart]]
            name = "early"
            exec = ["early", "--now"]
            "#,
        )
        .unwrap();

        assert_eq!(config.session_manager.program, "/usr/bin/ksmserver");
        assert_eq!(config.session_manager.service, "org.kde.ksmserver");
        assert_eq!(config.timeouts.window_manager_ms, 5000);
        assert_eq!(config.timeouts.init_call_ms, 10_000);
        assert_eq!(config.login_sound.sound.as_deref(), Some("login.ogg"));
        assert_eq!(config.scripts_dir(), PathBuf::from("/tmp/scripts"));
        assert_eq!(config.autostart.len(), 2);
        assert_eq!(config.autostart[1].phase, 0);
    }

    #[test]
    fn test_parse_error_has_context() {
        let err = SessionConfig::parse("[timeouts]\nwindow_manager_ms = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("session startup config"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = SessionConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[timeouts]\nphase0_dwell_ms = 250\n").unwrap();
        let config = SessionConfig::load_or_default(&path).unwrap();
        assert_eq!(config.timeouts.phase0_dwell(), Duration::from_millis(250));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SESSION_MANAGER_PROGRAM", "/opt/ksmserver"),
            ("GDBUS_CMD", "/opt/gdbus"),
        ]
        .into_iter()
        .collect();
        let mut config = SessionConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.session_manager.program, "/opt/ksmserver");
        assert_eq!(config.gdbus_cmd.as_deref(), Some("/opt/gdbus"));
    }

    #[test]
    fn test_validate_warnings() {
        let config = SessionConfig::parse(
            r#"
            [timeouts]
            window_manager_ms = 0

            [[autostart]]
            name = "dup"
            exec = ["a"]

            [[autostart]]
            name = "dup"
            phase = 7
            "#,
        )
        .unwrap();

        let warnings = config.validate();
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("window_manager_ms")));
        assert!(warnings.iter().any(|w| w.contains("listed twice")));
        assert!(warnings.iter().any(|w| w.contains("phase 7")));
        assert!(warnings.iter().any(|w| w.contains("no exec")));
    }
}
