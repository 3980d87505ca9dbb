//! User autostart scripts.
//!
//! Runs every regular file in `autostart-scripts` under the user config
//! directory. Editor backups and lock files are skipped. The first time the
//! directory is created, scripts from a legacy KDE 4 home are copied over.

use crate::job::{Completion, Job};
use crate::launcher::Launcher;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether `name` looks like an editor backup or lock file.
pub fn is_backup_name(name: &str) -> bool {
    name.ends_with('~')
        || name.ends_with(".bak")
        || (name.starts_with('%') && name.ends_with('%'))
        || (name.starts_with('#') && name.ends_with('#'))
}

/// The KDE 4 home: `$KDEHOME`, else `~/.kde4`, else `~/.kde`.
pub fn legacy_kde_home() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("KDEHOME").filter(|h| !h.is_empty()) {
        let home = PathBuf::from(home);
        return home.is_dir().then_some(home);
    }
    let user_home = dirs::home_dir()?;
    [".kde4", ".kde"]
        .iter()
        .map(|d| user_home.join(d))
        .find(|p| p.is_dir())
}

/// Launches the user's autostart scripts. Side job: its phase does not wait
/// on it, and nothing waits on the scripts themselves.
pub struct AutostartScriptsJob {
    dir: PathBuf,
    legacy_home: Option<PathBuf>,
    launcher: Arc<dyn Launcher>,
}

impl AutostartScriptsJob {
    pub fn new(dir: PathBuf, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            dir,
            legacy_home: None,
            launcher,
        }
    }

    /// `<config dir>/autostart-scripts`, falling back to `~/.config`.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("autostart-scripts")
    }

    /// Home directory to migrate legacy scripts from.
    pub fn with_legacy_home(mut self, home: Option<PathBuf>) -> Self {
        self.legacy_home = home;
        self
    }

    /// Launch every script. Returns how many were started.
    pub fn run_user_autostart(&self) -> usize {
        if !self.dir.exists() {
            // Create it anyway so users can find it.
            if let Err(e) = fs::create_dir_all(&self.dir) {
                warn!(dir = %self.dir.display(), error = %e, "Could not create autostart scripts folder");
            }
            if !self.migrate_legacy_autostart() {
                return 0;
            }
        }

        let scripts = match script_entries(&self.dir) {
            Ok(scripts) => scripts,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Could not read autostart scripts folder");
                return 0;
            }
        };

        let mut started = 0;
        for path in scripts {
            info!(script = %path.display(), "Starting autostart script");
            match self.launcher.launch(&path.to_string_lossy(), &[]) {
                Ok(()) => started += 1,
                Err(e) => warn!(script = %path.display(), error = %e, "Could not start autostart script"),
            }
        }
        started
    }

    /// Copy scripts from the legacy home. Returns false when there is no
    /// legacy home to migrate from.
    fn migrate_legacy_autostart(&self) -> bool {
        let Some(home) = &self.legacy_home else {
            return false;
        };

        let old_folder = legacy_autostart_dir(home);
        debug!(from = %old_folder.display(), "Copying autostart files");
        let entries = match fs::read_dir(&old_folder) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(from = %old_folder.display(), error = %e, "No legacy autostart folder");
                return true;
            }
        };

        for entry in entries.flatten() {
            let src = entry.path();
            let dest = self.dir.join(entry.file_name());
            if let Err(e) = copy_entry(&src, &dest) {
                warn!(src = %src.display(), dest = %dest.display(), error = %e, "Error copying autostart file");
            }
        }
        true
    }
}

impl Job for AutostartScriptsJob {
    fn name(&self) -> &str {
        "autostart-scripts"
    }

    fn start(&self, done: Completion) {
        let started = self.run_user_autostart();
        debug!(started, "Autostart scripts launched");
        done.complete();
    }
}

/// Regular files in `dir` that are not backups, sorted by name.
fn script_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut scripts = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            // Launch commands are UTF-8 strings.
            warn!(script = %path.display(), "Skipping autostart script with a non UTF-8 name");
            continue;
        };
        if !is_backup_name(name) {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// `<home>/Autostart`, unless `kdeglobals` points elsewhere.
fn legacy_autostart_dir(home: &Path) -> PathBuf {
    let kdeglobals = home.join("share").join("config").join("kdeglobals");
    fs::read_to_string(kdeglobals)
        .ok()
        .and_then(|content| ini_value(&content, "Paths", "Autostart"))
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join("Autostart"))
}

/// Look up `key` in `[group]` of an INI style file.
fn ini_value(content: &str, group: &str, key: &str) -> Option<String> {
    let header = format!("[{}]", group);
    let mut in_group = false;
    for line in content.lines().map(str::trim) {
        if line.starts_with('[') {
            in_group = line == header;
            continue;
        }
        if !in_group {
            continue;
        }
        if let Some((k, v)) = line.split_once('=')
            && k.trim() == key
        {
            return Some(v.trim().to_string());
        }
    }
    None
}

fn copy_entry(src: &Path, dest: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        // Only absolute link targets survive the move.
        let target = fs::read_link(src)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, dest)?;
        #[cfg(not(unix))]
        fs::copy(target, dest).map(|_| ())?;
    } else if meta.is_file() {
        fs::copy(src, dest)?;
    }
    Ok(())
}
