use crate::config::LoginSoundConfig;
use crate::job::{Completion, Job};
use crate::launcher::LaunchEnv;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Plays the login sound on a thread of its own.
///
/// Audio backends may still be initializing this early in the session, so the
/// player gets a dedicated thread and nothing waits for it.
pub struct LoginSoundJob {
    config: LoginSoundConfig,
    data_dirs: Vec<PathBuf>,
    env: LaunchEnv,
}

impl LoginSoundJob {
    /// The player runs with `env` applied, like every other launched program.
    pub fn new(config: LoginSoundConfig, env: LaunchEnv) -> Self {
        Self {
            config,
            data_dirs: default_data_dirs(),
            env,
        }
    }

    pub fn with_data_dirs(mut self, data_dirs: Vec<PathBuf>) -> Self {
        self.data_dirs = data_dirs;
        self
    }
}

impl Job for LoginSoundJob {
    fn name(&self) -> &str {
        "login-sound"
    }

    fn start(&self, done: Completion) {
        let config = self.config.clone();
        let data_dirs = self.data_dirs.clone();
        let env = self.env.clone();
        let spawned = std::thread::Builder::new()
            .name("login-sound".to_string())
            .spawn(move || play(&config, &data_dirs, &env));
        if let Err(e) = spawned {
            warn!(error = %e, "Could not start login sound thread");
        }
        done.complete();
    }
}

fn play(config: &LoginSoundConfig, data_dirs: &[PathBuf], env: &LaunchEnv) {
    if !config.action.split('|').any(|a| a == "Sound") {
        debug!("No startup sound configured");
        return;
    }
    let Some(sound) = config.sound.as_deref().filter(|s| !s.is_empty()) else {
        warn!("Audio notification requested, but no sound file provided, aborting audio notification");
        return;
    };
    let Some(path) = find_sound(sound, data_dirs) else {
        warn!(sound, "Audio notification requested, but sound file was not found, aborting audio notification");
        return;
    };

    match Command::new(&config.player)
        .arg(&path)
        .envs(env.snapshot())
        .stdin(Stdio::null())
        .status()
    {
        Ok(status) => debug!(sound = %path.display(), exit_code = status.code(), "Login sound finished"),
        Err(e) => warn!(player = %config.player, error = %e, "Could not play login sound"),
    }
}

/// Locate `sound`: an absolute path as is, otherwise `sounds/<sound>` in the
/// first data dir that has it.
pub fn find_sound(sound: &str, data_dirs: &[PathBuf]) -> Option<PathBuf> {
    let path = Path::new(sound);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }
    data_dirs
        .iter()
        .map(|dir| dir.join("sounds").join(sound))
        .find(|candidate| candidate.exists())
}

/// The user data dir followed by `$XDG_DATA_DIRS`.
pub fn default_data_dirs() -> Vec<PathBuf> {
    let system = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    dirs::data_dir()
        .into_iter()
        .chain(system.split(':').filter(|d| !d.is_empty()).map(PathBuf::from))
        .collect()
}
