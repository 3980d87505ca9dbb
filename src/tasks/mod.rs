//! The concrete startup jobs.
//!
//! | Job | Completes when |
//! |-----|----------------|
//! | [`StartServiceJob`] | the named service registers on the bus |
//! | [`WindowManagerWaitJob`] | compositing is on, or the fallback timer fires |
//! | [`RemoteCallJob`] | the call replies, fails or times out |
//! | [`SleepJob`] | the dwell time elapsed |
//! | [`AutoStartAppsJob`] | the registry ran dry for its phase |
//! | [`AutostartScriptsJob`] | every script was launched (not awaited by its phase) |
//! | [`LoginSoundJob`] | immediately; playback runs on its own thread |

mod autostart_apps;
mod login_sound;
mod remote_call;
mod scripts;
mod service;
mod sleep;
mod window_manager;

pub use autostart_apps::AutoStartAppsJob;
pub use login_sound::{LoginSoundJob, default_data_dirs, find_sound};
pub use remote_call::RemoteCallJob;
pub use scripts::{AutostartScriptsJob, is_backup_name, legacy_kde_home};
pub use service::StartServiceJob;
pub use sleep::SleepJob;
pub use window_manager::WindowManagerWaitJob;
