pub mod autostart;
pub mod bus;
pub mod config;
pub mod errors;
pub mod job;
pub mod launcher;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod tasks;

pub use config::SessionConfig;
pub use pipeline::{Startup, StartupDeps, StartupEvent};
