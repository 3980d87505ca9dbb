//! Session bus boundary.
//!
//! The orchestrator only needs four things from the bus: fire a method call
//! and learn when it finished, learn when a service name gets registered,
//! subscribe to a signal, and find out whether compositing is currently active.
//!
//! Two implementations ship with the crate:
//! - [`GdbusBus`] drives the `gdbus` command line tool
//! - [`MemoryBus`] is an in-process bus for tests and embedding

mod gdbus;
mod memory;

pub use gdbus::GdbusBus;
pub use memory::{CallReply, MemoryBus};

use crate::errors::BusError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Well-known service names and object paths.
pub mod names {
    pub const SESSION_MANAGER: &str = "org.kde.ksmserver";
    pub const WINDOW_MANAGER: &str = "org.kde.KWin";
    pub const SPLASH: &str = "org.kde.KSplash";
    pub const KCMINIT: &str = "org.kde.kcminit";
    pub const KDED: &str = "org.kde.kded5";

    pub const COMPOSITOR_PATH: &str = "/Compositor";
    pub const COMPOSITING_INTERFACE: &str = "org.kde.kwin.Compositing";
}

/// Default reply timeout for calls that do not set one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(25);

/// A method call on the session bus. Arguments are strings; nothing the
/// orchestrator calls needs anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl MethodCall {
    pub fn new(service: &str, path: &str, interface: &str, member: &str) -> Self {
        Self {
            service: service.to_string(),
            path: path.to_string(),
            interface: interface.to_string(),
            member: member.to_string(),
            args: Vec::new(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `interface.member`, as used in logs and by `gdbus`.
    pub fn method(&self) -> String {
        format!("{}.{}", self.interface, self.member)
    }
}

/// Which signal to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMatch {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub member: String,
}

impl SignalMatch {
    pub fn new(service: &str, path: &str, interface: &str, member: &str) -> Self {
        Self {
            service: service.to_string(),
            path: path.to_string(),
            interface: interface.to_string(),
            member: member.to_string(),
        }
    }

    /// KWin's `compositingToggled(bool)`.
    pub fn compositing_toggled() -> Self {
        Self::new(
            names::WINDOW_MANAGER,
            names::COMPOSITOR_PATH,
            names::COMPOSITING_INTERFACE,
            "compositingToggled",
        )
    }
}

/// A received signal with its arguments rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    pub member: String,
    pub args: Vec<String>,
}

impl SignalMessage {
    /// The first argument read as a boolean.
    pub fn first_bool(&self) -> Option<bool> {
        match self.args.first().map(String::as_str) {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }
}

pub type SignalReceiver = mpsc::UnboundedReceiver<SignalMessage>;

/// The session message bus as seen by the orchestrator.
#[async_trait]
pub trait SessionBus: Send + Sync {
    /// Issue a method call and resolve when the reply (or an error) arrives.
    /// Implementations honour `call.timeout` where they can; callers also
    /// bound the wait themselves.
    async fn call(&self, call: &MethodCall) -> Result<(), BusError>;

    /// Resolve once `service` is registered on the bus. A service that is
    /// already registered resolves immediately.
    async fn wait_for_service(&self, service: &str) -> Result<(), BusError>;

    /// Subscribe to a signal. The stream ends when the bus side goes away.
    async fn subscribe(&self, signal: &SignalMatch) -> Result<SignalReceiver, BusError>;

    /// Whether a compositor is active, when that is known without asking
    /// anyone. `None` means only [`SessionBus::compositing_active`] can tell.
    fn compositing_known(&self) -> Option<bool> {
        None
    }

    /// Ask whether a compositor is active right now.
    async fn compositing_active(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_builder() {
        let call = MethodCall::new(names::SPLASH, "/KSplash", "org.kde.KSplash", "setStage")
            .with_arg("ready")
            .with_timeout(Duration::from_secs(1));

        assert_eq!(call.method(), "org.kde.KSplash.setStage");
        assert_eq!(call.args, vec!["ready"]);
        assert_eq!(call.timeout, Duration::from_secs(1));
    }

    #[test]
    fn method_call_default_timeout() {
        let call = MethodCall::new(names::KDED, "/kded", "org.kde.kded5", "loadSecondPhase");
        assert_eq!(call.timeout, DEFAULT_CALL_TIMEOUT);
    }

    #[test]
    fn signal_first_bool() {
        let msg = |args: &[&str]| SignalMessage {
            member: "compositingToggled".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        assert_eq!(msg(&["true"]).first_bool(), Some(true));
        assert_eq!(msg(&["false"]).first_bool(), Some(false));
        assert_eq!(msg(&["1"]).first_bool(), None);
        assert_eq!(msg(&[]).first_bool(), None);
    }
}
