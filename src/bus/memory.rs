//! In-process session bus.
//!
//! Services are just names in a set, signals are pushed by whoever holds the
//! bus, and method calls are recorded and answered from a reply table.

use super::{MethodCall, SessionBus, SignalMatch, SignalMessage, SignalReceiver};
use crate::errors::BusError;
use crate::job::lock;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

/// How the bus answers calls to a given method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallReply {
    #[default]
    Ok,
    Error(String),
    /// Never answer; the caller's timeout has to kick in.
    Never,
}

#[derive(Default)]
struct State {
    services: HashSet<String>,
    waiters: HashMap<String, Vec<oneshot::Sender<()>>>,
    subscribers: Vec<(SignalMatch, mpsc::UnboundedSender<SignalMessage>)>,
    replies: HashMap<String, CallReply>,
    calls: Vec<MethodCall>,
    compositing: bool,
}

#[derive(Default)]
pub struct MemoryBus {
    state: Mutex<State>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service name, waking everyone waiting for it.
    pub fn register_service(&self, service: &str) {
        let waiters = {
            let mut state = lock(&self.state);
            state.services.insert(service.to_string());
            state.waiters.remove(service).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    pub fn unregister_service(&self, service: &str) {
        lock(&self.state).services.remove(service);
    }

    pub fn is_registered(&self, service: &str) -> bool {
        lock(&self.state).services.contains(service)
    }

    /// Deliver a signal to matching subscribers. Returns how many got it.
    pub fn emit_signal(&self, signal: &SignalMatch, args: &[&str]) -> usize {
        let message = SignalMessage {
            member: signal.member.clone(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        let mut state = lock(&self.state);
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state
            .subscribers
            .iter()
            .filter(|(wanted, _)| wanted == signal)
            .filter(|(_, tx)| tx.send(message.clone()).is_ok())
            .count()
    }

    pub fn set_compositing_active(&self, active: bool) {
        lock(&self.state).compositing = active;
    }

    /// Set how calls to `method` (`interface.member`) are answered.
    pub fn set_reply(&self, method: &str, reply: CallReply) {
        lock(&self.state).replies.insert(method.to_string(), reply);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MethodCall> {
        lock(&self.state).calls.clone()
    }

    /// Calls received for `method` (`interface.member`).
    pub fn calls_to(&self, method: &str) -> Vec<MethodCall> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.method() == method)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionBus for MemoryBus {
    async fn call(&self, call: &MethodCall) -> Result<(), BusError> {
        let reply = {
            let mut state = lock(&self.state);
            state.calls.push(call.clone());
            state.replies.get(&call.method()).cloned().unwrap_or_default()
        };
        match reply {
            CallReply::Ok => Ok(()),
            CallReply::Error(message) => Err(BusError::CallFailed {
                method: call.method(),
                message,
            }),
            CallReply::Never => std::future::pending().await,
        }
    }

    async fn wait_for_service(&self, service: &str) -> Result<(), BusError> {
        let registered = {
            let mut state = lock(&self.state);
            if state.services.contains(service) {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            state
                .waiters
                .entry(service.to_string())
                .or_default()
                .push(tx);
            rx
        };
        registered.await.map_err(|_| BusError::Closed)
    }

    async fn subscribe(&self, signal: &SignalMatch) -> Result<SignalReceiver, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).subscribers.push((signal.clone(), tx));
        Ok(rx)
    }

    fn compositing_known(&self) -> Option<bool> {
        Some(lock(&self.state).compositing)
    }

    async fn compositing_active(&self) -> bool {
        lock(&self.state).compositing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::names;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_on_registration() {
        let bus = std::sync::Arc::new(MemoryBus::new());
        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.wait_for_service(names::WINDOW_MANAGER).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        bus.register_service(names::WINDOW_MANAGER);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_for_registered_service_is_immediate() {
        let bus = MemoryBus::new();
        bus.register_service(names::SESSION_MANAGER);
        bus.wait_for_service(names::SESSION_MANAGER).await.unwrap();
    }

    #[tokio::test]
    async fn signals_reach_matching_subscribers_only() {
        let bus = MemoryBus::new();
        let toggled = SignalMatch::compositing_toggled();
        let other = SignalMatch::new(names::SPLASH, "/KSplash", "org.kde.KSplash", "stageChanged");
        let mut rx = bus.subscribe(&toggled).await.unwrap();

        assert_eq!(bus.emit_signal(&other, &["x"]), 0);
        assert_eq!(bus.emit_signal(&toggled, &["true"]), 1);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.first_bool(), Some(true));
    }

    #[tokio::test]
    async fn calls_are_recorded_and_answered() {
        let bus = MemoryBus::new();
        bus.set_reply("org.kde.kded5.loadSecondPhase", CallReply::Error("boom".into()));

        let ok = MethodCall::new(names::SPLASH, "/KSplash", "org.kde.KSplash", "setStage")
            .with_arg("ready");
        let failing = MethodCall::new(names::KDED, "/kded", "org.kde.kded5", "loadSecondPhase");

        bus.call(&ok).await.unwrap();
        let err = bus.call(&failing).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        assert_eq!(bus.calls().len(), 2);
        assert_eq!(bus.calls_to("org.kde.KSplash.setStage")[0].args, vec!["ready"]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_reply_hangs() {
        let bus = MemoryBus::new();
        bus.set_reply("org.kde.KSMServerInterface.restoreSession", CallReply::Never);
        let call = MethodCall::new(
            names::SESSION_MANAGER,
            "/KSMServer",
            "org.kde.KSMServerInterface",
            "restoreSession",
        );

        let result = tokio::time::timeout(Duration::from_secs(60), bus.call(&call)).await;
        assert!(result.is_err());
    }
}
