//! Autostart registry boundary.
//!
//! The orchestrator pulls service identifiers per phase until the registry
//! runs dry, then marks the phase done. How the list gets populated is not its
//! concern; [`AutoStartList`] is the simple table-backed implementation used
//! by the binary.

use crate::job::lock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

/// Ordered, phase-partitioned list of services to start.
pub trait AutoStartSource: Send + Sync {
    /// Next service for `phase`. `None` or an empty identifier means the phase
    /// has nothing left.
    fn next_service(&self, phase: u32) -> Option<String>;

    /// Record that `phase` has been fully started. Idempotent.
    fn mark_phase_done(&self, phase: u32);

    fn phase_done(&self, phase: u32) -> bool;
}

/// Turns a service identifier into a command line.
pub trait ExecResolver: Send + Sync {
    /// The argv for `service`; empty when it cannot be resolved.
    fn resolve(&self, service: &str) -> Vec<String>;
}

/// One `[[autostart]]` entry from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoStartEntry {
    pub name: String,
    #[serde(default)]
    pub phase: u32,
    #[serde(default)]
    pub exec: Vec<String>,
}

#[derive(Debug, Default)]
struct Queues {
    pending: BTreeMap<u32, VecDeque<String>>,
    done: BTreeSet<u32>,
}

/// Table-backed registry and resolver.
#[derive(Debug, Default)]
pub struct AutoStartList {
    queues: Mutex<Queues>,
    commands: HashMap<String, Vec<String>>,
}

impl AutoStartList {
    pub fn from_entries(entries: &[AutoStartEntry]) -> Self {
        let mut queues = Queues::default();
        let mut commands = HashMap::new();
        for entry in entries {
            queues
                .pending
                .entry(entry.phase)
                .or_default()
                .push_back(entry.name.clone());
            commands.insert(entry.name.clone(), entry.exec.clone());
        }
        Self {
            queues: Mutex::new(queues),
            commands,
        }
    }

    /// Services not yet handed out for `phase`.
    pub fn remaining(&self, phase: u32) -> usize {
        lock(&self.queues)
            .pending
            .get(&phase)
            .map_or(0, VecDeque::len)
    }
}

impl AutoStartSource for AutoStartList {
    fn next_service(&self, phase: u32) -> Option<String> {
        lock(&self.queues).pending.get_mut(&phase)?.pop_front()
    }

    fn mark_phase_done(&self, phase: u32) {
        lock(&self.queues).done.insert(phase);
    }

    fn phase_done(&self, phase: u32) -> bool {
        lock(&self.queues).done.contains(&phase)
    }
}

impl ExecResolver for AutoStartList {
    fn resolve(&self, service: &str) -> Vec<String> {
        self.commands.get(service).cloned().unwrap_or_default()
    }
}
