//! Jobs and their completion signal.
//!
//! A [`Job`] is a unit of asynchronous work with exactly one completion signal.
//! Jobs never block the caller of [`Job::start`]: they register continuations
//! (spawned tasks, bus watches, timers) and fire the [`Completion`] they were
//! handed when the work is done. There is no failure signal; a job either
//! completes once or never does.
//!
//! A [`Phase`] is itself a job: a barrier over child jobs that completes when
//! the last child does.

mod phase;

pub use phase::{Phase, PhaseState};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A unit of asynchronous startup work.
pub trait Job: Send + Sync {
    /// Short name used in logs and events.
    fn name(&self) -> &str;

    /// Start the job. `done` is completed once the work finishes, which may
    /// happen before `start` returns.
    fn start(&self, done: Completion);
}

/// Lifecycle of a job as seen by its owner. Strictly monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot completion handle.
///
/// Cloning shares the same signal. The first call to [`Completion::complete`]
/// runs the registered continuation; every later call is a no-op.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

struct CompletionInner {
    label: String,
    fired: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl Completion {
    /// Create a completion that runs `callback` when fired.
    pub fn new(label: impl Into<String>, callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                label: label.into(),
                fired: AtomicBool::new(false),
                callback: Mutex::new(Some(Box::new(callback))),
            }),
        }
    }

    /// Create a completion nobody waits on, for fire-and-forget side jobs.
    pub fn detached(label: impl Into<String>) -> Self {
        let label = label.into();
        let name = label.clone();
        Self::new(label, move || debug!(job = %name, "Side job finished"))
    }

    /// Fire the completion. Returns `true` if this call fired it.
    pub fn complete(&self) -> bool {
        // Take under the lock, run outside it: the continuation may start
        // other jobs that complete synchronously.
        let callback = lock(&self.inner.callback).take();
        match callback {
            Some(callback) => {
                self.inner.fired.store(true, Ordering::SeqCst);
                callback();
                true
            }
            None => {
                debug!(job = %self.inner.label, "Ignoring repeated completion");
                false
            }
        }
    }

    /// Whether the completion has fired.
    pub fn is_complete(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("label", &self.inner.label)
            .field("fired", &self.is_complete())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
