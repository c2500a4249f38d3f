//! Structured concurrency: a tree of supervising `Task`s where
//! terminating a task cascades to its children, and children are
//! terminated and joined in the order they were registered (never
//! reverse order). Every long-lived subsystem in this crate (the
//! alert driver, the request service, the resume service, the FTP
//! daemon, and the top-level `run()` supervisor in `lib.rs`) embeds a
//! `Task` rather than managing shutdown ad hoc.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Raised when a task meant to run until explicitly terminated returns
/// on its own instead — a programming error in the subsystem, not a
/// condition callers are expected to handle.
#[derive(Debug, thiserror::Error)]
#[error("task '{0}' exited before being terminated")]
pub struct PrematureTermination(pub String);

/// Anything a parent `Task` can terminate and then join: a nested
/// `Task`, or a thin wrapper around a subsystem's own worker thread.
pub trait Terminable: Send + Sync {
    /// Request termination. Must be idempotent and non-blocking.
    fn terminate(&self);
    /// Block until the terminated thing has actually stopped.
    fn join(&self);
}

/// One node in the supervision tree. A subsystem owns a `Task`,
/// registers its own worker threads as children via `add_child`, and
/// exposes `terminate`/`join` (often directly, sometimes behind a
/// subsystem-specific name like `abort`/`wait`) by delegating to it.
pub struct Task {
    name: String,
    terminated: AtomicBool,
    done: AtomicBool,
    children: Mutex<Vec<Box<dyn Terminable>>>,
    done_callbacks: Mutex<Vec<Box<dyn FnOnce(bool) + Send>>>,
    terminate_parent_on_child_failure: bool,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terminated: AtomicBool::new(false),
            done: AtomicBool::new(false),
            children: Mutex::new(Vec::new()),
            done_callbacks: Mutex::new(Vec::new()),
            terminate_parent_on_child_failure: true,
        }
    }

    /// A task whose failure does not terminate its parent (used for
    /// best-effort children where the parent should keep running).
    pub fn new_non_fatal(name: impl Into<String>) -> Self {
        Self {
            terminate_parent_on_child_failure: false,
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn terminates_parent_on_failure(&self) -> bool {
        self.terminate_parent_on_child_failure
    }

    /// Register `child` as a dependent. `terminate`/`join` walk
    /// children in this same order, so subsystems that must stop
    /// serving before others shut down should be added first.
    pub fn add_child(&self, child: Box<dyn Terminable>) {
        self.children.lock().unwrap().push(child);
    }

    /// Register a one-shot callback for when this task finishes,
    /// receiving whether it finished successfully. If the task has
    /// already finished, the callback fires immediately instead of
    /// being queued.
    pub fn on_done(&self, callback: Box<dyn FnOnce(bool) + Send>) {
        if self.done.load(Ordering::SeqCst) {
            // Already done; nothing further to read under the lock,
            // so the success value defaults to true (terminate() is
            // the only path that can mark failure explicitly, see
            // `mark_done`).
            callback(true);
            return;
        }
        self.done_callbacks.lock().unwrap().push(callback);
    }

    /// Mark this task's own work finished (distinct from its
    /// children's), firing every registered done-callback exactly
    /// once, in registration order.
    pub fn mark_done(&self, success: bool) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.done_callbacks.lock().unwrap());
        for cb in callbacks {
            cb(success);
        }
    }

    /// Terminate this task and cascade, in registration order, to
    /// every child. Idempotent.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        for child in self.children.lock().unwrap().iter() {
            child.terminate();
        }
    }

    /// Join every child, in registration order. Does not itself
    /// terminate anything; call `terminate` first.
    pub fn join(&self) {
        for child in self.children.lock().unwrap().iter() {
            child.join();
        }
    }

    /// Call from the end of a subsystem's run loop: logs a
    /// [`PrematureTermination`] warning if the loop exited without
    /// having been asked to terminate.
    pub fn guard_against_premature_exit(&self) {
        if !self.is_terminated() {
            tracing::warn!(task = %self.name, "{}", PrematureTermination(self.name.clone()));
        }
    }
}

/// Wraps a `std::thread::JoinHandle` as a `Terminable`, for the common
/// case of a subsystem's worker thread whose loop polls `should_stop`.
pub struct ThreadHandle {
    should_stop: std::sync::Arc<AtomicBool>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ThreadHandle {
    pub fn new(should_stop: std::sync::Arc<AtomicBool>, handle: std::thread::JoinHandle<()>) -> Self {
        Self {
            should_stop,
            handle: Mutex::new(Some(handle)),
        }
    }
}

impl Terminable for ThreadHandle {
    fn terminate(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    fn join(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
