//! Scheduling seam for deferred work.
//!
//! The session runs on a single cooperative event loop. Work that must not
//! run on the current stack (the factory's `on_closed` notification) and
//! timers are posted through a [`TaskRunner`].

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Posts tasks onto the event loop the session runs on.
///
/// Implementations never run a task from inside `post` or `post_delayed`.
pub trait TaskRunner {
    /// Run `task` on a later turn of the event loop.
    fn post(&self, task: Task);

    /// Run `task` after `delay`, unless the returned handle is cancelled first.
    fn post_delayed(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle for a delayed task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TimerHandle {
    /// Create a live handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running if it has not run yet.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}
