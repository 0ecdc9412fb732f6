//! Explicit and implicit opening of units, and their closing.
//!
//! A unit opened by key traffic alone is closed again once it has been idle
//! for the configured interval, unless something opened it explicitly in
//! the meantime. Closing is done by a job on the [`ModelTaskQueue`], which
//! checks the explicit-open set once more right before closing.
//!
//! ```text
//! unit_opened ──(not explicit)──> timer armed ──fires──> close job queued
//!      │                               │                      │
//!      └─ on_explicit_open ────────────┴── cancels ───────────┴── job re-checks, no-op
//! ```
//!
//! Repository errors are tallied per unit. The next close of a unit with a
//! non-zero tally wipes its persisted state whatever the caller asked for,
//! and resets the tally.

use crate::config::LifecycleConfig;
use crate::error::{KeyRepoError, Result};
use crate::repository::{Repository, RepositoryExceptionListener, RepositoryListener};
use crate::task_queue::ModelTaskQueue;
use crate::unit::UnitId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

struct ArmedTimer {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Default)]
struct Tracking {
    explicit: HashSet<UnitId>,
    timers: HashMap<UnitId, ArmedTimer>,
    next_generation: u64,
}

impl Tracking {
    fn cancel_timer(&mut self, unit: UnitId) -> bool {
        match self.timers.remove(&unit) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Tracks which units are held open and closes idle ones.
pub struct UnitLifecycleManager {
    repository: Arc<dyn Repository>,
    queue: ModelTaskQueue,
    runtime: Handle,
    interval: Duration,
    implicit_close: bool,
    tracking: Mutex<Tracking>,
    errors: Mutex<HashMap<UnitId, u32>>,
    this: Weak<UnitLifecycleManager>,
}

impl UnitLifecycleManager {
    /// Creates a manager for `repository` and registers it as the
    /// repository's listener. Timers and close jobs run on `runtime`.
    pub fn new(
        repository: Arc<dyn Repository>,
        config: &LifecycleConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        let manager = Arc::new_cyclic(|this| Self {
            repository: repository.clone(),
            queue: ModelTaskQueue::spawn(&runtime),
            runtime,
            interval: config.implicit_close_interval(),
            implicit_close: config.implicit_close_enabled,
            tracking: Mutex::new(Tracking::default()),
            errors: Mutex::new(HashMap::new()),
            this: this.clone(),
        });
        let weak = Arc::downgrade(&manager);
        repository.register_listener(weak);
        manager
    }

    /// Idle interval before an implicitly opened unit is closed.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Marks `unit` explicitly open and cancels its pending close.
    pub fn on_explicit_open(&self, unit: UnitId) {
        let mut tracking = self.tracking.lock();
        if tracking.cancel_timer(unit) {
            debug!(unit = %unit, "implicit close cancelled by explicit open");
        }
        tracking.explicit.insert(unit);
    }

    /// Drops `unit` from the explicitly open set and cancels its timer.
    pub fn on_explicit_close(&self, unit: UnitId) {
        let mut tracking = self.tracking.lock();
        tracking.cancel_timer(unit);
        tracking.explicit.remove(&unit);
    }

    /// Whether `unit` is held open explicitly.
    pub fn is_explicitly_open(&self, unit: UnitId) -> bool {
        self.tracking.lock().explicit.contains(&unit)
    }

    /// Whether an implicit close timer is armed for `unit`.
    pub fn has_pending_close(&self, unit: UnitId) -> bool {
        self.tracking.lock().timers.contains_key(&unit)
    }

    fn arm_timer(&self, unit: UnitId) {
        let mut tracking = self.tracking.lock();
        if tracking.explicit.contains(&unit) {
            return;
        }
        tracking.cancel_timer(unit);
        tracking.next_generation += 1;
        let generation = tracking.next_generation;
        let manager = self.this.clone();
        let interval = self.interval;
        let deadline = tokio::time::Instant::now() + interval;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(manager) = manager.upgrade() {
                manager.timer_fired(unit, generation);
            }
        });
        tracking.timers.insert(
            unit,
            ArmedTimer {
                generation,
                handle: task.abort_handle(),
            },
        );
        trace!(unit = %unit, ?interval, "implicit close timer armed");
    }

    fn timer_fired(&self, unit: UnitId, generation: u64) {
        {
            let mut tracking = self.tracking.lock();
            match tracking.timers.get(&unit) {
                Some(timer) if timer.generation == generation => {
                    tracking.timers.remove(&unit);
                }
                _ => return,
            }
        }
        self.timeout_elapsed(unit);
    }

    /// Idle interval of `unit` is over: queue its close unless it is
    /// explicitly open.
    pub fn timeout_elapsed(&self, unit: UnitId) {
        if self.is_explicitly_open(unit) {
            trace!(unit = %unit, "unit explicitly open, skipping implicit close");
            return;
        }
        let manager = self.this.clone();
        let queued = self.queue.submit(move || {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if manager.is_explicitly_open(unit) {
                trace!(unit = %unit, "implicit close lost to explicit open");
                return;
            }
            debug!(unit = %unit, "closing idle unit");
            if let Err(e) = manager.close_unit(unit, false, &[]) {
                warn!(unit = %unit, error = %e, "implicit close failed");
            }
        });
        if !queued {
            trace!(unit = %unit, "task queue shut down, implicit close dropped");
        }
    }

    /// Repository errors reported for `unit` since its last close.
    pub fn repository_error_count(&self, unit: UnitId) -> u32 {
        self.errors.lock().get(&unit).copied().unwrap_or(0)
    }

    /// Closes `unit`. Any repository error reported since the last close
    /// turns the close into a wipe.
    pub fn close_unit(&self, unit: UnitId, wipe: bool, required_units: &[UnitId]) -> Result<()> {
        let errors = self.errors.lock().remove(&unit).unwrap_or(0);
        if errors > 0 && !wipe {
            warn!(unit = %unit, errors, "unit had repository errors, wiping on close");
        }
        self.repository
            .close_unit(unit, wipe || errors > 0, required_units)
    }

    /// Wipes `unit` and opens it again, keeping its explicit-open status.
    pub fn reopen_unit(&self, unit: UnitId) -> Result<()> {
        let was_explicit = self.is_explicitly_open(unit);
        self.close_unit(unit, true, &[])?;
        if was_explicit {
            self.on_explicit_open(unit);
        }
        self.repository.open_unit(unit)
    }

    /// Waits until every queued close job has run.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    /// Cancels every armed timer.
    pub fn shutdown(&self) {
        let mut tracking = self.tracking.lock();
        for (_, timer) in tracking.timers.drain() {
            timer.handle.abort();
        }
    }
}

impl RepositoryExceptionListener for UnitLifecycleManager {
    fn an_exception_happened(&self, unit: UnitId, error: &KeyRepoError) {
        if error.is_intentional() {
            trace!(unit = %unit, "ignoring intentional error");
            return;
        }
        let mut errors = self.errors.lock();
        let count = errors.entry(unit).or_insert(0);
        *count += 1;
        warn!(unit = %unit, count = *count, error = %error, "repository error");
    }
}

impl RepositoryListener for UnitLifecycleManager {
    fn unit_opened(&self, unit: UnitId) {
        if self.implicit_close {
            self.arm_timer(unit);
        }
    }

    fn unit_closed(&self, unit: UnitId) {
        self.on_explicit_close(unit);
    }
}

impl Drop for UnitLifecycleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
