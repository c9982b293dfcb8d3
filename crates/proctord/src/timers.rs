//! Cancellable periodic tasks

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

/// Shortest period a task may run at. Shorter periods, zero included, are
/// raised to this.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// A spawned task that runs `f` once per period.
///
/// The first run happens one full period after spawning. The task ends when
/// `f` returns `false`, when [`cancel`](Self::cancel) is called, or when the
/// handle is dropped.
pub struct PeriodicTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let period = if period < MIN_PERIOD {
            warn!(
                task = name,
                period_ms = period.as_millis() as u64,
                "Period below minimum, using {}s",
                MIN_PERIOD.as_secs()
            );
            MIN_PERIOD
        } else {
            period
        };

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !f().await {
                    debug!(task = name, "Periodic task finished");
                    break;
                }
            }
        });

        debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");

        Self {
            name,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Abort the task. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(task = self.name, "Periodic task cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Every periodic task belonging to one session
#[derive(Default)]
pub struct SessionTimers {
    tasks: Vec<PeriodicTask>,
}

impl SessionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: PeriodicTask) {
        self.tasks.push(task);
    }

    /// Cancel every task at once. Safe to call repeatedly.
    pub fn cancel_all(&mut self) {
        for mut task in self.tasks.drain(..) {
            task.cancel();
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_active()).count()
    }
}
