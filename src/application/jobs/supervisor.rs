use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::Notify;
use tracing::{Instrument, info, info_span, warn};

use crate::util::shutdown::{self, ShutdownSignal, ShutdownTrigger};

const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// How [`TaskSupervisor::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed,
    Abandoned { remaining: usize },
}

struct Inner {
    trigger: ShutdownTrigger,
    active: AtomicUsize,
    idle: Notify,
}

/// Decrements the active count when a task finishes or unwinds.
struct ActiveGuard(Arc<Inner>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Owns every detached background task. Tasks outlive the request that
/// spawned them but not the process-level shutdown: they get a grace period
/// and are then abandoned.
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
    grace: Duration,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl TaskSupervisor {
    pub fn new(grace: Duration) -> Self {
        let (trigger, _) = shutdown::channel();
        Self {
            inner: Arc::new(Inner {
                trigger,
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
            grace,
        }
    }

    /// Signal observed by periodic loops.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.inner.trigger.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.trigger.is_fired()
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Starts `future` under supervision. Returns `false` once shutdown has
    /// begun, in which case the future is dropped unpolled.
    pub fn spawn<F>(&self, task: &'static str, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_cancelled() {
            warn!(
                target = "shelfwise::application::jobs::supervisor",
                task, "Supervisor is shutting down; task not started"
            );
            return false;
        }

        self.inner.active.fetch_add(1, Ordering::AcqRel);
        let guard = ActiveGuard(self.inner.clone());
        tokio::spawn(
            async move {
                let _guard = guard;
                future.await;
            }
            .instrument(info_span!("background_task", task)),
        );
        true
    }

    /// Waits until every task spawned so far has finished, including tasks
    /// those tasks spawn. New tasks may still be spawned afterwards.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Fires the shutdown signal, then waits up to the grace period.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        self.inner.trigger.fire();

        match tokio::time::timeout(self.grace, self.drain()).await {
            Ok(()) => {
                info!(
                    target = "shelfwise::application::jobs::supervisor",
                    "Background tasks finished"
                );
                ShutdownOutcome::Completed
            }
            Err(_) => {
                let remaining = self.active();
                warn!(
                    target = "shelfwise::application::jobs::supervisor",
                    remaining,
                    grace_ms = self.grace.as_millis() as u64,
                    "Abandoning background tasks after grace period"
                );
                ShutdownOutcome::Abandoned { remaining }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_waits_for_spawned_work() {
        let supervisor = TaskSupervisor::default();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = done.clone();
            supervisor.spawn("count", async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        supervisor.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(supervisor.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_tasks_past_grace() {
        let supervisor = TaskSupervisor::new(Duration::from_secs(1));
        supervisor.spawn("stuck", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let outcome = supervisor.shutdown().await;
        assert_eq!(outcome, ShutdownOutcome::Abandoned { remaining: 1 });
    }

    #[tokio::test]
    async fn shutdown_completes_when_tasks_honour_cancellation() {
        let supervisor = TaskSupervisor::default();
        let mut signal = supervisor.shutdown_signal();
        supervisor.spawn("loop", async move {
            signal.triggered().await;
        });

        assert_eq!(supervisor.shutdown().await, ShutdownOutcome::Completed);
        assert!(supervisor.is_cancelled());
    }

    #[tokio::test]
    async fn nested_spawns_are_drained() {
        let supervisor = TaskSupervisor::default();
        let done = Arc::new(AtomicUsize::new(0));
        let inner = supervisor.clone();
        let counter = done.clone();

        supervisor.spawn("outer", async move {
            inner.spawn("inner", async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        supervisor.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_task_still_counts_as_finished() {
        let supervisor = TaskSupervisor::default();
        supervisor.spawn("panics", async {
            panic!("task failure");
        });

        supervisor.drain().await;
        assert_eq!(supervisor.active(), 0);
    }

    #[tokio::test]
    async fn spawn_after_shutdown_is_refused() {
        let supervisor = TaskSupervisor::default();
        supervisor.shutdown().await;
        assert!(!supervisor.spawn("late", async {}));
        assert_eq!(supervisor.active(), 0);
    }
}
