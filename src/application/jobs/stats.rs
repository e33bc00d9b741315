//! Book statistics recomputation.
//!
//! `refresh` requests are coalesced per book: while a recomputation for a
//! book runs, further requests collapse into one pending re-run. A semaphore
//! caps how many books recompute at the same time.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Instant,
};

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    application::{
        jobs::TaskSupervisor,
        repos::{BookStatsRepo, RepoError},
    },
    domain::entities::BookStatsRecord,
    util::lock::mutex_lock,
};

const DEFAULT_WORKER_CAP: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsConfig {
    /// Maximum concurrent recomputations across the process.
    pub worker_cap: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            worker_cap: DEFAULT_WORKER_CAP,
        }
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: HashSet<Uuid>,
    pending: HashSet<Uuid>,
}

/// What a `refresh` call did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDisposition {
    Scheduled,
    Coalesced,
    Rejected,
}

struct Inner {
    repo: Arc<dyn BookStatsRepo>,
    state: Mutex<RefreshState>,
    permits: Semaphore,
}

/// Releases the book's slot if its driver unwinds or is cancelled.
struct FlightGuard<'a> {
    inner: &'a Inner,
    book_id: Uuid,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.release(self.book_id);
        }
    }
}

#[derive(Clone)]
pub struct StatsRecomputer {
    inner: Arc<Inner>,
    supervisor: TaskSupervisor,
}

impl StatsRecomputer {
    pub fn new(
        repo: Arc<dyn BookStatsRepo>,
        supervisor: TaskSupervisor,
        config: &StatsConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                state: Mutex::new(RefreshState::default()),
                permits: Semaphore::new(config.worker_cap.max(1)),
            }),
            supervisor,
        }
    }

    /// Schedules a recomputation for `book_id` and returns immediately.
    pub fn refresh(&self, book_id: Uuid) -> RefreshDisposition {
        if self.supervisor.is_cancelled() {
            return RefreshDisposition::Rejected;
        }

        {
            let mut state = mutex_lock(
                &self.inner.state,
                "application::jobs::stats",
                "refresh",
            );
            if state.in_flight.contains(&book_id) {
                state.pending.insert(book_id);
                counter!("shelfwise_stats_refresh_coalesced_total").increment(1);
                return RefreshDisposition::Coalesced;
            }
            state.in_flight.insert(book_id);
        }

        let inner = self.inner.clone();
        if !self
            .supervisor
            .spawn("stats_refresh", async move { inner.drive(book_id).await })
        {
            self.inner.release(book_id);
            return RefreshDisposition::Rejected;
        }
        RefreshDisposition::Scheduled
    }

    pub fn refresh_many<I>(&self, book_ids: I) -> usize
    where
        I: IntoIterator<Item = Uuid>,
    {
        book_ids
            .into_iter()
            .map(|book_id| self.refresh(book_id))
            .filter(|disposition| *disposition == RefreshDisposition::Scheduled)
            .count()
    }

    /// Recomputes inline, bypassing coalescing. Used by one-off maintenance.
    pub async fn recompute_now(&self, book_id: Uuid) -> Result<BookStatsRecord, RepoError> {
        self.inner.recompute(book_id).await
    }

    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.inner.state, "application::jobs::stats", "in_flight")
            .in_flight
            .len()
    }
}

impl Inner {
    async fn drive(&self, book_id: Uuid) {
        let mut flight = FlightGuard {
            inner: self,
            book_id,
            armed: true,
        };
        loop {
            match self.permits.acquire().await {
                Ok(_permit) => {
                    if let Err(err) = self.recompute(book_id).await {
                        counter!("shelfwise_stats_refresh_failed_total").increment(1);
                        error!(
                            target = "shelfwise::application::jobs::stats",
                            book_id = %book_id,
                            error = %err,
                            "Book stats recomputation failed"
                        );
                    }
                }
                Err(_) => return,
            }

            let rerun = {
                let mut state = mutex_lock(&self.state, "application::jobs::stats", "complete");
                if state.pending.remove(&book_id) {
                    true
                } else {
                    state.in_flight.remove(&book_id);
                    false
                }
            };
            if !rerun {
                flight.armed = false;
                return;
            }
            debug!(
                target = "shelfwise::application::jobs::stats",
                book_id = %book_id,
                "Running coalesced stats refresh"
            );
        }
    }

    async fn recompute(&self, book_id: Uuid) -> Result<BookStatsRecord, RepoError> {
        let started = Instant::now();
        let counts = self.repo.aggregate_counts(book_id).await?;
        let record = self.repo.upsert_stats(book_id, counts).await?;
        counter!("shelfwise_stats_refresh_total").increment(1);
        histogram!("shelfwise_stats_refresh_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(
            target = "shelfwise::application::jobs::stats",
            book_id = %book_id,
            ratings = counts.rating_count,
            reviews = counts.review_count,
            reads = counts.reads_count,
            want_to_read = counts.want_to_read_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Book stats recomputed"
        );
        Ok(record)
    }

    fn release(&self, book_id: Uuid) {
        let mut state = mutex_lock(&self.state, "application::jobs::stats", "release");
        state.in_flight.remove(&book_id);
        state.pending.remove(&book_id);
    }
}
