//! Periodic detection of new works by followed authors.
//!
//! Each run compares the upstream work count of every followed author with
//! the stored snapshot. The first observation of an author only records a
//! baseline. Works published between the upstream read and the snapshot
//! write are picked up by the next run.

use std::{sync::Arc, time::Duration};

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        catalog::CatalogService,
        fanout::{NotificationDraft, deliver_batch},
        jobs::TaskSupervisor,
        repos::{AuthorSnapshotsRepo, FollowsRepo, NotificationsRepo},
    },
    domain::{entities::FollowedAuthor, types::NotificationType},
    util::shutdown::ShutdownSignal,
};

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
/// Delays beyond this are clamped so the first deadline stays representable.
const MAX_INITIAL_DELAY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);
const WORKS_LIMIT: u32 = 5;
const MAX_TITLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Rows per notification insert.
    pub chunk_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            interval: DEFAULT_INTERVAL,
            chunk_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub authors: usize,
    pub skipped: usize,
    pub grown: usize,
    pub notifications: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthorOutcome {
    Baseline,
    Unchanged,
    Grew { notified: usize },
}

/// Title, body and metadata of a `new_publication` notification.
pub fn compose_publication_notice(
    author: &FollowedAuthor,
    new_count: i32,
    titles: &[String],
) -> NotificationDraft {
    let shown: Vec<&str> = titles
        .iter()
        .take(usize::try_from(new_count).unwrap_or(0))
        .map(String::as_str)
        .collect();
    let name = author.author_name.as_str();

    let body = match shown.as_slice() {
        [] => format!("{name} published {new_count} new work(s)"),
        [only] => format!("{name} published a new work: {only}"),
        many => format!("{name} published {new_count} new works: {}", many.join(", ")),
    };

    let mut metadata = Map::new();
    metadata.insert("author_key".into(), json!(author.author_key.as_str()));
    metadata.insert("author_name".into(), json!(name));
    metadata.insert("new_count".into(), json!(new_count));
    if !shown.is_empty() {
        metadata.insert("new_titles".into(), json!(shown));
    }

    NotificationDraft::new(
        NotificationType::NewPublication,
        format!("New work by {name}"),
        body,
        Value::Object(metadata),
    )
}

pub struct PublicationPoller {
    catalog: Arc<CatalogService>,
    follows: Arc<dyn FollowsRepo>,
    snapshots: Arc<dyn AuthorSnapshotsRepo>,
    notifications: Arc<dyn NotificationsRepo>,
    config: PollerConfig,
}

impl PublicationPoller {
    pub fn new(
        catalog: Arc<CatalogService>,
        follows: Arc<dyn FollowsRepo>,
        snapshots: Arc<dyn AuthorSnapshotsRepo>,
        notifications: Arc<dyn NotificationsRepo>,
        config: PollerConfig,
    ) -> Self {
        Self {
            catalog,
            follows,
            snapshots,
            notifications,
            config,
        }
    }

    /// Starts the periodic loop under `supervisor`, stopping on its
    /// shutdown signal.
    pub fn start(self: Arc<Self>, supervisor: &TaskSupervisor) -> bool {
        let shutdown = supervisor.shutdown_signal();
        supervisor.spawn("publication_poller", async move { self.run(shutdown).await })
    }

    /// First run after `initial_delay`, then every `interval`. Runs never
    /// overlap; shutdown is observed between runs.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        let mut ticker = interval_at(
            Instant::now() + self.config.initial_delay.min(MAX_INITIAL_DELAY),
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        info!(
            target = "shelfwise::application::jobs::publications",
            "Publication poller stopped"
        );
    }

    pub async fn poll_once(&self) -> PollSummary {
        let authors = match self.follows.followed_authors().await {
            Ok(authors) => authors,
            Err(err) => {
                error!(
                    target = "shelfwise::application::jobs::publications",
                    error = %err,
                    "Failed to list followed authors"
                );
                return PollSummary::default();
            }
        };

        let mut summary = PollSummary {
            authors: authors.len(),
            ..PollSummary::default()
        };

        for author in &authors {
            match self.check_author(author).await {
                Some(AuthorOutcome::Grew { notified }) => {
                    summary.grown += 1;
                    summary.notifications += notified;
                }
                Some(AuthorOutcome::Baseline | AuthorOutcome::Unchanged) => {}
                None => summary.skipped += 1,
            }
        }

        info!(
            target = "shelfwise::application::jobs::publications",
            authors = summary.authors,
            skipped = summary.skipped,
            grown = summary.grown,
            notifications = summary.notifications,
            "Publication poll finished"
        );
        summary
    }

    /// `None` means the author was skipped for this run.
    async fn check_author(&self, author: &FollowedAuthor) -> Option<AuthorOutcome> {
        let key = &author.author_key;

        let works = match self.catalog.author_works(key, WORKS_LIMIT).await {
            Ok((works, _)) => works,
            Err(err) => {
                warn!(
                    target = "shelfwise::application::jobs::publications",
                    author_key = %key,
                    error = %err,
                    "Skipping author: works lookup failed"
                );
                return None;
            }
        };

        let current = i32::try_from(works.size).unwrap_or(i32::MAX);
        let titles: Vec<String> = works
            .entries
            .into_iter()
            .take(MAX_TITLES)
            .map(|entry| entry.title)
            .filter(|title| !title.trim().is_empty())
            .collect();

        let previous = match self.snapshots.find_snapshot(key).await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(
                    target = "shelfwise::application::jobs::publications",
                    author_key = %key,
                    error = %err,
                    "Skipping author: snapshot lookup failed"
                );
                return None;
            }
        };

        if let Err(err) = self
            .snapshots
            .upsert_snapshot(key, current, OffsetDateTime::now_utc())
            .await
        {
            warn!(
                target = "shelfwise::application::jobs::publications",
                author_key = %key,
                error = %err,
                "Skipping author: snapshot write failed"
            );
            return None;
        }

        let stored = match previous {
            None => {
                debug!(
                    target = "shelfwise::application::jobs::publications",
                    author_key = %key,
                    work_count = current,
                    "Recorded first snapshot"
                );
                return Some(AuthorOutcome::Baseline);
            }
            Some(snapshot) => snapshot.work_count,
        };

        if current <= stored {
            return Some(AuthorOutcome::Unchanged);
        }

        let draft = compose_publication_notice(author, current - stored, &titles);
        let followers = match self.follows.author_followers(key).await {
            Ok(followers) => followers,
            Err(err) => {
                error!(
                    target = "shelfwise::application::jobs::publications",
                    author_key = %key,
                    error = %err,
                    "Failed to load author followers"
                );
                return Some(AuthorOutcome::Grew { notified: 0 });
            }
        };

        let batch = followers
            .into_iter()
            .map(|user_id| draft.for_user(user_id))
            .collect();
        let report = deliver_batch(self.notifications.as_ref(), batch, self.config.chunk_size).await;

        info!(
            target = "shelfwise::application::jobs::publications",
            author_key = %key,
            previous = stored,
            current,
            notified = report.created,
            failed = report.failed,
            "Author published new works"
        );
        Some(AuthorOutcome::Grew {
            notified: report.created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::AuthorKey;

    fn author() -> FollowedAuthor {
        FollowedAuthor {
            author_key: AuthorKey::parse("OL1A").unwrap(),
            author_name: "Ursula K. Le Guin".into(),
        }
    }

    #[test]
    fn notice_lists_titles_for_several_new_works() {
        let draft = compose_publication_notice(&author(), 2, &["T3".into(), "T4".into()]);
        assert_eq!(draft.title, "New work by Ursula K. Le Guin");
        assert_eq!(draft.body, "Ursula K. Le Guin published 2 new works: T3, T4");
        assert_eq!(draft.metadata["new_count"], json!(2));
        assert_eq!(draft.metadata["new_titles"], json!(["T3", "T4"]));
        assert_eq!(draft.kind, NotificationType::NewPublication);
    }

    #[test]
    fn notice_uses_singular_form_for_one_title() {
        let draft = compose_publication_notice(&author(), 1, &["T9".into(), "T8".into()]);
        assert_eq!(draft.body, "Ursula K. Le Guin published a new work: T9");
        assert_eq!(draft.metadata["new_titles"], json!(["T9"]));
    }

    #[test]
    fn notice_without_titles_omits_title_list() {
        let draft = compose_publication_notice(&author(), 3, &[]);
        assert_eq!(draft.body, "Ursula K. Le Guin published 3 new work(s)");
        assert!(draft.metadata.get("new_titles").is_none());
        assert_eq!(draft.metadata["author_key"], json!("OL1A"));
    }
}
