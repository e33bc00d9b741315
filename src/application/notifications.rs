//! Read-side of notifications: listing and read-state transitions.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::{
    application::{
        error::CatalogError,
        repos::{NotificationsRepo, RepoError},
    },
    domain::entities::NotificationRecord,
};

const MAX_PAGE: u32 = 100;

pub struct NotificationInbox {
    repo: Arc<dyn NotificationsRepo>,
}

impl NotificationInbox {
    pub fn new(repo: Arc<dyn NotificationsRepo>) -> Self {
        Self { repo }
    }

    pub async fn list_recent(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        self.repo.list_recent(user_id, limit.clamp(1, MAX_PAGE)).await
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64, RepoError> {
        self.repo.unread_count(user_id).await
    }

    /// Marks one notification read. Notifications of other users are
    /// reported as missing.
    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<(), CatalogError> {
        if self.repo.mark_read(user_id, id).await? {
            Ok(())
        } else {
            Err(CatalogError::not_found("notification", id.to_string()))
        }
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let updated = self.repo.mark_all_read(user_id).await?;
        debug!(
            target = "shelfwise::application::notifications",
            user_id = %user_id,
            updated,
            "Marked notifications read"
        );
        Ok(updated)
    }
}
