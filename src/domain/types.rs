//! Closed enumerations persisted as text columns.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Notification kinds. Every variant except [`NotificationType::ImportFinished`]
/// has a boolean column of the same name in `notification_preferences`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewFollower,
    FollowRequest,
    FollowAccepted,
    BookNewThread,
    BookNewReview,
    ThreadReply,
    NewPublication,
    ImportFinished,
}

impl NotificationType {
    pub const ALL: [NotificationType; 8] = [
        NotificationType::NewFollower,
        NotificationType::FollowRequest,
        NotificationType::FollowAccepted,
        NotificationType::BookNewThread,
        NotificationType::BookNewReview,
        NotificationType::ThreadReply,
        NotificationType::NewPublication,
        NotificationType::ImportFinished,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::NewFollower => "new_follower",
            NotificationType::FollowRequest => "follow_request",
            NotificationType::FollowAccepted => "follow_accepted",
            NotificationType::BookNewThread => "book_new_thread",
            NotificationType::BookNewReview => "book_new_review",
            NotificationType::ThreadReply => "thread_reply",
            NotificationType::NewPublication => "new_publication",
            NotificationType::ImportFinished => "import_finished",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("notification type", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ShelvedBook,
    RatedBook,
    ReviewedBook,
    StartedThread,
    RepliedThread,
    FollowedUser,
    FollowedAuthor,
    FollowedBook,
    CreatedCollection,
    ImportedLibrary,
}

impl ActivityType {
    pub const ALL: [ActivityType; 10] = [
        ActivityType::ShelvedBook,
        ActivityType::RatedBook,
        ActivityType::ReviewedBook,
        ActivityType::StartedThread,
        ActivityType::RepliedThread,
        ActivityType::FollowedUser,
        ActivityType::FollowedAuthor,
        ActivityType::FollowedBook,
        ActivityType::CreatedCollection,
        ActivityType::ImportedLibrary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::ShelvedBook => "shelved_book",
            ActivityType::RatedBook => "rated_book",
            ActivityType::ReviewedBook => "reviewed_book",
            ActivityType::StartedThread => "started_thread",
            ActivityType::RepliedThread => "replied_thread",
            ActivityType::FollowedUser => "followed_user",
            ActivityType::FollowedAuthor => "followed_author",
            ActivityType::FollowedBook => "followed_book",
            ActivityType::CreatedCollection => "created_collection",
            ActivityType::ImportedLibrary => "imported_library",
        }
    }
}

impl FromStr for ActivityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("activity type", s))
    }
}

/// Reading-state labels a user attaches to a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusTag {
    Finished,
    WantToRead,
    CurrentlyReading,
    Dnf,
    Owned,
}

impl StatusTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusTag::Finished => "finished",
            StatusTag::WantToRead => "want-to-read",
            StatusTag::CurrentlyReading => "currently-reading",
            StatusTag::Dnf => "dnf",
            StatusTag::Owned => "owned",
        }
    }
}

/// State of a user-to-user follow edge. Private profiles start `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowStatus {
    Active,
    Pending,
}

impl FollowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FollowStatus::Active => "active",
            FollowStatus::Pending => "pending",
        }
    }
}

impl FromStr for FollowStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(FollowStatus::Active),
            "pending" => Ok(FollowStatus::Pending),
            other => Err(DomainError::unknown_variant("follow status", other)),
        }
    }
}
