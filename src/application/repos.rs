//! Collaborator traits describing the search index, persistence adapters and access control.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::featured::{FeaturedOverride, SearchHit};
use crate::domain::feed::FeedArticle;
use crate::domain::flags::FlagTarget;
use crate::domain::subjects::SubjectCounts;
use crate::domain::types::{AuthId, Permission};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Failure talking to the search index.
///
/// Cloneable so one failed computation can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search transport error: {0}")]
    Transport(String),
    #[error("search index answered with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected search response: {0}")]
    Decode(String),
}

/// Read-only view of the full-text search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Every subject path assigned to an article of the journal. `None` spans all journals.
    async fn all_subjects(&self, journal: Option<&str>) -> Result<Vec<String>, SearchError>;

    async fn all_subject_counts(&self, journal: Option<&str>)
    -> Result<SubjectCounts, SearchError>;

    /// Most shared article of the last seven days.
    async fn most_shared(
        &self,
        journal: &str,
        category: &str,
    ) -> Result<Option<SearchHit>, SearchError>;

    /// Most viewed article of the last seven days.
    async fn most_viewed_recent(
        &self,
        journal: &str,
        category: &str,
    ) -> Result<Option<SearchHit>, SearchError>;

    async fn most_viewed_all_time(
        &self,
        journal: &str,
        category: &str,
    ) -> Result<Option<SearchHit>, SearchError>;
}

#[derive(Debug, Clone)]
pub struct CreateFeaturedParams {
    pub journal_key: String,
    pub category: String,
    pub doi: String,
}

#[async_trait]
pub trait FeaturedArticlesRepo: Send + Sync {
    /// Manual override for the category, matched case-insensitively.
    async fn find_override(
        &self,
        journal_key: &str,
        category: &str,
    ) -> Result<Option<FeaturedOverride>, RepoError>;

    async fn list_overrides(&self, journal_key: &str) -> Result<Vec<FeaturedOverride>, RepoError>;

    /// Resolves journal key and DOI and inserts the override. Returns the rows written.
    async fn create_override(&self, params: CreateFeaturedParams) -> Result<u64, RepoError>;

    /// Removes overrides matching the category case-insensitively. Returns the rows removed.
    async fn delete_overrides(&self, journal_key: &str, category: &str) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait FlagsRepo: Send + Sync {
    /// Inserts or refreshes the flag owned by the profile behind `auth_id`.
    async fn upsert_user_flag(&self, target: FlagTarget, auth_id: &AuthId)
    -> Result<u64, RepoError>;

    async fn insert_anonymous_flag(&self, target: FlagTarget) -> Result<u64, RepoError>;

    async fn delete_user_flag(&self, target: FlagTarget, auth_id: &AuthId)
    -> Result<u64, RepoError>;

    /// Removes at most one anonymous flag for the target. Which one is unspecified.
    async fn delete_one_anonymous_flag(&self, target: FlagTarget) -> Result<u64, RepoError>;
}

/// Article query behind a feed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedQuery {
    pub journal: Option<String>,
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub limit: u32,
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    /// Active articles matching the query, oldest first.
    async fn list_feed_articles(&self, query: &FeedQuery) -> Result<Vec<FeedArticle>, RepoError>;
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("permission `{permission}` denied: {reason}")]
    Denied {
        permission: Permission,
        reason: String,
    },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Succeeds only when `auth_id` resolves to a profile holding `permission`.
    async fn check_permission(
        &self,
        permission: Permission,
        auth_id: Option<&AuthId>,
    ) -> Result<(), PermissionError>;
}
