use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The database is locked by another gator process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A row the caller asked for does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint rejected the write
    #[error("{0} already exists")]
    Conflict(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// Map a unique-constraint violation to [`DatabaseError::Conflict`].
    ///
    /// Uses the driver's typed constraint classification rather than the
    /// error message, so it is stable across SQLite versions.
    pub(crate) fn conflict_or(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::Conflict(what.into())
            }
            _ => DatabaseError::Other(err),
        }
    }
}

// ============================================================================
// Time Helpers
// ============================================================================

/// Timestamps are persisted as integer Unix milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            last_fetched_at: self.last_fetched_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedFollowRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub feed_name: String,
    pub user_name: String,
    pub created_at: i64,
}

impl FeedFollowRow {
    pub(crate) fn into_follow(self) -> FeedFollow {
        FeedFollow {
            id: self.id,
            user_id: self.user_id,
            feed_id: self.feed_id,
            feed_name: self.feed_name,
            user_name: self.user_name,
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: i64,
    pub created_at: i64,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: from_millis(self.published_at),
            created_at: from_millis(self.created_at),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered syndication source.
///
/// `last_fetched_at` is `None` until the scheduler first selects the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feed with its owner's name, for listings
#[derive(Debug, Clone)]
pub struct FeedListing {
    pub name: String,
    pub url: String,
    pub owner_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub feed_name: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
}

/// A stored feed entry. `url` is unique across all posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A post ready for insertion, produced by the ingestion pipeline
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
}
