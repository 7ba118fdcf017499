//! SQLite-backed persistence for users, feeds, follows and posts.
//!
//! The poll scheduler only sees the store through [`FeedStore`] and
//! [`PostStore`]; everything else on [`Database`] serves the command layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod feeds;
mod follows;
mod posts;
mod schema;
mod types;
mod users;

pub use schema::Database;
pub use types::{DatabaseError, Feed, FeedFollow, FeedListing, NewPost, Post, User};

/// Feed selection for the poll scheduler.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The owner's feed with a null or the earliest `last_fetched_at`.
    ///
    /// Returns `None` when the owner has no feeds.
    async fn next_feed_to_fetch(&self, owner_id: i64) -> Result<Option<Feed>, DatabaseError>;

    /// Set `last_fetched_at` to `now` and return the updated feed.
    async fn mark_fetched(&self, feed_id: i64, now: DateTime<Utc>) -> Result<Feed, DatabaseError>;
}

/// Deduplicated post persistence for the ingestion pipeline.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert unless a post with the same URL exists.
    ///
    /// The flag is `true` when a new row was created; on `false` the
    /// returned post is the one already stored.
    async fn insert_post_if_absent(&self, post: &NewPost) -> Result<(Post, bool), DatabaseError>;
}
