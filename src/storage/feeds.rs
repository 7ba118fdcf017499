use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{to_millis, DatabaseError, Feed, FeedListing, FeedRow};
use super::FeedStore;

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`. URLs are globally unique.
    pub async fn create_feed(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<Feed, DatabaseError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::conflict_or(e, format!("feed '{}'", url)))?;

        tracing::debug!(feed_id = row.id, url = %url, "Created feed");
        Ok(row.into_feed())
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// All feeds with the name of the user who added them
    pub async fn list_feeds_with_owners(&self) -> Result<Vec<FeedListing>, DatabaseError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT f.name, f.url, u.name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, url, owner_name)| FeedListing {
                name,
                url,
                owner_name,
            })
            .collect())
    }
}

#[async_trait]
impl FeedStore for Database {
    /// Never-fetched feeds come first, then the oldest `last_fetched_at`;
    /// ties are broken by id so selection is deterministic.
    async fn next_feed_to_fetch(&self, owner_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            WHERE user_id = ?
            ORDER BY last_fetched_at IS NOT NULL, last_fetched_at ASC, id ASC
            LIMIT 1
        "#
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    async fn mark_fetched(&self, feed_id: i64, now: DateTime<Utc>) -> Result<Feed, DatabaseError> {
        let now = to_millis(now);
        let row = sqlx::query_as::<_, FeedRow>(&format!(
            r#"
            UPDATE feeds SET last_fetched_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeedRow::into_feed)
            .ok_or_else(|| DatabaseError::NotFound(format!("feed {}", feed_id)))
    }
}
