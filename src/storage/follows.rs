use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, FeedFollow, FeedFollowRow};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow a feed. Following the same feed twice yields `Conflict`.
    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::conflict_or(e, "feed follow"))?;

        let row = sqlx::query_as::<_, FeedFollowRow>(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id, f.name AS feed_name, u.name AS user_name,
                   ff.created_at
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            JOIN users u ON u.id = ff.user_id
            WHERE ff.id = ?
        "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_follow())
    }

    /// Follows for a user, ordered by feed name
    pub async fn get_follows_for_user(&self, user_id: i64) -> Result<Vec<FeedFollow>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedFollowRow>(
            r#"
            SELECT ff.id, ff.user_id, ff.feed_id, f.name AS feed_name, u.name AS user_name,
                   ff.created_at
            FROM feed_follows ff
            JOIN feeds f ON f.id = ff.feed_id
            JOIN users u ON u.id = ff.user_id
            WHERE ff.user_id = ?
            ORDER BY f.name, ff.id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedFollowRow::into_follow).collect())
    }

    /// Stop following a feed. Returns `NotFound` when no follow existed.
    pub async fn delete_feed_follow(&self, user_id: i64, feed_id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound("feed follow".to_string()));
        }
        Ok(())
    }
}
