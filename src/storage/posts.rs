use async_trait::async_trait;
use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, NewPost, Post, PostRow};
use super::PostStore;

/// Maximum number of posts to return from any single query
const MAX_POSTS: i64 = 2000;

const POST_COLUMNS: &str = "id, feed_id, title, url, description, published_at, created_at";

impl Database {
    // ========================================================================
    // Post Queries
    // ========================================================================

    /// Newest posts across the feeds a user follows.
    ///
    /// `limit` is capped at `MAX_POSTS`.
    pub async fn get_posts_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, DatabaseError> {
        let limit = limit.clamp(0, MAX_POSTS);
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at, p.created_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC, id DESC
            LIMIT ?
        "#
        ))
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn get_post_by_url(&self, url: &str) -> Result<Option<Post>, DatabaseError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PostRow::into_post))
    }
}

#[async_trait]
impl PostStore for Database {
    /// Insert `post` unless its URL is already stored.
    ///
    /// The conflict is resolved inside the single INSERT statement, so two
    /// concurrent inserts of the same URL leave exactly one row. Only the
    /// `url` constraint is absorbed; any other failure is returned.
    async fn insert_post_if_absent(&self, post: &NewPost) -> Result<(Post, bool), DatabaseError> {
        let now = to_millis(Utc::now());
        let inserted = sqlx::query_as::<_, PostRow>(&format!(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            RETURNING {POST_COLUMNS}
        "#
        ))
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(to_millis(post.published_at))
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.into_post(), true));
        }

        let existing = self
            .get_post_by_url(&post.url)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("post '{}'", post.url)))?;
        Ok((existing, false))
    }
}
