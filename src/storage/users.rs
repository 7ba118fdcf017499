use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, DatabaseError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. Names are unique; a taken name yields `Conflict`.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::conflict_or(e, format!("user '{}'", name)))?;

        tracing::debug!(user_id = row.id, name = %name, "Created user");
        Ok(row.into_user())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRow::into_user))
    }

    /// All users, alphabetically
    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// Delete every user. Feeds, follows and posts go with them via cascade.
    ///
    /// Returns the number of users removed.
    pub async fn reset(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        tracing::info!(users = result.rows_affected(), "Reset database");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = test_db().await;
        let user = db.create_user("alice").await.unwrap();
        assert!(user.id > 0);
        assert_eq!(user.name, "alice");

        let by_name = db.get_user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(by_name, user);

        let by_id = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_user_is_conflict() {
        let db = test_db().await;
        db.create_user("alice").await.unwrap();

        match db.create_user("alice").await {
            Err(DatabaseError::Conflict(what)) => assert!(what.contains("alice")),
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_user_is_none() {
        let db = test_db().await;
        assert!(db.get_user_by_name("nobody").await.unwrap().is_none());
        assert!(db.get_user(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_users_sorted() {
        let db = test_db().await;
        db.create_user("carol").await.unwrap();
        db.create_user("alice").await.unwrap();
        db.create_user("bob").await.unwrap();

        let names: Vec<String> = db
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_reset_cascades_to_feeds() {
        let db = test_db().await;
        let user = db.create_user("alice").await.unwrap();
        db.create_feed(user.id, "Blog", "https://example.com/rss")
            .await
            .unwrap();

        assert_eq!(db.reset().await.unwrap(), 1);
        assert!(db.list_users().await.unwrap().is_empty());
        assert!(db.list_feeds_with_owners().await.unwrap().is_empty());
    }
}
