use crate::config::Config;
use crate::feed::FeedFetcher;
use crate::scheduler::Scheduler;
use crate::storage::{Database, DatabaseError, Feed, FeedFollow, FeedListing, Post, User};
use crate::util::validate_feed_url;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of posts `browse` shows when no limit is given.
pub const DEFAULT_BROWSE_LIMIT: i64 = 2;

// ============================================================================
// Application Context
// ============================================================================

/// Everything a command needs, built once at startup.
///
/// Commands that act on behalf of a user take the [`User`] returned by
/// [`App::current_user`] as an explicit argument.
pub struct App {
    pub db: Database,
    pub config: Config,
    config_path: PathBuf,
    fetcher: FeedFetcher,
}

impl App {
    pub fn new(db: Database, config: Config, config_path: PathBuf) -> Result<Self> {
        let fetcher =
            FeedFetcher::new(config.fetch_timeout()).context("Failed to build HTTP client")?;
        Ok(Self {
            db,
            config,
            config_path,
            fetcher,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Resolve the logged-in user named in the config.
    ///
    /// # Errors
    ///
    /// Fails when nobody is logged in or the named user no longer exists
    /// (for example after `reset`).
    pub async fn current_user(&self) -> Result<User> {
        let Some(name) = self.config.current_user_name.as_deref() else {
            bail!("Not logged in. Run `gator register <name>` or `gator login <name>` first");
        };

        self.db
            .get_user_by_name(name)
            .await
            .context("Failed to look up current user")?
            .with_context(|| format!("Current user '{}' does not exist, log in again", name))
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Create a user and make them the current user.
    pub async fn register(&mut self, name: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            bail!("User name cannot be empty");
        }

        let user = match self.db.create_user(name).await {
            Ok(user) => user,
            Err(DatabaseError::Conflict(_)) => bail!("User '{}' already exists", name),
            Err(e) => return Err(e).context("Failed to create user"),
        };
        self.set_current_user(&user.name)?;

        tracing::info!(user_id = user.id, name = %user.name, "Registered user");
        Ok(user)
    }

    /// Switch the current user to an existing user.
    pub async fn login(&mut self, name: &str) -> Result<User> {
        let user = self
            .db
            .get_user_by_name(name.trim())
            .await
            .context("Failed to look up user")?
            .with_context(|| format!("User '{}' does not exist", name.trim()))?;
        self.set_current_user(&user.name)?;
        Ok(user)
    }

    fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config
            .set_current_user(name, &self.config_path)
            .with_context(|| format!("Failed to save config to '{}'", self.config_path.display()))
    }

    /// Delete every user, and with them every feed, follow and post.
    pub async fn reset(&self) -> Result<u64> {
        let removed = self.db.reset().await.context("Failed to reset database")?;
        tracing::info!(users = removed, "Database reset");
        Ok(removed)
    }

    /// All users, each paired with whether they are the current user.
    pub async fn users(&self) -> Result<Vec<(User, bool)>> {
        let users = self.db.list_users().await.context("Failed to list users")?;
        let current = self.config.current_user_name.as_deref();
        Ok(users
            .into_iter()
            .map(|u| {
                let is_current = current == Some(u.name.as_str());
                (u, is_current)
            })
            .collect())
    }

    // ========================================================================
    // Feeds and Follows
    // ========================================================================

    /// Register a feed for `user` and follow it.
    ///
    /// The URL is fetched once first, so a feed that cannot be retrieved or
    /// parsed is never stored.
    pub async fn add_feed(&self, user: &User, name: &str, url: &str) -> Result<(Feed, FeedFollow)> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Feed name cannot be empty");
        }
        let url = validate_feed_url(url).context("Invalid feed URL")?;

        let parsed = self
            .fetcher
            .fetch(url.as_str())
            .await
            .with_context(|| format!("Could not fetch a feed from '{}'", url))?;
        tracing::debug!(url = %url, title = %parsed.title, items = parsed.items.len(), "Validated feed");

        let feed = match self.db.create_feed(user.id, name, url.as_str()).await {
            Ok(feed) => feed,
            Err(DatabaseError::Conflict(_)) => bail!("A feed with URL '{}' already exists", url),
            Err(e) => return Err(e).context("Failed to create feed"),
        };
        let follow = self
            .db
            .create_feed_follow(user.id, feed.id)
            .await
            .context("Failed to follow new feed")?;

        Ok((feed, follow))
    }

    pub async fn feeds(&self) -> Result<Vec<FeedListing>> {
        self.db
            .list_feeds_with_owners()
            .await
            .context("Failed to list feeds")
    }

    pub async fn follow(&self, user: &User, url: &str) -> Result<FeedFollow> {
        let feed = self.feed_by_url(url).await?;
        match self.db.create_feed_follow(user.id, feed.id).await {
            Ok(follow) => Ok(follow),
            Err(DatabaseError::Conflict(_)) => {
                bail!("{} already follows '{}'", user.name, feed.name)
            }
            Err(e) => Err(e).context("Failed to follow feed"),
        }
    }

    pub async fn following(&self, user: &User) -> Result<Vec<FeedFollow>> {
        self.db
            .get_follows_for_user(user.id)
            .await
            .context("Failed to list follows")
    }

    pub async fn unfollow(&self, user: &User, url: &str) -> Result<Feed> {
        let feed = self.feed_by_url(url).await?;
        match self.db.delete_feed_follow(user.id, feed.id).await {
            Ok(()) => Ok(feed),
            Err(DatabaseError::NotFound(_)) => {
                bail!("{} does not follow '{}'", user.name, feed.name)
            }
            Err(e) => Err(e).context("Failed to unfollow feed"),
        }
    }

    /// Feeds are stored under their normalized URL, so look that up first.
    async fn feed_by_url(&self, url: &str) -> Result<Feed> {
        let url = url.trim();
        if let Ok(normalized) = validate_feed_url(url) {
            if let Some(feed) = self
                .db
                .get_feed_by_url(normalized.as_str())
                .await
                .context("Failed to look up feed")?
            {
                return Ok(feed);
            }
        }
        self.db
            .get_feed_by_url(url)
            .await
            .context("Failed to look up feed")?
            .with_context(|| format!("No feed with URL '{}'", url))
    }

    // ========================================================================
    // Posts and Polling
    // ========================================================================

    /// Newest posts from the feeds `user` follows.
    pub async fn browse(&self, user: &User, limit: i64) -> Result<Vec<Post>> {
        self.db
            .get_posts_for_user(user.id, limit)
            .await
            .context("Failed to load posts")
    }

    /// A poll loop over the feeds `user` added.
    pub fn scheduler(&self, user: &User, interval: Duration) -> Scheduler<Database> {
        Scheduler::new(self.db.clone(), self.fetcher.clone(), user.id, interval)
    }
}
