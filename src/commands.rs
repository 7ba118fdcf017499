//! Command-line subcommands and their dispatch.
//!
//! The [`Command`] enum is the whole command table: clap parses it once and
//! [`run`] matches on it. Commands that act for the logged-in user resolve
//! that user once, up front, and hand it to the [`App`] method.

use crate::app::{App, DEFAULT_BROWSE_LIMIT};
use crate::storage::Post;
use crate::util::parse_interval;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::io::Write;
use tokio::sync::watch;

/// Longest description shown by `browse`, in characters.
const DESCRIPTION_PREVIEW_CHARS: usize = 280;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Log in as an existing user
    Login { name: String },

    /// Delete all users, feeds, follows and posts
    Reset,

    /// List users
    Users,

    /// Poll your feeds forever, one feed per interval (e.g. 30s, 1m, 1h30m)
    Agg {
        #[arg(value_name = "INTERVAL")]
        time_between_reqs: String,
    },

    /// Add a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },

    /// List all feeds
    Feeds,

    /// Follow an existing feed by URL
    Follow { url: String },

    /// List the feeds you follow
    Following,

    /// Stop following a feed by URL
    Unfollow { url: String },

    /// Show the newest posts from feeds you follow
    Browse {
        #[arg(value_name = "LIMIT")]
        limit: Option<String>,
    },
}

/// Execute `command`, writing user-facing output to `out`.
pub async fn run<W: Write>(app: &mut App, command: Command, out: &mut W) -> Result<()> {
    tracing::debug!(command = ?command, "Running command");

    match command {
        Command::Register { name } => {
            let user = app.register(&name).await?;
            writeln!(out, "User '{}' created (id {})", user.name, user.id)?;
        }
        Command::Login { name } => {
            let user = app.login(&name).await?;
            writeln!(out, "Logged in as {}", user.name)?;
        }
        Command::Reset => {
            let removed = app.reset().await?;
            writeln!(out, "Database reset ({} users removed)", removed)?;
        }
        Command::Users => {
            for (user, is_current) in app.users().await? {
                if is_current {
                    writeln!(out, "* {} (current)", user.name)?;
                } else {
                    writeln!(out, "* {}", user.name)?;
                }
            }
        }
        Command::Agg { time_between_reqs } => {
            let user = app.current_user().await?;
            let interval = parse_interval(&time_between_reqs)
                .with_context(|| format!("Invalid interval '{}'", time_between_reqs))?;
            writeln!(out, "Collecting feeds every {:?}", interval)?;
            out.flush()?;

            let (stop_tx, stop_rx) = watch::channel(false);
            let scheduler = app.scheduler(&user, interval);
            let cycles = {
                let polling = scheduler.run(stop_rx, &mut *out);
                tokio::pin!(polling);

                tokio::select! {
                    cycles = &mut polling => cycles,
                    signal = tokio::signal::ctrl_c() => {
                        if let Err(e) = signal {
                            tracing::warn!(error = %e, "Failed to listen for Ctrl-C, stopping");
                        }
                        tracing::info!("Stopping after the current cycle");
                        let _ = stop_tx.send(true);
                        polling.await
                    }
                }
            };
            writeln!(out, "Stopped after {} cycles", cycles)?;
        }
        Command::AddFeed { name, url } => {
            let user = app.current_user().await?;
            let (feed, follow) = app.add_feed(&user, &name, &url).await?;
            writeln!(out, "Feed added:")?;
            writeln!(out, "  Name:  {}", feed.name)?;
            writeln!(out, "  URL:   {}", feed.url)?;
            writeln!(out, "  Owner: {}", follow.user_name)?;
        }
        Command::Feeds => {
            let feeds = app.feeds().await?;
            if feeds.is_empty() {
                writeln!(out, "No feeds yet")?;
            }
            for feed in feeds {
                writeln!(out, "* {}", feed.name)?;
                writeln!(out, "  URL:      {}", feed.url)?;
                writeln!(out, "  Added by: {}", feed.owner_name)?;
            }
        }
        Command::Follow { url } => {
            let user = app.current_user().await?;
            let follow = app.follow(&user, &url).await?;
            writeln!(out, "{} now follows {}", follow.user_name, follow.feed_name)?;
        }
        Command::Following => {
            let user = app.current_user().await?;
            for follow in app.following(&user).await? {
                writeln!(out, "* {}", follow.feed_name)?;
            }
        }
        Command::Unfollow { url } => {
            let user = app.current_user().await?;
            let feed = app.unfollow(&user, &url).await?;
            writeln!(out, "{} unfollowed {}", user.name, feed.name)?;
        }
        Command::Browse { limit } => {
            let user = app.current_user().await?;
            let limit = browse_limit(limit.as_deref());
            let posts = app.browse(&user, limit).await?;
            if posts.is_empty() {
                writeln!(out, "No posts yet, run `gator agg <interval>` to collect some")?;
            }
            for post in &posts {
                write_post(out, post)?;
            }
        }
    }

    Ok(())
}

/// Parse the optional `browse` limit, falling back to the default for
/// missing, unparseable or non-positive input.
pub fn browse_limit(raw: Option<&str>) -> i64 {
    match raw.map(|s| s.trim().parse::<i64>()) {
        Some(Ok(n)) if n > 0 => n,
        Some(_) => {
            tracing::debug!(raw = ?raw, "Unusable browse limit, using default");
            DEFAULT_BROWSE_LIMIT
        }
        None => DEFAULT_BROWSE_LIMIT,
    }
}

fn write_post<W: Write>(out: &mut W, post: &Post) -> std::io::Result<()> {
    writeln!(out, "{}", post.title.as_deref().unwrap_or("(untitled)"))?;
    writeln!(out, "  {}", post.published_at.format("%Y-%m-%d %H:%M UTC"))?;
    writeln!(out, "  {}", post.url)?;
    if let Some(description) = post.description.as_deref() {
        let mut preview: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        if description.chars().nth(DESCRIPTION_PREVIEW_CHARS).is_some() {
            preview.push_str("...");
        }
        writeln!(out, "  {}", preview)?;
    }
    writeln!(out)
}
