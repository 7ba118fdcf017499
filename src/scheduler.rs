//! Fixed-interval poll loop.
//!
//! Every tick processes exactly one feed: the owner's feed that was fetched
//! least recently (never-fetched feeds first). The feed is marked fetched
//! *before* the network request, so a feed that keeps failing still rotates
//! to the back of the queue instead of starving the others.

use chrono::Utc;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::feed::{ingest, FeedFetcher, FetchError, IngestReport};
use crate::storage::{DatabaseError, Feed, FeedStore, PostStore};

/// Why a single poll cycle did not ingest anything.
///
/// Cycle errors are reported by [`Scheduler::run`] and never stop the loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("No feeds to fetch, add one with `gator addfeed <name> <url>`")]
    NoFeeds,
    #[error(transparent)]
    Store(#[from] DatabaseError),
    #[error("Fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// What one successful cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// The processed feed, as marked
    pub feed: Feed,
    pub ingest: IngestReport,
}

pub struct Scheduler<S> {
    store: S,
    fetcher: FeedFetcher,
    owner_id: i64,
    interval: Duration,
}

impl<S> Scheduler<S>
where
    S: FeedStore + PostStore,
{
    pub fn new(store: S, fetcher: FeedFetcher, owner_id: i64, interval: Duration) -> Self {
        Self {
            store,
            fetcher,
            owner_id,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one select, mark, fetch, ingest cycle.
    ///
    /// The feed stays marked even when the fetch fails.
    pub async fn poll_once(&self) -> Result<CycleReport, CycleError> {
        let next = self
            .store
            .next_feed_to_fetch(self.owner_id)
            .await?
            .ok_or(CycleError::NoFeeds)?;

        let feed = self.store.mark_fetched(next.id, Utc::now()).await?;
        tracing::info!(feed_id = feed.id, name = %feed.name, url = %feed.url, "Polling feed");

        let parsed = self
            .fetcher
            .fetch(&feed.url)
            .await
            .map_err(|source| CycleError::Fetch {
                url: feed.url.clone(),
                source,
            })?;

        let ingest = ingest(&self.store, feed.id, &parsed).await;
        Ok(CycleReport { feed, ingest })
    }

    /// Poll until `shutdown` turns `true` or its sender is dropped.
    ///
    /// The first cycle starts immediately. A cycle that overruns the interval
    /// delays the next tick rather than triggering a burst of catch-up ticks.
    /// The signal is observed between cycles; an in-flight cycle is bounded
    /// by the fetcher's timeout. Status lines for each cycle go to `out`.
    /// Returns the number of cycles run.
    pub async fn run<W: Write>(&self, mut shutdown: watch::Receiver<bool>, out: &mut W) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        tracing::info!(owner_id = self.owner_id, interval = ?self.interval, "Scheduler started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Shutdown sender dropped");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let outcome = self.poll_once().await;
                    if let Err(e) = report(out, &outcome) {
                        tracing::warn!(error = %e, "Failed to write cycle status");
                    }
                    cycles += 1;
                }
            }
        }

        tracing::info!(cycles, "Scheduler stopped");
        cycles
    }
}

fn report<W: Write>(out: &mut W, outcome: &Result<CycleReport, CycleError>) -> std::io::Result<()> {
    match outcome {
        Ok(CycleReport { feed, ingest }) => {
            tracing::info!(
                feed_id = feed.id,
                created = ingest.created,
                duplicates = ingest.duplicates,
                failed = ingest.failed,
                "Cycle complete"
            );
            writeln!(out, "Fetched {} ({})", feed.name, feed.url)?;
            writeln!(
                out,
                "  {} new, {} already stored, {} failed",
                ingest.created, ingest.duplicates, ingest.failed
            )?;
            for error in &ingest.errors {
                writeln!(out, "  Error: {}", error)?;
            }
        }
        Err(CycleError::NoFeeds) => {
            tracing::debug!("No feeds to poll");
            writeln!(out, "{}", CycleError::NoFeeds)?;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cycle failed");
            writeln!(out, "Error: {}", e)?;
        }
    }
    out.flush()
}
