//! Feed retrieval and ingestion.
//!
//! - `parser` - RSS 2.0 documents into [`ParsedFeed`] using `quick-xml`
//! - [`dates`] - best-effort resolution of `<pubDate>` text
//! - `fetcher` - single-shot HTTP retrieval with a deadline and size cap
//! - `ingest` - deduplicated persistence of parsed items as posts
//!
//! # Example
//!
//! ```ignore
//! use gator::feed::{ingest, FeedFetcher, DEFAULT_FETCH_TIMEOUT};
//!
//! let fetcher = FeedFetcher::new(DEFAULT_FETCH_TIMEOUT)?;
//! let parsed = fetcher.fetch("https://blog.boot.dev/index.xml").await?;
//! let report = ingest(&db, feed.id, &parsed).await;
//! ```

pub mod dates;
mod fetcher;
mod ingest;
mod parser;

pub use dates::resolve_published;
pub use fetcher::{FeedFetcher, FetchError, DEFAULT_FETCH_TIMEOUT, USER_AGENT};
pub use ingest::{ingest, IngestReport};
pub use parser::{parse_feed, ParseError, ParsedFeed, ParsedItem};
