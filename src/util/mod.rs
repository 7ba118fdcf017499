//! Utility functions for common operations.
//!
//! - **URL validation**: feed addresses must be http(s) with a host
//! - **Interval parsing**: `30s`, `1m`, `1h30m` style durations for `agg`
//!
//! # Examples
//!
//! ```
//! use gator::util::{parse_interval, validate_feed_url};
//! use std::time::Duration;
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//!
//! assert_eq!(parse_interval("1m30s").unwrap(), Duration::from_secs(90));
//! ```

mod duration;
mod url_validator;

pub use duration::{parse_interval, IntervalError};
pub use url_validator::{validate_feed_url, UrlValidationError};
