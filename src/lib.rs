//! gator: a command-line RSS aggregator.
//!
//! Feeds are polled round-robin by [`scheduler::Scheduler`], one feed per
//! tick, and every new item is stored once as a post keyed by its link.

pub mod app;
pub mod commands;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
