//! navrank - mutual fund NAV tracker with trailing XIRR leaderboards
//!
//! Keeps a sharded local copy of daily NAV history per scheme, refreshes it
//! incrementally from an upstream provider, computes a trailing 12-month
//! XIRR per scheme and ranks Direct growth plans overall and per category.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod reports;
pub mod returns;
pub mod store;
pub mod sync;
pub mod utils;
