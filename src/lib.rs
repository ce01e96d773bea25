//! Presence tracker for people who want a number on their day. A background
//! daemon watches input idle time and turns continuous activity into scored
//! sessions, and the cli aggregates them into daily/weekly/monthly/yearly
//! totals.

pub mod cli;
pub mod daemon;
pub mod idle_api;
pub mod stats;
pub mod store;
pub mod utils;
