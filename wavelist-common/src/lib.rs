//! # wavelist-common
//!
//! Shared code for the wavelist playlist-generation core:
//! - the immutable data model (`model`)
//! - fixed-point USD amounts (`money`)
//! - tiered configuration resolution (`config`)
//! - cache-key folding for `(artist, title)` pairs (`cache_key`)
//! - small time/uuid helpers

pub mod cache_key;
pub mod config;
pub mod error;
pub mod model;
pub mod money;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use money::{UnitRate, Usd};
