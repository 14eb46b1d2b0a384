//! Core playlist-generation pipeline: parses a station programming
//! document, derives per-daypart selection criteria, drives the
//! tool-augmented LLM selector with constraint relaxation, validates the
//! result, and writes the finished playlists.

pub mod batch;
pub mod budget;
pub mod decision_log;
pub mod enrich;
pub mod error;
pub mod library;
pub mod lock;
pub mod output;
pub mod parser;
pub mod relax;
pub mod selector;
pub mod validate;

pub use error::{Error, Result};
