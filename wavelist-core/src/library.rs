//! The music library accessor capability contract (spec §1: "provides
//! searchable tracks, streaming URLs, audio-file access" — an external
//! collaborator, not re-specified in full, but its boundary is in scope).

use crate::error::{LibraryError, Result};
use async_trait::async_trait;
use wavelist_common::model::LibraryTrack;

/// What the selector's tools (spec §4.5) and the enricher (spec §4.2)
/// need from the library. A real implementation would speak the
/// Subsonic-ish protocol named by `SUBSONIC_URL`/`SUBSONIC_USER`/
/// `SUBSONIC_PASSWORD` (spec §6); that wire protocol is out of scope
/// here, only this trait boundary is.
#[async_trait]
pub trait LibraryAccessor: Send + Sync {
    async fn search_tracks(
        &self,
        query: &str,
        filters: Option<&serde_json::Value>,
    ) -> Result<Vec<LibraryTrack>>;

    async fn genres(&self) -> Result<Vec<(String, usize)>>;

    async fn tracks_by_genre(&self, genre: &str, limit: usize) -> Result<Vec<LibraryTrack>>;

    async fn tracks_by_era(&self, min_year: i32, max_year: i32) -> Result<Vec<LibraryTrack>>;

    async fn track_info(&self, track_id: &str) -> Result<LibraryTrack>;

    async fn australian_tracks(&self) -> Result<Vec<LibraryTrack>>;

    /// Invoked by the local audio analyser step of the enricher (spec
    /// §4.2) via the library accessor, which alone knows how to resolve
    /// `audio_ref` to bytes on disk or a stream.
    async fn analyze_audio_bpm(&self, audio_ref: &str) -> Result<Option<f64>>;

    /// All known track ids, backing the `KnownTracksCache` (spec §3).
    async fn all_track_ids(&self) -> Result<Vec<String>>;
}

/// An in-memory test double implementing the full `LibraryAccessor`
/// contract over a fixed `Vec<LibraryTrack>`. Used by unit/integration
/// tests in this crate and suitable as a starting point for local
/// experimentation without a live Subsonic-compatible server.
pub struct InMemoryLibrary {
    tracks: Vec<LibraryTrack>,
}

impl InMemoryLibrary {
    pub fn new(tracks: Vec<LibraryTrack>) -> Self {
        Self { tracks }
    }
}

#[async_trait]
impl LibraryAccessor for InMemoryLibrary {
    async fn search_tracks(
        &self,
        query: &str,
        _filters: Option<&serde_json::Value>,
    ) -> Result<Vec<LibraryTrack>> {
        let q = query.to_lowercase();
        Ok(self
            .tracks
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&q)
                    || t.artist.to_lowercase().contains(&q)
                    || t.genre.as_deref().unwrap_or("").to_lowercase().contains(&q)
            })
            .take(100)
            .cloned()
            .collect())
    }

    async fn genres(&self) -> Result<Vec<(String, usize)>> {
        let mut counts = std::collections::HashMap::<String, usize>::new();
        for t in &self.tracks {
            if let Some(g) = &t.genre {
                *counts.entry(g.clone()).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn tracks_by_genre(&self, genre: &str, limit: usize) -> Result<Vec<LibraryTrack>> {
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.genre.as_deref() == Some(genre))
            .take(limit.min(100))
            .cloned()
            .collect())
    }

    async fn tracks_by_era(&self, min_year: i32, max_year: i32) -> Result<Vec<LibraryTrack>> {
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.year.is_some_and(|y| y >= min_year && y <= max_year))
            .take(100)
            .cloned()
            .collect())
    }

    async fn track_info(&self, track_id: &str) -> Result<LibraryTrack> {
        self.tracks
            .iter()
            .find(|t| t.id == track_id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(track_id.to_string()).into())
    }

    async fn australian_tracks(&self) -> Result<Vec<LibraryTrack>> {
        Ok(self
            .tracks
            .iter()
            .filter(|t| t.is_australian)
            .take(100)
            .cloned()
            .collect())
    }

    async fn analyze_audio_bpm(&self, _audio_ref: &str) -> Result<Option<f64>> {
        Ok(None)
    }

    async fn all_track_ids(&self) -> Result<Vec<String>> {
        Ok(self.tracks.iter().map(|t| t.id.clone()).collect())
    }
}
