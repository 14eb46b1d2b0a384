use serde::{Deserialize, Serialize};

/// A TTL-bounded snapshot of "what tracks already exist" as reported by
/// the external library accessor (spec §3 "Known-Tracks Cache"). Used by
/// any code path needing a cheap existence check during a batch without
/// re-querying the accessor on every lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownTracksCache {
    pub track_ids: Vec<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub ttl_seconds: u64,
}

impl KnownTracksCache {
    pub fn new(track_ids: Vec<String>, ttl_seconds: u64) -> Self {
        Self {
            track_ids,
            fetched_at: chrono::Utc::now(),
            ttl_seconds,
        }
    }

    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        age.num_seconds() > self.ttl_seconds as i64
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.track_ids.iter().any(|id| id == track_id)
    }
}
