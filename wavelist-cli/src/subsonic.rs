//! A Subsonic-API-speaking `LibraryAccessor` (spec §1, §6: `SUBSONIC_URL`,
//! `SUBSONIC_USER`, `SUBSONIC_PASSWORD`). The wire protocol itself is an
//! out-of-core collaborator boundary per the specification; this adapter
//! is the thinnest binding that makes the CLI runnable against a real
//! music server, not a re-specification of the library accessor.
//!
//! Authenticates with the standard token scheme: `t = md5(password + salt)`
//! plus a random `salt`, sent alongside `u`/`v`/`c`/`f=json` on every call,
//! so the plaintext password never crosses the wire.
//!
//! "Australian content" and BPM are not native Subsonic fields; they are
//! read from a server-side genre convention (`genre` containing "AU" /
//! "Australian") and the `song`'s embedded `bpm` field respectively, when
//! present. Local audio-BPM analysis is a separate out-of-core collaborator
//! (spec §1) this adapter does not implement; `analyze_audio_bpm` always
//! returns `None`.

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use wavelist_common::model::{LibraryTrack, MetadataSource, RotationCategory};
use wavelist_core::error::{LibraryError, Result};
use wavelist_core::library::LibraryAccessor;

const CLIENT_NAME: &str = "wavelist";
const API_VERSION: &str = "1.16.1";
const PAGE_SIZE: usize = 500;

pub struct SubsonicLibrary {
    base_url: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl SubsonicLibrary {
    pub fn new(base_url: String, user: String, password: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user,
            password,
            client: reqwest::Client::new(),
        }
    }

    fn auth_params(&self) -> Vec<(String, String)> {
        let salt: String = rand::thread_rng()
            .sample_iter(rand::distributions::Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        let token = format!("{:x}", md5::compute(format!("{}{salt}", self.password)));
        vec![
            ("u".to_string(), self.user.clone()),
            ("t".to_string(), token),
            ("s".to_string(), salt),
            ("v".to_string(), API_VERSION.to_string()),
            ("c".to_string(), CLIENT_NAME.to_string()),
            ("f".to_string(), "json".to_string()),
        ]
    }

    async fn call(&self, endpoint: &str, extra: &[(&str, String)]) -> Result<Value> {
        let mut params = self.auth_params();
        for (k, v) in extra {
            params.push((k.to_string(), v.clone()));
        }
        let url = format!("{}/rest/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| LibraryError::Unreachable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LibraryError::AuthFailure(format!("{endpoint} returned 401")).into());
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(LibraryError::RateLimited { retry_after_ms }.into());
        }
        if !response.status().is_success() {
            return Err(LibraryError::Unreachable(format!("{endpoint} returned {}", response.status())).into());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LibraryError::Unreachable(e.to_string()))?;
        let root = &body["subsonic-response"];
        if root["status"].as_str() != Some("ok") {
            let code = root["error"]["code"].as_i64().unwrap_or(0);
            let message = root["error"]["message"].as_str().unwrap_or("unknown error").to_string();
            return Err(match code {
                40 | 41 => LibraryError::AuthFailure(message),
                70 => LibraryError::NotFound(message),
                _ => LibraryError::Unreachable(message),
            }
            .into());
        }
        Ok(root.clone())
    }

    fn song_to_track(song: &Value) -> Option<LibraryTrack> {
        let id = song["id"].as_str()?.to_string();
        let genre = song["genre"].as_str().map(str::to_string);
        let is_australian = genre
            .as_deref()
            .is_some_and(|g| g.to_ascii_lowercase().contains("australia"));
        Some(LibraryTrack {
            id,
            title: song["title"].as_str().unwrap_or("Unknown").to_string(),
            artist: song["artist"].as_str().unwrap_or("Unknown").to_string(),
            album: song["album"].as_str().unwrap_or("").to_string(),
            duration_seconds: song["duration"].as_u64().unwrap_or(0) as u32,
            is_australian,
            rotation_category: RotationCategory::Library,
            bpm: song["bpm"].as_f64(),
            genre,
            year: song["year"].as_i64().map(|y| y as i32),
            country: None,
            metadata_source: Some(MetadataSource::Library),
            audio_ref: Some(song["id"].as_str().unwrap_or_default().to_string()),
        })
    }
}

#[async_trait]
impl LibraryAccessor for SubsonicLibrary {
    async fn search_tracks(&self, query: &str, _filters: Option<&Value>) -> Result<Vec<LibraryTrack>> {
        let root = self
            .call(
                "search3",
                &[
                    ("query", query.to_string()),
                    ("songCount", PAGE_SIZE.to_string()),
                    ("albumCount", "0".to_string()),
                    ("artistCount", "0".to_string()),
                ],
            )
            .await?;
        Ok(root["searchResult3"]["song"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Self::song_to_track)
            .collect())
    }

    async fn genres(&self) -> Result<Vec<(String, usize)>> {
        let root = self.call("getGenres", &[]).await?;
        Ok(root["genres"]["genre"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|g| {
                Some((
                    g["value"].as_str()?.to_string(),
                    g["songCount"].as_u64().unwrap_or(0) as usize,
                ))
            })
            .collect())
    }

    async fn tracks_by_genre(&self, genre: &str, limit: usize) -> Result<Vec<LibraryTrack>> {
        let root = self
            .call(
                "getSongsByGenre",
                &[
                    ("genre", genre.to_string()),
                    ("count", limit.min(PAGE_SIZE).to_string()),
                ],
            )
            .await?;
        Ok(root["songsByGenre"]["song"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Self::song_to_track)
            .collect())
    }

    async fn tracks_by_era(&self, min_year: i32, max_year: i32) -> Result<Vec<LibraryTrack>> {
        // search3's free-text query has no year filter; an empty query
        // returns a broad recent-activity sample which is then filtered
        // client-side by the embedded `year` tag.
        let tracks = self.search_tracks("", None).await?;
        Ok(tracks
            .into_iter()
            .filter(|t| t.year.is_some_and(|y| y >= min_year && y <= max_year))
            .collect())
    }

    async fn track_info(&self, track_id: &str) -> Result<LibraryTrack> {
        let root = self.call("getSong", &[("id", track_id.to_string())]).await?;
        Self::song_to_track(&root["song"]).ok_or_else(|| LibraryError::NotFound(track_id.to_string()).into())
    }

    async fn australian_tracks(&self) -> Result<Vec<LibraryTrack>> {
        let tracks = self.search_tracks("Australia", None).await?;
        Ok(tracks.into_iter().filter(|t| t.is_australian).collect())
    }

    async fn analyze_audio_bpm(&self, _audio_ref: &str) -> Result<Option<f64>> {
        Ok(None)
    }

    async fn all_track_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut offset = 0usize;
        loop {
            let root = self
                .call(
                    "search3",
                    &[
                        ("query", "".to_string()),
                        ("songCount", PAGE_SIZE.to_string()),
                        ("songOffset", offset.to_string()),
                        ("albumCount", "0".to_string()),
                        ("artistCount", "0".to_string()),
                    ],
                )
                .await?;
            let page: Vec<String> = root["searchResult3"]["song"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|s| s["id"].as_str().map(str::to_string))
                .collect();
            let page_len = page.len();
            ids.extend(page);
            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn song_to_track_reads_genre_convention_for_australian_content() {
        let song = json!({
            "id": "42",
            "title": "Down Under",
            "artist": "Men at Work",
            "album": "Business as Usual",
            "duration": 222,
            "genre": "Pop/Australian",
            "bpm": 112.5,
            "year": 1981,
        });
        let track = SubsonicLibrary::song_to_track(&song).unwrap();
        assert_eq!(track.id, "42");
        assert!(track.is_australian);
        assert_eq!(track.bpm, Some(112.5));
        assert_eq!(track.year, Some(1981));
        assert_eq!(track.rotation_category, RotationCategory::Library);
        assert_eq!(track.audio_ref.as_deref(), Some("42"));
    }

    #[test]
    fn song_to_track_defaults_missing_optional_fields() {
        let song = json!({"id": "7"});
        let track = SubsonicLibrary::song_to_track(&song).unwrap();
        assert_eq!(track.title, "Unknown");
        assert_eq!(track.artist, "Unknown");
        assert_eq!(track.album, "");
        assert!(!track.is_australian);
        assert_eq!(track.bpm, None);
        assert_eq!(track.genre, None);
    }

    #[test]
    fn song_to_track_requires_an_id() {
        let song = json!({"title": "No Id Here"});
        assert!(SubsonicLibrary::song_to_track(&song).is_none());
    }

    #[test]
    fn auth_params_never_carry_the_plaintext_password() {
        let library = SubsonicLibrary::new(
            "http://library.local".to_string(),
            "dj".to_string(),
            "hunter2".to_string(),
        );
        let params = library.auth_params();
        assert!(params.iter().all(|(_, v)| v != "hunter2"));
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["u", "t", "s", "v", "c", "f"]);
    }

    #[test]
    fn base_url_drops_a_trailing_slash() {
        let library = SubsonicLibrary::new(
            "http://library.local/".to_string(),
            "dj".to_string(),
            "hunter2".to_string(),
        );
        assert_eq!(library.base_url, "http://library.local");
    }
}
