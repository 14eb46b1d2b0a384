//! Metadata enricher (spec §4.2): fills in missing `bpm`/`genre`/`year`/
//! `country` fields, preferring a permanent on-disk cache, then a web
//! enrichment source, then local audio analysis, and never raising on a
//! single-track failure.

use crate::decision_log::DecisionLogger;
use crate::error::{Error, LibraryError, Result};
use crate::library::LibraryAccessor;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;
use wavelist_common::cache_key::track_cache_key;
use wavelist_common::model::{DecisionType, LibraryTrack, MetadataSource, SelectedTrack};
use wavelist_common::Usd;

const BACKOFF_BASE_SECS: f64 = 1.5;
const BACKOFF_CAP_SECS: f64 = 80.0;
const BACKOFF_JITTER: f64 = 0.25;
const MAX_ATTEMPTS: usize = 6;
const AUDIO_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMetadata {
    pub bpm: Option<f64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub country: Option<String>,
    pub source: MetadataSource,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// The external scrobbling-style web API (spec §1, §4.2), out of scope
/// to re-specify in full; only this boundary is in scope here.
#[async_trait]
pub trait MetadataEnrichmentSource: Send + Sync {
    async fn lookup(&self, artist: &str, title: &str) -> Result<EnrichmentLookup>;
}

/// Used when no web enrichment API key is configured: every lookup
/// fails immediately and permanently, so `Enricher` falls straight
/// through to local audio analysis without ever sleeping on a retry.
pub struct NoEnrichmentSource;

#[async_trait]
impl MetadataEnrichmentSource for NoEnrichmentSource {
    async fn lookup(&self, _artist: &str, _title: &str) -> Result<EnrichmentLookup> {
        Err(Error::Library(LibraryError::NotFound(
            "no web enrichment source configured".to_string(),
        )))
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentLookup {
    pub bpm: Option<f64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub country: Option<String>,
}

/// Distinguishes a transient failure (retry with backoff) from a
/// permanent one (4xx other than 429, never retried).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Transient,
    Permanent,
    RateLimited { retry_after_secs: Option<u64> },
}

pub struct MetadataCache {
    dir: PathBuf,
}

impl MetadataCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn get(&self, artist: &str, title: &str) -> Result<Option<CachedMetadata>> {
        let path = self.path_for(&track_cache_key(artist, title));
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Atomic write: write to a sibling temp file, then rename over the
    /// destination, so a crash mid-write never leaves a truncated cache
    /// entry (spec §5 "Metadata cache ... writes are atomic").
    pub fn put(&self, artist: &str, title: &str, entry: &CachedMetadata) -> Result<()> {
        let key = track_cache_key(artist, title);
        let path = self.path_for(&key);
        let tmp_path = self.dir.join(format!("{key}.json.tmp-{}", Uuid::new_v4()));
        std::fs::write(&tmp_path, serde_json::to_vec(entry)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

pub struct Enricher<'a> {
    cache: &'a MetadataCache,
    source: &'a dyn MetadataEnrichmentSource,
    library: &'a dyn LibraryAccessor,
    log: &'a DecisionLogger,
}

impl<'a> Enricher<'a> {
    pub fn new(
        cache: &'a MetadataCache,
        source: &'a dyn MetadataEnrichmentSource,
        library: &'a dyn LibraryAccessor,
        log: &'a DecisionLogger,
    ) -> Self {
        Self {
            cache,
            source,
            library,
            log,
        }
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let base = (BACKOFF_BASE_SECS * 2f64.powi(attempt as i32)).min(BACKOFF_CAP_SECS);
        let jitter_fraction = rand::thread_rng().gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
        let jittered = (base * (1.0 + jitter_fraction)).max(0.0);
        Duration::from_secs_f64(jittered)
    }

    /// Fill in `track`'s missing metadata fields, never raising on a
    /// single-track failure (spec §4.2).
    pub async fn enrich(&self, playlist_id: Uuid, mut track: LibraryTrack) -> Result<LibraryTrack> {
        let needs_enrichment =
            track.bpm.is_none() || track.genre.is_none() || track.year.is_none() || track.country.is_none();
        if !needs_enrichment {
            return Ok(track);
        }

        let start = std::time::Instant::now();

        if let Some(cached) = self.cache.get(&track.artist, &track.title)? {
            track.bpm = track.bpm.or(cached.bpm);
            track.genre = track.genre.or(cached.genre);
            track.year = track.year.or(cached.year);
            track.country = track.country.or(cached.country);
            track.metadata_source = Some(MetadataSource::Library);
            self.log_retrieval(playlist_id, &track.id, "cache", start.elapsed().as_millis() as u64)?;
            return self.maybe_audio_analysis(playlist_id, track, start).await;
        }

        match self.query_web_with_retry(&track.artist, &track.title).await {
            Ok(lookup) => {
                track.bpm = track.bpm.or(lookup.bpm);
                track.genre = track.genre.or(lookup.genre);
                track.year = track.year.or(lookup.year);
                track.country = track.country.or(lookup.country);
                track.metadata_source = Some(MetadataSource::WebEnrichment);
                self.cache.put(
                    &track.artist,
                    &track.title,
                    &CachedMetadata {
                        bpm: track.bpm,
                        genre: track.genre.clone(),
                        year: track.year,
                        country: track.country.clone(),
                        source: MetadataSource::WebEnrichment,
                        fetched_at: chrono::Utc::now(),
                    },
                )?;
                self.log_retrieval(
                    playlist_id,
                    &track.id,
                    "web_enrichment",
                    start.elapsed().as_millis() as u64,
                )?;
            }
            Err(e) => {
                self.log.record(
                    playlist_id,
                    DecisionType::MetadataRetrieval,
                    json!({
                        "track_id": track.id,
                        "source": "web_enrichment",
                        "error": e.to_string(),
                        "error_type": "EnrichmentUnavailable",
                    }),
                    Usd::ZERO,
                    start.elapsed().as_millis() as u64,
                )?;
            }
        }

        self.maybe_audio_analysis(playlist_id, track, start).await
    }

    /// Fill in a playlist-bound `SelectedTrack`'s missing fields by
    /// routing its identity through the same cache/web/audio-analysis
    /// pipeline as `enrich`, then copying the result back. A
    /// `SelectedTrack` has no `audio_ref`, so the local audio-analysis
    /// fallback never fires here; only cache and web enrichment can fill
    /// a gap this late in the pipeline.
    pub async fn enrich_selected(&self, playlist_id: Uuid, track: &mut SelectedTrack) -> Result<()> {
        if track.bpm.is_some() && track.genre.is_some() && track.year.is_some() && track.country.is_some() {
            return Ok(());
        }
        let as_library_track = LibraryTrack {
            id: track.track_id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            duration_seconds: track.duration_seconds,
            is_australian: track.is_australian,
            rotation_category: track.rotation_category,
            bpm: track.bpm,
            genre: track.genre.clone(),
            year: track.year,
            country: track.country.clone(),
            metadata_source: track.metadata_source,
            audio_ref: None,
        };
        let enriched = self.enrich(playlist_id, as_library_track).await?;
        track.bpm = enriched.bpm;
        track.genre = enriched.genre;
        track.year = enriched.year;
        track.country = enriched.country;
        track.metadata_source = enriched.metadata_source;
        Ok(())
    }

    async fn maybe_audio_analysis(
        &self,
        playlist_id: Uuid,
        mut track: LibraryTrack,
        started_at: std::time::Instant,
    ) -> Result<LibraryTrack> {
        if track.bpm.is_some() {
            return Ok(track);
        }
        let Some(audio_ref) = track.audio_ref.clone() else {
            return Ok(track);
        };

        let result = tokio::time::timeout(AUDIO_ANALYSIS_TIMEOUT, self.library.analyze_audio_bpm(&audio_ref)).await;
        match result {
            Ok(Ok(Some(bpm))) => {
                track.bpm = Some(bpm);
                track.metadata_source = Some(MetadataSource::AudioAnalysis);
                self.log_retrieval(
                    playlist_id,
                    &track.id,
                    "audio_analysis",
                    started_at.elapsed().as_millis() as u64,
                )?;
            }
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => {
                // BPM remains null; best-effort only.
            }
        }
        Ok(track)
    }

    /// Classify a lookup failure so the retry loop can tell a transient
    /// error (keep trying) from a permanent one (give up immediately) from
    /// a rate limit (honour `Retry-After` instead of the jittered backoff).
    fn classify(error: &Error) -> LookupOutcome {
        match error {
            Error::Library(LibraryError::RateLimited { retry_after_ms }) => LookupOutcome::RateLimited {
                retry_after_secs: Some(retry_after_ms / 1000),
            },
            Error::Library(LibraryError::AuthFailure(_)) | Error::Library(LibraryError::NotFound(_)) => {
                LookupOutcome::Permanent
            }
            _ => LookupOutcome::Transient,
        }
    }

    async fn query_web_with_retry(&self, artist: &str, title: &str) -> Result<EnrichmentLookup> {
        let mut attempt = 0;
        loop {
            match self.source.lookup(artist, title).await {
                Ok(lookup) => return Ok(lookup),
                Err(e) => {
                    let outcome = Self::classify(&e);
                    if outcome == LookupOutcome::Permanent {
                        return Err(Error::EnrichmentUnavailable(format!("{artist} - {title}: {e}")));
                    }
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::EnrichmentUnavailable(format!("{artist} - {title}: {e}")));
                    }
                    let delay = match outcome {
                        LookupOutcome::RateLimited { retry_after_secs: Some(secs) } => {
                            Duration::from_secs(secs)
                        }
                        _ => Self::backoff_delay(attempt as u32),
                    };
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn log_retrieval(&self, playlist_id: Uuid, track_id: &str, source: &str, elapsed_ms: u64) -> Result<()> {
        self.log.record(
            playlist_id,
            DecisionType::MetadataRetrieval,
            json!({"track_id": track_id, "source": source}),
            Usd::ZERO,
            elapsed_ms,
        )?;
        Ok(())
    }
}

pub fn cache_dir_default() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("wavelist")
        .join("metadata")
}

/// A `reqwest`-based `MetadataEnrichmentSource` against the Last.fm
/// `track.getInfo` API, the external scrobbling-style service spec §1
/// names as the web enrichment collaborator. Last.fm has no BPM field,
/// so only `genre` (its top tag) and `year` (its album's release date,
/// when present) ever come back filled in; `country` and `bpm` are left
/// for the local audio analyser.
pub struct LastFmEnrichmentSource {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl LastFmEnrichmentSource {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://ws.audioscrobbler.com/2.0/".to_string(),
        }
    }
}

#[async_trait]
impl MetadataEnrichmentSource for LastFmEnrichmentSource {
    async fn lookup(&self, artist: &str, title: &str) -> Result<EnrichmentLookup> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("method", "track.getInfo"),
                ("api_key", &self.api_key),
                ("artist", artist),
                ("track", title),
                ("format", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(Error::Library(LibraryError::RateLimited {
                retry_after_ms: retry_after_ms.unwrap_or(1000),
            }));
        }
        if status.as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Library(LibraryError::AuthFailure(body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Library(LibraryError::NotFound(body)));
        }

        let body: serde_json::Value = response.json().await?;
        if body.get("error").is_some() {
            let message = body["message"].as_str().unwrap_or("track not found").to_string();
            return Err(Error::Library(LibraryError::NotFound(message)));
        }

        let track = &body["track"];
        let genre = track["toptags"]["tag"]
            .as_array()
            .and_then(|tags| tags.first())
            .and_then(|t| t["name"].as_str())
            .map(str::to_string);
        let year = track["album"]["@attr"]["year"]
            .as_str()
            .or_else(|| track["wiki"]["published"].as_str())
            .and_then(|s| s.get(0..4))
            .and_then(|y| y.parse::<i32>().ok());

        Ok(EnrichmentLookup {
            bpm: None,
            genre,
            year,
            country: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::InMemoryLibrary;
    use wavelist_common::model::RotationCategory;

    struct AlwaysFindsSource;

    #[async_trait]
    impl MetadataEnrichmentSource for AlwaysFindsSource {
        async fn lookup(&self, _artist: &str, _title: &str) -> Result<EnrichmentLookup> {
            Ok(EnrichmentLookup {
                bpm: Some(120.0),
                genre: Some("Alt".to_string()),
                year: Some(2020),
                country: Some("AU".to_string()),
            })
        }
    }

    struct AlwaysFailsSource(Error);

    #[async_trait]
    impl MetadataEnrichmentSource for AlwaysFailsSource {
        async fn lookup(&self, _artist: &str, _title: &str) -> Result<EnrichmentLookup> {
            Err(match &self.0 {
                Error::Library(LibraryError::NotFound(m)) => Error::Library(LibraryError::NotFound(m.clone())),
                Error::Library(LibraryError::RateLimited { retry_after_ms }) => {
                    Error::Library(LibraryError::RateLimited {
                        retry_after_ms: *retry_after_ms,
                    })
                }
                Error::Library(LibraryError::Unreachable(m)) => Error::Library(LibraryError::Unreachable(m.clone())),
                other => Error::Llm(other.to_string()),
            })
        }
    }

    #[test]
    fn classify_treats_auth_and_not_found_as_permanent() {
        assert_eq!(
            Enricher::classify(&Error::Library(LibraryError::NotFound("x".into()))),
            LookupOutcome::Permanent
        );
        assert_eq!(
            Enricher::classify(&Error::Library(LibraryError::AuthFailure("x".into()))),
            LookupOutcome::Permanent
        );
    }

    #[test]
    fn classify_converts_rate_limited_ms_to_seconds() {
        let outcome = Enricher::classify(&Error::Library(LibraryError::RateLimited { retry_after_ms: 4000 }));
        assert_eq!(outcome, LookupOutcome::RateLimited { retry_after_secs: Some(4) });
    }

    #[test]
    fn classify_treats_unreachable_as_transient() {
        assert_eq!(
            Enricher::classify(&Error::Library(LibraryError::Unreachable("x".into()))),
            LookupOutcome::Transient
        );
    }

    #[tokio::test]
    async fn a_permanent_lookup_failure_does_not_retry_and_falls_back_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(dir.path().join("cache")).unwrap();
        let log = DecisionLogger::new(dir.path().join("logs")).unwrap();
        let library = InMemoryLibrary::new(vec![]);
        let source = AlwaysFailsSource(Error::Library(LibraryError::NotFound("no match".into())));
        let enricher = Enricher::new(&cache, &source, &library, &log);

        let enriched = enricher.enrich(Uuid::new_v4(), sample_track()).await.unwrap();
        // enrich() never propagates a single-track metadata failure; the
        // track comes back with its fields still unset.
        assert_eq!(enriched.bpm, None);
        assert!(cache.get("Artist", "Song").unwrap().is_none());
    }

    fn sample_track() -> LibraryTrack {
        LibraryTrack {
            id: "t1".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            album: "Album".into(),
            duration_seconds: 200,
            is_australian: true,
            rotation_category: RotationCategory::Medium,
            bpm: None,
            genre: None,
            year: None,
            country: None,
            metadata_source: None,
            audio_ref: None,
        }
    }

    #[tokio::test]
    async fn caches_after_first_web_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(dir.path().join("cache")).unwrap();
        let log = DecisionLogger::new(dir.path().join("logs")).unwrap();
        let library = InMemoryLibrary::new(vec![]);
        let source = AlwaysFindsSource;
        let enricher = Enricher::new(&cache, &source, &library, &log);

        let playlist_id = Uuid::new_v4();
        let enriched = enricher.enrich(playlist_id, sample_track()).await.unwrap();
        assert_eq!(enriched.bpm, Some(120.0));

        let cached = cache.get("Artist", "Song").unwrap().unwrap();
        assert_eq!(cached.bpm, Some(120.0));
    }

    #[tokio::test]
    async fn already_complete_track_skips_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::new(dir.path().join("cache")).unwrap();
        let log = DecisionLogger::new(dir.path().join("logs")).unwrap();
        let library = InMemoryLibrary::new(vec![]);
        let source = AlwaysFindsSource;
        let enricher = Enricher::new(&cache, &source, &library, &log);

        let mut track = sample_track();
        track.bpm = Some(99.0);
        track.genre = Some("Pop".into());
        track.year = Some(2019);
        track.country = Some("US".into());

        let enriched = enricher.enrich(Uuid::new_v4(), track).await.unwrap();
        assert_eq!(enriched.bpm, Some(99.0));
        assert!(cache.get("Artist", "Song").unwrap().is_none());
    }
}
