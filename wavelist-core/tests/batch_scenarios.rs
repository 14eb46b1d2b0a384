//! End-to-end batch-coordinator scenarios exercising the parser,
//! selector, relaxer, budget manager, lock, and decision log together,
//! the way a single `run_batch` call actually wires them.

use chrono::NaiveDate;
use serde_json::json;
use wavelist_common::config::{AllocationStrategy, BudgetMode};
use wavelist_common::model::{LibraryTrack, MetadataSource, RotationCategory};
use wavelist_common::Usd;
use wavelist_core::batch::{run_batch, BatchConfig};
use wavelist_core::decision_log::DecisionLogger;
use wavelist_core::enrich::NoEnrichmentSource;
use wavelist_core::error::Error;
use wavelist_core::library::InMemoryLibrary;
use wavelist_core::lock::DocumentLock;
use wavelist_core::selector::llm::{ApproximateTokenCounter, LlmTurn, ScriptedLlmClient};

const WEEKDAY_DOC: &str = r#"# Station Programming

**Australian Content**: 30% minimum

## Monday Programming

### Morning

**Time**: 06:00 - 08:00
**Tracks per Hour**: 2
**BPM Progression**:
- 06:00-08:00: 90-115 BPM
**Genre Mix**:
- Rock: 60%
- Pop: 40%
**Era Distribution**:
- Current: 100%
**Australian Content**: 30%
"#;

const TWO_DAYPART_DOC: &str = r#"# Station Programming

**Australian Content**: 30% minimum

## Monday Programming

### Morning

**Time**: 06:00 - 08:00
**Tracks per Hour**: 2
**BPM Progression**:
- 06:00-08:00: 90-115 BPM
**Genre Mix**:
- Rock: 60%
- Pop: 40%
**Era Distribution**:
- Current: 100%
**Australian Content**: 30%

### Afternoon

**Time**: 08:00 - 10:00
**Tracks per Hour**: 2
**BPM Progression**:
- 08:00-10:00: 90-115 BPM
**Genre Mix**:
- Rock: 60%
- Pop: 40%
**Era Distribution**:
- Current: 100%
**Australian Content**: 30%
"#;

// A known Monday, so `ScheduleTag::Weekday` matches it.
fn generation_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn write_doc(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("weekday.md");
    std::fs::write(&path, contents).unwrap();
    path
}

fn track(id: &str, genre: &str, australian: bool) -> LibraryTrack {
    LibraryTrack {
        id: id.to_string(),
        title: format!("Track {id}"),
        artist: "Some Artist".to_string(),
        album: "Some Album".to_string(),
        duration_seconds: 210,
        is_australian: australian,
        rotation_category: RotationCategory::Medium,
        bpm: Some(100.0),
        genre: Some(genre.to_string()),
        year: Some(2023),
        country: if australian { Some("AU".to_string()) } else { None },
        metadata_source: Some(MetadataSource::Library),
        audio_ref: None,
    }
}

fn sample_library() -> InMemoryLibrary {
    InMemoryLibrary::new(vec![
        track("t1", "Rock", true),
        track("t2", "Rock", true),
        track("t3", "Pop", false),
        track("t4", "Pop", false),
        track("t5", "Rock", false),
        track("t6", "Pop", false),
    ])
}

fn final_answer(ids: &[&str]) -> LlmTurn {
    let answers: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "track_id": id,
                "title": format!("Track {id}"),
                "artist": "Some Artist",
                "reason": "fits the morning energy curve and genre mix for this daypart nicely",
            })
        })
        .collect();
    LlmTurn::FinalAnswer(serde_json::to_string(&answers).unwrap())
}

fn config(
    document_path: std::path::PathBuf,
    decision_log_dir: std::path::PathBuf,
    total_budget: Option<Usd>,
    budget_mode: BudgetMode,
) -> BatchConfig {
    let metadata_cache_dir = decision_log_dir
        .parent()
        .unwrap_or(&decision_log_dir)
        .join("metadata-cache");
    BatchConfig {
        document_path,
        generation_date: generation_date(),
        total_budget,
        budget_mode,
        allocation_strategy: AllocationStrategy::Equal,
        decision_log_dir,
        metadata_cache_dir,
    }
}

#[tokio::test]
async fn happy_path_produces_a_full_playlist_with_no_relaxations() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = write_doc(dir.path(), WEEKDAY_DOC);
    let log_dir = dir.path().join("decisions");

    let library = sample_library();
    let llm = ScriptedLlmClient::new(vec![final_answer(&["t1", "t2", "t3", "t4"])]);
    let tokens = ApproximateTokenCounter;

    let cfg = config(doc_path, log_dir, None, BudgetMode::Suggested);
    let playlists = run_batch(&library, &llm, &tokens, &NoEnrichmentSource, cfg).await.unwrap();

    assert_eq!(playlists.len(), 1);
    let playlist = &playlists[0];
    assert_eq!(playlist.tracks.len(), 4);
    assert!(playlist.relaxations.is_empty());
}

#[tokio::test]
async fn insufficient_tracks_trigger_one_bpm_relaxation_then_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = write_doc(dir.path(), WEEKDAY_DOC);
    let log_dir = dir.path().join("decisions");

    let library = sample_library();
    // First attempt returns only 2 tracks (needed: 4), so the ladder's
    // first step (BPM +/-10) runs and the retry supplies enough.
    let llm = ScriptedLlmClient::new(vec![
        final_answer(&["t1", "t2"]),
        final_answer(&["t1", "t2", "t3", "t4"]),
    ]);
    let tokens = ApproximateTokenCounter;

    let cfg = config(doc_path, log_dir, None, BudgetMode::Suggested);
    let playlists = run_batch(&library, &llm, &tokens, &NoEnrichmentSource, cfg).await.unwrap();

    assert_eq!(playlists.len(), 1);
    let playlist = &playlists[0];
    assert_eq!(playlist.tracks.len(), 4);
    assert_eq!(playlist.relaxations.len(), 1);
    assert_eq!(playlist.relaxations[0].step, 1);
}

#[tokio::test]
async fn hard_budget_cap_stops_the_batch_with_budget_exceeded() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = write_doc(dir.path(), TWO_DAYPART_DOC);
    let log_dir = dir.path().join("decisions");

    let library = sample_library();
    // No turns queued: a zero budget refuses the very first reservation
    // before the scripted client is ever asked for one.
    let llm = ScriptedLlmClient::new(vec![]);
    let tokens = ApproximateTokenCounter;

    let cfg = config(doc_path, log_dir.clone(), Some(Usd::ZERO), BudgetMode::Hard);
    let playlists = run_batch(&library, &llm, &tokens, &NoEnrichmentSource, cfg).await.unwrap();

    // The batch coordinator never aborts the whole run on a daypart
    // failure; in Hard mode it stops scheduling further dayparts once the
    // shared budget pool is exhausted, so only the first daypart's
    // (empty, failed) playlist is produced even though the document
    // schedules two.
    assert_eq!(playlists.len(), 1);
    let playlist = &playlists[0];
    assert!(playlist.tracks.is_empty());

    let log = DecisionLogger::new(&log_dir).unwrap();
    let entries = log.read(playlist.spec_id).unwrap();
    let error_entry = entries
        .iter()
        .find(|e| e.decision_data["error_type"] == "BudgetExceeded")
        .expect("expected a BudgetExceeded decision log entry");
    assert_eq!(error_entry.decision_data["error_type"], "BudgetExceeded");
}

#[tokio::test]
async fn malformed_llm_output_is_logged_as_an_llm_error() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = write_doc(dir.path(), WEEKDAY_DOC);
    let log_dir = dir.path().join("decisions");

    let library = sample_library();
    // Two consecutive malformed final answers exhaust the single retry
    // the selector allows per attempt.
    let llm = ScriptedLlmClient::new(vec![
        LlmTurn::FinalAnswer("not valid json at all".to_string()),
        LlmTurn::FinalAnswer("still not valid json".to_string()),
    ]);
    let tokens = ApproximateTokenCounter;

    let cfg = config(doc_path, log_dir.clone(), None, BudgetMode::Suggested);
    let playlists = run_batch(&library, &llm, &tokens, &NoEnrichmentSource, cfg).await.unwrap();

    assert_eq!(playlists.len(), 1);
    let playlist = &playlists[0];
    assert!(playlist.tracks.is_empty());

    let log = DecisionLogger::new(&log_dir).unwrap();
    let entries = log.read(playlist.spec_id).unwrap();
    let error_entry = entries
        .iter()
        .find(|e| e.decision_data["error_type"] == "LLMError")
        .expect("expected an LLMError decision log entry");
    assert_eq!(error_entry.decision_data["error_type"], "LLMError");
}

#[tokio::test]
async fn a_second_batch_run_fails_fast_while_the_first_holds_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = write_doc(dir.path(), WEEKDAY_DOC);
    let log_dir = dir.path().join("decisions");

    // Hold the document lock exactly the way a concurrent `run_batch`
    // call already in progress would.
    let _held = DocumentLock::acquire(&doc_path).unwrap();

    let library = sample_library();
    let llm = ScriptedLlmClient::new(vec![final_answer(&["t1", "t2", "t3", "t4"])]);
    let tokens = ApproximateTokenCounter;

    let cfg = config(doc_path, log_dir, None, BudgetMode::Suggested);
    let err = run_batch(&library, &llm, &tokens, &NoEnrichmentSource, cfg).await.unwrap_err();

    assert!(matches!(err, Error::LockBusy(_)));
    assert_eq!(err.error_type(), "LockBusy");
}

#[tokio::test]
async fn unknown_tracks_in_the_final_answer_are_silently_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = write_doc(dir.path(), WEEKDAY_DOC);
    let log_dir = dir.path().join("decisions");

    let library = sample_library();
    // "ghost" isn't in the library; score_and_build looks it up via
    // track_info and skips it rather than failing the whole attempt.
    let llm = ScriptedLlmClient::new(vec![
        final_answer(&["t1", "t2", "ghost", "t3", "t4"]),
    ]);
    let tokens = ApproximateTokenCounter;

    let cfg = config(doc_path, log_dir, None, BudgetMode::Suggested);
    let playlists = run_batch(&library, &llm, &tokens, &NoEnrichmentSource, cfg).await.unwrap();

    assert_eq!(playlists.len(), 1);
    assert_eq!(playlists[0].tracks.len(), 4);
    assert!(playlists[0].tracks.iter().all(|t| t.track_id != "ghost"));
}

#[tokio::test]
async fn empty_schedule_for_the_requested_date_yields_no_playlists() {
    let dir = tempfile::tempdir().unwrap();
    // Only a Monday Programming section; a Saturday generation date has
    // nothing scheduled for it.
    let doc_path = write_doc(dir.path(), WEEKDAY_DOC);
    let log_dir = dir.path().join("decisions");

    let library = sample_library();
    let llm = ScriptedLlmClient::new(vec![]);
    let tokens = ApproximateTokenCounter;

    let mut cfg = config(doc_path, log_dir, None, BudgetMode::Suggested);
    cfg.generation_date = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(); // a Saturday

    let playlists = run_batch(&library, &llm, &tokens, &NoEnrichmentSource, cfg).await.unwrap();
    assert!(playlists.is_empty());
}
