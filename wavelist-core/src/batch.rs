//! Batch Coordinator (spec §4.8): locks the document, allocates budget
//! across the dayparts scheduled for a given date, runs the
//! relaxer-wrapped selector and validator per daypart, prevents
//! cross-playlist track reuse, and aggregates results without ever
//! letting a single daypart's failure abort the batch.

use crate::budget::BudgetManager;
use crate::decision_log::DecisionLogger;
use crate::enrich::{Enricher, MetadataCache, MetadataEnrichmentSource};
use crate::error::{Error, Result};
use crate::library::LibraryAccessor;
use crate::lock::DocumentLock;
use crate::relax::select_with_relaxation;
use crate::selector::llm::{LlmClient, TokenCounter};
use crate::selector::{Selector, SelectorConfig};
use crate::{parser, validate};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use uuid::Uuid;
use wavelist_common::config::{AllocationStrategy, BudgetMode};
use wavelist_common::model::{
    DaypartSpecification, DecisionType, EraCriterion, EraTable, FlowQualityMetrics, GenreCriterion,
    Playlist, ToleranceKnobs, TrackSelectionCriteria, ValidationResult, ValidationStatus,
};
use wavelist_common::Usd;

pub struct BatchConfig {
    pub document_path: PathBuf,
    pub generation_date: chrono::NaiveDate,
    pub total_budget: Option<Usd>,
    pub budget_mode: BudgetMode,
    pub allocation_strategy: AllocationStrategy,
    pub decision_log_dir: PathBuf,
    pub metadata_cache_dir: PathBuf,
}

/// Derive the `TrackSelectionCriteria` for one daypart at the given
/// generation date (spec §3 "Track Selection Criteria").
fn derive_criteria(daypart: &DaypartSpecification, reference_year: i32) -> TrackSelectionCriteria {
    let era_table = EraTable::default();
    let era_criteria = daypart
        .era_distribution
        .iter()
        .map(|(label, target)| {
            let (min_year, max_year) = era_table.resolve(label, reference_year);
            (
                label.clone(),
                EraCriterion {
                    min_year,
                    max_year,
                    target: *target,
                    tolerance: 0.10,
                },
            )
        })
        .collect();

    let genre_criteria = daypart
        .genre_mix
        .iter()
        .map(|(genre, target)| {
            (
                genre.clone(),
                GenreCriterion {
                    target: *target,
                    tolerance: 0.10,
                },
            )
        })
        .collect();

    TrackSelectionCriteria {
        bpm_ranges: daypart.bpm_progression.clone(),
        genre_criteria,
        era_criteria,
        australian_minimum: daypart.australian_minimum,
        mood_includes: daypart.mood_includes.clone(),
        mood_excludes: daypart.mood_excludes.clone(),
        rotation_distribution: daypart.rotation_mix.clone(),
        no_repeat_window_hours: daypart.duration_hours(),
        tolerances: ToleranceKnobs::default(),
        specialty_tag: daypart.specialty.as_ref().map(|s| s.tag.clone()),
    }
}

/// Spec §4.3 dynamic weight formula: duration (x1) + distinct target
/// genres (x0.3) + BPM sub-windows (x0.2) + 0.5 if a specialty
/// constraint is present. Scaled by 100 and rounded so it can reuse the
/// integer-weighted allocator.
fn dynamic_weight(daypart: &DaypartSpecification) -> u32 {
    let mut weight = daypart.duration_hours();
    weight += daypart.genre_mix.len() as f64 * 0.3;
    weight += daypart.bpm_progression.len() as f64 * 0.2;
    if daypart.specialty.is_some() {
        weight += 0.5;
    }
    (weight * 100.0).round().max(1.0) as u32
}

fn compute_weights(dayparts: &[&DaypartSpecification], strategy: AllocationStrategy) -> Vec<u32> {
    match strategy {
        AllocationStrategy::Dynamic => dayparts.iter().map(|d| dynamic_weight(d)).collect(),
        AllocationStrategy::Equal | AllocationStrategy::Weighted => vec![1; dayparts.len()],
    }
}

fn min_max_tracks(daypart: &DaypartSpecification) -> (usize, usize) {
    let hours = daypart.duration_hours();
    let (min_tph, max_tph) = daypart.tracks_per_hour;
    (
        (hours * min_tph as f64).round().max(1.0) as usize,
        (hours * max_tph as f64).round().max(1.0) as usize,
    )
}

fn empty_validation(reason: &str) -> ValidationResult {
    ValidationResult {
        playlist_id: Uuid::new_v4(),
        status: ValidationStatus::Fail,
        scores: Default::default(),
        flow_quality: FlowQualityMetrics {
            bpm_stddev: 0.0,
            bpm_progression_coherence: 0.0,
            energy_consistency: 0.0,
            genre_diversity_index: 0.0,
        },
        compliance_percentage: 0.0,
        validated_at: chrono::Utc::now(),
        gap_analysis: vec![reason.to_string()],
    }
}

fn empty_playlist(spec_id: Uuid, name: String, reason: &str) -> Playlist {
    Playlist {
        id: Uuid::new_v4(),
        name,
        spec_id,
        tracks: vec![],
        validation: empty_validation(reason),
        created_at: chrono::Utc::now(),
        cost_actual: Usd::ZERO,
        generation_time_seconds: 0.0,
        relaxations: vec![],
    }
}

/// Run a full batch: one Playlist per daypart scheduled for
/// `config.generation_date`.
pub async fn run_batch(
    library: &dyn LibraryAccessor,
    llm: &dyn LlmClient,
    tokens: &dyn TokenCounter,
    enrichment_source: &dyn MetadataEnrichmentSource,
    config: BatchConfig,
) -> Result<Vec<Playlist>> {
    let document = parser::load(&config.document_path)?;
    let _lock = DocumentLock::acquire(&config.document_path)?;
    let log = DecisionLogger::new(&config.decision_log_dir)?;
    let budget = BudgetManager::new(config.budget_mode, config.total_budget);
    let metadata_cache = MetadataCache::new(&config.metadata_cache_dir)?;

    let dayparts = document.dayparts_for_date(config.generation_date);
    if dayparts.is_empty() {
        return Ok(Vec::new());
    }

    let weights = compute_weights(&dayparts, config.allocation_strategy);

    let reference_year: i32 = config
        .generation_date
        .format("%Y")
        .to_string()
        .parse()
        .unwrap_or(2026);
    let mut used_track_ids: HashSet<String> = HashSet::new();
    let mut playlists = Vec::new();

    for (idx, daypart) in dayparts.iter().enumerate() {
        let started = std::time::Instant::now();
        let criteria = derive_criteria(daypart, reference_year);
        let (min_tracks, max_tracks) = min_max_tracks(daypart);
        let spec_id = Uuid::new_v4();
        let name = format!("{} - {}", daypart.name, config.generation_date);
        // Re-derived from whatever is left of the shared pool after prior
        // dayparts' actual spend, not a static up-front split, so an early
        // daypart that under- or overspends its nominal share leaves the
        // rest for its siblings. Reporting only: enforcement is against
        // the shared remaining total, so an early daypart overrunning its
        // own share doesn't fail until the shared pool itself is exhausted.
        let daypart_allocation = budget
            .total()
            .map(|_| budget.reallocate_remaining(AllocationStrategy::Weighted, &weights[idx..]));
        if let Some(amount) = daypart_allocation.and_then(|a| a.first().map(|a| a.amount)) {
            tracing::debug!(daypart = %daypart.name, allocation = %amount, "allocated daypart budget share");
        }

        let selector = Selector::new(library, llm, tokens, &budget, &log);
        let daypart_name = daypart.name.clone();
        let exclude_ids = used_track_ids.clone();
        let selection = select_with_relaxation(spec_id, &log, &criteria, min_tracks, |relaxed_criteria| {
            let selector = &selector;
            let daypart_name = daypart_name.clone();
            let exclude_ids = exclude_ids.clone();
            async move {
                selector
                    .select(
                        spec_id,
                        &daypart_name,
                        &relaxed_criteria,
                        min_tracks,
                        max_tracks,
                        SelectorConfig {
                            exclude_track_ids: exclude_ids,
                            ..Default::default()
                        },
                    )
                    .await
            }
        })
        .await;

        let playlist = match selection {
            Ok((mut tracks, cost, relaxations)) => {
                for t in &tracks {
                    used_track_ids.insert(t.track_id.clone());
                }
                tracks.sort_by_key(|t| t.position_in_playlist);

                let enricher = Enricher::new(&metadata_cache, enrichment_source, library, &log);
                for track in &mut tracks {
                    enricher.enrich_selected(spec_id, track).await?;
                }

                let mut playlist = Playlist {
                    id: Uuid::new_v4(),
                    name: name.clone(),
                    spec_id,
                    tracks,
                    validation: empty_validation("pending"),
                    created_at: chrono::Utc::now(),
                    cost_actual: cost,
                    generation_time_seconds: started.elapsed().as_secs_f64(),
                    relaxations,
                };
                playlist.validation = validate::validate(&log, &playlist, &criteria)?;
                playlist
            }
            Err(Error::BudgetExceeded { requested, remaining }) => {
                log.record(
                    spec_id,
                    DecisionType::Error,
                    json!({
                        "error_type": "BudgetExceeded",
                        "requested": requested.to_string(),
                        "remaining": remaining.to_string(),
                    }),
                    Usd::ZERO,
                    started.elapsed().as_millis() as u64,
                )?;
                let playlist = empty_playlist(spec_id, name.clone(), "budget exceeded in hard mode");
                if budget.mode() == BudgetMode::Hard {
                    playlists.push(playlist);
                    break;
                }
                playlist
            }
            Err(e) => {
                log.record(
                    spec_id,
                    DecisionType::Error,
                    json!({"error_type": e.error_type(), "message": e.to_string()}),
                    Usd::ZERO,
                    started.elapsed().as_millis() as u64,
                )?;
                empty_playlist(spec_id, name.clone(), &e.to_string())
            }
        };

        playlists.push(playlist);
    }

    Ok(playlists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wavelist_common::model::{ScheduleTag, SpecialtyConstraint, TimeWindow};

    fn time(h: u32, m: u32) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sample_daypart() -> DaypartSpecification {
        let window = TimeWindow::new(time(6, 0), time(8, 0)).unwrap();
        DaypartSpecification {
            id: Uuid::new_v4(),
            name: "Morning".to_string(),
            schedule_tag: ScheduleTag::Weekday,
            window,
            target_demographic: String::new(),
            bpm_progression: vec![wavelist_common::model::BpmRange::new(window, 90, 115).unwrap()],
            genre_mix: HashMap::from([("Rock".to_string(), 0.6), ("Pop".to_string(), 0.4)]),
            era_distribution: HashMap::from([("Current".to_string(), 1.0)]),
            mood_includes: vec![],
            mood_excludes: vec![],
            rotation_mix: HashMap::new(),
            tracks_per_hour: (2, 2),
            australian_minimum: 0.30,
            specialty: None,
        }
    }

    #[test]
    fn min_max_tracks_scales_with_duration_and_rate() {
        let daypart = sample_daypart();
        assert_eq!(min_max_tracks(&daypart), (4, 4));
    }

    #[test]
    fn min_max_tracks_never_rounds_down_to_zero() {
        let mut daypart = sample_daypart();
        daypart.window = TimeWindow::new(time(6, 0), time(6, 10)).unwrap();
        daypart.tracks_per_hour = (1, 1);
        let (min, max) = min_max_tracks(&daypart);
        assert_eq!(min, 1);
        assert_eq!(max, 1);
    }

    #[test]
    fn dynamic_weight_accounts_for_duration_genres_bpm_and_specialty() {
        let mut daypart = sample_daypart();
        // 2h duration + 2 genres*0.3 + 1 bpm window*0.2 = 2.8 -> 280
        assert_eq!(dynamic_weight(&daypart), 280);

        daypart.specialty = Some(SpecialtyConstraint {
            tag: "australian".to_string(),
            params: serde_json::Value::Null,
        });
        assert_eq!(dynamic_weight(&daypart), 330);
    }

    #[test]
    fn compute_weights_is_uniform_outside_dynamic_strategy() {
        let daypart = sample_daypart();
        let dayparts = vec![&daypart, &daypart];
        assert_eq!(
            compute_weights(&dayparts, AllocationStrategy::Equal),
            vec![1, 1]
        );
        assert_eq!(
            compute_weights(&dayparts, AllocationStrategy::Weighted),
            vec![1, 1]
        );
    }

    #[test]
    fn compute_weights_uses_dynamic_weight_per_daypart() {
        let daypart = sample_daypart();
        let dayparts = vec![&daypart, &daypart];
        assert_eq!(
            compute_weights(&dayparts, AllocationStrategy::Dynamic),
            vec![280, 280]
        );
    }

    #[test]
    fn derive_criteria_resolves_era_and_keeps_no_repeat_window_at_duration() {
        let daypart = sample_daypart();
        let criteria = derive_criteria(&daypart, 2024);
        let current = &criteria.era_criteria["Current"];
        assert_eq!((current.min_year, current.max_year), (2022, 2024));
        assert_eq!(criteria.no_repeat_window_hours, 2.0);
    }
}
