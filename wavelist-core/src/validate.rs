//! Validator (§4.7): scores a finished playlist's constraint compliance
//! and flow quality against the criteria it was selected against.

use crate::decision_log::DecisionLogger;
use crate::error::Result;
use serde_json::json;
use std::collections::HashMap;
use wavelist_common::model::{
    ConstraintScore, DecisionType, FlowQualityMetrics, Playlist, SelectedTrack, TrackSelectionCriteria,
    ValidationResult, ValidationStatus,
};
use wavelist_common::Usd;

/// A heuristic per-track "energy" proxy derived from BPM alone, since no
/// separate loudness/energy field exists on `LibraryTrack`/`SelectedTrack`.
/// Normalised against the library-wide BPM band used elsewhere (60-200).
fn heuristic_energy(track: &SelectedTrack) -> f64 {
    let bpm = track.bpm.unwrap_or(100.0);
    ((bpm - 60.0) / 140.0).clamp(0.0, 1.0)
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Normalised Shannon entropy over the genre distribution actually
/// present in the playlist: `-sum(p * ln(p)) / ln(n)`, 1.0 when every
/// represented genre appears equally often, 0 when there is exactly one
/// distinct genre (or none).
fn genre_diversity_index(tracks: &[SelectedTrack]) -> f64 {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for t in tracks {
        if let Some(g) = t.genre.as_deref() {
            *counts.entry(g).or_default() += 1;
        }
    }
    let n = counts.len();
    if n <= 1 {
        return 0.0;
    }
    let total = tracks.len() as f64;
    let entropy: f64 = counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.ln()
        })
        .sum();
    entropy / (n as f64).ln()
}

/// BPM progression coherence (§4.7): the fraction of consecutive track
/// pairs whose BPM difference is <= 15 AND whose midpoint BPM falls
/// inside the scheduled sub-window's range for that position.
fn bpm_progression_coherence(tracks: &[SelectedTrack], criteria: &TrackSelectionCriteria) -> f64 {
    if tracks.len() < 2 {
        return 1.0;
    }
    let mut coherent = 0usize;
    let pairs = tracks.len() - 1;
    for i in 0..pairs {
        let a = tracks[i].bpm.unwrap_or(0.0);
        let b = tracks[i + 1].bpm.unwrap_or(0.0);
        let midpoint = (a + b) / 2.0;
        let close_enough = (a - b).abs() <= 15.0;
        let in_range = criteria
            .bpm_ranges
            .iter()
            .any(|r| r.contains_bpm(midpoint));
        if close_enough && in_range {
            coherent += 1;
        }
    }
    coherent as f64 / pairs as f64
}

fn flow_quality(tracks: &[SelectedTrack], criteria: &TrackSelectionCriteria) -> FlowQualityMetrics {
    let bpms: Vec<f64> = tracks.iter().filter_map(|t| t.bpm).collect();
    let energies: Vec<f64> = tracks.iter().map(heuristic_energy).collect();
    FlowQualityMetrics {
        bpm_stddev: stddev(&bpms),
        bpm_progression_coherence: bpm_progression_coherence(tracks, criteria),
        energy_consistency: (1.0 - variance(&energies)).max(0.0),
        genre_diversity_index: genre_diversity_index(tracks),
    }
}

fn score_fraction(label: &str, target: f64, tolerance: f64, actual: f64) -> (String, ConstraintScore) {
    let is_compliant = (actual - target).abs() <= tolerance;
    (
        label.to_string(),
        ConstraintScore {
            target,
            actual,
            tolerance,
            is_compliant,
        },
    )
}

/// Score `playlist.tracks` against `criteria`, producing the
/// `ValidationResult` spec §4.7 and §3 describe, and log a
/// `Validation` decision entry recording the outcome.
pub fn validate(log: &DecisionLogger, playlist: &Playlist, criteria: &TrackSelectionCriteria) -> Result<ValidationResult> {
    let total = playlist.tracks.len().max(1) as f64;
    let mut scores = HashMap::new();

    for (genre, criterion) in &criteria.genre_criteria {
        let actual = playlist
            .tracks
            .iter()
            .filter(|t| t.genre.as_deref() == Some(genre.as_str()))
            .count() as f64
            / total;
        let (key, score) = score_fraction(
            &format!("genre:{genre}"),
            criterion.target,
            criterion.tolerance,
            actual,
        );
        scores.insert(key, score);
    }

    for (era, criterion) in &criteria.era_criteria {
        let actual = playlist
            .tracks
            .iter()
            .filter(|t| t.year.is_some_and(|y| criterion.contains_year(y)))
            .count() as f64
            / total;
        let (key, score) = score_fraction(
            &format!("era:{era}"),
            criterion.target,
            criterion.tolerance,
            actual,
        );
        scores.insert(key, score);
    }

    for (category, target) in &criteria.rotation_distribution {
        let actual = playlist
            .tracks
            .iter()
            .filter(|t| t.rotation_category == *category)
            .count() as f64
            / total;
        let (key, score) = score_fraction(
            &format!("rotation:{category:?}"),
            *target,
            criteria.tolerances.genre_percent,
            actual,
        );
        scores.insert(key, score);
    }

    let australian_actual = playlist.fraction_australian();
    let australian_compliant = australian_actual >= criteria.australian_minimum;
    scores.insert(
        "australian_content".to_string(),
        ConstraintScore {
            target: criteria.australian_minimum,
            actual: australian_actual,
            tolerance: 0.0,
            is_compliant: australian_compliant,
        },
    );

    let compliant_count = scores.values().filter(|s| s.is_compliant).count();
    let total_count = scores.len().max(1);
    let p = compliant_count as f64 / total_count as f64;

    let soft_non_compliant = scores
        .iter()
        .filter(|(k, s)| k.as_str() != "australian_content" && !s.is_compliant)
        .count();

    let status = if p >= 0.95 && australian_compliant {
        ValidationStatus::Pass
    } else if (0.80..0.95).contains(&p) || (australian_compliant && soft_non_compliant == 1) {
        ValidationStatus::Warning
    } else {
        ValidationStatus::Fail
    };

    let gap_analysis = scores
        .iter()
        .filter(|(_, s)| !s.is_compliant)
        .map(|(label, s)| {
            let direction = if s.actual < s.target { "below" } else { "above" };
            format!(
                "{label}: target {:.3}, actual {:.3} ({direction} target by {:.3})",
                s.target,
                s.actual,
                (s.actual - s.target).abs()
            )
        })
        .collect();

    let result = ValidationResult {
        playlist_id: playlist.id,
        status,
        scores,
        flow_quality: flow_quality(&playlist.tracks, criteria),
        compliance_percentage: p,
        validated_at: chrono::Utc::now(),
        gap_analysis,
    };

    log.record(
        playlist.spec_id,
        DecisionType::Validation,
        json!({
            "status": format!("{:?}", result.status),
            "compliance_percentage": result.compliance_percentage,
        }),
        Usd::ZERO,
        0,
    )?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavelist_common::model::{RotationCategory, ValidationResult as VR};
    use wavelist_common::Usd;

    fn sample_track(genre: &str, year: i32, bpm: f64, australian: bool) -> SelectedTrack {
        SelectedTrack {
            track_id: uuid::Uuid::new_v4().to_string(),
            title: "t".into(),
            artist: "a".into(),
            album: "al".into(),
            duration_seconds: 200,
            is_australian: australian,
            rotation_category: RotationCategory::Medium,
            position_in_playlist: 0,
            selection_reasoning: "x".repeat(60),
            validation_status: ValidationStatus::Pass,
            bpm: Some(bpm),
            genre: Some(genre.to_string()),
            year: Some(year),
            country: None,
            metadata_source: None,
        }
    }

    fn dummy_result() -> VR {
        ValidationResult {
            playlist_id: uuid::Uuid::new_v4(),
            status: ValidationStatus::Pass,
            scores: HashMap::new(),
            flow_quality: FlowQualityMetrics {
                bpm_stddev: 0.0,
                bpm_progression_coherence: 1.0,
                energy_consistency: 1.0,
                genre_diversity_index: 1.0,
            },
            compliance_percentage: 1.0,
            validated_at: chrono::Utc::now(),
            gap_analysis: vec![],
        }
    }

    #[test]
    fn australian_floor_is_a_lower_bound_not_a_band() {
        let mut criteria_genre = HashMap::new();
        criteria_genre.insert(
            "Alt".to_string(),
            wavelist_common::model::GenreCriterion {
                target: 1.0,
                tolerance: 0.1,
            },
        );
        let criteria = TrackSelectionCriteria {
            bpm_ranges: vec![],
            genre_criteria: criteria_genre,
            era_criteria: HashMap::new(),
            australian_minimum: 0.30,
            mood_includes: vec![],
            mood_excludes: vec![],
            rotation_distribution: HashMap::new(),
            no_repeat_window_hours: 4.0,
            tolerances: Default::default(),
            specialty_tag: None,
        };
        let tracks = vec![
            sample_track("Alt", 2024, 110.0, true),
            sample_track("Alt", 2024, 112.0, false),
            sample_track("Alt", 2024, 108.0, false),
        ];
        let playlist = Playlist {
            id: uuid::Uuid::new_v4(),
            name: "p".into(),
            spec_id: uuid::Uuid::new_v4(),
            tracks,
            validation: dummy_result(),
            created_at: chrono::Utc::now(),
            cost_actual: Usd::ZERO,
            generation_time_seconds: 1.0,
            relaxations: vec![],
        };
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLogger::new(dir.path()).unwrap();
        let result = validate(&log, &playlist, &criteria).unwrap();
        let aus = &result.scores["australian_content"];
        assert!(!aus.is_compliant);
        assert_eq!(aus.tolerance, 0.0);
    }

    #[test]
    fn genre_diversity_is_zero_for_a_single_genre() {
        let tracks = vec![
            sample_track("Alt", 2024, 110.0, true),
            sample_track("Alt", 2020, 112.0, true),
        ];
        assert_eq!(genre_diversity_index(&tracks), 0.0);
    }
}
