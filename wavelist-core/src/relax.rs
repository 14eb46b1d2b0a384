//! Constraint Relaxer (§4.6): a fixed, ordered, never-heuristic ladder
//! of soft-constraint widenings tried in sequence until the selector
//! returns at least `target_min` tracks, or the ladder is exhausted.
//!
//! The Australian-content minimum and the no-repeat window are never
//! touched by any step; they simply never appear in the mutations below.

use crate::decision_log::DecisionLogger;
use crate::error::{Error, Result};
use serde_json::json;
use std::future::Future;
use uuid::Uuid;
use wavelist_common::model::{
    ConstraintRelaxation, DecisionType, GenreCriterion, RelaxedConstraintType, SelectedTrack,
    TrackSelectionCriteria,
};
use wavelist_common::Usd;

const BPM_WIDEN_STEP_1: u16 = 10;
const BPM_WIDEN_STEP_2: u16 = 15;
const GENRE_TOLERANCE_STEP_3: f64 = 0.20;
const ERA_TOLERANCE_STEP_4: f64 = 0.20;

fn widen_bpm(criteria: &mut TrackSelectionCriteria, by: u16) -> (String, String) {
    let original = format!("{:?}", criteria.bpm_ranges);
    criteria.bpm_ranges = criteria.bpm_ranges.iter().map(|r| r.widen(by)).collect();
    (original, format!("{:?}", criteria.bpm_ranges))
}

fn widen_genre_tolerance(criteria: &mut TrackSelectionCriteria, tolerance: f64) -> (String, String) {
    let original = format!("{:?}", criteria.genre_criteria);
    for criterion in criteria.genre_criteria.values_mut() {
        criterion.tolerance = tolerance;
    }
    (original, format!("{:?}", criteria.genre_criteria))
}

fn widen_era_tolerance(criteria: &mut TrackSelectionCriteria, tolerance: f64) -> (String, String) {
    let original = format!("{:?}", criteria.era_criteria);
    for criterion in criteria.era_criteria.values_mut() {
        criterion.tolerance = tolerance;
    }
    (original, format!("{:?}", criteria.era_criteria))
}

/// Step 5: the specialty tag's meaning shifts from exclusive to
/// "primary genre >= 0.80, remainder in related genres" without
/// changing the `specialty_tag` string itself; we record the relaxation
/// by loosening the matching genre criterion's target/tolerance instead,
/// since a closed-set specialty representation has no separate
/// "exclusivity" field to flip.
fn relax_specialty(criteria: &mut TrackSelectionCriteria) -> Option<(String, String)> {
    let tag = criteria.specialty_tag.clone()?;
    let entry = criteria
        .genre_criteria
        .entry(tag.clone())
        .or_insert(GenreCriterion {
            target: 1.0,
            tolerance: 0.0,
        });
    let original = format!("{entry:?}");
    entry.target = 0.80;
    entry.tolerance = 0.20;
    Some((original, format!("{entry:?}")))
}

/// Try `attempt` against progressively relaxed copies of `criteria`
/// until it succeeds with at least `target_min` tracks or the ladder is
/// exhausted, in which case the last attempt's error propagates (a
/// `BudgetExceeded` short-circuits the ladder immediately rather than
/// being retried against relaxed criteria that can't fix it).
pub async fn select_with_relaxation<F, Fut>(
    playlist_id: Uuid,
    log: &DecisionLogger,
    criteria: &TrackSelectionCriteria,
    target_min: usize,
    mut attempt: F,
) -> Result<(Vec<SelectedTrack>, Usd, Vec<ConstraintRelaxation>)>
where
    F: FnMut(TrackSelectionCriteria) -> Fut,
    Fut: Future<Output = Result<(Vec<SelectedTrack>, Usd)>>,
{
    let mut last_error = None;
    match attempt(criteria.clone()).await {
        Ok((tracks, cost)) if tracks.len() >= target_min => return Ok((tracks, cost, Vec::new())),
        Ok(_) => {}
        // A budget refusal isn't something widening BPM/genre/era tolerance
        // can fix, so there is no point spending the rest of the ladder on
        // it; surface it as-is rather than letting it decay into a
        // misleading InsufficientTracks.
        Err(e @ Error::BudgetExceeded { .. }) => return Err(e),
        Err(e) => last_error = Some(e),
    }

    let mut relaxed = criteria.clone();
    let mut relaxations = Vec::new();

    let steps: Vec<(RelaxedConstraintType, &str, fn(&mut TrackSelectionCriteria) -> Option<(String, String)>)> = vec![
        (
            RelaxedConstraintType::Bpm,
            "expand BPM sub-windows by +/-10",
            (|c: &mut TrackSelectionCriteria| Some(widen_bpm(c, BPM_WIDEN_STEP_1))) as fn(&mut TrackSelectionCriteria) -> Option<(String, String)>,
        ),
        (
            RelaxedConstraintType::Bpm,
            "expand BPM sub-windows by +/-15",
            |c| Some(widen_bpm(c, BPM_WIDEN_STEP_2)),
        ),
        (
            RelaxedConstraintType::Genre,
            "widen genre tolerance to +/-0.20",
            |c| Some(widen_genre_tolerance(c, GENRE_TOLERANCE_STEP_3)),
        ),
        (
            RelaxedConstraintType::Era,
            "widen era tolerance to +/-0.20, adjacent eras substitutable",
            |c| Some(widen_era_tolerance(c, ERA_TOLERANCE_STEP_4)),
        ),
        (
            RelaxedConstraintType::Genre,
            "relax specialty constraint to primary genre >= 0.80",
            relax_specialty,
        ),
    ];

    for (step_index, (constraint_type, reason, apply)) in steps.into_iter().enumerate() {
        let Some((original, new_value)) = apply(&mut relaxed) else {
            continue;
        };
        let relaxation = ConstraintRelaxation {
            step: (step_index + 1) as u32,
            constraint_type,
            original,
            relaxed: new_value,
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        };
        log.record(
            playlist_id,
            DecisionType::Relaxation,
            json!({
                "step": relaxation.step,
                "constraint_type": format!("{:?}", relaxation.constraint_type),
                "reason": relaxation.reason,
            }),
            Usd::ZERO,
            0,
        )?;
        relaxations.push(relaxation);

        match attempt(relaxed.clone()).await {
            Ok((tracks, cost)) if tracks.len() >= target_min => return Ok((tracks, cost, relaxations)),
            Ok(_) => {}
            Err(e @ Error::BudgetExceeded { .. }) => return Err(e),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or(Error::InsufficientTracks {
        needed: target_min,
        found: 0,
    }))
}
