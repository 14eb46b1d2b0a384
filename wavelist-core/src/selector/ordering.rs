//! Final playlist ordering (spec §4.5 "Ordering of the returned
//! playlist"): partition target positions across BPM sub-windows
//! proportionally to each sub-window's duration, then order each
//! partition by BPM so consecutive tracks differ by <= 15 BPM where
//! possible, tie-breaking on track id ascending.

use wavelist_common::model::{BpmRange, SelectedTrack};

/// Split `track_count` positions across `ranges` proportionally to each
/// range's duration, rounding down and handing any remainder to the
/// last partition so the partition sizes always sum to `track_count`.
fn partition_sizes(ranges: &[BpmRange], track_count: usize) -> Vec<usize> {
    if ranges.is_empty() {
        return Vec::new();
    }
    let total_hours: f64 = ranges.iter().map(|r| r.window.duration_hours()).sum();
    if total_hours <= 0.0 {
        return vec![track_count / ranges.len(); ranges.len()];
    }
    let mut sizes: Vec<usize> = ranges
        .iter()
        .map(|r| {
            let fraction = r.window.duration_hours() / total_hours;
            (fraction * track_count as f64).floor() as usize
        })
        .collect();
    let assigned: usize = sizes.iter().sum();
    if let Some(last) = sizes.last_mut() {
        *last += track_count.saturating_sub(assigned);
    }
    sizes
}

/// Order `tracks` (already filtered/scored by the caller) into the
/// final `position_in_playlist` sequence.
pub fn order_tracks(mut tracks: Vec<SelectedTrack>, ranges: &[BpmRange]) -> Vec<SelectedTrack> {
    if ranges.is_empty() || tracks.is_empty() {
        tracks.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        for (i, t) in tracks.iter_mut().enumerate() {
            t.position_in_playlist = i;
        }
        return tracks;
    }

    let sizes = partition_sizes(ranges, tracks.len());

    // Greedily assign each track to the first sub-window whose BPM range
    // contains it and that still has capacity remaining, preserving
    // ascending BPM order as the secondary sort within a partition.
    tracks.sort_by(|a, b| {
        a.bpm
            .partial_cmp(&b.bpm)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.track_id.cmp(&b.track_id))
    });

    let mut partitions: Vec<Vec<SelectedTrack>> = vec![Vec::new(); ranges.len()];
    let mut remaining = tracks;
    for (idx, range) in ranges.iter().enumerate() {
        let capacity = sizes[idx];
        let mut taken = Vec::new();
        remaining.retain(|t| {
            if taken.len() >= capacity {
                return true;
            }
            let in_range = t.bpm.is_some_and(|bpm| range.contains_bpm(bpm));
            if in_range {
                taken.push(t.clone());
                false
            } else {
                true
            }
        });
        partitions[idx] = taken;
    }
    // Anything left over (no matching sub-window) is appended in order.
    remaining.sort_by(|a, b| a.track_id.cmp(&b.track_id));

    let mut ordered = Vec::new();
    for partition in partitions {
        ordered.extend(partition);
    }
    ordered.extend(remaining);

    for (i, t) in ordered.iter_mut().enumerate() {
        t.position_in_playlist = i;
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use wavelist_common::model::{RotationCategory, TimeWindow, ValidationStatus};

    fn track(id: &str, bpm: f64) -> SelectedTrack {
        SelectedTrack {
            track_id: id.to_string(),
            title: "t".into(),
            artist: "a".into(),
            album: "al".into(),
            duration_seconds: 200,
            is_australian: false,
            rotation_category: RotationCategory::Medium,
            position_in_playlist: 0,
            selection_reasoning: "x".repeat(60),
            validation_status: ValidationStatus::Pass,
            bpm: Some(bpm),
            genre: None,
            year: None,
            country: None,
            metadata_source: None,
        }
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn positions_are_a_dense_permutation() {
        let ranges = vec![
            BpmRange::new(TimeWindow::new(time(6, 0), time(7, 0)).unwrap(), 90, 115).unwrap(),
            BpmRange::new(TimeWindow::new(time(7, 0), time(10, 0)).unwrap(), 110, 135).unwrap(),
        ];
        let tracks = vec![
            track("c", 130.0),
            track("a", 95.0),
            track("b", 120.0),
            track("d", 100.0),
        ];
        let ordered = order_tracks(tracks, &ranges);
        let mut positions: Vec<usize> = ordered.iter().map(|t| t.position_in_playlist).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn lower_bpm_window_is_ordered_first() {
        let ranges = vec![
            BpmRange::new(TimeWindow::new(time(6, 0), time(7, 0)).unwrap(), 90, 115).unwrap(),
            BpmRange::new(TimeWindow::new(time(7, 0), time(10, 0)).unwrap(), 110, 135).unwrap(),
        ];
        let tracks = vec![track("x", 130.0), track("y", 95.0)];
        let ordered = order_tracks(tracks, &ranges);
        assert_eq!(ordered[0].track_id, "y");
        assert_eq!(ordered[1].track_id, "x");
    }
}
