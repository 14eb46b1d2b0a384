use crate::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One of the three weekly programming groups a station document organizes
/// dayparts under (spec §2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleTag {
    Weekday,
    Saturday,
    Sunday,
}

impl ScheduleTag {
    /// Whether `tag` matches the weekday of `date` (Mon-Fri => Weekday).
    pub fn matches(self, date: chrono::NaiveDate) -> bool {
        use chrono::Datelike;
        match (self, date.weekday()) {
            (ScheduleTag::Saturday, chrono::Weekday::Sat) => true,
            (ScheduleTag::Sunday, chrono::Weekday::Sun) => true,
            (ScheduleTag::Weekday, d) => !matches!(d, chrono::Weekday::Sat | chrono::Weekday::Sun),
            _ => false,
        }
    }
}

/// A half-open time-of-day interval, `start <= t < end`, used both for a
/// daypart's own span and for BPM sub-windows within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidInput(format!(
                "time_end ({end}) must be after time_start ({start}); a daypart crossing \
                 midnight must be expressed as two dayparts"
            )));
        }
        Ok(Self { start, end })
    }

    /// Inclusive-of-both-ends containment, matching §8's boundary rule
    /// that a track on a sub-window boundary belongs to both adjacent
    /// windows.
    pub fn contains_inclusive(&self, t: NaiveTime) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }
}

/// A tempo band in effect during one sub-window of a daypart (spec §3,
/// §4.1 "BPM Progression").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmRange {
    pub window: TimeWindow,
    pub bpm_min: u16,
    pub bpm_max: u16,
}

impl BpmRange {
    pub fn new(window: TimeWindow, bpm_min: u16, bpm_max: u16) -> Result<Self> {
        if !(60..=200).contains(&bpm_min) || !(60..=200).contains(&bpm_max) {
            return Err(Error::InvalidInput(format!(
                "BPM bounds must fall in 60-200, got {bpm_min}-{bpm_max}"
            )));
        }
        if bpm_min >= bpm_max {
            return Err(Error::InvalidInput(format!(
                "bpm_min ({bpm_min}) must be < bpm_max ({bpm_max})"
            )));
        }
        Ok(Self {
            window,
            bpm_min,
            bpm_max,
        })
    }

    /// Inclusive containment per §8's boundary rule.
    pub fn contains_bpm(&self, bpm: f64) -> bool {
        bpm >= self.bpm_min as f64 && bpm <= self.bpm_max as f64
    }

    pub fn widen(&self, by: u16) -> BpmRange {
        BpmRange {
            window: self.window,
            bpm_min: self.bpm_min.saturating_sub(by).max(1),
            bpm_max: self.bpm_max.saturating_add(by),
        }
    }
}

/// How heavily a track is played over a week (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationCategory {
    Power,
    Medium,
    Light,
    Recurrent,
    Library,
}

/// A specialty rule such as "100% Australian" (spec §3, §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyConstraint {
    pub tag: String,
    pub params: serde_json::Value,
}

/// A named, time-bounded segment of broadcast programming (GLOSSARY;
/// spec §3 "Daypart Specification"). Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaypartSpecification {
    pub id: Uuid,
    pub name: String,
    pub schedule_tag: ScheduleTag,
    pub window: TimeWindow,
    pub target_demographic: String,
    pub bpm_progression: Vec<BpmRange>,
    pub genre_mix: HashMap<String, f64>,
    pub era_distribution: HashMap<String, f64>,
    pub mood_includes: Vec<String>,
    pub mood_excludes: Vec<String>,
    pub rotation_mix: HashMap<RotationCategory, f64>,
    pub tracks_per_hour: (u32, u32),
    pub australian_minimum: f64,
    pub specialty: Option<SpecialtyConstraint>,
}

impl DaypartSpecification {
    pub fn duration_hours(&self) -> f64 {
        self.window.duration_hours()
    }

    /// §3 invariant: genre-mix and era-mix percentages sum to 1.0 ± 0.01.
    /// §8: sums of 0.99 and 1.01 are accepted, 0.98/1.02 are not.
    pub fn validate(&self) -> Result<()> {
        validate_percent_sum("genre_mix", &self.genre_mix)?;
        validate_percent_sum("era_distribution", &self.era_distribution)?;
        if !(0.0..=1.0).contains(&self.australian_minimum) {
            return Err(Error::InvalidInput(
                "australian_minimum must be in [0,1]".into(),
            ));
        }
        let (min, max) = self.tracks_per_hour;
        if !(0 < min && min <= max) {
            return Err(Error::InvalidInput(format!(
                "tracks_per_hour must satisfy 0 < min <= max, got ({min}, {max})"
            )));
        }
        validate_bpm_coverage(&self.window, &self.bpm_progression)?;
        Ok(())
    }
}

fn validate_percent_sum(label: &str, map: &HashMap<String, f64>) -> Result<()> {
    let sum: f64 = map.values().sum();
    if !(0.99..=1.01).contains(&sum) {
        return Err(Error::InvalidInput(format!(
            "{label} fractions sum to {sum:.4}, outside the accepted [0.99, 1.01] band"
        )));
    }
    Ok(())
}

fn validate_bpm_coverage(daypart_window: &TimeWindow, ranges: &[BpmRange]) -> Result<()> {
    if ranges.is_empty() {
        return Err(Error::InvalidInput(
            "BPM progression must cover the full daypart duration".into(),
        ));
    }
    let mut sorted: Vec<&BpmRange> = ranges.iter().collect();
    sorted.sort_by_key(|r| r.window.start);
    if sorted[0].window.start != daypart_window.start {
        return Err(Error::InvalidInput(
            "BPM progression does not start at the daypart's start time".into(),
        ));
    }
    if sorted[sorted.len() - 1].window.end != daypart_window.end {
        return Err(Error::InvalidInput(
            "BPM progression does not end at the daypart's end time".into(),
        ));
    }
    for pair in sorted.windows(2) {
        if pair[0].window.end != pair[1].window.start {
            return Err(Error::InvalidInput(
                "BPM progression has a gap or overlap between sub-windows".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn rejects_midnight_crossing_window() {
        let err = TimeWindow::new(time(23, 0), time(1, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn boundary_bpm_is_inclusive_both_sides() {
        let r = BpmRange::new(TimeWindow::new(time(6, 0), time(7, 0)).unwrap(), 90, 115).unwrap();
        assert!(r.contains_bpm(115.0));
        assert!(r.contains_bpm(90.0));
        assert!(!r.contains_bpm(115.1));
    }

    #[test]
    fn percent_sum_boundaries() {
        let mut m = HashMap::new();
        m.insert("a".to_string(), 0.5);
        m.insert("b".to_string(), 0.49);
        validate_percent_sum("x", &m).unwrap();
        m.insert("b".to_string(), 0.47);
        assert!(validate_percent_sum("x", &m).is_err());
    }
}
