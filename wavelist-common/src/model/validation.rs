use super::track::ValidationStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One soft or hard constraint's compliance score (spec §3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintScore {
    pub target: f64,
    pub actual: f64,
    pub tolerance: f64,
    pub is_compliant: bool,
}

impl ConstraintScore {
    /// §3: `deviation_percentage = |actual - target| / target` (0 if
    /// target is 0).
    pub fn deviation_percentage(&self) -> f64 {
        if self.target == 0.0 {
            0.0
        } else {
            (self.actual - self.target).abs() / self.target
        }
    }
}

/// Flow-quality metrics over the finished, ordered playlist (spec §3,
/// §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowQualityMetrics {
    pub bpm_stddev: f64,
    pub bpm_progression_coherence: f64,
    pub energy_consistency: f64,
    pub genre_diversity_index: f64,
}

impl FlowQualityMetrics {
    /// §3: "Overall quality is their weighted mean (equal weights; BPM
    /// variance normalised as `max(0, 1 - sigma/30)`)."
    pub fn overall_quality(&self) -> f64 {
        let bpm_component = (1.0 - self.bpm_stddev / 30.0).max(0.0);
        (bpm_component
            + self.bpm_progression_coherence
            + self.energy_consistency
            + self.genre_diversity_index)
            / 4.0
    }
}

/// The outcome of scoring a finished playlist against its source
/// criteria (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub playlist_id: Uuid,
    pub status: ValidationStatus,
    pub scores: HashMap<String, ConstraintScore>,
    pub flow_quality: FlowQualityMetrics,
    pub compliance_percentage: f64,
    pub validated_at: chrono::DateTime<chrono::Utc>,
    pub gap_analysis: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deviation_is_zero_when_target_is_zero() {
        let s = ConstraintScore {
            target: 0.0,
            actual: 0.2,
            tolerance: 0.1,
            is_compliant: true,
        };
        assert_eq!(s.deviation_percentage(), 0.0);
    }

    #[test]
    fn overall_quality_weights_equally() {
        let m = FlowQualityMetrics {
            bpm_stddev: 0.0,
            bpm_progression_coherence: 1.0,
            energy_consistency: 1.0,
            genre_diversity_index: 1.0,
        };
        assert_eq!(m.overall_quality(), 1.0);
    }
}
