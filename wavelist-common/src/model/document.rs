use super::daypart::{DaypartSpecification, ScheduleTag};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies who holds the exclusive lock on a `ProgrammingDocument` for
/// the duration of a batch (spec §3, §5, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDescriptor {
    pub lock_id: uuid::Uuid,
    pub lock_timestamp: chrono::DateTime<chrono::Utc>,
    pub locked_by: String,
}

/// One weekly programming group (spec §3 "Programming Structure").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammingStructure {
    pub tag: ScheduleTag,
    pub dayparts: Vec<DaypartSpecification>,
}

/// The parsed, immutable station programming document (spec §3, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammingDocument {
    pub document_path: PathBuf,
    /// SHA-256 over the raw document bytes; doubles as a cache-busting
    /// "have I seen this exact document before" key.
    pub version: String,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
    pub lock: Option<LockDescriptor>,
    pub structures: Vec<ProgrammingStructure>,
}

impl ProgrammingDocument {
    /// §3 invariant: "Australian-content minimum >= 0.30 station-wide."
    pub fn validate(&self) -> Result<()> {
        for structure in &self.structures {
            for daypart in &structure.dayparts {
                daypart.validate()?;
                if daypart.australian_minimum < 0.30 {
                    return Err(Error::InvalidInput(format!(
                        "daypart '{}' has an Australian-content minimum of {}, below the \
                         station-wide floor of 0.30",
                        daypart.name, daypart.australian_minimum
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn dayparts_for_date(&self, date: chrono::NaiveDate) -> Vec<&DaypartSpecification> {
        self.structures
            .iter()
            .filter(|s| s.tag.matches(date))
            .flat_map(|s| s.dayparts.iter())
            .collect()
    }
}
