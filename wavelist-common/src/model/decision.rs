use crate::money::Usd;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of event an append-only decision log entry records (spec §3,
/// §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    TrackSelection,
    Validation,
    Error,
    Relaxation,
    MetadataRetrieval,
}

/// One line of the audit trail (spec §3, §4.4, §6). Owned by the log
/// file, referencing its playlist by id rather than being owned by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub id: Uuid,
    pub playlist_id: Uuid,
    pub decision_type: DecisionType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub decision_data: serde_json::Value,
    pub cost_incurred: Usd,
    pub execution_time_ms: u64,
}

impl DecisionLogEntry {
    pub fn new(
        playlist_id: Uuid,
        decision_type: DecisionType,
        decision_data: serde_json::Value,
        cost_incurred: Usd,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            playlist_id,
            decision_type,
            timestamp: chrono::Utc::now(),
            decision_data,
            cost_incurred,
            execution_time_ms,
        }
    }
}
