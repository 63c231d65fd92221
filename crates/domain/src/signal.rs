//! Signal — a persisted binding of an automation to a trigger.
//!
//! A signal references its automation by content hash. This is a weak
//! reference: when no currently parsed automation carries that hash the
//! signal is orphaned and gets deleted on the next reschedule.

use serde::{Deserialize, Serialize};

use crate::id::SignalId;
use crate::time::Timestamp;

/// One of the four trigger configurations a signal can persist.
///
/// Serialized as the JSON `data` column; the variant tag matches the
/// signal row's `type` column (`cron`, `state`, `offset`, `time`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TriggerPayload {
    /// Fires on a cron schedule.
    Cron { cron: String },
    /// Fires whenever a watched entity's state matches a case-insensitive regex.
    State {
        #[serde(rename = "entityIds")]
        entity_ids: Vec<String>,
        regex: String,
    },
    /// Fires once, a relative number of seconds after the handler is built.
    Offset {
        #[serde(rename = "offsetInSeconds")]
        offset_in_seconds: f64,
    },
    /// Fires once at an absolute instant.
    Time {
        #[serde(rename = "iso8601Time")]
        iso8601_time: String,
    },
}

impl TriggerPayload {
    /// The `type` column value for this payload.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cron { .. } => "cron",
            Self::State { .. } => "state",
            Self::Offset { .. } => "offset",
            Self::Time { .. } => "time",
        }
    }

    /// Whether this trigger fires at most once and the signal should be
    /// marked dead after firing.
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Self::Offset { .. } | Self::Time { .. })
    }
}

/// A persisted trigger registration for one automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: SignalId,
    pub created_at: Timestamp,
    /// Content hash of the automation this signal belongs to.
    pub automation_hash: String,
    pub payload: TriggerPayload,
    /// One-shot signals are marked dead after firing instead of deleted,
    /// preserving the scheduling history.
    pub is_dead: bool,
}

/// A signal about to be persisted (no id or timestamp yet).
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub automation_hash: String,
    pub payload: TriggerPayload,
}
