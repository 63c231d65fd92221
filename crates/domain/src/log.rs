//! Append-only execution log records.
//!
//! An [`AutomationLogEntry`] is written once per agent run and never
//! mutated afterwards. [`ServiceCallRecord`]s are side-effect audit
//! entries, each a child of exactly one log entry.

use serde::{Deserialize, Serialize};

use crate::automation::Automation;
use crate::id::LogEntryId;
use crate::message::Message;
use crate::signal::TriggerPayload;
use crate::time::Timestamp;

/// Why an agent run happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogEntryKind {
    /// A caller requested the run directly.
    Manual,
    /// The runtime asked the model to plan signals for an automation.
    DetermineSignal,
    /// A trigger fired and the automation was executed.
    ExecuteSignal,
}

impl LogEntryKind {
    /// The `type` column value for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::DetermineSignal => "determine-signal",
            Self::ExecuteSignal => "execute-signal",
        }
    }
}

/// A side-effect audit entry: one service invocation made during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCallRecord {
    pub created_at: Timestamp,
    pub service: String,
    pub target: String,
    pub data: serde_json::Value,
}

/// One completed (or truncated) agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationLogEntry {
    pub id: LogEntryId,
    pub kind: LogEntryKind,
    pub created_at: Timestamp,
    /// The ordered conversation transcript.
    pub messages: Vec<Message>,
    /// Service calls issued during this run.
    pub services_called: Vec<ServiceCallRecord>,
    /// The automation that ran, when still known.
    pub automation: Option<Automation>,
    /// The trigger payload that caused the run, for trigger-driven runs.
    pub signaled_by: Option<TriggerPayload>,
}

impl AutomationLogEntry {
    /// Create a new entry stamped with the current time.
    #[must_use]
    pub fn new(kind: LogEntryKind, messages: Vec<Message>) -> Self {
        Self {
            id: LogEntryId::new(),
            kind,
            created_at: crate::time::now(),
            messages,
            services_called: Vec::new(),
            automation: None,
            signaled_by: None,
        }
    }

    #[must_use]
    pub fn with_automation(mut self, automation: Automation) -> Self {
        self.automation = Some(automation);
        self
    }

    #[must_use]
    pub fn with_signaled_by(mut self, payload: TriggerPayload) -> Self {
        self.signaled_by = Some(payload);
        self
    }

    #[must_use]
    pub fn with_services_called(mut self, records: Vec<ServiceCallRecord>) -> Self {
        self.services_called = records;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_kind_as_kebab_case() {
        let json = serde_json::to_value(LogEntryKind::DetermineSignal).unwrap();
        assert_eq!(json, serde_json::json!("determine-signal"));
        assert_eq!(LogEntryKind::ExecuteSignal.as_str(), "execute-signal");
    }

    #[test]
    fn should_attach_automation_and_trigger_context() {
        let automation = Automation::from_contents("Water the plants.", "a.md");
        let entry = AutomationLogEntry::new(
            LogEntryKind::ExecuteSignal,
            vec![Message::user("Water the plants.")],
        )
        .with_automation(automation.clone())
        .with_signaled_by(TriggerPayload::Cron {
            cron: "0 0 8 * * *".to_string(),
        });

        assert_eq!(entry.automation, Some(automation));
        assert!(matches!(entry.signaled_by, Some(TriggerPayload::Cron { .. })));
    }

    #[test]
    fn should_roundtrip_entry_through_serde_json() {
        let entry = AutomationLogEntry::new(LogEntryKind::Manual, vec![Message::user("hi")])
            .with_services_called(vec![ServiceCallRecord {
                created_at: crate::time::now(),
                service: "light.turn_on".to_string(),
                target: "light.kitchen".to_string(),
                data: serde_json::json!({"brightness": 255}),
            }]);

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: AutomationLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
