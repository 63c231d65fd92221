//! Built-in tools exposed to every agent run.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use mindhub_app::ports::{Tool, ToolContext, ToolDefinition};
use mindhub_domain::error::ToolError;
use mindhub_domain::id::SignalId;
use mindhub_domain::log::ServiceCallRecord;
use mindhub_domain::signal::{NewSignal, TriggerPayload};
use mindhub_domain::state::StateChange;

use crate::bus::VirtualStateBus;

fn invalid_args(err: impl std::fmt::Display) -> ToolError {
    ToolError::InvalidArgs(err.to_string())
}

/// Read the last known state of entities on the bus.
pub struct GetEntityStatesTool {
    bus: Arc<VirtualStateBus>,
}

impl GetEntityStatesTool {
    #[must_use]
    pub fn new(bus: Arc<VirtualStateBus>) -> Self {
        Self { bus }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetEntityStatesArgs {
    #[serde(default)]
    entity_ids: Option<Vec<String>>,
}

#[async_trait]
impl Tool for GetEntityStatesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_entity_states".to_string(),
            description: "Read the current state of entities. Omit entityIds to list every known entity.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "entityIds": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Entity ids to read, e.g. [\"light.kitchen\"]",
                    },
                },
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: GetEntityStatesArgs = serde_json::from_value(args).map_err(invalid_args)?;
        let states: Vec<StateChange> = match args.entity_ids {
            Some(ids) => ids.iter().filter_map(|id| self.bus.state_of(id)).collect(),
            None => self.bus.snapshot(),
        };
        serde_json::to_value(states).map_err(|err| ToolError::Failed(err.to_string()))
    }
}

/// Call a service on an entity, recording the call in the run's audit trail.
pub struct CallServiceTool {
    bus: Arc<VirtualStateBus>,
}

impl CallServiceTool {
    #[must_use]
    pub fn new(bus: Arc<VirtualStateBus>) -> Self {
        Self { bus }
    }
}

#[derive(Deserialize)]
struct CallServiceArgs {
    service: String,
    target: String,
    #[serde(default)]
    data: Value,
}

/// Resulting entity state for the services the virtual world understands.
fn state_after(service: &str) -> Option<&'static str> {
    match service.rsplit('.').next() {
        Some("turn_on") => Some("on"),
        Some("turn_off") => Some("off"),
        _ => None,
    }
}

#[async_trait]
impl Tool for CallServiceTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "call_service".to_string(),
            description: "Call a service on a target entity, e.g. service light.turn_on on target light.kitchen.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "service": {"type": "string", "description": "Service to call, e.g. light.turn_on"},
                    "target": {"type": "string", "description": "Entity id the call applies to"},
                    "data": {"type": "object", "description": "Optional service data"},
                },
                "required": ["service", "target"],
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: CallServiceArgs = serde_json::from_value(args).map_err(invalid_args)?;
        info!(service = %args.service, target = %args.target, "service call");
        ctx.record_service_call(ServiceCallRecord {
            created_at: mindhub_domain::time::now(),
            service: args.service.clone(),
            target: args.target.clone(),
            data: args.data.clone(),
        });
        if let Some(new_state) = state_after(&args.service) {
            let mut change = StateChange::new(args.target.clone(), new_state);
            change.attributes = args.data;
            self.bus.push_state(change);
        }
        Ok(json!({"ok": true}))
    }
}

/// Persist a new signal bound to the running automation.
pub struct ScheduleSignalTool;

#[async_trait]
impl Tool for ScheduleSignalTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "schedule_signal".to_string(),
            description: "Schedule a trigger for this automation. Pass one of: {type: \"cron\", cron}, {type: \"state\", entityIds, regex}, {type: \"offset\", offsetInSeconds}, {type: \"time\", iso8601Time}.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["cron", "state", "offset", "time"]},
                    "cron": {"type": "string"},
                    "entityIds": {"type": "array", "items": {"type": "string"}},
                    "regex": {"type": "string"},
                    "offsetInSeconds": {"type": "number"},
                    "iso8601Time": {"type": "string"},
                },
                "required": ["type"],
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let payload: TriggerPayload = serde_json::from_value(args).map_err(invalid_args)?;
        let signal = ctx
            .signals
            .create(NewSignal {
                automation_hash: ctx.automation_hash.clone(),
                payload,
            })
            .await
            .map_err(|err| ToolError::Failed(err.to_string()))?;
        info!(id = %signal.id, kind = signal.payload.kind(), "signal scheduled");
        Ok(json!({"signalId": signal.id.to_string()}))
    }
}

/// Delete a previously scheduled signal.
pub struct CancelSignalTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelSignalArgs {
    signal_id: String,
}

#[async_trait]
impl Tool for CancelSignalTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "cancel_signal".to_string(),
            description: "Cancel a scheduled signal by its id.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "signalId": {"type": "string", "description": "Id returned by schedule_signal"},
                },
                "required": ["signalId"],
            }),
        }
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: CancelSignalArgs = serde_json::from_value(args).map_err(invalid_args)?;
        let id = SignalId::from_str(&args.signal_id).map_err(invalid_args)?;
        ctx.signals
            .delete(id)
            .await
            .map_err(|err| ToolError::Failed(err.to_string()))?;
        info!(%id, "signal cancelled");
        Ok(json!({"ok": true}))
    }
}
