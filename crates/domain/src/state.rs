//! State change events observed from the entity world.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// One observed entity state update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    /// Entity identifier, e.g. `light.kitchen`.
    pub entity_id: String,
    /// The entity's new state string.
    pub new_state: String,
    /// Free-form attributes reported alongside the state.
    #[serde(default)]
    pub attributes: serde_json::Value,
    pub changed_at: Timestamp,
}

impl StateChange {
    /// Build a state change stamped with the current time.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, new_state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            new_state: new_state.into(),
            attributes: serde_json::Value::Null,
            changed_at: crate::time::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_state_change_with_current_time() {
        let change = StateChange::new("light.kitchen", "on");
        assert_eq!(change.entity_id, "light.kitchen");
        assert_eq!(change.new_state, "on");
        assert!(change.attributes.is_null());
    }
}
