//! # mindhub-adapter-virtual
//!
//! Virtual entity world for testing and demonstration: an in-process
//! [`StateObserver`](mindhub_app::ports::StateObserver) backed by a
//! broadcast bus, plus the built-in tools agent runs use to read states,
//! call services and manage signals.
//!
//! ## Dependency rule
//!
//! Depends on `mindhub-app` (port traits) and `mindhub-domain` only.

mod bus;
mod tools;

use std::sync::Arc;

use mindhub_app::ports::ToolRegistry;

pub use bus::VirtualStateBus;
pub use tools::{CallServiceTool, CancelSignalTool, GetEntityStatesTool, ScheduleSignalTool};

/// The standard tool set handed to every agent run.
#[must_use]
pub fn builtin_registry(bus: Arc<VirtualStateBus>) -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(GetEntityStatesTool::new(Arc::clone(&bus))))
        .with(Arc::new(CallServiceTool::new(bus)))
        .with(Arc::new(ScheduleSignalTool))
        .with(Arc::new(CancelSignalTool))
}
