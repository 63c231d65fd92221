//! # mindhub-domain
//!
//! Pure domain model for the mindhub automation runtime.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Automations** (hashed units of natural-language task text)
//! - Define **Signals** (persisted bindings of an automation to a trigger)
//! - Define **Trigger payloads** (cron, offset, absolute time, state regex)
//! - Define **Log entries** (append-only execution records) and
//!   **Service call records** (side-effect audit entries)
//! - Define **Messages** (canonical model/tool conversation turns)
//! - Parse automation source files into hashed units
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod automation;
pub mod log;
pub mod message;
pub mod signal;
pub mod state;
