//! # mindhub-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `SignalStore` / `LogStore` — persistence for signals and log entries
//!   - `StateObserver` — lazy sequences of entity state changes
//!   - `DirectoryWatcher` — lazy sequences of filesystem change ticks
//!   - `LlmBackend` — one completion round against a language model
//!   - `Tool` — a named, schema-described callable the model may invoke
//! - Build **trigger handlers** from persisted signals (`triggers`)
//! - Run the **reactive pipeline**: watch → reparse → reschedule → fire →
//!   execute, with latest-wins cancellation (`pipeline`)
//! - Drive the **agentic tool-calling loop** (`agent_loop`, `executor`)
//! - Expose the runtime's observable feeds behind [`runtime::RuntimeApi`]
//!
//! ## Dependency rule
//! Depends on `mindhub-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod agent_loop;
pub mod executor;
pub mod pipeline;
pub mod ports;
pub mod runtime;
pub mod triggers;
