//! # mindhub-adapter-rpc-axum
//!
//! Streaming RPC transport for the runtime API.
//!
//! The protocol is a JSON method-call scheme over an abstract duplex string
//! channel: the server side is [`server::serve`], which speaks through a pair
//! of `mpsc` channels, and [`ws`] binds that pair to an axum websocket at
//! `/api/ws`. [`client::RpcClient`] is the matching typed stub.
//!
//! ## Dependency rule
//! Depends on `mindhub-app` (for [`RuntimeApi`](mindhub_app::runtime::RuntimeApi))
//! and `mindhub-domain`. The `app` and `domain` crates must never reference
//! this adapter.

pub mod client;
pub mod method;
pub mod protocol;
pub mod server;
pub mod ws;

pub use client::{RpcClient, RpcError};
pub use method::Method;
pub use protocol::{ResponseKind, RpcRequest, RpcResponse};
