//! remoto-relay: WebSocket relay between terminals and remotes
//!
//! Terminals register under a label and token; remotes receive the live
//! terminal directory and exchange arbitrary JSON frames with every terminal
//! sharing their token. Built with axum for HTTP handling and a single hub
//! task that owns all connection state.

pub mod auth;
pub mod directory;
pub mod error;
pub mod handler;
pub mod hub;
pub mod liveness;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;

pub use error::{RelayError, Result};
pub use handler::relay_handler;
pub use hub::{RelayEvent, RelayHandle, RelayHub};
pub use message::{DirectoryEntry, Envelope};
pub use registry::{ClientClass, Connection, ConnectionId, Handshake, HandshakeParams, Registry};
pub use router::Dispatch;
pub use server::{build_router, serve, start_relay_server, RelayState};
