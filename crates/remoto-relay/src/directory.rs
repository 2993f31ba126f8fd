//! Terminal directory broadcaster
//!
//! Every registry add or removal is followed by a `LIST` push to all remotes.

use tracing::{debug, warn};

use crate::liveness;
use crate::message::{DirectoryEntry, Envelope};
use crate::registry::{ClientClass, ConnectionId, Registry};
use crate::Result;

/// `[label, token]` of every terminal, in registry order
pub fn entries(registry: &Registry) -> Vec<DirectoryEntry> {
    registry
        .by_class(ClientClass::Terminal)
        .map(|c| DirectoryEntry::new(c.label.clone().unwrap_or_default(), c.token.clone()))
        .collect()
}

/// The encoded `LIST` frame for the current registry
pub fn list_frame(registry: &Registry) -> Result<String> {
    Envelope::List(entries(registry)).to_frame()
}

/// Push the directory to every remote
///
/// Remotes whose socket is gone are deregistered once this round is done,
/// each removal producing its own fresh broadcast. If the frame cannot be
/// built at all the registry is assumed to hold a stale handle and a sweep
/// runs instead.
pub fn broadcast(registry: &mut Registry) {
    let frame = match list_frame(registry) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to build terminal list, sweeping registry: {}", e);
            liveness::sweep(registry);
            return;
        }
    };

    let dead: Vec<ConnectionId> = registry
        .by_class(ClientClass::Remote)
        .filter(|remote| remote.send(&frame).is_err())
        .map(|remote| remote.id)
        .collect();

    if dead.is_empty() {
        return;
    }

    for id in dead {
        debug!("Remote {} unreachable during directory broadcast", id);
        deregister(registry, id);
    }
    liveness::sweep(registry);
}

/// Remove a connection and, if it was present, rebroadcast the directory
pub fn deregister(registry: &mut Registry, id: ConnectionId) -> bool {
    match registry.remove(id) {
        Some(connection) => {
            debug!("Deregistered {} {}", connection.class, id);
            broadcast(registry);
            true
        }
        None => false,
    }
}
