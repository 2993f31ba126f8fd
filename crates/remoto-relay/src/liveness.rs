//! Liveness sweeper
//!
//! Fallback pruning for entries whose socket writer has already stopped but
//! whose close event has not reached the hub yet. Explicit close, error and
//! delivery-failure handling remain the primary removal path.

use tracing::{debug, info};

use crate::directory;
use crate::registry::{ConnectionId, Registry};

/// Deregister every connection whose socket is closed
///
/// Each removal triggers its own directory broadcast. Returns how many
/// entries were pruned.
pub fn sweep(registry: &mut Registry) -> usize {
    let stale: Vec<ConnectionId> = registry
        .iter()
        .filter(|c| c.is_closed())
        .map(|c| c.id)
        .collect();

    if stale.is_empty() {
        debug!("Liveness sweep: {} connections, none stale", registry.len());
        return 0;
    }

    let mut pruned = 0;
    for id in stale {
        // an earlier removal's broadcast may already have pruned this one
        if directory::deregister(registry, id) {
            pruned += 1;
        }
    }
    info!("Liveness sweep pruned {} stale connections", pruned);
    pruned
}
