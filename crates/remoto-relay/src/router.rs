//! Inbound message router
//!
//! Decides what a frame from one connection does: set its token, answer a
//! ping, or fan out to the paired peers on the other side.

use tracing::{debug, warn};

use crate::directory;
use crate::error::{RelayError, Result};
use crate::liveness;
use crate::message::Envelope;
use crate::registry::{ConnectionId, Registry};

/// What a dispatched frame ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// `CONN`: the sender's token was replaced
    TokenSet,
    /// `PING`: a `PONG` was queued for the sender
    Ponged,
    /// Anything else: fanned out to matching peers
    Forwarded { delivered: usize, dropped: usize },
    /// The sender is no longer registered; nothing happened
    UnknownSender,
}

/// Route one text frame received from `from`
///
/// Malformed frames come back as [`RelayError::MalformedMessage`] and leave
/// the registry untouched; the caller keeps the connection open.
pub fn dispatch(registry: &mut Registry, from: ConnectionId, text: &str) -> Result<Dispatch> {
    let envelope = Envelope::parse(text)?;

    let Some(sender) = registry.get(from) else {
        debug!("Dropping frame from unregistered connection {}", from);
        return Ok(Dispatch::UnknownSender);
    };

    match envelope {
        Envelope::Conn(token) => {
            debug!("Connection {} token set to {:?}", from, token);
            registry.set_token(from, token);
            Ok(Dispatch::TokenSet)
        }
        Envelope::Ping => {
            let frame = Envelope::pong().to_frame()?;
            if sender.send(&frame).is_err() {
                directory::deregister(registry, from);
            }
            Ok(Dispatch::Ponged)
        }
        data => forward(registry, from, &data),
    }
}

/// Deliver `envelope` to every opposite-class connection sharing the sender's token
///
/// A peer that cannot be reached is deregistered after the fan-out; delivery
/// to the other peers is unaffected.
fn forward(registry: &mut Registry, from: ConnectionId, envelope: &Envelope) -> Result<Dispatch> {
    let Some(sender) = registry.get(from) else {
        return Ok(Dispatch::UnknownSender);
    };
    let target = sender.class.opposite();
    let token = sender.token.clone();
    let frame = envelope.to_frame()?;

    let mut delivered = 0;
    let mut dead = Vec::new();
    for peer in registry.by_class(target).filter(|c| c.token == token) {
        match peer.send(&frame) {
            Ok(()) => delivered += 1,
            Err(RelayError::PeerGone(id)) => dead.push(id),
            Err(e) => warn!("Unexpected error delivering to {}: {}", peer.id, e),
        }
    }

    let dropped = dead.len();
    if dropped > 0 {
        for id in dead {
            warn!("Peer {} unreachable, dropping it", id);
            directory::deregister(registry, id);
        }
        liveness::sweep(registry);
    }

    debug!(
        "Forwarded {} from {} to {} {}(s), {} dropped",
        envelope.kind(),
        from,
        delivered,
        target,
        dropped
    );
    Ok(Dispatch::Forwarded { delivered, dropped })
}
