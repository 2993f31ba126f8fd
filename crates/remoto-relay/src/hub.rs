//! Relay hub
//!
//! The single owner of the [`Registry`]. Socket tasks never touch the registry
//! directly; they post [`RelayEvent`]s through a [`RelayHandle`] and the hub
//! applies them one at a time, each to completion.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::directory;
use crate::error::{RelayError, Result};
use crate::liveness;
use crate::registry::{Connection, ConnectionId, Registry};
use crate::router::{self, Dispatch};

/// Something that happened on a socket
#[derive(Debug)]
pub enum RelayEvent {
    /// Handshake accepted
    Connected(Connection),
    /// Text frame received
    Frame { id: ConnectionId, text: String },
    /// Socket closed or errored
    Disconnected { id: ConnectionId },
}

/// Cloneable sender side used by socket tasks
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayHandle {
    pub fn connect(&self, connection: Connection) -> Result<()> {
        self.post(RelayEvent::Connected(connection))
    }

    pub fn frame(&self, id: ConnectionId, text: String) -> Result<()> {
        self.post(RelayEvent::Frame { id, text })
    }

    pub fn disconnect(&self, id: ConnectionId) -> Result<()> {
        self.post(RelayEvent::Disconnected { id })
    }

    fn post(&self, event: RelayEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| RelayError::HubClosed)
    }
}

/// Event loop owning the registry
pub struct RelayHub {
    registry: Registry,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    sweep_interval: Option<Duration>,
}

impl RelayHub {
    /// Create a hub and the handle that feeds it
    ///
    /// `sweep_interval` of `None` disables the periodic liveness sweep.
    pub fn new(sweep_interval: Option<Duration>) -> (Self, RelayHandle) {
        let (tx, events) = mpsc::unbounded_channel();
        let hub = Self {
            registry: Registry::new(),
            events,
            sweep_interval: sweep_interval.filter(|d| !d.is_zero()),
        };
        (hub, RelayHandle { tx })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Apply one event to the registry
    pub fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected(connection) => {
                let (id, class) = (connection.id, connection.class);
                match self.registry.add(connection) {
                    Ok(()) => {
                        info!("Registered {} {} ({} live)", class, id, self.registry.len());
                        directory::broadcast(&mut self.registry);
                    }
                    Err(e) => warn!("Not registering {}: {}", id, e),
                }
            }
            RelayEvent::Frame { id, text } => {
                match router::dispatch(&mut self.registry, id, &text) {
                    Ok(Dispatch::UnknownSender) => debug!("Frame from unknown connection {}", id),
                    Ok(_) => {}
                    Err(RelayError::MalformedMessage(e)) => {
                        warn!("Dropping malformed frame from {}: {}", id, e)
                    }
                    Err(e) => warn!("Failed to route frame from {}: {}", id, e),
                }
            }
            RelayEvent::Disconnected { id } => {
                if directory::deregister(&mut self.registry, id) {
                    info!("Connection {} closed ({} live)", id, self.registry.len());
                }
            }
        }
    }

    /// Run until every [`RelayHandle`] has been dropped
    pub async fn run(mut self) {
        let mut ticker = self.sweep_interval.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = next_tick(&mut ticker) => {
                    liveness::sweep(&mut self.registry);
                }
            }
        }

        debug!("Relay hub stopped with {} connections", self.registry.len());
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
