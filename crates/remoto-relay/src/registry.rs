//! Connection registry
//!
//! The insertion-ordered set of live connections. Exactly one owner (the relay
//! hub) mutates it, so nothing here locks.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// Identity of one accepted socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which side of the relay a client is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientClass {
    /// Controllable endpoint, listed in the directory
    Terminal,
    /// Controller, receives the directory
    Remote,
}

impl ClientClass {
    /// Interpret the `type` query parameter; anything but `terminal` is a remote
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("terminal") => ClientClass::Terminal,
            _ => ClientClass::Remote,
        }
    }

    /// The class this one exchanges data with
    pub fn opposite(self) -> Self {
        match self {
            ClientClass::Terminal => ClientClass::Remote,
            ClientClass::Remote => ClientClass::Terminal,
        }
    }
}

impl fmt::Display for ClientClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientClass::Terminal => f.write_str("terminal"),
            ClientClass::Remote => f.write_str("remote"),
        }
    }
}

/// Raw handshake query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub token: Option<String>,
    pub label: Option<String>,
}

/// A handshake that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub class: ClientClass,
    pub token: Option<String>,
    pub label: Option<String>,
}

impl TryFrom<HandshakeParams> for Handshake {
    type Error = RelayError;

    /// Terminals must bring a non-empty token and label; remotes need neither
    fn try_from(params: HandshakeParams) -> Result<Self> {
        let class = ClientClass::from_query(params.kind.as_deref());
        let token = params.token.filter(|t| !t.is_empty());
        let label = params.label.filter(|l| !l.is_empty());

        if class == ClientClass::Terminal {
            if token.is_none() {
                return Err(RelayError::HandshakeRejected("terminal without token".to_string()));
            }
            if label.is_none() {
                return Err(RelayError::HandshakeRejected("terminal without label".to_string()));
            }
        }

        Ok(Self { class, token, label })
    }
}

/// A registered client and the queue feeding its socket writer
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub class: ClientClass,
    pub token: Option<String>,
    pub label: Option<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn new(id: ConnectionId, handshake: Handshake, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            class: handshake.class,
            token: handshake.token,
            label: handshake.label,
            outbound,
        }
    }

    /// Queue a text frame for this client
    ///
    /// Fails once the socket writer has stopped, which means the peer is dead.
    pub fn send(&self, frame: &str) -> Result<()> {
        self.outbound
            .send(frame.to_string())
            .map_err(|_| RelayError::PeerGone(self.id))
    }

    /// Whether the socket behind this entry is observably closed
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    fn is_valid(&self) -> bool {
        match self.class {
            ClientClass::Terminal => self.token.is_some() && self.label.is_some(),
            ClientClass::Remote => true,
        }
    }
}

/// Insertion-ordered collection of live connections
#[derive(Debug, Default)]
pub struct Registry {
    connections: Vec<Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection
    ///
    /// A terminal without token and label never gets an entry.
    pub fn add(&mut self, connection: Connection) -> Result<()> {
        if !connection.is_valid() {
            return Err(RelayError::HandshakeRejected(format!(
                "{} {} is missing token or label",
                connection.class, connection.id
            )));
        }
        if self.contains(connection.id) {
            debug!("Connection {} already registered", connection.id);
            return Ok(());
        }
        self.connections.push(connection);
        Ok(())
    }

    /// Remove by identity; `None` if it was already gone
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let index = self.connections.iter().position(|c| c.id == id)?;
        Some(self.connections.remove(index))
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    /// Overwrite the pairing token of a connection
    pub fn set_token(&mut self, id: ConnectionId, token: Option<String>) -> bool {
        match self.connections.iter_mut().find(|c| c.id == id) {
            Some(connection) => {
                connection.token = token;
                true
            }
            None => false,
        }
    }

    /// Connections of one class, in registry order
    pub fn by_class(&self, class: ClientClass) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.class == class)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
