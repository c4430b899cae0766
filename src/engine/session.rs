use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use uuid::Uuid;

use crate::protocol::ServerEvent;

use super::{Identity, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> SessionId {
        SessionId(Uuid::now_v7())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Identified,
    InRoom(RoomId),
}

/// Server side of one live connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub identity: Option<Identity>,
    pub joined: Option<RoomId>,
    pub is_typing: bool,
    tx: mpsc::Sender<ServerEvent>,
}

impl Session {
    pub(crate) fn new(id: SessionId, tx: mpsc::Sender<ServerEvent>) -> Session {
        Session {
            id,
            identity: None,
            joined: None,
            is_typing: false,
            tx,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.identity, self.joined) {
            (_, Some(room_id)) => SessionState::InRoom(room_id),
            (Some(_), None) => SessionState::Identified,
            (None, None) => SessionState::Anonymous,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.username.as_str())
    }

    /// Queues an event for the socket writer without waiting.
    ///
    /// A full queue means the client stopped reading, so the event is
    /// dropped. A closed queue means the connection is already going away,
    /// and its disconnect will clean up.
    pub fn send(&self, event: ServerEvent) {
        if let Err(TrySendError::Full(event)) = self.tx.try_send(event) {
            warn!(session = %self.id, event = event.name(), "outbound queue full, dropping event");
        }
    }
}
