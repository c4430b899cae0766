use std::{fmt, str::FromStr};

use serde::Serialize;
use uuid::Uuid;

use super::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn generate() -> RoomId {
        RoomId(Uuid::now_v7())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(RoomId)
    }
}

/// What a caller asks for when creating a room.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub name: String,
    pub password: Option<String>,
    pub capacity: u32,
    pub anonymous: bool,
}

/// A live room. Who is inside is tracked by the registry, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub owner: Identity,
    password: Option<String>,
    pub capacity: u32,
    pub anonymous: bool,
}

impl Room {
    pub(crate) fn new(id: RoomId, name: String, owner: Identity, spec: RoomSpec) -> Room {
        Room {
            id,
            name,
            owner,
            password: spec.password.filter(|p| !p.is_empty()),
            capacity: spec.capacity,
            anonymous: spec.anonymous,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.password.is_some()
    }

    /// Rooms without a password let anyone in, whatever they typed.
    pub fn accepts(&self, password: Option<&str>) -> bool {
        match &self.password {
            Some(expected) => password == Some(expected.as_str()),
            None => true,
        }
    }

    pub fn summary(&self, users: usize) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            owner: self.owner.clone(),
            password_protected: self.is_protected(),
            max_users: self.capacity,
            users,
            anonymous: self.anonymous,
        }
    }
}

/// Point-in-time view of a room, as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub owner: Identity,
    pub password_protected: bool,
    pub max_users: u32,
    pub users: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub anonymous: bool,
}

/// Keeps ASCII letters, digits and spaces; everything else is dropped.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect()
}
