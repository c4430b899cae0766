use thiserror::Error;

/// Every way a client operation can be refused.
///
/// The `Display` text is what goes out on the wire as `error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Username is required")]
    UsernameRequired,
    #[error("Username already taken")]
    NameTaken,
    #[error("You are already logged in")]
    AlreadyLoggedIn,
    #[error("You must log in first")]
    NotLoggedIn,
    #[error("Name is required")]
    NameRequired,
    #[error("Max users must be at least 1")]
    InvalidCapacity,
    #[error("Room already exists")]
    RoomExists,
    #[error("Room id is required")]
    IdRequired,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Wrong password")]
    WrongPassword,
    #[error("Room is full")]
    RoomFull,
    #[error("You are already in this room")]
    AlreadyIn,
    #[error("You are not in a room")]
    NotInRoom,
    #[error("Session is gone")]
    UnknownSession,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Authorization,
    Capacity,
    /// Not really a failure, the caller should redirect into the room.
    SoftConflict,
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        use RoomError::*;
        match self {
            UsernameRequired | NameRequired | InvalidCapacity | IdRequired | NotInRoom
            | InvalidRequest(_) => ErrorKind::Validation,
            NameTaken | AlreadyLoggedIn | RoomExists => ErrorKind::Conflict,
            RoomNotFound | UnknownSession => ErrorKind::NotFound,
            NotLoggedIn | WrongPassword => ErrorKind::Authorization,
            RoomFull => ErrorKind::Capacity,
            AlreadyIn => ErrorKind::SoftConflict,
        }
    }
}

pub type RoomResult<T> = Result<T, RoomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings() {
        assert_eq!(RoomError::WrongPassword.to_string(), "Wrong password");
        assert_eq!(RoomError::RoomFull.to_string(), "Room is full");
        assert_eq!(RoomError::NameRequired.to_string(), "Name is required");
        assert_eq!(RoomError::NameTaken.to_string(), "Username already taken");
    }

    #[test]
    fn already_in_is_soft() {
        assert_eq!(RoomError::AlreadyIn.kind(), ErrorKind::SoftConflict);
        assert_eq!(RoomError::RoomFull.kind(), ErrorKind::Capacity);
        assert_eq!(RoomError::RoomNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(RoomError::InvalidRequest("bad".to_owned()).kind(), ErrorKind::Validation);
    }
}
