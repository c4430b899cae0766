//! Wire format for the chat socket.
//!
//! Every text frame, in either direction, is `{"event": <name>, "data": <payload>}`.
//! Replies go out under the same event name as the request that caused them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::{
    engine::{Identity, RoomSummary},
    error::{RoomError, RoomResult},
    stats::Leaderboard,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Login(LoginData),
    FetchUser,
    FetchRooms,
    UsersOnline,
    CreateRoom(CreateRoomData),
    JoinRoom(JoinRoomData),
    JoinRoomStranger(JoinRoomData),
    JoinRandom,
    ChatStranger,
    LeaveRoom,
    LeaveRoomStranger,
    RoomMembers,
    FetchRoom,
    Message(MessageData),
    IsTyping,
    ClearMessages,
    FetchLeaderboard,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginData {
    #[serde(alias = "displayName")]
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomData {
    pub name: Option<String>,
    pub password: Option<String>,
    pub max_users: Option<u32>,
    #[serde(default, alias = "anonymousFlag")]
    pub anonymous: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRoomData {
    pub id: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageData {
    #[serde(default, alias = "text")]
    pub message: String,
    pub file: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Events whose payload is a struct of optional fields. A missing `data`
/// decodes as the empty struct so the operation itself reports what is absent.
const PAYLOAD_EVENTS: [&str; 5] = ["login", "createRoom", "joinRoom", "joinRoomStranger", "message"];

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not an event frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("bad payload for {event}: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientEvent {
    /// Reads the envelope first, then the typed payload, so a frame that
    /// names an event can always be answered under that event.
    pub fn decode(frame: &[u8]) -> Result<ClientEvent, DecodeError> {
        let Envelope { event, data } = serde_json::from_slice(frame).map_err(DecodeError::Malformed)?;
        let data = match data {
            Value::Null if PAYLOAD_EVENTS.contains(&event.as_str()) => Value::Object(Map::new()),
            data => data,
        };
        serde_json::from_value(json!({ "event": &event, "data": data }))
            .map_err(|source| DecodeError::Payload { event, source })
    }
}

/// Outcome of one client operation: `{success, data?, error?, alreadyIn?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_in: bool,
}

impl<T> Reply<T> {
    pub fn ok(data: T) -> Reply<T> {
        Reply { success: true, data: Some(data), error: None, already_in: false }
    }

    pub fn err(err: &RoomError) -> Reply<T> {
        Reply {
            success: false,
            data: None,
            error: Some(err.to_string()),
            already_in: matches!(err, RoomError::AlreadyIn),
        }
    }
}

impl Reply<()> {
    /// Success without a payload.
    pub fn done(result: RoomResult<()>) -> Reply<()> {
        match result {
            Ok(()) => Reply { success: true, data: None, error: None, already_in: false },
            Err(err) => Reply::err(&err),
        }
    }
}

impl<T> From<RoomResult<T>> for Reply<T> {
    fn from(result: RoomResult<T>) -> Self {
        match result {
            Ok(data) => Reply::ok(data),
            Err(err) => Reply::err(&err),
        }
    }
}

/// A chat line or a membership notice, as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub is_self: Option<bool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub system: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ChatMessage {
    pub fn system(message: impl Into<String>) -> ChatMessage {
        ChatMessage {
            user: None,
            message: message.into(),
            date: None,
            is_self: None,
            system: true,
            file: None,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsSnapshot {
    pub is_logged_in: bool,
    pub user: Option<Identity>,
    pub rooms: Vec<RoomSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineCount {
    pub success: bool,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingNotice {
    pub success: bool,
    pub user: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Login(Reply<Identity>),
    User(Option<Identity>),
    Rooms(RoomsSnapshot),
    UsersOnline(OnlineCount),
    CreateRoom(Reply<RoomSummary>),
    JoinRoom(Reply<RoomSummary>),
    JoinRoomStranger(Reply<RoomSummary>),
    JoinRandom(Reply<RoomSummary>),
    ChatStranger(Reply<RoomSummary>),
    LeaveRoom(Reply<()>),
    LeaveRoomStranger(Reply<()>),
    RoomMembers(Reply<Vec<Identity>>),
    FetchRoom(Reply<RoomSummary>),
    Message(ChatMessage),
    IsTyping(TypingNotice),
    ClearMessages(Ack),
    Leaderboard(Leaderboard),
}

impl ServerEvent {
    /// The failure reply for a request named `event`, when that request is
    /// one that gets a `{success, error}` answer.
    pub fn rejection(event: &str, err: &RoomError) -> Option<ServerEvent> {
        use ServerEvent::*;
        let reply = match event {
            "login" => Login(Reply::err(err)),
            "createRoom" => CreateRoom(Reply::err(err)),
            "joinRoom" => JoinRoom(Reply::err(err)),
            "joinRoomStranger" => JoinRoomStranger(Reply::err(err)),
            "joinRandom" => JoinRandom(Reply::err(err)),
            "chatStranger" => ChatStranger(Reply::err(err)),
            "leaveRoom" => LeaveRoom(Reply::err(err)),
            "leaveRoomStranger" => LeaveRoomStranger(Reply::err(err)),
            "roomMembers" => RoomMembers(Reply::err(err)),
            "fetchRoom" => FetchRoom(Reply::err(err)),
            _ => return None,
        };
        Some(reply)
    }

    pub fn name(&self) -> &'static str {
        use ServerEvent::*;
        match self {
            Login(_) => "login",
            User(_) => "user",
            Rooms(_) => "rooms",
            UsersOnline(_) => "usersOnline",
            CreateRoom(_) => "createRoom",
            JoinRoom(_) => "joinRoom",
            JoinRoomStranger(_) => "joinRoomStranger",
            JoinRandom(_) => "joinRandom",
            ChatStranger(_) => "chatStranger",
            LeaveRoom(_) => "leaveRoom",
            LeaveRoomStranger(_) => "leaveRoomStranger",
            RoomMembers(_) => "roomMembers",
            FetchRoom(_) => "fetchRoom",
            Message(_) => "message",
            IsTyping(_) => "isTyping",
            ClearMessages(_) => "clearMessages",
            Leaderboard(_) => "leaderboard",
        }
    }
}
