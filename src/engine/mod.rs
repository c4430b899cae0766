//! Live room and presence coordination.
//!
//! All live state sits in one [`EngineState`] behind a single async mutex.
//! Every client operation takes the lock once, runs to completion without
//! awaiting, and queues whatever it needs to tell other sessions before
//! letting go. So joins, leaves and capacity checks against a room are
//! applied in a total order, and nobody can observe a half-applied move.

mod identity;
mod matchmaker;
mod presence;
mod registry;
mod relay;
mod room;
mod session;

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

pub use identity::{ANONYMOUS, Identity, is_verified};
pub use presence::spawn_ticker;
pub use registry::{Departure, RoomRegistry};
pub use room::{Room, RoomId, RoomSpec, RoomSummary, sanitize_name};
pub use session::{Session, SessionId, SessionState};

use crate::{
    config::EngineConfig,
    error::{RoomError, RoomResult},
    protocol::{Ack, ClientEvent, CreateRoomData, DecodeError, OnlineCount, Reply, ServerEvent},
    stats::{self, Counter, PersistenceGateway},
};

/// Which UI flow a join or leave came through. Only changes the wording of
/// membership notices and whether the remaining members' history is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Named,
    Stranger,
}

#[derive(Debug)]
pub struct EngineState {
    sessions: HashMap<SessionId, Session>,
    names: HashMap<String, SessionId>,
    registry: RoomRegistry,
}

impl EngineState {
    fn new(stranger_pool: &str) -> EngineState {
        EngineState {
            sessions: HashMap::new(),
            names: HashMap::new(),
            registry: RoomRegistry::new(stranger_pool),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    fn identity_of(&self, session_id: SessionId) -> RoomResult<Identity> {
        self.sessions
            .get(&session_id)
            .ok_or(RoomError::UnknownSession)?
            .identity
            .clone()
            .ok_or(RoomError::NotLoggedIn)
    }

    fn joined_room(&self, session_id: SessionId) -> RoomResult<RoomId> {
        self.sessions
            .get(&session_id)
            .ok_or(RoomError::UnknownSession)?
            .joined
            .ok_or(RoomError::NotInRoom)
    }

    fn send(&self, session_id: SessionId, event: ServerEvent) {
        if let Some(session) = self.sessions.get(&session_id) {
            session.send(event);
        }
    }

    fn login(
        &mut self,
        session_id: SessionId,
        username: String,
        email: Option<String>,
        config: &EngineConfig,
    ) -> RoomResult<Identity> {
        let session = self.sessions.get(&session_id).ok_or(RoomError::UnknownSession)?;
        if session.identity.is_some() {
            return Err(RoomError::AlreadyLoggedIn);
        }
        if self.names.contains_key(&username) {
            return Err(RoomError::NameTaken);
        }

        let identity = Identity::new(username.clone(), email, &config.verified_names);
        self.names.insert(username, session_id);
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.identity = Some(identity.clone());
        }
        Ok(identity)
    }

    fn join(
        &mut self,
        session_id: SessionId,
        room_id: RoomId,
        password: Option<&str>,
        channel: Channel,
    ) -> RoomResult<RoomSummary> {
        self.identity_of(session_id)?;
        self.registry.check_admission(room_id, session_id, password)?;
        self.enter(session_id, room_id, channel)
    }

    fn create_and_join(
        &mut self,
        session_id: SessionId,
        spec: RoomSpec,
        channel: Channel,
    ) -> RoomResult<RoomSummary> {
        let owner = self.identity_of(session_id)?;
        let room = self.registry.create(spec, owner)?;
        self.enter(session_id, room.id, channel)
    }

    /// Moves a session into a room it has already been cleared for, leaving
    /// its current room first.
    fn enter(
        &mut self,
        session_id: SessionId,
        room_id: RoomId,
        channel: Channel,
    ) -> RoomResult<RoomSummary> {
        self.depart(session_id, channel, false);

        if let Err(err) = self.registry.admit(room_id, session_id) {
            self.registry.destroy_if_empty(room_id);
            return Err(err);
        }
        let Some(session) = self.sessions.get_mut(&session_id) else {
            self.registry.remove_member(room_id, session_id);
            return Err(RoomError::UnknownSession);
        };
        session.joined = Some(room_id);
        session.is_typing = false;
        let username = session.username().unwrap_or(ANONYMOUS).to_owned();

        self.push_roster(room_id);
        let notice = self.joined_notice(room_id, &username, channel);
        self.notify_room(room_id, Some(session_id), notice);

        self.registry.summary(room_id).ok_or(RoomError::RoomNotFound)
    }

    /// The leave protocol. Returns the room that was left, if any.
    fn depart(&mut self, session_id: SessionId, channel: Channel, clear_history: bool) -> Option<RoomId> {
        let session = self.sessions.get_mut(&session_id)?;
        let room_id = session.joined.take()?;
        session.is_typing = false;
        let username = session.username().unwrap_or(ANONYMOUS).to_owned();
        // worded before removal, the room may not survive it
        let notice = self.left_notice(room_id, &username, channel);

        match self.registry.remove_member(room_id, session_id) {
            Departure::Remaining(_) => {
                if clear_history {
                    self.notify_room(room_id, None, ServerEvent::ClearMessages(Ack { success: true }));
                }
                self.push_roster(room_id);
                self.notify_room(room_id, None, notice);
            }
            Departure::Destroyed(_) | Departure::NotMember => {}
        }
        Some(room_id)
    }

    fn disconnect(&mut self, session_id: SessionId) -> Option<Session> {
        self.depart(session_id, Channel::Named, false);
        let session = self.sessions.remove(&session_id)?;
        if let Some(username) = session.username() {
            if self.names.get(username) == Some(&session_id) {
                self.names.remove(username);
            }
        }
        Some(session)
    }

    /// Cross-checks sessions, the name table and the room registry.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.registry.check_invariants()?;

        for (id, session) in &self.sessions {
            if session.id != *id {
                return Err(format!("session {} is filed under {id}", session.id));
            }
            if let Some(room_id) = session.joined {
                if !self.registry.contains(room_id) {
                    return Err(format!("session {id} points at dead room {room_id}"));
                }
                if !self.registry.is_member(room_id, *id) {
                    return Err(format!("session {id} is not counted in room {room_id}"));
                }
                if session.identity.is_none() {
                    return Err(format!("session {id} sits in room {room_id} without identity"));
                }
            }
            if let Some(username) = session.username() {
                if self.names.get(username) != Some(id) {
                    return Err(format!("name {username:?} is not held by session {id}"));
                }
            }
        }

        for room in self.registry.list_non_lobby_rooms() {
            for member in self.registry.members(room.id) {
                let joined = self.sessions.get(&member).and_then(|s| s.joined);
                if joined != Some(room.id) {
                    return Err(format!("room {} counts session {member} which is elsewhere", room.id));
                }
            }
        }

        if self.names.len() != self.sessions.values().filter(|s| s.identity.is_some()).count() {
            return Err("name table out of step with logged in sessions".to_owned());
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
    stats: Arc<dyn PersistenceGateway>,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(config: EngineConfig, stats: Arc<dyn PersistenceGateway>) -> Engine {
        Engine {
            state: Arc::new(Mutex::new(EngineState::new(&config.stranger_pool))),
            stats,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<dyn PersistenceGateway> {
        &self.stats
    }

    /// Runs `f` against a consistent view of the whole engine.
    pub async fn inspect<T>(&self, f: impl FnOnce(&EngineState) -> T) -> T {
        f(&*self.state.lock().await)
    }

    pub async fn check_invariants(&self) -> Result<(), String> {
        self.state.lock().await.check_invariants()
    }

    pub async fn connect(&self) -> (SessionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_queue);
        let session_id = SessionId::generate();
        self.state.lock().await.sessions.insert(session_id, Session::new(session_id, tx));
        info!(session = %session_id, "connected");
        (session_id, rx)
    }

    /// Leaves any room, frees the username and forgets the session.
    pub async fn disconnect(&self, session_id: SessionId) {
        let session = self.state.lock().await.disconnect(session_id);
        if let Some(session) = session {
            info!(session = %session_id, user = session.username(), "disconnected");
        }
    }

    pub async fn login(
        &self,
        session_id: SessionId,
        username: Option<String>,
        email: Option<String>,
    ) -> RoomResult<Identity> {
        let username = username
            .filter(|name| !name.trim().is_empty())
            .ok_or(RoomError::UsernameRequired)?;
        let identity = self.state.lock().await.login(session_id, username, email, &self.config)?;
        info!(session = %session_id, user = %identity.username, verified = identity.verified, "logged in");
        Ok(identity)
    }

    pub async fn user(&self, session_id: SessionId) -> Option<Identity> {
        self.state.lock().await.identity_of(session_id).ok()
    }

    pub async fn create_room(&self, session_id: SessionId, data: CreateRoomData) -> RoomResult<RoomSummary> {
        let name = data.name.ok_or(RoomError::NameRequired)?;
        let spec = RoomSpec {
            name,
            password: data.password,
            capacity: data.max_users.unwrap_or(self.config.default_max_users),
            anonymous: data.anonymous,
        };
        let summary = self.state.lock().await.create_and_join(session_id, spec, Channel::Named)?;
        self.count_join(session_id, &summary).await;
        Ok(summary)
    }

    pub async fn join_room(
        &self,
        session_id: SessionId,
        id: Option<&str>,
        password: Option<&str>,
        channel: Channel,
    ) -> RoomResult<RoomSummary> {
        let id = id.filter(|id| !id.is_empty()).ok_or(RoomError::IdRequired)?;
        let room_id: RoomId = id.parse().map_err(|_| RoomError::RoomNotFound)?;
        let summary = self.state.lock().await.join(session_id, room_id, password, channel)?;
        self.count_join(session_id, &summary).await;
        Ok(summary)
    }

    pub async fn leave_room(&self, session_id: SessionId, channel: Channel) -> RoomResult<()> {
        let mut state = self.state.lock().await;
        state.joined_room(session_id)?;
        state.depart(session_id, channel, channel == Channel::Stranger);
        Ok(())
    }

    pub async fn fetch_room(&self, session_id: SessionId) -> RoomResult<RoomSummary> {
        let state = self.state.lock().await;
        let room_id = state.joined_room(session_id)?;
        state.registry.summary(room_id).ok_or(RoomError::RoomNotFound)
    }

    /// Re-sends the roster of the caller's room to everyone in it.
    pub async fn room_members(&self, session_id: SessionId) -> RoomResult<()> {
        let state = self.state.lock().await;
        let room_id = state.joined_room(session_id)?;
        state.push_roster(room_id);
        Ok(())
    }

    pub async fn online_count(&self) -> usize {
        self.state.lock().await.online_count()
    }

    async fn count_join(&self, session_id: SessionId, summary: &RoomSummary) {
        if let Some(identity) = self.user(session_id).await {
            info!(session = %session_id, user = %identity.username, room = %summary.id, "joined room");
            stats::record(&self.stats, Counter::RoomJoins, &identity.username);
        }
    }

    async fn reply(&self, session_id: SessionId, event: ServerEvent) {
        self.state.lock().await.send(session_id, event);
    }

    /// Answers a frame that named an event but could not be read as one.
    pub async fn reject(&self, session_id: SessionId, err: DecodeError) {
        let (event, source) = match err {
            DecodeError::Payload { event, source } => (event, source),
            malformed => {
                debug!(session = %session_id, err = %malformed, "undecodable frame");
                return;
            }
        };
        let err = RoomError::InvalidRequest(source.to_string());
        debug!(session = %session_id, %event, kind = ?err.kind(), %err, "rejected");
        match ServerEvent::rejection(&event, &err) {
            Some(reply) => self.reply(session_id, reply).await,
            None => debug!(session = %session_id, %event, "no reply for unreadable event"),
        }
    }

    /// Applies one client operation and answers on the matching event.
    pub async fn handle(&self, session_id: SessionId, event: ClientEvent) {
        use ClientEvent::*;
        match event {
            Login(data) => {
                let result = self.login(session_id, data.username, data.email).await;
                log_rejection(session_id, "login", &result);
                self.reply(session_id, ServerEvent::Login(result.into())).await;
            }
            FetchUser => {
                let user = self.user(session_id).await;
                self.reply(session_id, ServerEvent::User(user)).await;
            }
            FetchRooms => {
                self.push_presence(session_id).await;
            }
            UsersOnline => {
                let users = self.online_count().await;
                self.reply(session_id, ServerEvent::UsersOnline(OnlineCount { success: true, users }))
                    .await;
            }
            CreateRoom(data) => {
                let result = self.create_room(session_id, data).await;
                log_rejection(session_id, "createRoom", &result);
                self.reply(session_id, ServerEvent::CreateRoom(result.into())).await;
            }
            JoinRoom(data) => {
                let result = self
                    .join_room(session_id, data.id.as_deref(), data.password.as_deref(), Channel::Named)
                    .await;
                log_rejection(session_id, "joinRoom", &result);
                self.reply(session_id, ServerEvent::JoinRoom(result.into())).await;
            }
            JoinRoomStranger(data) => {
                let result = self
                    .join_room(session_id, data.id.as_deref(), data.password.as_deref(), Channel::Stranger)
                    .await;
                log_rejection(session_id, "joinRoomStranger", &result);
                self.reply(session_id, ServerEvent::JoinRoomStranger(result.into())).await;
            }
            JoinRandom => {
                let result = self.join_random(session_id).await;
                log_rejection(session_id, "joinRandom", &result);
                self.reply(session_id, ServerEvent::JoinRandom(result.into())).await;
            }
            ChatStranger => {
                let result = self.chat_stranger(session_id).await;
                log_rejection(session_id, "chatStranger", &result);
                self.reply(session_id, ServerEvent::ChatStranger(result.into())).await;
            }
            LeaveRoom => {
                let result = self.leave_room(session_id, Channel::Named).await;
                log_rejection(session_id, "leaveRoom", &result);
                self.reply(session_id, ServerEvent::LeaveRoom(Reply::done(result))).await;
            }
            LeaveRoomStranger => {
                let result = self.leave_room(session_id, Channel::Stranger).await;
                log_rejection(session_id, "leaveRoomStranger", &result);
                self.reply(session_id, ServerEvent::LeaveRoomStranger(Reply::done(result))).await;
            }
            RoomMembers => {
                if let Err(err) = self.room_members(session_id).await {
                    debug!(session = %session_id, kind = ?err.kind(), %err, "roomMembers rejected");
                    self.reply(session_id, ServerEvent::RoomMembers(Reply::err(&err))).await;
                }
            }
            FetchRoom => {
                let result = self.fetch_room(session_id).await;
                log_rejection(session_id, "fetchRoom", &result);
                self.reply(session_id, ServerEvent::FetchRoom(result.into())).await;
            }
            Message(data) => {
                if let Err(err) = self.relay_message(session_id, data).await {
                    debug!(session = %session_id, kind = ?err.kind(), %err, "message dropped");
                }
            }
            IsTyping => {
                if let Err(err) = self.typing(session_id).await {
                    debug!(session = %session_id, kind = ?err.kind(), %err, "typing notice dropped");
                }
            }
            ClearMessages => {
                self.reply(session_id, ServerEvent::ClearMessages(Ack { success: true })).await;
            }
            FetchLeaderboard => {
                let board = stats::leaderboard(self.stats.as_ref()).await;
                self.reply(session_id, ServerEvent::Leaderboard(board)).await;
            }
        }
    }
}

fn log_rejection<T>(session_id: SessionId, event: &str, result: &RoomResult<T>) {
    if let Err(err) = result {
        debug!(session = %session_id, event, kind = ?err.kind(), %err, "rejected");
    }
}
