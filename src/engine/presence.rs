//! Rosters, membership notices and the periodic room/online-count push.

use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::debug;

use crate::protocol::{ChatMessage, OnlineCount, Reply, RoomsSnapshot, ServerEvent};

use super::{Channel, Engine, EngineState, Identity, RoomId, SessionId};

impl EngineState {
    /// Members of a room as the room shows them: real identities, or the
    /// placeholder for every seat in an anonymous room.
    pub fn roster(&self, room_id: RoomId) -> Vec<Identity> {
        let anonymous = self.registry.get(room_id).is_some_and(|room| room.anonymous);
        self.registry
            .members(room_id)
            .filter_map(|member| self.sessions.get(&member)?.identity.clone())
            .map(|identity| if anonymous { Identity::anonymous() } else { identity })
            .collect()
    }

    pub(super) fn push_roster(&self, room_id: RoomId) {
        let roster = self.roster(room_id);
        if roster.is_empty() {
            return;
        }
        self.notify_room(room_id, None, ServerEvent::RoomMembers(Reply::ok(roster)));
    }

    pub(super) fn notify_room(&self, room_id: RoomId, except: Option<SessionId>, event: ServerEvent) {
        for member in self.registry.members(room_id) {
            if Some(member) == except {
                continue;
            }
            self.send(member, event.clone());
        }
    }

    fn announces_strangers(&self, room_id: RoomId, channel: Channel) -> bool {
        channel == Channel::Stranger
            || self
                .registry
                .get(room_id)
                .is_some_and(|room| room.anonymous || self.registry.is_pool_room(room))
    }

    pub(super) fn joined_notice(&self, room_id: RoomId, username: &str, channel: Channel) -> ServerEvent {
        let text = if self.announces_strangers(room_id, channel) {
            "A stranger joins the room".to_owned()
        } else {
            format!("{username} joined the room")
        };
        ServerEvent::Message(ChatMessage::system(text))
    }

    pub(super) fn left_notice(&self, room_id: RoomId, username: &str, channel: Channel) -> ServerEvent {
        let text = if self.announces_strangers(room_id, channel) {
            "Stranger left the room".to_owned()
        } else {
            format!("{username} left the room")
        };
        ServerEvent::Message(ChatMessage::system(text))
    }

    /// Sessions holding an identity. The lobby is everyone, so this is the
    /// whole-site figure.
    pub fn online_count(&self) -> usize {
        self.sessions.values().filter(|session| session.identity.is_some()).count()
    }

    pub fn rooms_snapshot(&self, session_id: SessionId) -> Option<RoomsSnapshot> {
        let session = self.sessions.get(&session_id)?;
        Some(RoomsSnapshot {
            is_logged_in: session.identity.is_some(),
            user: session.identity.clone(),
            rooms: self.registry.list_non_lobby_rooms(),
        })
    }
}

impl Engine {
    /// Sends one `rooms` + `usersOnline` pair, both taken from the same
    /// snapshot. Returns `false` once the session is gone.
    pub async fn push_presence(&self, session_id: SessionId) -> bool {
        let state = self.state.lock().await;
        let Some(snapshot) = state.rooms_snapshot(session_id) else {
            return false;
        };
        let users = state.online_count();
        state.send(session_id, ServerEvent::Rooms(snapshot));
        state.send(session_id, ServerEvent::UsersOnline(OnlineCount { success: true, users }));
        true
    }
}

/// Pushes presence to one session on a fixed cadence until it disconnects.
///
/// The first push is one period out, since the `fetchRooms` that starts the
/// ticker is answered directly. Late ticks are skipped rather than replayed, so a slow round never
/// stacks up behind itself.
pub fn spawn_ticker(engine: Engine, session_id: SessionId) -> JoinHandle<()> {
    let period = engine.config().presence_interval;
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.reset();
        loop {
            interval.tick().await;
            if !engine.push_presence(session_id).await {
                debug!(session = %session_id, "presence ticker stopped");
                break;
            }
        }
    })
}
