use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    error::{RoomError, RoomResult},
    protocol::{ChatMessage, MessageData, ServerEvent, TypingNotice},
    stats::{self, Counter},
};

use super::{Engine, Identity, SessionId};

const IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

impl Engine {
    /// Fans a chat line out to everyone in the sender's room, the sender included.
    pub async fn relay_message(&self, session_id: SessionId, data: MessageData) -> RoomResult<()> {
        let MessageData { message, file, kind } = data;
        let attachment = match (file, kind) {
            (Some(file), Some(kind)) if IMAGE_TYPES.contains(&kind.as_str()) => Some((file, kind)),
            _ => None,
        };
        let (file, kind) = attachment.unzip();
        let date = OffsetDateTime::now_utc().format(&Rfc3339).ok();

        let sender = {
            let mut state = self.state.lock().await;
            let room_id = state.joined_room(session_id)?;
            let sender = state.identity_of(session_id)?;
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.is_typing = false;
            }
            let room = state.registry.get(room_id).ok_or(RoomError::RoomNotFound)?;
            let shown = if room.anonymous { Identity::anonymous() } else { sender.clone() };

            for member in state.registry.members(room_id) {
                state.send(
                    member,
                    ServerEvent::Message(ChatMessage {
                        user: Some(shown.clone()),
                        message: message.clone(),
                        date: date.clone(),
                        is_self: Some(member == session_id),
                        system: false,
                        file: file.clone(),
                        kind: kind.clone(),
                    }),
                );
            }
            sender
        };

        stats::record(&self.stats, Counter::Messages, &sender.username);
        Ok(())
    }

    /// Tells the rest of the room that this session is typing.
    pub async fn typing(&self, session_id: SessionId) -> RoomResult<()> {
        let mut state = self.state.lock().await;
        let room_id = state.joined_room(session_id)?;
        let identity = state.identity_of(session_id)?;
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.is_typing = true;
        }
        let anonymous = state.registry.get(room_id).is_some_and(|room| room.anonymous);
        let user = if anonymous { Identity::anonymous() } else { identity };

        state.notify_room(room_id, Some(session_id), ServerEvent::IsTyping(TypingNotice { success: true, user }));
        Ok(())
    }
}
