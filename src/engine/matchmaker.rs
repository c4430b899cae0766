//! "Chat with a stranger" and "join a random room".
//!
//! Nothing is queued: each request looks at the registry as it is right now,
//! and whoever finds no open seat opens the room the next requester will find.

use rand::seq::IndexedRandom;
use tracing::info;

use crate::error::{RoomError, RoomResult};

use super::{Channel, Engine, RoomSpec, RoomSummary, SessionId};

pub const STRANGER_ROOM_SIZE: u32 = 2;

impl Engine {
    pub async fn chat_stranger(&self, session_id: SessionId) -> RoomResult<RoomSummary> {
        let summary = {
            let mut state = self.state.lock().await;
            state.identity_of(session_id)?;

            let candidates = state.registry.stranger_candidates(session_id);
            let pick = candidates.choose(&mut rand::rng()).copied();
            match pick {
                Some(room_id) => {
                    info!(session = %session_id, room = %room_id, "matched with a stranger");
                    state.join(session_id, room_id, None, Channel::Stranger)?
                }
                None => {
                    let spec = RoomSpec {
                        name: state.registry.stranger_pool().to_owned(),
                        password: None,
                        capacity: STRANGER_ROOM_SIZE,
                        anonymous: false,
                    };
                    let summary = state.create_and_join(session_id, spec, Channel::Stranger)?;
                    info!(session = %session_id, room = %summary.id, "waiting for a stranger");
                    summary
                }
            }
        };
        self.count_join(session_id, &summary).await;
        Ok(summary)
    }

    pub async fn join_random(&self, session_id: SessionId) -> RoomResult<RoomSummary> {
        let summary = {
            let mut state = self.state.lock().await;
            state.identity_of(session_id)?;

            let candidates = state.registry.public_candidates(session_id);
            let room_id = *candidates.choose(&mut rand::rng()).ok_or(RoomError::RoomNotFound)?;
            state.join(session_id, room_id, None, Channel::Named)?
        };
        self.count_join(session_id, &summary).await;
        Ok(summary)
    }
}
