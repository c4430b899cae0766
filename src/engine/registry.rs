//! The one authoritative table of live rooms.
//!
//! Rooms are stored by id. Two indexes sit next to the table and are only
//! ever changed together with it:
//! - `room -> sessions`: derived membership, used for rosters and fan-out
//! - `name -> room`: display-name uniqueness, except for the stranger pool
//!
//! The registry does not know about sessions beyond their ids; keeping
//! `Session::joined` in step with `members` is the engine's job.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use crate::error::{RoomError, RoomResult};

use super::{Identity, Room, RoomId, RoomSpec, RoomSummary, SessionId, sanitize_name};

#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    members: HashMap<RoomId, BTreeSet<SessionId>>,
    names: HashMap<String, RoomId>,
    stranger_pool: String,
}

/// What happened to a room after someone was taken out of it.
#[derive(Debug, PartialEq, Eq)]
pub enum Departure {
    NotMember,
    Remaining(usize),
    Destroyed(Room),
}

impl RoomRegistry {
    pub fn new(stranger_pool: impl Into<String>) -> Self {
        Self {
            rooms: HashMap::new(),
            members: HashMap::new(),
            names: HashMap::new(),
            stranger_pool: stranger_pool.into(),
        }
    }

    pub fn stranger_pool(&self) -> &str {
        &self.stranger_pool
    }

    pub fn is_pool_room(&self, room: &Room) -> bool {
        room.name == self.stranger_pool
    }

    /// Registers a new, still empty room.
    ///
    /// Callers must admit the creator in the same critical section, or the
    /// room would outlive the step that made it.
    pub fn create(&mut self, spec: RoomSpec, owner: Identity) -> RoomResult<Room> {
        let name = sanitize_name(&spec.name);
        if name.trim().is_empty() {
            return Err(RoomError::NameRequired);
        }
        if spec.capacity == 0 {
            return Err(RoomError::InvalidCapacity);
        }

        let pooled = name == self.stranger_pool;
        if !pooled && self.names.contains_key(&name) {
            return Err(RoomError::RoomExists);
        }

        let id = RoomId::generate();
        let room = Room::new(id, name.clone(), owner, spec);
        if !pooled {
            self.names.insert(name, id);
        }
        self.rooms.insert(id, room.clone());
        self.members.insert(id, BTreeSet::new());

        info!(room = %id, name = %room.name, capacity = room.capacity, "room created");
        Ok(room)
    }

    pub fn get(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    pub fn members(&self, room_id: RoomId) -> impl Iterator<Item = SessionId> + '_ {
        self.members.get(&room_id).into_iter().flat_map(|m| m.iter().copied())
    }

    pub fn member_count(&self, room_id: RoomId) -> usize {
        self.members.get(&room_id).map_or(0, BTreeSet::len)
    }

    pub fn is_member(&self, room_id: RoomId, session_id: SessionId) -> bool {
        self.members.get(&room_id).is_some_and(|m| m.contains(&session_id))
    }

    /// Checks everything a join needs except "already elsewhere", in order:
    /// existence, password, already inside, free slot.
    pub fn check_admission(
        &self,
        room_id: RoomId,
        session_id: SessionId,
        password: Option<&str>,
    ) -> RoomResult<&Room> {
        let room = self.rooms.get(&room_id).ok_or(RoomError::RoomNotFound)?;
        if !room.accepts(password) {
            return Err(RoomError::WrongPassword);
        }
        if self.is_member(room_id, session_id) {
            return Err(RoomError::AlreadyIn);
        }
        if self.member_count(room_id) >= room.capacity as usize {
            return Err(RoomError::RoomFull);
        }
        Ok(room)
    }

    /// Adds a member. Capacity is re-checked so a slot can never be overbooked.
    pub fn admit(&mut self, room_id: RoomId, session_id: SessionId) -> RoomResult<()> {
        let capacity = self.rooms.get(&room_id).ok_or(RoomError::RoomNotFound)?.capacity;
        let members = self.members.entry(room_id).or_default();
        if members.contains(&session_id) {
            return Err(RoomError::AlreadyIn);
        }
        if members.len() >= capacity as usize {
            return Err(RoomError::RoomFull);
        }
        members.insert(session_id);
        Ok(())
    }

    /// Takes a member out, destroying the room if that emptied it.
    pub fn remove_member(&mut self, room_id: RoomId, session_id: SessionId) -> Departure {
        let removed = self.members.get_mut(&room_id).is_some_and(|m| m.remove(&session_id));
        if !removed {
            return Departure::NotMember;
        }

        match self.destroy_if_empty(room_id) {
            Some(room) => Departure::Destroyed(room),
            None => Departure::Remaining(self.member_count(room_id)),
        }
    }

    pub fn destroy_if_empty(&mut self, room_id: RoomId) -> Option<Room> {
        if self.member_count(room_id) > 0 {
            return None;
        }

        let room = self.rooms.remove(&room_id)?;
        self.members.remove(&room_id);
        if self.names.get(&room.name) == Some(&room_id) {
            self.names.remove(&room.name);
        }

        info!(room = %room_id, name = %room.name, "room destroyed");
        Some(room)
    }

    pub fn summary(&self, room_id: RoomId) -> Option<RoomSummary> {
        self.rooms.get(&room_id).map(|room| room.summary(self.member_count(room_id)))
    }

    /// Snapshot of every room with its member count at the time of the call.
    pub fn list_non_lobby_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .values()
            .map(|room| room.summary(self.member_count(room.id)))
            .collect();
        rooms.sort_by_key(|summary| summary.id);
        rooms
    }

    /// Unprotected pool rooms that still have a free seat and do not hold `session_id`.
    pub fn stranger_candidates(&self, session_id: SessionId) -> Vec<RoomId> {
        self.rooms
            .values()
            .filter(|room| self.is_pool_room(room) && !room.is_protected())
            .filter(|room| {
                let count = self.member_count(room.id);
                count < 2 && count < room.capacity as usize
            })
            .filter(|room| !self.is_member(room.id, session_id))
            .map(|room| room.id)
            .collect()
    }

    /// Open named rooms with a free seat, for "join a random room".
    pub fn public_candidates(&self, session_id: SessionId) -> Vec<RoomId> {
        self.rooms
            .values()
            .filter(|room| !self.is_pool_room(room) && !room.is_protected())
            .filter(|room| self.member_count(room.id) < room.capacity as usize)
            .filter(|room| !self.is_member(room.id, session_id))
            .map(|room| room.id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Table-local invariants: no empty or overfull rooms, indexes in step.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (id, room) in &self.rooms {
            let count = self.member_count(*id);
            if count == 0 {
                return Err(format!("room {id} is live with no members"));
            }
            if count > room.capacity as usize {
                return Err(format!("room {id} has {count} members over capacity {}", room.capacity));
            }
            if !self.is_pool_room(room) && self.names.get(&room.name) != Some(id) {
                return Err(format!("room {id} missing from the name index"));
            }
        }
        for id in self.members.keys() {
            if !self.rooms.contains_key(id) {
                return Err(format!("member set left behind for dead room {id}"));
            }
        }
        for (name, id) in &self.names {
            if self.rooms.get(id).is_none_or(|room| &room.name != name) {
                return Err(format!("name index entry {name:?} points at the wrong room"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Identity {
        Identity::new("Alice".to_owned(), None, &[])
    }

    fn spec(name: &str, capacity: u32) -> RoomSpec {
        RoomSpec { name: name.to_owned(), password: None, capacity, anonymous: false }
    }

    #[test]
    fn create_sanitizes_and_indexes_name() {
        let mut registry = RoomRegistry::new("random");
        let room = registry.create(spec("study *hall*", 2), owner()).unwrap();

        assert_eq!(room.name, "study hall");
        assert_eq!(registry.names.get("study hall"), Some(&room.id));
    }

    #[test]
    fn create_rejects_blank_and_duplicate_names() {
        let mut registry = RoomRegistry::new("random");

        assert_eq!(registry.create(spec("", 2), owner()), Err(RoomError::NameRequired));
        assert_eq!(registry.create(spec("%%%", 2), owner()), Err(RoomError::NameRequired));
        assert_eq!(registry.create(spec("study", 0), owner()), Err(RoomError::InvalidCapacity));

        registry.create(spec("study", 2), owner()).unwrap();
        assert_eq!(registry.create(spec("study", 5), owner()), Err(RoomError::RoomExists));
    }

    #[test]
    fn pool_rooms_share_a_name() {
        let mut registry = RoomRegistry::new("random");
        let a = registry.create(spec("random", 2), owner()).unwrap();
        let b = registry.create(spec("random", 2), owner()).unwrap();
        assert_ne!(a.id, b.id);
        assert!(registry.names.is_empty());
        assert_eq!(registry.stranger_candidates(SessionId::generate()).len(), 2);
    }

    #[test]
    fn admit_enforces_capacity() {
        let mut registry = RoomRegistry::new("random");
        let room = registry.create(spec("duo", 2), owner()).unwrap();
        let (a, b, c) = (SessionId::generate(), SessionId::generate(), SessionId::generate());

        registry.admit(room.id, a).unwrap();
        assert_eq!(registry.admit(room.id, a), Err(RoomError::AlreadyIn));
        registry.admit(room.id, b).unwrap();
        assert_eq!(registry.admit(room.id, c), Err(RoomError::RoomFull));
        assert_eq!(registry.check_admission(room.id, c, None).err(), Some(RoomError::RoomFull));
        assert_eq!(registry.member_count(room.id), 2);
    }

    #[test]
    fn last_member_out_destroys_room() {
        let mut registry = RoomRegistry::new("random");
        let room = registry.create(spec("solo", 3), owner()).unwrap();
        let (a, b) = (SessionId::generate(), SessionId::generate());
        registry.admit(room.id, a).unwrap();
        registry.admit(room.id, b).unwrap();

        assert_eq!(registry.remove_member(room.id, a), Departure::Remaining(1));
        assert_eq!(registry.remove_member(room.id, a), Departure::NotMember);
        assert!(matches!(registry.remove_member(room.id, b), Departure::Destroyed(_)));

        assert!(!registry.contains(room.id));
        assert!(registry.list_non_lobby_rooms().is_empty());
        // the name is free again
        registry.create(spec("solo", 3), owner()).unwrap();
    }

    #[test]
    fn stranger_candidates_skip_full_protected_and_own_rooms() {
        let mut registry = RoomRegistry::new("random");
        let me = SessionId::generate();

        let open = registry.create(spec("random", 2), owner()).unwrap();
        registry.admit(open.id, SessionId::generate()).unwrap();

        let full = registry.create(spec("random", 2), owner()).unwrap();
        registry.admit(full.id, SessionId::generate()).unwrap();
        registry.admit(full.id, SessionId::generate()).unwrap();

        let mut locked = spec("random", 2);
        locked.password = Some("pw".to_owned());
        let locked = registry.create(locked, owner()).unwrap();
        registry.admit(locked.id, SessionId::generate()).unwrap();

        let mine = registry.create(spec("random", 2), owner()).unwrap();
        registry.admit(mine.id, me).unwrap();

        let named = registry.create(spec("lounge", 2), owner()).unwrap();
        registry.admit(named.id, SessionId::generate()).unwrap();

        assert_eq!(registry.stranger_candidates(me), vec![open.id]);
        assert_eq!(registry.public_candidates(me), vec![named.id]);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn listing_reports_live_counts() {
        let mut registry = RoomRegistry::new("random");
        let room = registry.create(spec("study", 4), owner()).unwrap();
        registry.admit(room.id, SessionId::generate()).unwrap();
        registry.admit(room.id, SessionId::generate()).unwrap();

        let listed = registry.list_non_lobby_rooms();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].users, 2);
        assert_eq!(listed[0].max_users, 4);
        assert!(!listed[0].password_protected);
    }
}
