mod room;

use std::sync::Arc;

use bandicon_core::SlotError;
use log::info;
use thiserror::Error;

use crate::{
    events::CollabEvent, util::hash_secret, CollabContext, DatabaseError, NewRoom, PrimaryKey,
    RoomData, UserData,
};

pub use room::*;

pub struct RoomManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room does not exist")]
    RoomNotFound,
    #[error("User {0} does not exist")]
    UserNotFound(String),
    #[error("A room needs at least one session")]
    NoSessions,
    #[error("A private room needs a password")]
    PasswordRequired,
    #[error("The room password is incorrect")]
    InvalidPassword,
    #[error("Messages must be between 1 and {} characters", Room::MAX_MESSAGE_LENGTH)]
    InvalidMessage,
    #[error("Only ended rooms can be evaluated")]
    NotEnded,
    #[error("You have already evaluated this room")]
    AlreadyEvaluated,
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

/// The order rooms are listed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoomOrder {
    /// Newest rooms first
    #[default]
    Latest,
    /// Oldest rooms first
    Oldest,
}

/// A request to open a new room
#[derive(Debug)]
pub struct NewRoomRequest {
    pub title: String,
    pub song: String,
    pub artist: String,
    pub description: Option<String>,
    pub is_private: bool,
    /// The plain text password, required for private rooms
    pub password: Option<String>,
    pub clan_id: Option<PrimaryKey>,
    pub sessions: Vec<String>,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Restores the rooms from the database on init
    pub async fn restore(&self) -> Result<(), DatabaseError> {
        let rooms: Vec<_> = self
            .context
            .database
            .list_rooms()
            .await?
            .into_iter()
            .map(|r| (r.id, Room::new(&self.context, r)))
            .collect();

        let count = rooms.len();

        for (id, room) in rooms {
            self.context.rooms.insert(id, room.into());
        }

        info!("Restored {} rooms", count);
        Ok(())
    }

    /// Creates a new room managed by the given user. Every session starts vacant.
    pub async fn create_room(
        &self,
        manager: &UserData,
        request: NewRoomRequest,
    ) -> Result<Arc<Room>, RoomError> {
        let sessions: Vec<_> = request
            .sessions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if sessions.is_empty() {
            return Err(RoomError::NoSessions);
        }

        let password = match (request.is_private, request.password) {
            (true, Some(password)) if !password.is_empty() => {
                Some(hash_secret(&password).map_err(RoomError::HashError)?)
            }
            (true, _) => return Err(RoomError::PasswordRequired),
            (false, _) => None,
        };

        let room_data = self
            .context
            .database
            .create_room(NewRoom {
                title: request.title,
                song: request.song,
                artist: request.artist,
                description: request.description,
                is_private: request.is_private,
                password,
                clan_id: request.clan_id,
                user_id: manager.id,
                sessions,
            })
            .await?;

        let room = Arc::new(Room::new(&self.context, room_data.clone()));
        self.context.rooms.insert(room.id(), room.clone());

        info!(
            "{} created room {} with {} sessions",
            manager.nickname,
            room_data.title,
            room_data.lineup.slots.len()
        );

        self.context.emit(CollabEvent::RoomCreated { room: room_data });

        Ok(room)
    }

    pub fn room_by_id(&self, room_id: PrimaryKey) -> Result<Arc<Room>, RoomError> {
        self.context
            .rooms
            .get(&room_id)
            .map(|r| r.clone())
            .ok_or(RoomError::RoomNotFound)
    }

    /// Returns the room containing the slot
    pub fn room_by_slot_id(&self, slot_id: PrimaryKey) -> Result<Arc<Room>, RoomError> {
        self.context
            .rooms
            .iter()
            .find(|r| r.has_slot(slot_id))
            .map(|r| r.clone())
            .ok_or(RoomError::Slot(SlotError::SlotNotFound(slot_id)))
    }

    /// Get all rooms in memory
    pub fn list_all(&self) -> Vec<Arc<Room>> {
        self.context.rooms.iter().map(|r| r.clone()).collect()
    }

    /// General rooms that can still be joined, newest first
    pub fn list_open(&self) -> Vec<Arc<Room>> {
        self.list_filtered(RoomOrder::Latest, |room| {
            room.clan_id.is_none() && !room.lineup.is_confirmed() && !room.lineup.is_ended()
        })
    }

    /// Rooms of a clan that have not ended
    pub fn list_clan(&self, clan_id: PrimaryKey, order: RoomOrder) -> Vec<Arc<Room>> {
        self.list_filtered(order, |room| {
            room.clan_id == Some(clan_id) && !room.lineup.is_ended()
        })
    }

    /// Rooms that have not ended where the user is the manager or plays a session
    pub fn list_for_user(&self, user_id: PrimaryKey) -> Vec<Arc<Room>> {
        self.list_filtered(RoomOrder::Latest, |room| {
            !room.lineup.is_ended()
                && (room.lineup.is_manager(user_id) || room.lineup.is_playing(user_id))
        })
    }

    /// Rooms that have not ended and are managed by the user with the nickname
    pub async fn list_managed_by(&self, nickname: &str) -> Result<Vec<Arc<Room>>, RoomError> {
        let user = self
            .context
            .database
            .user_by_nickname(nickname)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => RoomError::UserNotFound(nickname.to_string()),
                err => err.into(),
            })?;

        Ok(self.list_filtered(RoomOrder::Latest, |room| {
            !room.lineup.is_ended() && room.lineup.is_manager(user.id)
        }))
    }

    /// Deletes a room. Only the manager may do this.
    pub async fn delete_room(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        self.room_by_id(room_id)?.delete(user_id).await
    }

    /// Propagates a nickname change to every room the user appears in
    pub async fn rename_member(&self, user: &UserData) {
        let member = user.member();

        for room in self.list_all() {
            room.rename_member(&member).await;
        }
    }

    fn list_filtered<F>(&self, order: RoomOrder, filter: F) -> Vec<Arc<Room>>
    where
        F: Fn(&RoomData) -> bool,
    {
        let mut rooms: Vec<_> = self
            .context
            .rooms
            .iter()
            .map(|r| (r.data(), r.clone()))
            .filter(|(data, _)| filter(data))
            .collect();

        rooms.sort_by(|(a, _), (b, _)| match order {
            RoomOrder::Latest => b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)),
            RoomOrder::Oldest => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
        });

        rooms.into_iter().map(|(_, room)| room).collect()
    }
}
