use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type BoxedDatabase = Box<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can fetch and store bandicon data
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn user_by_nickname(&self, nickname: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData>;
    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()>;
    async fn set_room_confirmed(&self, room_id: PrimaryKey, at: DateTime<Utc>) -> Result<()>;
    async fn set_room_ended(&self, room_id: PrimaryKey, at: DateTime<Utc>) -> Result<()>;

    /// Puts the user into a vacant slot and drops their reservation for it, if any.
    /// Fails with a conflict if the slot is occupied.
    async fn occupy_slot(&self, slot_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    async fn vacate_slots(&self, slot_ids: &[PrimaryKey]) -> Result<()>;
    async fn create_reservation(&self, new_reservation: NewReservation) -> Result<()>;
    async fn delete_reservation(&self, slot_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;

    async fn room_messages(&self, room_id: PrimaryKey) -> Result<Vec<RoomMessageData>>;
    async fn create_room_message(&self, new_message: NewRoomMessage) -> Result<RoomMessageData>;

    async fn availability(&self, room_id: PrimaryKey) -> Result<Vec<AvailabilityData>>;
    /// Replaces every vote of the user in the room with votes for the given times,
    /// then removes the times nobody voted for.
    async fn replace_availability(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        times: Vec<DateTime<Utc>>,
    ) -> Result<()>;

    async fn has_evaluated(&self, room_id: PrimaryKey, evaluator_id: PrimaryKey) -> Result<bool>;
    async fn create_evaluations(
        &self,
        new_evaluations: Vec<NewEvaluation>,
    ) -> Result<Vec<EvaluationData>>;
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub nickname: String,
}

#[derive(Debug)]
pub struct UpdatedUser {
    pub id: PrimaryKey,
    pub nickname: Option<String>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub title: String,
    pub song: String,
    pub artist: String,
    pub description: Option<String>,
    pub is_private: bool,
    /// Hashed password of a private room
    pub password: Option<String>,
    pub clan_id: Option<PrimaryKey>,
    /// The manager of the new room
    pub user_id: PrimaryKey,
    /// Names of the sessions, in display order
    pub sessions: Vec<String>,
}

#[derive(Debug, Default)]
pub struct UpdatedRoom {
    pub id: PrimaryKey,
    pub title: Option<String>,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub struct NewReservation {
    pub slot_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoomMessage {
    pub room_id: PrimaryKey,
    pub sender: String,
    pub message: String,
}

#[derive(Debug)]
pub struct NewEvaluation {
    pub room_id: PrimaryKey,
    pub evaluator_id: PrimaryKey,
    pub target_id: PrimaryKey,
    pub score: i32,
    pub comment: Option<String>,
    pub is_mood_maker: bool,
}
