use bandicon_core::{Lineup, Member};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

pub use bandicon_core::PrimaryKey;

/// A bandicon account
#[derive(Debug, Clone, FromRow)]
pub struct UserData {
    pub id: PrimaryKey,
    /// The name used to log in
    pub username: String,
    /// The argon2 hash of the password
    pub password: String,
    /// The public name shown in rooms, unique across users
    pub nickname: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A jam room and its lineup of sessions
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub title: String,
    pub song: String,
    pub artist: String,
    pub description: Option<String>,
    pub is_private: bool,
    /// The argon2 hash of the room password, only set for private rooms
    pub password: Option<String>,
    /// The clan owning this room. General rooms have none.
    pub clan_id: Option<PrimaryKey>,
    pub created_at: DateTime<Utc>,
    pub lineup: Lineup,
}

/// A chat message posted in a room
#[derive(Debug, Clone)]
pub struct RoomMessageData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    /// Nickname of the sender at the time of posting
    pub sender: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A proposed rehearsal time and the users who can make it
#[derive(Debug, Clone)]
pub struct AvailabilityData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub time: DateTime<Utc>,
    pub voters: Vec<Member>,
}

/// A manner evaluation one participant gave another after a rehearsal
#[derive(Debug, Clone)]
pub struct EvaluationData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub evaluator_id: PrimaryKey,
    pub target_id: PrimaryKey,
    pub score: i32,
    pub comment: Option<String>,
    pub is_mood_maker: bool,
    pub created_at: DateTime<Utc>,
}

impl UserData {
    pub fn member(&self) -> Member {
        Member::new(self.id, self.nickname.clone())
    }
}

impl RoomData {
    pub fn is_manager(&self, user_id: PrimaryKey) -> bool {
        self.lineup.is_manager(user_id)
    }
}
