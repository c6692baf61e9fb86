//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use bandicon_collab::{
    AvailabilityData, EvaluationData, PrimaryKey, RoomData, RoomMessageData, SessionData, UserData,
};
use bandicon_core::{Member as CoreMember, Reservation as CoreReservation, Slot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct User {
    id: i32,
    username: String,
    nickname: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResult {
    token: String,
    user: User,
}

/// A user as shown in a room
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Member {
    id: i32,
    nickname: String,
}

/// A snapshot of a room and its sessions
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Room {
    id: i32,
    title: String,
    song: String,
    artist: String,
    description: Option<String>,
    manager_nickname: String,
    confirmed: bool,
    ended: bool,
    is_private: bool,
    clan: Option<i32>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    session_count: usize,
    participant_count: usize,
    sessions: Vec<RoomSession>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSession {
    id: i32,
    session_name: String,
    participant_nickname: Option<String>,
    /// Users waiting for this session, oldest first
    reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Reservation {
    user: Member,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatMessage {
    id: i32,
    room_id: i32,
    sender: String,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilitySlot {
    id: i32,
    time: DateTime<Utc>,
    voters: Vec<Member>,
    /// True if the requesting user voted for this time
    voted: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Evaluation {
    id: i32,
    room_id: i32,
    target_id: i32,
    score: i32,
    comment: Option<String>,
    is_mood_maker: bool,
    created_at: DateTime<Utc>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            nickname: self.nickname.clone(),
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Member> for CoreMember {
    fn to_serialized(&self) -> Member {
        Member {
            id: self.id,
            nickname: self.nickname.clone(),
        }
    }
}

impl ToSerialized<Room> for RoomData {
    fn to_serialized(&self) -> Room {
        let lineup = &self.lineup;

        Room {
            id: self.id,
            title: self.title.clone(),
            song: self.song.clone(),
            artist: self.artist.clone(),
            description: self.description.clone(),
            manager_nickname: lineup.manager.nickname.clone(),
            confirmed: lineup.is_confirmed(),
            ended: lineup.is_ended(),
            is_private: self.is_private,
            clan: self.clan_id,
            created_at: self.created_at,
            confirmed_at: lineup.confirmed_at,
            ended_at: lineup.ended_at,
            session_count: lineup.slots.len(),
            participant_count: lineup.participant_count(),
            sessions: lineup.slots.to_serialized(),
        }
    }
}

impl ToSerialized<RoomSession> for Slot {
    fn to_serialized(&self) -> RoomSession {
        RoomSession {
            id: self.id,
            session_name: self.name.clone(),
            participant_nickname: self.participant.as_ref().map(|p| p.nickname.clone()),
            reservations: self.reservations.to_serialized(),
        }
    }
}

impl ToSerialized<Reservation> for CoreReservation {
    fn to_serialized(&self) -> Reservation {
        Reservation {
            user: self.member.to_serialized(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<ChatMessage> for RoomMessageData {
    fn to_serialized(&self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            room_id: self.room_id,
            sender: self.sender.clone(),
            message: self.message.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl ToSerialized<Evaluation> for EvaluationData {
    fn to_serialized(&self) -> Evaluation {
        Evaluation {
            id: self.id,
            room_id: self.room_id,
            target_id: self.target_id,
            score: self.score,
            comment: self.comment.clone(),
            is_mood_maker: self.is_mood_maker,
            created_at: self.created_at,
        }
    }
}

impl AvailabilitySlot {
    /// Serializes availability as seen by the given user
    pub fn for_user(slots: &[AvailabilityData], user_id: PrimaryKey) -> Vec<Self> {
        slots
            .iter()
            .map(|slot| Self {
                id: slot.id,
                time: slot.time,
                voters: slot.voters.to_serialized(),
                voted: slot.voters.iter().any(|v| v.id == user_id),
            })
            .collect()
    }
}
