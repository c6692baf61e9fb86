use async_trait::async_trait;
use bandicon_core::{Lineup, Reservation, Slot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    AvailabilityData, Database, DatabaseError, EvaluationData, NewEvaluation, NewReservation,
    NewRoom, NewRoomMessage, NewSession, NewUser, PrimaryKey, Result, RoomData, RoomMessageData,
    SessionData, UpdatedRoom, UpdatedUser, UserData,
};

/// A database kept entirely in memory. Everything is lost when it is dropped.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: PrimaryKey,
    users: Vec<UserData>,
    sessions: Vec<StoredSession>,
    rooms: Vec<RoomData>,
    messages: Vec<RoomMessageData>,
    availability: Vec<StoredAvailability>,
    evaluations: Vec<EvaluationData>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

struct StoredAvailability {
    id: PrimaryKey,
    room_id: PrimaryKey,
    time: DateTime<Utc>,
    voter_ids: Vec<PrimaryKey>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<&UserData> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(not_found("user", "id"))
    }

    fn room_mut(&mut self, room_id: PrimaryKey) -> Result<&mut RoomData> {
        self.rooms
            .iter_mut()
            .find(|r| r.id == room_id)
            .ok_or(not_found("room", "id"))
    }

    fn slot_mut(&mut self, slot_id: PrimaryKey) -> Result<&mut Slot> {
        self.rooms
            .iter_mut()
            .flat_map(|r| r.lineup.slots.iter_mut())
            .find(|s| s.id == slot_id)
            .ok_or(not_found("room slot", "id"))
    }

    fn ensure_unique_nickname(&self, nickname: &str) -> Result<()> {
        if self.users.iter().any(|u| u.nickname == nickname) {
            return Err(conflict("user", "nickname", nickname));
        }

        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id).cloned()
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(not_found("user", "username"))
    }

    async fn user_by_nickname(&self, nickname: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.nickname == nickname)
            .cloned()
            .ok_or(not_found("user", "nickname"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.iter().any(|u| u.username == new_user.username) {
            return Err(conflict("user", "username", &new_user.username));
        }

        state.ensure_unique_nickname(&new_user.nickname)?;

        let user = UserData {
            id: state.next_id(),
            username: new_user.username,
            password: new_user.password,
            nickname: new_user.nickname,
        };

        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let mut state = self.state.lock();
        let current = state.user(updated_user.id)?.nickname.clone();

        if let Some(nickname) = updated_user.nickname {
            if nickname != current {
                state.ensure_unique_nickname(&nickname)?;
            }

            if let Some(user) = state.users.iter_mut().find(|u| u.id == updated_user.id) {
                user.nickname = nickname;
            }
        }

        state.user(updated_user.id).cloned()
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();

        let session = state
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(not_found("session", "token"))?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user: state.user(session.user_id)?.clone(),
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        if state.sessions.iter().any(|s| s.token == new_session.token) {
            return Err(conflict("session", "token", &new_session.token));
        }

        let user = state.user(new_session.user_id)?.clone();
        let session = StoredSession {
            id: state.next_id(),
            token: new_session.token,
            user_id: user.id,
            expires_at: new_session.expires_at,
        };

        let result = SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user,
        };

        state.sessions.push(session);
        Ok(result)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock();

        let index = state
            .sessions
            .iter()
            .position(|s| s.token == token)
            .ok_or(not_found("session", "token"))?;

        state.sessions.remove(index);
        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.state.lock().sessions.retain(|s| s.expires_at > now);

        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.state.lock().room_mut(room_id).map(|r| r.clone())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self.state.lock().rooms.clone())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut state = self.state.lock();
        let manager = state.user(new_room.user_id)?.member();

        let slots = new_room
            .sessions
            .into_iter()
            .map(|name| Slot::vacant(state.next_id(), name))
            .collect();

        let room = RoomData {
            id: state.next_id(),
            title: new_room.title,
            song: new_room.song,
            artist: new_room.artist,
            description: new_room.description,
            is_private: new_room.is_private,
            password: new_room.password,
            clan_id: new_room.clan_id,
            created_at: Utc::now(),
            lineup: Lineup::new(manager, slots),
        };

        state.rooms.push(room.clone());
        Ok(room)
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        let mut state = self.state.lock();
        let room = state.room_mut(updated_room.id)?;

        if let Some(title) = updated_room.title {
            room.title = title;
        }
        if let Some(song) = updated_room.song {
            room.song = song;
        }
        if let Some(artist) = updated_room.artist {
            room.artist = artist;
        }
        if updated_room.description.is_some() {
            room.description = updated_room.description;
        }

        Ok(room.clone())
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        let index = state
            .rooms
            .iter()
            .position(|r| r.id == room_id)
            .ok_or(not_found("room", "id"))?;

        state.rooms.remove(index);
        state.messages.retain(|m| m.room_id != room_id);
        state.availability.retain(|a| a.room_id != room_id);
        state.evaluations.retain(|e| e.room_id != room_id);

        Ok(())
    }

    async fn set_room_confirmed(&self, room_id: PrimaryKey, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();
        let lineup = &mut state.room_mut(room_id)?.lineup;

        lineup.confirmed_at.get_or_insert(at);
        Ok(())
    }

    async fn set_room_ended(&self, room_id: PrimaryKey, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();
        let lineup = &mut state.room_mut(room_id)?.lineup;

        lineup.ended_at.get_or_insert(at);
        Ok(())
    }

    async fn occupy_slot(&self, slot_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();
        let member = state.user(user_id)?.member();
        let slot = state.slot_mut(slot_id)?;

        if slot.participant.is_some() {
            return Err(conflict("room slot", "participant", &slot_id.to_string()));
        }

        slot.reservations.retain(|r| r.member.id != member.id);
        slot.participant = Some(member);
        Ok(())
    }

    async fn vacate_slots(&self, slot_ids: &[PrimaryKey]) -> Result<()> {
        let mut state = self.state.lock();

        for slot_id in slot_ids {
            state.slot_mut(*slot_id)?.participant = None;
        }

        Ok(())
    }

    async fn create_reservation(&self, new_reservation: NewReservation) -> Result<()> {
        let mut state = self.state.lock();
        let member = state.user(new_reservation.user_id)?.member();
        let slot = state.slot_mut(new_reservation.slot_id)?;

        if slot.is_reserved_by(member.id) {
            return Err(conflict(
                "reservation",
                "slot:user",
                &format!("{}:{}", new_reservation.slot_id, member.id),
            ));
        }

        slot.reservations.push(Reservation {
            member,
            created_at: new_reservation.created_at,
        });

        Ok(())
    }

    async fn delete_reservation(&self, slot_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        state
            .slot_mut(slot_id)?
            .reservations
            .retain(|r| r.member.id != user_id);

        Ok(())
    }

    async fn room_messages(&self, room_id: PrimaryKey) -> Result<Vec<RoomMessageData>> {
        let messages = self
            .state
            .lock()
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();

        Ok(messages)
    }

    async fn create_room_message(&self, new_message: NewRoomMessage) -> Result<RoomMessageData> {
        let mut state = self.state.lock();
        state.room_mut(new_message.room_id)?;

        let message = RoomMessageData {
            id: state.next_id(),
            room_id: new_message.room_id,
            sender: new_message.sender,
            message: new_message.message,
            timestamp: Utc::now(),
        };

        state.messages.push(message.clone());
        Ok(message)
    }

    async fn availability(&self, room_id: PrimaryKey) -> Result<Vec<AvailabilityData>> {
        let state = self.state.lock();

        let mut slots: Vec<_> = state
            .availability
            .iter()
            .filter(|a| a.room_id == room_id)
            .map(|a| AvailabilityData {
                id: a.id,
                room_id: a.room_id,
                time: a.time,
                voters: a
                    .voter_ids
                    .iter()
                    .filter_map(|id| state.user(*id).ok())
                    .map(UserData::member)
                    .collect(),
            })
            .collect();

        slots.sort_by_key(|s| s.time);
        Ok(slots)
    }

    async fn replace_availability(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        times: Vec<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.user(user_id)?;
        state.room_mut(room_id)?;

        for slot in state.availability.iter_mut().filter(|a| a.room_id == room_id) {
            slot.voter_ids.retain(|id| *id != user_id);
        }

        for time in times {
            let existing = state
                .availability
                .iter()
                .position(|a| a.room_id == room_id && a.time == time);

            match existing {
                Some(index) => {
                    let slot = &mut state.availability[index];

                    if !slot.voter_ids.contains(&user_id) {
                        slot.voter_ids.push(user_id)
                    }
                }
                None => {
                    let id = state.next_id();
                    state.availability.push(StoredAvailability {
                        id,
                        room_id,
                        time,
                        voter_ids: vec![user_id],
                    })
                }
            }
        }

        state
            .availability
            .retain(|a| a.room_id != room_id || !a.voter_ids.is_empty());

        Ok(())
    }

    async fn has_evaluated(&self, room_id: PrimaryKey, evaluator_id: PrimaryKey) -> Result<bool> {
        let evaluated = self
            .state
            .lock()
            .evaluations
            .iter()
            .any(|e| e.room_id == room_id && e.evaluator_id == evaluator_id);

        Ok(evaluated)
    }

    async fn create_evaluations(
        &self,
        new_evaluations: Vec<NewEvaluation>,
    ) -> Result<Vec<EvaluationData>> {
        let mut state = self.state.lock();
        let mut created = vec![];

        for evaluation in new_evaluations {
            let data = EvaluationData {
                id: state.next_id(),
                room_id: evaluation.room_id,
                evaluator_id: evaluation.evaluator_id,
                target_id: evaluation.target_id,
                score: evaluation.score,
                comment: evaluation.comment,
                is_mood_maker: evaluation.is_mood_maker,
                created_at: Utc::now(),
            };

            state.evaluations.push(data.clone());
            created.push(data);
        }

        Ok(created)
    }
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

fn conflict(resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
    DatabaseError::Conflict {
        resource,
        field,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::MemoryDatabase;
    use crate::{Database, DatabaseError, NewReservation, NewRoom, NewSession, NewUser};

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            password: "hash".to_string(),
            nickname: format!("{name}-nick"),
        }
    }

    #[tokio::test]
    async fn user_conflicts() {
        let db = MemoryDatabase::new();

        db.create_user(new_user("john")).await.unwrap();

        let result = db.create_user(new_user("john")).await;
        assert!(matches!(
            result,
            Err(DatabaseError::Conflict {
                field: "username",
                ..
            })
        ));

        let result = db
            .create_user(NewUser {
                username: "mary".to_string(),
                password: "hash".to_string(),
                nickname: "john-nick".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(DatabaseError::Conflict {
                field: "nickname",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn expired_sessions_are_cleared() {
        let db = MemoryDatabase::new();
        let user = db.create_user(new_user("john")).await.unwrap();

        db.create_session(NewSession {
            token: "old".to_string(),
            user_id: user.id,
            expires_at: Utc::now() - Duration::days(1),
        })
        .await
        .unwrap();

        db.create_session(NewSession {
            token: "new".to_string(),
            user_id: user.id,
            expires_at: Utc::now() + Duration::days(1),
        })
        .await
        .unwrap();

        db.clear_expired_sessions().await.unwrap();

        assert!(db.session_by_token("old").await.is_err());
        assert_eq!(db.session_by_token("new").await.unwrap().user.id, user.id);
    }

    #[tokio::test]
    async fn slot_storage() {
        let db = MemoryDatabase::new();
        let manager = db.create_user(new_user("manager")).await.unwrap();
        let john = db.create_user(new_user("john")).await.unwrap();

        let room = db
            .create_room(NewRoom {
                title: "Friday".to_string(),
                song: "Song".to_string(),
                artist: "Artist".to_string(),
                description: None,
                is_private: false,
                password: None,
                clan_id: None,
                user_id: manager.id,
                sessions: vec!["보컬".to_string(), "보컬".to_string()],
            })
            .await
            .unwrap();

        let slot_id = room.lineup.slots[0].id;

        db.occupy_slot(slot_id, john.id).await.unwrap();
        assert!(db.occupy_slot(slot_id, manager.id).await.is_err());

        db.create_reservation(NewReservation {
            slot_id,
            user_id: manager.id,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        db.vacate_slots(&[slot_id]).await.unwrap();

        let room = db.room_by_id(room.id).await.unwrap();
        assert_eq!(room.lineup.slots.len(), 2);
        assert!(room.lineup.slots.iter().all(|s| s.is_vacant()));
        assert_eq!(room.lineup.slots[0].reservations.len(), 1);

        // Occupying a slot drops the occupant's own reservation
        db.occupy_slot(slot_id, manager.id).await.unwrap();

        let room = db.room_by_id(room.id).await.unwrap();
        let slot = &room.lineup.slots[0];
        assert!(slot.is_played_by(manager.id));
        assert!(slot.reservations.is_empty());
    }
}
