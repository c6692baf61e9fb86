use bandicon_core::{Member, PrimaryKey, SlotError, Transition};
use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;

use crate::{
    events::CollabEvent, util::verify_secret, AvailabilityData, CollabContext, DatabaseError,
    EvaluationData, NewEvaluation, NewReservation, NewRoomMessage, RoomData, RoomMessageData,
    UpdatedRoom, UserData,
};

use super::RoomError;

/// A jam room, holding the committed state of its lineup.
///
/// Mutations are serialized by an async write gate, so checking a precondition and
/// persisting its effect happen as one step. Readers only lock the committed data.
pub struct Room {
    context: CollabContext,
    gate: tokio::sync::Mutex<()>,
    data: Mutex<RoomData>,
}

/// Changes to the details of a room. Fields left as None are not changed.
#[derive(Debug, Default)]
pub struct RoomUpdate {
    pub title: Option<String>,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
}

/// An evaluation of one fellow participant
#[derive(Debug)]
pub struct EvaluationEntry {
    pub target_nickname: String,
    pub score: Option<i32>,
    pub comment: Option<String>,
    pub is_mood_maker: bool,
}

impl Room {
    pub const MAX_MESSAGE_LENGTH: usize = 1000;
    const DEFAULT_SCORE: i32 = 50;

    pub fn new(context: &CollabContext, data: RoomData) -> Self {
        Self {
            context: context.clone(),
            gate: Default::default(),
            data: data.into(),
        }
    }

    pub fn id(&self) -> PrimaryKey {
        self.data.lock().id
    }

    /// Returns a copy of the committed room data
    pub fn data(&self) -> RoomData {
        self.data.lock().clone()
    }

    pub fn has_slot(&self, slot_id: PrimaryKey) -> bool {
        self.data.lock().lineup.has_slot(slot_id)
    }

    /// Occupies a vacant slot
    pub async fn join(
        &self,
        slot_id: PrimaryKey,
        user: &UserData,
        password: Option<&str>,
    ) -> Result<RoomData, RoomError> {
        let member = user.member();

        self.transition(|room| {
            check_password(room, user.id, password)?;
            Ok(room.lineup.join(slot_id, &member)?)
        })
        .await
    }

    /// Vacates a slot the user plays
    pub async fn leave(
        &self,
        slot_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomData, RoomError> {
        self.transition(|room| Ok(room.lineup.leave(slot_id, user_id)?))
            .await
    }

    /// Joins the slot, or leaves it if the user already plays it
    pub async fn toggle(
        &self,
        slot_id: PrimaryKey,
        user: &UserData,
        password: Option<&str>,
    ) -> Result<RoomData, RoomError> {
        let member = user.member();

        self.transition(|room| {
            check_password(room, user.id, password)?;
            Ok(room.lineup.toggle(slot_id, &member)?)
        })
        .await
    }

    /// Queues the user for an occupied slot
    pub async fn reserve(
        &self,
        slot_id: PrimaryKey,
        user: &UserData,
        password: Option<&str>,
    ) -> Result<RoomData, RoomError> {
        let member = user.member();
        let now = Utc::now();

        self.transition(|room| {
            check_password(room, user.id, password)?;
            Ok(room.lineup.reserve(slot_id, &member, now)?)
        })
        .await
    }

    pub async fn cancel_reservation(
        &self,
        slot_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomData, RoomError> {
        self.transition(|room| Ok(room.lineup.cancel_reservation(slot_id, user_id)?))
            .await
    }

    /// Locks every slot of the room
    pub async fn confirm(&self, user_id: PrimaryKey) -> Result<RoomData, RoomError> {
        let now = Utc::now();
        self.transition(|room| Ok(room.lineup.confirm(user_id, now)?))
            .await
    }

    /// Ends a confirmed room, opening it for evaluations
    pub async fn end(&self, user_id: PrimaryKey) -> Result<RoomData, RoomError> {
        let now = Utc::now();
        self.transition(|room| Ok(room.lineup.end(user_id, now)?))
            .await
    }

    /// Removes a participant from every slot they play in this room
    pub async fn kick(&self, user_id: PrimaryKey, nickname: &str) -> Result<RoomData, RoomError> {
        self.transition(|room| Ok(room.lineup.kick(user_id, nickname)?))
            .await
    }

    /// Removes the user from every slot they play in this room
    pub async fn leave_room(&self, user_id: PrimaryKey) -> Result<RoomData, RoomError> {
        self.transition(|room| Ok(room.lineup.leave_room(user_id)?))
            .await
    }

    /// Updates the details of the room. Only the manager may do this.
    pub async fn update(
        &self,
        user_id: PrimaryKey,
        update: RoomUpdate,
    ) -> Result<RoomData, RoomError> {
        let _gate = self.gate.lock().await;
        self.ensure_exists()?;

        let id = {
            let data = self.data.lock();

            if !data.is_manager(user_id) {
                return Err(SlotError::NotManager.into());
            }

            data.id
        };

        let updated = self
            .context
            .database
            .update_room(UpdatedRoom {
                id,
                title: update.title,
                song: update.song,
                artist: update.artist,
                description: update.description,
            })
            .await?;

        let room = {
            let mut data = self.data.lock();

            data.title = updated.title;
            data.song = updated.song;
            data.artist = updated.artist;
            data.description = updated.description;

            data.clone()
        };

        info!("Room {} was updated", room.title);
        self.context.emit(CollabEvent::RoomUpdated { room: room.clone() });

        Ok(room)
    }

    /// Deletes the room, removing it from the store. Only the manager may do this.
    pub async fn delete(&self, user_id: PrimaryKey) -> Result<(), RoomError> {
        let _gate = self.gate.lock().await;
        self.ensure_exists()?;

        let data = self.data();

        if !data.is_manager(user_id) {
            return Err(SlotError::NotManager.into());
        }

        self.context.database.delete_room(data.id).await?;
        self.context.rooms.remove(&data.id);

        info!("Room {} was deleted", data.title);
        self.context.emit(CollabEvent::RoomDeleted { room_id: data.id });

        Ok(())
    }

    /// Updates the nickname of a user everywhere it appears in the lineup
    pub async fn rename_member(&self, member: &Member) {
        let _gate = self.gate.lock().await;

        let room = {
            let mut data = self.data.lock();

            if !data.lineup.rename_member(member) {
                return;
            }

            data.clone()
        };

        self.context.emit(CollabEvent::RoomUpdated { room });
    }

    /// Returns the chat messages of the room, oldest first
    pub async fn messages(&self) -> Result<Vec<RoomMessageData>, RoomError> {
        Ok(self.context.database.room_messages(self.id()).await?)
    }

    /// Posts a chat message as the user
    pub async fn post_message(
        &self,
        user: &UserData,
        message: &str,
    ) -> Result<RoomMessageData, RoomError> {
        let message = message.trim();
        let length = message.chars().count();

        if length == 0 || length > Self::MAX_MESSAGE_LENGTH {
            return Err(RoomError::InvalidMessage);
        }

        let _gate = self.gate.lock().await;
        self.ensure_exists()?;

        let message = self
            .context
            .database
            .create_room_message(NewRoomMessage {
                room_id: self.id(),
                sender: user.nickname.clone(),
                message: message.to_string(),
            })
            .await?;

        self.context.emit(CollabEvent::RoomMessage {
            message: message.clone(),
        });

        Ok(message)
    }

    /// Returns the proposed rehearsal times, earliest first
    pub async fn availability(&self) -> Result<Vec<AvailabilityData>, RoomError> {
        Ok(self.context.database.availability(self.id()).await?)
    }

    /// Replaces every vote of the user with votes for the given times
    pub async fn submit_availability(
        &self,
        user_id: PrimaryKey,
        mut times: Vec<DateTime<Utc>>,
    ) -> Result<Vec<AvailabilityData>, RoomError> {
        times.sort();
        times.dedup();

        let _gate = self.gate.lock().await;
        self.ensure_exists()?;

        let id = self.id();

        self.context
            .database
            .replace_availability(id, user_id, times)
            .await?;

        Ok(self.context.database.availability(id).await?)
    }

    /// Submits the evaluations of the evaluator for an ended room.
    ///
    /// Entries targeting the evaluator or an unknown nickname are skipped.
    pub async fn evaluate(
        &self,
        evaluator: &UserData,
        entries: Vec<EvaluationEntry>,
    ) -> Result<Vec<EvaluationData>, RoomError> {
        let _gate = self.gate.lock().await;
        self.ensure_exists()?;

        let data = self.data();

        if !data.lineup.is_ended() {
            return Err(RoomError::NotEnded);
        }

        if self
            .context
            .database
            .has_evaluated(data.id, evaluator.id)
            .await?
        {
            return Err(RoomError::AlreadyEvaluated);
        }

        let mut new_evaluations = vec![];

        for entry in entries {
            let target = match self
                .context
                .database
                .user_by_nickname(&entry.target_nickname)
                .await
            {
                Ok(target) => target,
                Err(DatabaseError::NotFound { .. }) => continue,
                Err(err) => return Err(err.into()),
            };

            if target.id == evaluator.id {
                continue;
            }

            new_evaluations.push(NewEvaluation {
                room_id: data.id,
                evaluator_id: evaluator.id,
                target_id: target.id,
                score: entry.score.unwrap_or(Self::DEFAULT_SCORE),
                comment: entry.comment,
                is_mood_maker: entry.is_mood_maker,
            });
        }

        let evaluations = self
            .context
            .database
            .create_evaluations(new_evaluations)
            .await?;

        info!(
            "{} submitted {} evaluations for room {}",
            evaluator.nickname,
            evaluations.len(),
            data.title
        );

        Ok(evaluations)
    }

    /// Fails if the room was deleted while a request was waiting for the gate
    fn ensure_exists(&self) -> Result<(), RoomError> {
        if self.context.rooms.contains_key(&self.id()) {
            Ok(())
        } else {
            Err(RoomError::RoomNotFound)
        }
    }

    /// Computes a transition on the committed room, persists it, then commits it.
    ///
    /// The gate is held throughout, so the committed state cannot change between
    /// the checks in `compute` and the commit.
    async fn transition<F>(&self, compute: F) -> Result<RoomData, RoomError>
    where
        F: FnOnce(&RoomData) -> Result<Transition, RoomError>,
    {
        let _gate = self.gate.lock().await;
        self.ensure_exists()?;

        let transition = compute(&self.data())?;

        if transition.is_noop() {
            return Ok(self.data());
        }

        self.persist(&transition).await?;

        let room = {
            let mut data = self.data.lock();
            data.lineup.apply(&transition);
            data.clone()
        };

        info!("Room {}: {}", room.title, describe(&transition));
        self.context.emit(CollabEvent::RoomUpdated { room: room.clone() });

        Ok(room)
    }

    async fn persist(&self, transition: &Transition) -> Result<(), RoomError> {
        let database = &self.context.database;

        match transition {
            Transition::Occupy { slot_id, member, .. } => database
                .occupy_slot(*slot_id, member.id)
                .await
                .map_err(|e| conflict_as(e, SlotError::SlotOccupied)),
            Transition::Vacate { slot_ids } => Ok(database.vacate_slots(slot_ids).await?),
            Transition::Reserve {
                slot_id,
                reservation,
            } => database
                .create_reservation(NewReservation {
                    slot_id: *slot_id,
                    user_id: reservation.member.id,
                    created_at: reservation.created_at,
                })
                .await
                .map_err(|e| conflict_as(e, SlotError::AlreadyReserved)),
            Transition::CancelReservation { slot_id, user_id } => {
                Ok(database.delete_reservation(*slot_id, *user_id).await?)
            }
            Transition::Confirm { at } => Ok(database.set_room_confirmed(self.id(), *at).await?),
            Transition::End { at } => Ok(database.set_room_ended(self.id(), *at).await?),
        }
    }
}

/// Checks the room password for users who are neither the manager nor already playing
fn check_password(
    room: &RoomData,
    user_id: PrimaryKey,
    password: Option<&str>,
) -> Result<(), RoomError> {
    if !room.is_private || room.is_manager(user_id) || room.lineup.is_playing(user_id) {
        return Ok(());
    }

    let (Some(hash), Some(password)) = (room.password.as_deref(), password) else {
        return Err(RoomError::InvalidPassword);
    };

    match verify_secret(password, hash) {
        Ok(true) => Ok(()),
        Ok(false) => Err(RoomError::InvalidPassword),
        Err(e) => Err(RoomError::HashError(e)),
    }
}

fn conflict_as(error: DatabaseError, slot_error: SlotError) -> RoomError {
    match error {
        DatabaseError::Conflict { .. } => slot_error.into(),
        err => err.into(),
    }
}

fn describe(transition: &Transition) -> String {
    match transition {
        Transition::Occupy {
            slot_id,
            member,
            consumed_reservation,
        } => {
            let source = if *consumed_reservation {
                " from the queue"
            } else {
                ""
            };

            format!("{} joined session {}{}", member.nickname, slot_id, source)
        }
        Transition::Vacate { slot_ids } => format!("sessions {:?} were vacated", slot_ids),
        Transition::Reserve {
            slot_id,
            reservation,
        } => format!("{} reserved session {}", reservation.member.nickname, slot_id),
        Transition::CancelReservation { slot_id, user_id } => {
            format!("user {} cancelled a reservation for session {}", user_id, slot_id)
        }
        Transition::Confirm { .. } => "confirmed".to_string(),
        Transition::End { .. } => "ended".to_string(),
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use bandicon_core::SlotError;
    use chrono::{Duration, TimeZone, Utc};

    use crate::{
        Collab, CollabEvent, Database, EvaluationEntry, MemoryDatabase, NewRoomRequest, NewUser,
        RoomData, RoomError, UpdatedUser, UserData,
    };

    async fn setup(names: &[&str]) -> (Collab, Vec<UserData>) {
        let database = MemoryDatabase::new();
        let mut users = vec![];

        for name in names {
            let user = database
                .create_user(NewUser {
                    username: name.to_string(),
                    password: "hashed".to_string(),
                    nickname: name.to_string(),
                })
                .await
                .expect("user is created");

            users.push(user);
        }

        (Collab::new(Box::new(database)), users)
    }

    fn request(title: &str, sessions: &[&str]) -> NewRoomRequest {
        NewRoomRequest {
            title: title.to_string(),
            song: "Don't Look Back in Anger".to_string(),
            artist: "Oasis".to_string(),
            description: None,
            is_private: false,
            password: None,
            clan_id: None,
            sessions: sessions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn slot_error(result: Result<RoomData, RoomError>) -> SlotError {
        match result {
            Err(RoomError::Slot(err)) => err,
            other => panic!("expected a slot error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn saturday_jam() {
        let (collab, users) = setup(&["manager", "a", "b"]).await;
        let (manager, a, b) = (&users[0], &users[1], &users[2]);

        let room = collab
            .rooms
            .create_room(manager, request("토요일 합주", &["보컬", "드럼", "베이스"]))
            .await
            .expect("room is created");

        let data = room.data();
        let vocals = data.lineup.slots[0].id;

        assert_eq!(data.lineup.slots.len(), 3);
        assert!(
            data.lineup.slots.iter().all(|s| s.is_vacant()),
            "every session starts vacant"
        );

        room.toggle(vocals, a, None).await.expect("a joins vocals");

        let err = slot_error(room.join(vocals, b, None).await);
        assert_eq!(err, SlotError::SlotOccupied);

        let data = room.reserve(vocals, b, None).await.expect("b reserves");
        let queue: Vec<_> = data.lineup.slots[0]
            .reservations
            .iter()
            .map(|r| r.member.nickname.as_str())
            .collect();
        assert_eq!(queue, vec!["b"]);

        let data = room.toggle(vocals, a, None).await.expect("a leaves");
        assert!(data.lineup.slots[0].is_vacant());
        assert_eq!(
            data.lineup.slots[0].reservations.len(),
            1,
            "leaving does not promote the reservation"
        );

        room.confirm(manager.id).await.expect("manager confirms");

        let before = room.data();
        let err = slot_error(room.toggle(vocals, b, None).await);
        assert_eq!(err, SlotError::RoomLocked);
        assert_eq!(room.data().lineup, before.lineup, "locked lineup is unchanged");

        let stored = collab
            .rooms
            .room_by_id(room.id())
            .expect("room is in the store")
            .data();
        assert!(stored.lineup.is_confirmed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_have_one_winner() {
        let (collab, users) = setup(&["manager", "a", "b"]).await;

        let room = collab
            .rooms
            .create_room(&users[0], request("race", &["drums"]))
            .await
            .expect("room is created");

        let slot_id = room.data().lineup.slots[0].id;

        let first = {
            let room = room.clone();
            let user = users[1].clone();
            tokio::spawn(async move { room.join(slot_id, &user, None).await })
        };

        let second = {
            let room = room.clone();
            let user = users[2].clone();
            tokio::spawn(async move { room.join(slot_id, &user, None).await })
        };

        let results = [
            first.await.expect("task completes"),
            second.await.expect("task completes"),
        ];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let occupied = results
            .iter()
            .filter(|r| matches!(r, Err(RoomError::Slot(SlotError::SlotOccupied))))
            .count();

        assert_eq!(successes, 1, "exactly one join succeeds");
        assert_eq!(occupied, 1, "the other join sees an occupied slot");
    }

    #[tokio::test]
    async fn queued_user_takes_freed_slot() {
        let (collab, users) = setup(&["manager", "a", "b", "c"]).await;
        let (manager, a, b, c) = (&users[0], &users[1], &users[2], &users[3]);

        let room = collab
            .rooms
            .create_room(manager, request("토요일 합주", &["보컬"]))
            .await
            .expect("room is created");

        let vocals = room.data().lineup.slots[0].id;

        room.join(vocals, a, None).await.expect("a joins");
        room.reserve(vocals, b, None).await.expect("b reserves");
        room.reserve(vocals, c, None).await.expect("c reserves");
        room.leave(vocals, a.id).await.expect("a leaves");

        let data = room.join(vocals, b, None).await.expect("b joins");
        let slot = &data.lineup.slots[0];

        assert!(slot.is_played_by(b.id));
        assert!(!slot.is_reserved_by(b.id), "b's reservation is consumed");
        assert!(slot.is_reserved_by(c.id));

        let err = slot_error(room.cancel_reservation(vocals, b.id).await);
        assert_eq!(err, SlotError::NotReserved);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reserves_queue_once() {
        let (collab, users) = setup(&["manager", "a", "b"]).await;

        let room = collab
            .rooms
            .create_room(&users[0], request("queue", &["bass"]))
            .await
            .expect("room is created");

        let slot_id = room.data().lineup.slots[0].id;
        room.join(slot_id, &users[1], None)
            .await
            .expect("a joins");

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let room = room.clone();
                let user = users[2].clone();
                tokio::spawn(async move { room.reserve(slot_id, &user, None).await })
            })
            .collect();

        let mut results = vec![];
        for task in tasks {
            results.push(task.await.expect("task completes"));
        }

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(RoomError::Slot(SlotError::AlreadyReserved))))
            .count();

        assert_eq!(successes, 1, "exactly one reserve succeeds");
        assert_eq!(duplicates, 1, "the other one is already reserved");
        assert_eq!(room.data().lineup.slots[0].reservations.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn kicked_player_needs_password_again() {
        let (collab, users) = setup(&["manager", "guest"]).await;
        let (manager, guest) = (&users[0], &users[1]);

        let mut new_room = request("secret", &["keys", "bass"]);
        new_room.is_private = true;
        new_room.password = Some("letmein".to_string());

        let room = collab
            .rooms
            .create_room(manager, new_room)
            .await
            .expect("room is created");

        let keys = room.data().lineup.slots[0].id;
        let bass = room.data().lineup.slots[1].id;

        for _ in 0..20 {
            room.join(keys, guest, Some("letmein"))
                .await
                .expect("guest joins with password");

            let kick = {
                let room = room.clone();
                let manager_id = manager.id;
                tokio::spawn(async move { room.kick(manager_id, "guest").await })
            };

            let join = {
                let room = room.clone();
                let guest = guest.clone();
                tokio::spawn(async move { room.join(bass, &guest, None).await })
            };

            kick.await.expect("task completes").expect("guest is kicked");

            match join.await.expect("task completes") {
                // The join ran first, while the guest was still playing
                Ok(_) => {}
                Err(RoomError::InvalidPassword) => {}
                other => panic!("unexpected join result {:?}", other),
            }

            assert!(
                !room.data().lineup.is_playing(guest.id),
                "a kicked guest never stays in without the password"
            );
        }

        let result = room.join(bass, guest, None).await;
        assert!(matches!(result, Err(RoomError::InvalidPassword)));
    }

    #[tokio::test]
    async fn deleted_rooms_reject_chat_and_votes() {
        let (collab, users) = setup(&["manager"]).await;
        let manager = &users[0];

        let room = collab
            .rooms
            .create_room(manager, request("gone", &["drums"]))
            .await
            .expect("room is created");

        collab
            .rooms
            .delete_room(room.id(), manager.id)
            .await
            .expect("room is deleted");

        let result = room.post_message(manager, "anyone here?").await;
        assert!(matches!(result, Err(RoomError::RoomNotFound)));

        let result = room.submit_availability(manager.id, vec![Utc::now()]).await;
        assert!(matches!(result, Err(RoomError::RoomNotFound)));
    }

    #[tokio::test]
    async fn kick_only_affects_one_room() {
        let (collab, users) = setup(&["manager", "guitarist"]).await;
        let (manager, guitarist) = (&users[0], &users[1]);

        let first = collab
            .rooms
            .create_room(manager, request("first", &["guitar", "guitar"]))
            .await
            .expect("room is created");

        let second = collab
            .rooms
            .create_room(manager, request("second", &["guitar"]))
            .await
            .expect("room is created");

        for slot in first.data().lineup.slots {
            first
                .join(slot.id, guitarist, None)
                .await
                .expect("guitarist joins");
        }

        let other_slot = second.data().lineup.slots[0].id;
        second
            .join(other_slot, guitarist, None)
            .await
            .expect("guitarist joins");

        let err = slot_error(first.kick(guitarist.id, "manager").await);
        assert_eq!(err, SlotError::NotManager);

        let data = first
            .kick(manager.id, "guitarist")
            .await
            .expect("guitarist is kicked");

        assert!(data.lineup.slots.iter().all(|s| s.is_vacant()));
        assert!(second.data().lineup.slots[0].is_played_by(guitarist.id));

        let err = slot_error(first.kick(manager.id, "guitarist").await);
        assert_eq!(err, SlotError::TargetNotFound("guitarist".to_string()));
    }

    #[tokio::test]
    async fn private_rooms_need_password() {
        let (collab, users) = setup(&["manager", "guest"]).await;
        let (manager, guest) = (&users[0], &users[1]);

        let mut new_room = request("secret", &["keys"]);
        new_room.is_private = true;

        let result = collab.rooms.create_room(manager, new_room).await;
        assert!(matches!(result, Err(RoomError::PasswordRequired)));

        let mut new_room = request("secret", &["keys", "bass"]);
        new_room.is_private = true;
        new_room.password = Some("letmein".to_string());

        let room = collab
            .rooms
            .create_room(manager, new_room)
            .await
            .expect("room is created");

        let data = room.data();
        assert_ne!(data.password.as_deref(), Some("letmein"), "password is hashed");

        let keys = data.lineup.slots[0].id;
        let bass = data.lineup.slots[1].id;

        let result = room.join(keys, guest, Some("wrong")).await;
        assert!(matches!(result, Err(RoomError::InvalidPassword)));

        let result = room.join(keys, guest, None).await;
        assert!(matches!(result, Err(RoomError::InvalidPassword)));

        room.join(bass, manager, None)
            .await
            .expect("manager needs no password");

        room.join(keys, guest, Some("letmein"))
            .await
            .expect("guest joins with password");

        room.toggle(keys, guest, None)
            .await
            .expect("participant leaves without password");
    }

    #[tokio::test]
    async fn evaluations_after_end() {
        let (collab, users) = setup(&["manager", "a", "b"]).await;
        let (manager, a) = (&users[0], &users[1]);

        let room = collab
            .rooms
            .create_room(manager, request("eval", &["vocals"]))
            .await
            .expect("room is created");

        let entries = || {
            vec![
                EvaluationEntry {
                    target_nickname: "b".to_string(),
                    score: Some(90),
                    comment: Some("great timing".to_string()),
                    is_mood_maker: true,
                },
                EvaluationEntry {
                    target_nickname: "a".to_string(),
                    score: None,
                    comment: None,
                    is_mood_maker: false,
                },
                EvaluationEntry {
                    target_nickname: "ghost".to_string(),
                    score: None,
                    comment: None,
                    is_mood_maker: false,
                },
                EvaluationEntry {
                    target_nickname: "manager".to_string(),
                    score: None,
                    comment: None,
                    is_mood_maker: false,
                },
            ]
        };

        let result = room.evaluate(a, entries()).await;
        assert!(matches!(result, Err(RoomError::NotEnded)));

        let err = slot_error(room.end(manager.id).await);
        assert_eq!(err, SlotError::NotConfirmed);

        room.confirm(manager.id).await.expect("room is confirmed");
        room.end(manager.id).await.expect("room is ended");

        let evaluations = room
            .evaluate(a, entries())
            .await
            .expect("evaluations are accepted");

        assert_eq!(evaluations.len(), 2, "self and unknown targets are skipped");
        assert_eq!(evaluations[0].score, 90);
        assert_eq!(evaluations[1].score, 50, "score defaults to 50");

        let result = room.evaluate(a, entries()).await;
        assert!(matches!(result, Err(RoomError::AlreadyEvaluated)));
    }

    #[tokio::test]
    async fn availability_replaces_votes() {
        let (collab, users) = setup(&["manager", "a"]).await;
        let (manager, a) = (&users[0], &users[1]);

        let room = collab
            .rooms
            .create_room(manager, request("schedule", &["drums"]))
            .await
            .expect("room is created");

        let saturday = Utc
            .with_ymd_and_hms(2025, 3, 1, 14, 0, 0)
            .single()
            .expect("valid date");
        let sunday = saturday + Duration::days(1);

        room.submit_availability(a.id, vec![saturday, sunday, saturday])
            .await
            .expect("votes are stored");

        let slots = room
            .submit_availability(manager.id, vec![sunday])
            .await
            .expect("votes are stored");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].voters.len(), 2);

        let slots = room
            .submit_availability(a.id, vec![])
            .await
            .expect("votes are replaced");

        assert_eq!(slots.len(), 1, "times without votes are pruned");
        assert_eq!(slots[0].time, sunday);
        assert_eq!(slots[0].voters[0].nickname, "manager");
    }

    #[tokio::test]
    async fn mutations_emit_events() {
        let (collab, users) = setup(&["manager"]).await;
        let events = collab.events();

        let room = collab
            .rooms
            .create_room(&users[0], request("events", &["drums"]))
            .await
            .expect("room is created");

        assert!(matches!(
            events.try_recv(),
            Ok(CollabEvent::RoomCreated { .. })
        ));

        room.post_message(&users[0], "hello")
            .await
            .expect("message is posted");

        assert!(matches!(
            events.try_recv(),
            Ok(CollabEvent::RoomMessage { .. })
        ));

        let room_id = room.id();
        collab
            .rooms
            .delete_room(room_id, users[0].id)
            .await
            .expect("room is deleted");

        assert!(matches!(
            events.try_recv(),
            Ok(CollabEvent::RoomDeleted { room_id: id }) if id == room_id
        ));
        assert!(matches!(
            collab.rooms.room_by_id(room_id),
            Err(RoomError::RoomNotFound)
        ));

        let result = room.confirm(users[0].id).await;
        assert!(matches!(result, Err(RoomError::RoomNotFound)));
    }

    #[tokio::test]
    async fn listings() {
        let (collab, users) = setup(&["manager", "player"]).await;
        let (manager, player) = (&users[0], &users[1]);

        let open = collab
            .rooms
            .create_room(manager, request("open", &["drums"]))
            .await
            .expect("room is created");

        let confirmed = collab
            .rooms
            .create_room(manager, request("confirmed", &["drums"]))
            .await
            .expect("room is created");
        confirmed.confirm(manager.id).await.expect("room is confirmed");

        let mut clan_room = request("clan", &["drums"]);
        clan_room.clan_id = Some(7);
        let clan = collab
            .rooms
            .create_room(manager, clan_room)
            .await
            .expect("room is created");

        let ids = |rooms: Vec<Arc<super::Room>>| rooms.iter().map(|r| r.id()).collect::<Vec<_>>();

        assert_eq!(ids(collab.rooms.list_open()), vec![open.id()]);
        assert_eq!(
            ids(collab.rooms.list_clan(7, Default::default())),
            vec![clan.id()]
        );
        assert!(collab.rooms.list_for_user(player.id).is_empty());

        let slot_id = open.data().lineup.slots[0].id;
        open.join(slot_id, player, None).await.expect("player joins");

        assert_eq!(ids(collab.rooms.list_for_user(player.id)), vec![open.id()]);
        assert_eq!(collab.rooms.list_for_user(manager.id).len(), 3);
        assert_eq!(
            collab
                .rooms
                .room_by_slot_id(slot_id)
                .expect("slot belongs to a room")
                .id(),
            open.id()
        );

        let managed = collab
            .rooms
            .list_managed_by("manager")
            .await
            .expect("user exists");
        assert_eq!(managed.len(), 3);

        let result = collab.rooms.list_managed_by("nobody").await;
        assert!(matches!(result, Err(RoomError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn nickname_changes_reach_lineups() {
        let (collab, users) = setup(&["manager", "drummer"]).await;
        let (manager, drummer) = (&users[0], &users[1]);

        let room = collab
            .rooms
            .create_room(manager, request("rename", &["drums"]))
            .await
            .expect("room is created");

        let slot_id = room.data().lineup.slots[0].id;
        room.join(slot_id, drummer, None).await.expect("drummer joins");

        collab
            .update_user(UpdatedUser {
                id: drummer.id,
                nickname: Some("beatmaker".to_string()),
            })
            .await
            .expect("user is updated");

        let err = slot_error(room.kick(manager.id, "drummer").await);
        assert_eq!(err, SlotError::TargetNotFound("drummer".to_string()));

        let data = room
            .kick(manager.id, "beatmaker")
            .await
            .expect("renamed user is kicked");
        assert!(data.lineup.slots[0].is_vacant());
    }
}

