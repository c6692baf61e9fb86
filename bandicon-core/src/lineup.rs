use chrono::{DateTime, Utc};

use crate::{PrimaryKey, SlotError, Transition};

pub type SlotResult<T> = Result<T, SlotError>;

/// A user as seen by the lineup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: PrimaryKey,
    pub nickname: String,
}

/// A user waiting for an occupied slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub member: Member,
    pub created_at: DateTime<Utc>,
}

/// A named instrument position in a room, like vocals or drums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: PrimaryKey,
    /// The label of the slot. Duplicates within a room are allowed.
    pub name: String,
    /// The user currently playing this slot, if any
    pub participant: Option<Member>,
    /// Users waiting for this slot, oldest first
    pub reservations: Vec<Reservation>,
}

/// The slots of a room together with the manager and the lock state.
///
/// Every operation checks its preconditions against the current state and returns a
/// [Transition] without mutating anything. [Lineup::apply] performs the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineup {
    pub manager: Member,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub slots: Vec<Slot>,
}

impl Member {
    pub fn new(id: PrimaryKey, nickname: impl Into<String>) -> Self {
        Self {
            id,
            nickname: nickname.into(),
        }
    }
}

impl Slot {
    /// Creates a slot with no participant and no reservations
    pub fn vacant(id: PrimaryKey, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            participant: None,
            reservations: vec![],
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.participant.is_none()
    }

    /// Returns true if the given user is the participant of this slot
    pub fn is_played_by(&self, user_id: PrimaryKey) -> bool {
        self.participant.as_ref().is_some_and(|p| p.id == user_id)
    }

    pub fn is_reserved_by(&self, user_id: PrimaryKey) -> bool {
        self.reservations.iter().any(|r| r.member.id == user_id)
    }
}

impl Lineup {
    pub fn new(manager: Member, slots: Vec<Slot>) -> Self {
        Self {
            manager,
            confirmed_at: None,
            ended_at: None,
            slots,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn is_manager(&self, user_id: PrimaryKey) -> bool {
        self.manager.id == user_id
    }

    /// Returns the amount of slots that have a participant
    pub fn participant_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_vacant()).count()
    }

    /// Returns true if the user plays at least one slot in this lineup
    pub fn is_playing(&self, user_id: PrimaryKey) -> bool {
        self.slots.iter().any(|s| s.is_played_by(user_id))
    }

    pub fn slot(&self, slot_id: PrimaryKey) -> SlotResult<&Slot> {
        self.slots
            .iter()
            .find(|s| s.id == slot_id)
            .ok_or(SlotError::SlotNotFound(slot_id))
    }

    pub fn has_slot(&self, slot_id: PrimaryKey) -> bool {
        self.slots.iter().any(|s| s.id == slot_id)
    }

    /// Puts the member into a vacant slot, dropping their own reservation for it
    pub fn join(&self, slot_id: PrimaryKey, member: &Member) -> SlotResult<Transition> {
        self.ensure_unlocked()?;

        let slot = self.slot(slot_id)?;

        if !slot.is_vacant() {
            return Err(SlotError::SlotOccupied);
        }

        Ok(Transition::Occupy {
            slot_id,
            member: member.clone(),
            consumed_reservation: slot.is_reserved_by(member.id),
        })
    }

    /// Frees a slot the user is playing. The reservation queue is not promoted.
    pub fn leave(&self, slot_id: PrimaryKey, user_id: PrimaryKey) -> SlotResult<Transition> {
        self.ensure_unlocked()?;

        let slot = self.slot(slot_id)?;

        if !slot.is_played_by(user_id) {
            return Err(SlotError::NotParticipant);
        }

        Ok(Transition::Vacate {
            slot_ids: vec![slot_id],
        })
    }

    /// Leaves the slot if the member is playing it, joins it otherwise
    pub fn toggle(&self, slot_id: PrimaryKey, member: &Member) -> SlotResult<Transition> {
        self.ensure_unlocked()?;

        if self.slot(slot_id)?.is_played_by(member.id) {
            self.leave(slot_id, member.id)
        } else {
            self.join(slot_id, member)
        }
    }

    /// Appends the member to the reservation queue of an occupied slot
    pub fn reserve(
        &self,
        slot_id: PrimaryKey,
        member: &Member,
        now: DateTime<Utc>,
    ) -> SlotResult<Transition> {
        self.ensure_unlocked()?;

        let slot = self.slot(slot_id)?;

        if slot.is_vacant() {
            return Err(SlotError::SlotVacant);
        }

        if slot.is_played_by(member.id) {
            return Err(SlotError::SelfReserve);
        }

        if slot.is_reserved_by(member.id) {
            return Err(SlotError::AlreadyReserved);
        }

        Ok(Transition::Reserve {
            slot_id,
            reservation: Reservation {
                member: member.clone(),
                created_at: now,
            },
        })
    }

    pub fn cancel_reservation(
        &self,
        slot_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> SlotResult<Transition> {
        self.ensure_unlocked()?;

        if !self.slot(slot_id)?.is_reserved_by(user_id) {
            return Err(SlotError::NotReserved);
        }

        Ok(Transition::CancelReservation { slot_id, user_id })
    }

    /// Locks every slot of the room
    pub fn confirm(&self, user_id: PrimaryKey, now: DateTime<Utc>) -> SlotResult<Transition> {
        self.ensure_manager(user_id)?;

        if self.is_confirmed() {
            return Err(SlotError::AlreadyConfirmed);
        }

        Ok(Transition::Confirm { at: now })
    }

    /// Marks a confirmed room as finished
    pub fn end(&self, user_id: PrimaryKey, now: DateTime<Utc>) -> SlotResult<Transition> {
        self.ensure_manager(user_id)?;

        if !self.is_confirmed() {
            return Err(SlotError::NotConfirmed);
        }

        if self.is_ended() {
            return Err(SlotError::AlreadyEnded);
        }

        Ok(Transition::End { at: now })
    }

    /// Vacates every slot the target plays. The target's reservations are untouched.
    pub fn kick(&self, user_id: PrimaryKey, nickname: &str) -> SlotResult<Transition> {
        self.ensure_manager(user_id)?;
        self.ensure_unlocked()?;

        if self.manager.nickname == nickname {
            return Err(SlotError::CannotKickManager);
        }

        let slot_ids: Vec<_> = self
            .slots
            .iter()
            .filter(|s| s.participant.as_ref().is_some_and(|p| p.nickname == nickname))
            .map(|s| s.id)
            .collect();

        if slot_ids.is_empty() {
            return Err(SlotError::TargetNotFound(nickname.to_string()));
        }

        Ok(Transition::Vacate { slot_ids })
    }

    /// Vacates every slot the user plays. Leaving a room you don't play in is a no-op.
    pub fn leave_room(&self, user_id: PrimaryKey) -> SlotResult<Transition> {
        if self.is_manager(user_id) {
            return Err(SlotError::ManagerCannotLeave);
        }

        self.ensure_unlocked()?;

        let slot_ids = self
            .slots
            .iter()
            .filter(|s| s.is_played_by(user_id))
            .map(|s| s.id)
            .collect();

        Ok(Transition::Vacate { slot_ids })
    }

    /// Applies a transition returned by one of the operations above.
    ///
    /// Transitions referring to unknown slots are ignored.
    pub fn apply(&mut self, transition: &Transition) {
        match transition {
            Transition::Occupy {
                slot_id,
                member,
                consumed_reservation,
            } => {
                if let Some(slot) = self.slot_mut(*slot_id) {
                    if *consumed_reservation {
                        slot.reservations.retain(|r| r.member.id != member.id)
                    }

                    slot.participant = Some(member.clone())
                }
            }
            Transition::Vacate { slot_ids } => {
                for slot in self.slots.iter_mut().filter(|s| slot_ids.contains(&s.id)) {
                    slot.participant = None
                }
            }
            Transition::Reserve {
                slot_id,
                reservation,
            } => {
                if let Some(slot) = self.slot_mut(*slot_id) {
                    slot.reservations.push(reservation.clone())
                }
            }
            Transition::CancelReservation { slot_id, user_id } => {
                if let Some(slot) = self.slot_mut(*slot_id) {
                    slot.reservations.retain(|r| r.member.id != *user_id)
                }
            }
            Transition::Confirm { at } => self.confirmed_at = Some(*at),
            Transition::End { at } => self.ended_at = Some(*at),
        }
    }

    /// Updates the nickname of a member everywhere it appears.
    /// Returns true if anything changed.
    pub fn rename_member(&mut self, member: &Member) -> bool {
        let mut changed = false;

        let occurrences = std::iter::once(&mut self.manager).chain(
            self.slots.iter_mut().flat_map(|s| {
                s.participant
                    .iter_mut()
                    .chain(s.reservations.iter_mut().map(|r| &mut r.member))
            }),
        );

        for existing in occurrences.filter(|m| m.id == member.id) {
            if existing.nickname != member.nickname {
                existing.nickname = member.nickname.clone();
                changed = true;
            }
        }

        changed
    }

    fn slot_mut(&mut self, slot_id: PrimaryKey) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == slot_id)
    }

    fn ensure_unlocked(&self) -> SlotResult<()> {
        if self.is_confirmed() {
            return Err(SlotError::RoomLocked);
        }

        Ok(())
    }

    fn ensure_manager(&self, user_id: PrimaryKey) -> SlotResult<()> {
        if !self.is_manager(user_id) {
            return Err(SlotError::NotManager);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::{Lineup, Member, Slot};
    use crate::{SlotError, Transition};

    const VOCALS: i32 = 1;
    const DRUMS: i32 = 2;
    const BASS: i32 = 3;

    fn lineup() -> Lineup {
        Lineup::new(
            Member::new(100, "manager"),
            vec![
                Slot::vacant(VOCALS, "보컬"),
                Slot::vacant(DRUMS, "드럼"),
                Slot::vacant(BASS, "베이스"),
            ],
        )
    }

    /// Runs the operation and applies the resulting transition
    fn run<F>(lineup: &mut Lineup, operation: F) -> Result<(), SlotError>
    where
        F: FnOnce(&Lineup) -> Result<Transition, SlotError>,
    {
        let transition = operation(lineup)?;
        lineup.apply(&transition);
        Ok(())
    }

    fn reserved_nicknames(lineup: &Lineup, slot_id: i32) -> Vec<String> {
        lineup
            .slot(slot_id)
            .unwrap()
            .reservations
            .iter()
            .map(|r| r.member.nickname.clone())
            .collect()
    }

    #[test]
    fn join_occupies_vacant_slot_once() {
        let mut lineup = lineup();
        let alice = Member::new(1, "alice");
        let bob = Member::new(2, "bob");

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();

        assert_eq!(lineup.slot(VOCALS).unwrap().participant, Some(alice));
        assert_eq!(lineup.join(VOCALS, &bob), Err(SlotError::SlotOccupied));
        assert_eq!(lineup.participant_count(), 1);
    }

    #[test]
    fn join_unknown_slot() {
        let lineup = lineup();

        assert_eq!(
            lineup.join(42, &Member::new(1, "alice")),
            Err(SlotError::SlotNotFound(42))
        );
    }

    #[test]
    fn leave_requires_participant() {
        let mut lineup = lineup();
        let alice = Member::new(1, "alice");

        run(&mut lineup, |l| l.join(DRUMS, &alice)).unwrap();

        assert_eq!(lineup.leave(DRUMS, 2), Err(SlotError::NotParticipant));
        assert_eq!(lineup.leave(BASS, alice.id), Err(SlotError::NotParticipant));

        run(&mut lineup, |l| l.leave(DRUMS, alice.id)).unwrap();
        assert!(lineup.slot(DRUMS).unwrap().is_vacant());
    }

    #[test]
    fn toggle_twice_ends_vacant() {
        let mut lineup = lineup();
        let alice = Member::new(1, "alice");

        run(&mut lineup, |l| l.toggle(BASS, &alice)).unwrap();
        assert!(lineup.slot(BASS).unwrap().is_played_by(alice.id));

        run(&mut lineup, |l| l.toggle(BASS, &alice)).unwrap();
        assert!(lineup.slot(BASS).unwrap().is_vacant());
    }

    #[test]
    fn user_may_play_several_slots() {
        let mut lineup = lineup();
        let alice = Member::new(1, "alice");

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();
        run(&mut lineup, |l| l.join(BASS, &alice)).unwrap();

        assert_eq!(lineup.participant_count(), 2);
    }

    #[test]
    fn reservations_are_fifo() {
        let mut lineup = lineup();
        let now = Utc::now();

        run(&mut lineup, |l| l.join(VOCALS, &Member::new(1, "alice"))).unwrap();

        for (id, name) in [(2, "a"), (3, "b"), (4, "c")] {
            let member = Member::new(id, name);
            run(&mut lineup, |l| l.reserve(VOCALS, &member, now)).unwrap();
        }

        assert_eq!(reserved_nicknames(&lineup, VOCALS), vec!["a", "b", "c"]);

        run(&mut lineup, |l| l.cancel_reservation(VOCALS, 3)).unwrap();
        assert_eq!(reserved_nicknames(&lineup, VOCALS), vec!["a", "c"]);
    }

    #[test]
    fn reserve_preconditions() {
        let mut lineup = lineup();
        let now = Utc::now();
        let alice = Member::new(1, "alice");
        let bob = Member::new(2, "bob");

        assert_eq!(
            lineup.reserve(VOCALS, &bob, now),
            Err(SlotError::SlotVacant)
        );

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();

        assert_eq!(
            lineup.reserve(VOCALS, &alice, now),
            Err(SlotError::SelfReserve)
        );

        run(&mut lineup, |l| l.reserve(VOCALS, &bob, now)).unwrap();
        assert_eq!(
            lineup.reserve(VOCALS, &bob, now),
            Err(SlotError::AlreadyReserved)
        );

        assert_eq!(
            lineup.cancel_reservation(VOCALS, alice.id),
            Err(SlotError::NotReserved)
        );
    }

    #[test]
    fn leaving_does_not_promote_reservations() {
        let mut lineup = lineup();
        let alice = Member::new(1, "alice");
        let bob = Member::new(2, "bob");

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();
        run(&mut lineup, |l| l.reserve(VOCALS, &bob, Utc::now())).unwrap();
        run(&mut lineup, |l| l.leave(VOCALS, alice.id)).unwrap();

        let slot = lineup.slot(VOCALS).unwrap();
        assert!(slot.is_vacant());
        assert_eq!(reserved_nicknames(&lineup, VOCALS), vec!["bob"]);

        // The queued user still has to join explicitly
        run(&mut lineup, |l| l.join(VOCALS, &bob)).unwrap();

        let slot = lineup.slot(VOCALS).unwrap();
        assert!(slot.is_played_by(bob.id));
        assert!(slot.reservations.is_empty());
    }

    #[test]
    fn joining_consumes_own_reservation() {
        let mut lineup = lineup();
        let now = Utc::now();
        let alice = Member::new(1, "alice");
        let bob = Member::new(2, "bob");
        let carol = Member::new(3, "carol");

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();
        run(&mut lineup, |l| l.reserve(VOCALS, &bob, now)).unwrap();
        run(&mut lineup, |l| l.reserve(VOCALS, &carol, now)).unwrap();
        run(&mut lineup, |l| l.leave(VOCALS, alice.id)).unwrap();

        let transition = lineup.join(VOCALS, &bob).unwrap();
        assert_eq!(
            transition,
            Transition::Occupy {
                slot_id: VOCALS,
                member: bob.clone(),
                consumed_reservation: true,
            }
        );

        lineup.apply(&transition);

        let slot = lineup.slot(VOCALS).unwrap();
        assert!(slot.is_played_by(bob.id));
        assert!(!slot.is_reserved_by(bob.id), "bob is not queued for his own slot");
        assert_eq!(reserved_nicknames(&lineup, VOCALS), vec!["carol"]);

        // Joining without a reservation leaves the queue alone
        let transition = lineup.join(DRUMS, &alice).unwrap();
        assert!(matches!(
            transition,
            Transition::Occupy {
                consumed_reservation: false,
                ..
            }
        ));
    }

    #[test]
    fn confirmation_freezes_slots() {
        let mut lineup = lineup();
        let now = Utc::now();
        let alice = Member::new(1, "alice");
        let bob = Member::new(2, "bob");

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();
        run(&mut lineup, |l| l.reserve(VOCALS, &bob, now)).unwrap();

        assert_eq!(lineup.confirm(alice.id, now), Err(SlotError::NotManager));
        run(&mut lineup, |l| l.confirm(100, now)).unwrap();

        let before = lineup.clone();

        assert_eq!(lineup.join(DRUMS, &bob), Err(SlotError::RoomLocked));
        assert_eq!(lineup.leave(VOCALS, alice.id), Err(SlotError::RoomLocked));
        assert_eq!(lineup.toggle(VOCALS, &alice), Err(SlotError::RoomLocked));
        assert_eq!(
            lineup.reserve(VOCALS, &Member::new(3, "carol"), now),
            Err(SlotError::RoomLocked)
        );
        assert_eq!(
            lineup.cancel_reservation(VOCALS, bob.id),
            Err(SlotError::RoomLocked)
        );
        assert_eq!(lineup.kick(100, "alice"), Err(SlotError::RoomLocked));
        assert_eq!(lineup.leave_room(alice.id), Err(SlotError::RoomLocked));
        assert_eq!(lineup.confirm(100, now), Err(SlotError::AlreadyConfirmed));

        assert_eq!(lineup, before);
    }

    #[test]
    fn kick_vacates_all_target_slots() {
        let mut lineup = lineup();
        let now = Utc::now();
        let alice = Member::new(1, "alice");
        let bob = Member::new(2, "bob");

        run(&mut lineup, |l| l.join(DRUMS, &alice)).unwrap();
        run(&mut lineup, |l| l.join(BASS, &alice)).unwrap();
        run(&mut lineup, |l| l.join(VOCALS, &bob)).unwrap();
        run(&mut lineup, |l| l.reserve(VOCALS, &alice, now)).unwrap();

        assert_eq!(lineup.kick(bob.id, "alice"), Err(SlotError::NotManager));
        assert_eq!(lineup.kick(100, "manager"), Err(SlotError::CannotKickManager));
        assert_eq!(
            lineup.kick(100, "nobody"),
            Err(SlotError::TargetNotFound("nobody".to_string()))
        );

        run(&mut lineup, |l| l.kick(100, "alice")).unwrap();

        assert!(lineup.slot(DRUMS).unwrap().is_vacant());
        assert!(lineup.slot(BASS).unwrap().is_vacant());
        assert!(lineup.slot(VOCALS).unwrap().is_played_by(bob.id));
        assert_eq!(reserved_nicknames(&lineup, VOCALS), vec!["alice"]);
    }

    #[test]
    fn leave_room() {
        let mut lineup = lineup();
        let alice = Member::new(1, "alice");

        assert_eq!(lineup.leave_room(100), Err(SlotError::ManagerCannotLeave));

        let noop = lineup.leave_room(alice.id).unwrap();
        assert!(noop.is_noop());

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();
        run(&mut lineup, |l| l.join(DRUMS, &alice)).unwrap();
        run(&mut lineup, |l| l.leave_room(alice.id)).unwrap();

        assert!(!lineup.is_playing(alice.id));
    }

    #[test]
    fn end_requires_confirmation() {
        let mut lineup = lineup();
        let now = Utc::now();

        assert_eq!(lineup.end(100, now), Err(SlotError::NotConfirmed));

        run(&mut lineup, |l| l.confirm(100, now)).unwrap();
        assert_eq!(lineup.end(1, now), Err(SlotError::NotManager));

        run(&mut lineup, |l| l.end(100, now)).unwrap();
        assert!(lineup.is_ended());
        assert_eq!(lineup.end(100, now), Err(SlotError::AlreadyEnded));
    }

    #[test]
    fn rename_member_everywhere() {
        let mut lineup = lineup();
        let alice = Member::new(1, "alice");
        let bob = Member::new(2, "bob");

        run(&mut lineup, |l| l.join(VOCALS, &alice)).unwrap();
        run(&mut lineup, |l| l.join(DRUMS, &bob)).unwrap();
        run(&mut lineup, |l| l.reserve(DRUMS, &alice, Utc::now())).unwrap();

        assert!(lineup.rename_member(&Member::new(1, "alicia")));
        assert!(!lineup.rename_member(&Member::new(1, "alicia")), "nothing left to rename");

        let vocals = lineup.slot(VOCALS).unwrap();
        assert_eq!(vocals.participant.as_ref().unwrap().nickname, "alicia");
        assert_eq!(reserved_nicknames(&lineup, DRUMS), vec!["alicia"]);
        assert_eq!(lineup.kick(100, "alice"), Err(SlotError::TargetNotFound("alice".to_string())));
    }
}
