use chrono::{DateTime, Utc};

use crate::{Member, PrimaryKey, Reservation};

/// A checked change to a [Lineup](crate::Lineup).
///
/// Transitions are produced by the lineup's operations after every precondition has passed,
/// so a transition can be persisted first and applied afterwards without being re-validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A vacant slot receives a participant. If the participant was queued for the slot,
    /// that reservation is consumed.
    Occupy {
        slot_id: PrimaryKey,
        member: Member,
        consumed_reservation: bool,
    },
    /// The given slots lose their participant. Reservations are kept as they are.
    Vacate { slot_ids: Vec<PrimaryKey> },
    /// A reservation is appended to the tail of a slot's queue.
    Reserve {
        slot_id: PrimaryKey,
        reservation: Reservation,
    },
    /// A user's reservation is removed from a slot's queue.
    CancelReservation {
        slot_id: PrimaryKey,
        user_id: PrimaryKey,
    },
    /// The room is confirmed, freezing all slots.
    Confirm { at: DateTime<Utc> },
    /// The confirmed room has ended.
    End { at: DateTime<Utc> },
}

impl Transition {
    /// Returns true if applying this transition would change nothing.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Vacate { slot_ids } if slot_ids.is_empty())
    }
}
