use thiserror::Error;

use crate::PrimaryKey;

/// A rejected slot transition. The lineup is left untouched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("Session {0} does not exist in this room")]
    SlotNotFound(PrimaryKey),
    #[error("This session is already taken by another user")]
    SlotOccupied,
    /// The room is confirmed, so slots can no longer change
    #[error("The room is confirmed and its sessions are locked")]
    RoomLocked,
    #[error("You are not the participant of this session")]
    NotParticipant,
    #[error("You have already reserved this session")]
    AlreadyReserved,
    /// Reserving an empty slot makes no sense, the caller should join instead
    #[error("This session is vacant, join it instead of reserving")]
    SlotVacant,
    #[error("You cannot reserve a session you are playing in")]
    SelfReserve,
    #[error("You have not reserved this session")]
    NotReserved,
    #[error("Only the room manager can do this")]
    NotManager,
    #[error("The room is already confirmed")]
    AlreadyConfirmed,
    #[error("{0} is not playing in this room")]
    TargetNotFound(String),
    #[error("The room manager cannot be kicked")]
    CannotKickManager,
    #[error("The room manager cannot leave the room")]
    ManagerCannotLeave,
    #[error("Only a confirmed room can be ended")]
    NotConfirmed,
    #[error("The room has already ended")]
    AlreadyEnded,
}
