use crossbeam::channel::{Receiver, Sender};

use crate::{PrimaryKey, RoomData, RoomMessageData};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system whenever committed state changes
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A new room was created
    RoomCreated { room: RoomData },
    /// A room's lineup or details changed. Contains the committed state.
    RoomUpdated { room: RoomData },
    /// A room was deleted by its manager
    RoomDeleted { room_id: PrimaryKey },
    /// A chat message was posted in a room
    RoomMessage { message: RoomMessageData },
}

impl CollabEvent {
    /// The room this event concerns
    pub fn room_id(&self) -> PrimaryKey {
        match self {
            Self::RoomCreated { room } | Self::RoomUpdated { room } => room.id,
            Self::RoomDeleted { room_id } => *room_id,
            Self::RoomMessage { message } => message.room_id,
        }
    }
}
