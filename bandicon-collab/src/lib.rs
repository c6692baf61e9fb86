mod auth;
mod db;
mod events;
mod rooms;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use db::*;
pub use events::*;
pub use rooms::*;

use crossbeam::channel::unbounded;
use dashmap::DashMap;

/// A thread-safe, reference counted store
pub type Store<Id, T> = Arc<DashMap<Id, Arc<T>>>;

/// The bandicon collab system, facilitating room management, authentication, and more.
pub struct Collab {
    event_receiver: EventReceiver,

    pub auth: Auth,
    pub rooms: RoomManager,
}

/// A type passed to various components of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub database: Arc<dyn Database>,
    pub rooms: Store<PrimaryKey, Room>,

    event_sender: EventSender,
}

impl Collab {
    pub fn new(database: BoxedDatabase) -> Self {
        let database: Arc<dyn Database> = database.into();
        let (event_sender, event_receiver) = unbounded();

        let context = CollabContext {
            database: database.clone(),
            rooms: Default::default(),
            event_sender,
        };

        Self {
            event_receiver,
            auth: Auth::new(&database),
            rooms: RoomManager::new(&context),
        }
    }

    /// Updates a user and propagates a new nickname to the rooms
    pub async fn update_user(&self, updated_user: UpdatedUser) -> std::result::Result<UserData, DatabaseError> {
        let user = self.auth.update_user(updated_user).await?;
        self.rooms.rename_member(&user).await;

        Ok(user)
    }

    /// Returns a receiver of every event emitted by the collab system
    pub fn events(&self) -> EventReceiver {
        self.event_receiver.clone()
    }
}

impl CollabContext {
    /// Emits an event. Events without receivers are dropped silently.
    pub fn emit(&self, event: CollabEvent) {
        let _ = self.event_sender.send(event);
    }
}
