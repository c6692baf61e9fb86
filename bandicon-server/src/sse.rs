use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use bandicon_collab::CollabEvent;
use bandicon_core::Id;
use futures_util::Stream;
use log::error;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::VecDeque,
    convert::Infallible,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};
use utoipa::ToSchema;

use crate::{
    context::ServerContext,
    serialized::{ChatMessage, Room, ToSerialized},
    Router,
};

type ConnectionId = Id<Connection>;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    /// A room was opened
    RoomCreated { room: Room },
    /// The sessions or details of a room changed
    RoomUpdated { room: Room },
    /// A room was deleted by its manager
    RoomDeleted { room_id: i32 },
    /// A chat message was posted
    RoomMessage { message: ChatMessage },
}

impl From<CollabEvent> for ServerEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::RoomCreated { room } => Self::RoomCreated {
                room: room.to_serialized(),
            },
            CollabEvent::RoomUpdated { room } => Self::RoomUpdated {
                room: room.to_serialized(),
            },
            CollabEvent::RoomDeleted { room_id } => Self::RoomDeleted { room_id },
            CollabEvent::RoomMessage { message } => Self::RoomMessage {
                message: message.to_serialized(),
            },
        }
    }
}

/// Manages server sent event connections
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

pub struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending messages
    pending_messages: Arc<Mutex<VecDeque<ServerEvent>>>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove connection when dropped
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    pub fn broadcast(&self, event: ServerEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter() {
            connection.send(event.clone())
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    fn connect(&self) -> ConnectionHandle {
        let connection = Connection::new();
        let handle = connection.handle(self.me.clone());

        self.connections.lock().push(connection);
        handle
    }

    fn disconnect(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id)
    }
}

impl Connection {
    fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            pending_messages: Default::default(),
            waker: Default::default(),
        }
    }

    fn send(&self, message: ServerEvent) {
        self.pending_messages.lock().push_back(message);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    fn handle(&self, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending_messages: self.pending_messages.clone(),
            waker: self.waker.clone(),
            manager,
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // The waker is stored before checking for messages so a send in between isn't missed
        *self.waker.lock() = Some(cx.waker().clone());

        while let Some(message) = self.pending_messages.lock().pop_front() {
            match serde_json::to_string(&message) {
                Ok(data) => return Poll::Ready(Some(Ok(Event::default().data(data)))),
                Err(e) => error!("Failed to serialize server event: {}", e),
            }
        }

        Poll::Pending
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of room events",
            body = ServerEvent
        )
    )
)]
async fn event_stream(State(sse): State<Arc<ServerSentEvents>>) -> Sse<ConnectionHandle> {
    Sse::new(sse.connect()).keep_alive(KeepAlive::default())
}

pub fn router() -> Router {
    Router::new().route("/", get(event_stream))
}

#[cfg(test)]
mod test {
    use futures_util::StreamExt;

    use super::{ServerEvent, ServerSentEvents};

    #[tokio::test]
    async fn broadcast_reaches_connections() {
        let sse = ServerSentEvents::new();
        let mut handle = sse.connect();

        assert_eq!(sse.connection_count(), 1);

        sse.broadcast(ServerEvent::RoomDeleted { room_id: 1 });
        sse.broadcast(ServerEvent::RoomDeleted { room_id: 2 });

        assert!(handle.next().await.is_some());
        assert!(handle.next().await.is_some());

        drop(handle);
        assert_eq!(sse.connection_count(), 0, "dropped handles disconnect");
    }
}
