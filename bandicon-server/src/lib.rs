mod auth;
mod context;
mod docs;
mod errors;
mod rooms;
mod schemas;
mod serialized;
mod sse;

use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    thread,
};

use axum::routing::get;
use bandicon_collab::Collab;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};
pub use sse::{ServerEvent, ServerSentEvents};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Starts the bandicon server
pub async fn run_server(collab: Arc<Collab>, port: u16) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let sse = ServerSentEvents::new();
    forward_events(&collab, &sse);

    let context = ServerContext { collab, sse };
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);
    axum::serve(listener, app(context).into_make_service()).await
}

/// Builds the router with every route mounted under /v1
pub fn app(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/rooms", rooms::router())
        .nest("/events", sse::router())
        .route("/docs", get(docs::docs));

    axum::Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context)
}

/// Broadcasts every collab event to the connected event streams
fn forward_events(collab: &Collab, sse: &Arc<ServerSentEvents>) {
    let events = collab.events();
    let sse = sse.clone();

    thread::spawn(move || {
        while let Ok(event) = events.recv() {
            sse.broadcast(event.into())
        }
    });
}
