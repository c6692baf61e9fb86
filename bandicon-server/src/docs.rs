use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth, errors, rooms, schemas, serialized, sse};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::logout,
        auth::user,
        auth::update_user,
        rooms::list_rooms,
        rooms::create_room,
        rooms::my_rooms,
        rooms::user_rooms,
        rooms::room,
        rooms::update_room,
        rooms::delete_room,
        rooms::toggle_session,
        rooms::reserve_session,
        rooms::cancel_reservation,
        rooms::confirm_room,
        rooms::end_room,
        rooms::kick_member,
        rooms::leave_room,
        rooms::messages,
        rooms::post_message,
        rooms::availability,
        rooms::submit_availability,
        rooms::evaluate,
        sse::event_stream,
    ),
    components(schemas(
        errors::ErrorBody,
        schemas::LoginSchema,
        schemas::RegisterSchema,
        schemas::UpdateUserSchema,
        schemas::NewRoomSchema,
        schemas::UpdateRoomSchema,
        schemas::RoomPasswordSchema,
        schemas::KickSchema,
        schemas::MessageSchema,
        schemas::AvailabilitySchema,
        schemas::EvaluateSchema,
        schemas::EvaluationSchema,
        schemas::RoomSort,
        serialized::User,
        serialized::LoginResult,
        serialized::Member,
        serialized::Room,
        serialized::RoomSession,
        serialized::Reservation,
        serialized::ChatMessage,
        serialized::AvailabilitySlot,
        serialized::Evaluation,
        sse::ServerEvent,
    )),
    modifiers(&Security),
    info(
        title = "bandicon",
        description = "bandicon-server exposes endpoints to reserve and play sessions in jam rooms"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
