use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use bandicon_collab::{EvaluationEntry, NewRoomRequest, RoomOrder, RoomUpdate};
use log::info;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::{ErrorBody, ServerResult},
    schemas::{
        AvailabilitySchema, EvaluateSchema, KickSchema, MessageSchema, NewRoomSchema,
        RoomListQuery, RoomPasswordSchema, RoomSort, UpdateRoomSchema, ValidatedJson,
    },
    serialized::{AvailabilitySlot, ChatMessage, Evaluation, Room, ToSerialized},
    Router,
};

type RoomResult = ServerResult<Json<Room>>;

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    params(RoomListQuery),
    responses(
        (status = 200, description = "Open general rooms, or the rooms of a clan", body = [Room])
    )
)]
async fn list_rooms(
    State(context): State<ServerContext>,
    Query(query): Query<RoomListQuery>,
) -> Json<Vec<Room>> {
    let rooms = &context.collab.rooms;

    let rooms = match query.clan {
        Some(clan_id) => {
            let order = match query.sort {
                Some(RoomSort::Oldest) => RoomOrder::Oldest,
                _ => RoomOrder::Latest,
            };

            rooms.list_clan(clan_id, order)
        }
        None => rooms.list_open(),
    };

    Json(rooms.iter().map(|r| r.data().to_serialized()).collect())
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    security(("BearerAuth" = [])),
    request_body = NewRoomSchema,
    responses(
        (status = 201, description = "The room was created with every session vacant", body = Room),
        (status = 400, description = "The request body is invalid", body = ErrorBody)
    )
)]
async fn create_room(
    State(context): State<ServerContext>,
    session: Session,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<(StatusCode, Json<Room>)> {
    let room = context
        .collab
        .rooms
        .create_room(
            session.user(),
            NewRoomRequest {
                title: body.title,
                song: body.song,
                artist: body.artist,
                description: body.description,
                is_private: body.is_private,
                password: body.password,
                clan_id: body.clan_id,
                sessions: body.sessions,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(room.data().to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/my",
    tag = "rooms",
    security(("BearerAuth" = [])),
    responses(
        (status = 200, description = "Rooms the user manages or plays in", body = [Room]),
        (status = 401, description = "Missing or invalid session", body = ErrorBody)
    )
)]
async fn my_rooms(State(context): State<ServerContext>, session: Session) -> Json<Vec<Room>> {
    let rooms = context.collab.rooms.list_for_user(session.user().id);

    Json(rooms.iter().map(|r| r.data().to_serialized()).collect())
}

#[utoipa::path(
    get,
    path = "/v1/rooms/my/{nickname}",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("nickname" = String, Path, description = "Nickname of the manager")),
    responses(
        (status = 200, description = "Rooms the user manages", body = [Room]),
        (status = 404, description = "No user has this nickname", body = ErrorBody)
    )
)]
async fn user_rooms(
    State(context): State<ServerContext>,
    _session: Session,
    Path(nickname): Path<String>,
) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context.collab.rooms.list_managed_by(&nickname).await?;

    Ok(Json(rooms.iter().map(|r| r.data().to_serialized()).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{room_id}",
    tag = "rooms",
    params(("room_id" = i32, Path, description = "Room id")),
    responses(
        (status = 200, description = "A snapshot of the room", body = Room),
        (status = 404, description = "Room does not exist", body = ErrorBody)
    )
)]
async fn room(State(context): State<ServerContext>, Path(room_id): Path<i32>) -> RoomResult {
    let room = context.collab.rooms.room_by_id(room_id)?;

    Ok(Json(room.data().to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/rooms/{room_id}",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    request_body = UpdateRoomSchema,
    responses(
        (status = 200, description = "The updated room", body = Room),
        (status = 403, description = "Only the manager can update the room", body = ErrorBody)
    )
)]
async fn update_room(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UpdateRoomSchema>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_id(room_id)?;

    let data = room
        .update(
            session.user().id,
            RoomUpdate {
                title: body.title,
                song: body.song,
                artist: body.artist,
                description: body.description,
            },
        )
        .await?;

    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{room_id}",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    responses(
        (status = 204, description = "The room was deleted"),
        (status = 403, description = "Only the manager can delete the room", body = ErrorBody),
        (status = 404, description = "Room does not exist", body = ErrorBody)
    )
)]
async fn delete_room(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .rooms
        .delete_room(room_id, session.user().id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/sessions/{slot_id}/join",
    tag = "sessions",
    security(("BearerAuth" = [])),
    params(
        ("room_id" = i32, Path, description = "Room id"),
        ("slot_id" = i32, Path, description = "Session id")
    ),
    request_body(content = RoomPasswordSchema, description = "Required for private rooms"),
    responses(
        (status = 200, description = "Joined the session, or left it if already playing", body = Room),
        (status = 400, description = "The room is locked or the password is wrong", body = ErrorBody),
        (status = 409, description = "The session is taken", body = ErrorBody)
    )
)]
async fn toggle_session(
    State(context): State<ServerContext>,
    session: Session,
    Path((room_id, slot_id)): Path<(i32, i32)>,
    body: Option<Json<RoomPasswordSchema>>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let password = body.and_then(|Json(b)| b.password);

    let data = room
        .toggle(slot_id, session.user(), password.as_deref())
        .await?;

    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/sessions/{slot_id}/reserve",
    tag = "sessions",
    security(("BearerAuth" = [])),
    params(("slot_id" = i32, Path, description = "Session id")),
    request_body(content = RoomPasswordSchema, description = "Required for private rooms"),
    responses(
        (status = 200, description = "Added to the end of the reservation queue", body = Room),
        (status = 400, description = "The session is vacant, played by the caller, or locked", body = ErrorBody),
        (status = 409, description = "The session is already reserved by the caller", body = ErrorBody)
    )
)]
async fn reserve_session(
    State(context): State<ServerContext>,
    session: Session,
    Path(slot_id): Path<i32>,
    body: Option<Json<RoomPasswordSchema>>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_slot_id(slot_id)?;
    let password = body.and_then(|Json(b)| b.password);

    let data = room
        .reserve(slot_id, session.user(), password.as_deref())
        .await?;

    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/sessions/{slot_id}/cancel-reserve",
    tag = "sessions",
    security(("BearerAuth" = [])),
    params(("slot_id" = i32, Path, description = "Session id")),
    responses(
        (status = 200, description = "The reservation was removed", body = Room),
        (status = 400, description = "The caller has no reservation, or the room is locked", body = ErrorBody)
    )
)]
async fn cancel_reservation(
    State(context): State<ServerContext>,
    session: Session,
    Path(slot_id): Path<i32>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_slot_id(slot_id)?;

    let data = room
        .cancel_reservation(slot_id, session.user().id)
        .await?;

    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/confirm",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    responses(
        (status = 200, description = "The room is confirmed and its sessions locked", body = Room),
        (status = 403, description = "Only the manager can confirm", body = ErrorBody),
        (status = 409, description = "The room is already confirmed", body = ErrorBody)
    )
)]
async fn confirm_room(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let data = room.confirm(session.user().id).await?;

    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/end",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    responses(
        (status = 200, description = "The room has ended", body = Room),
        (status = 400, description = "The room is not confirmed", body = ErrorBody),
        (status = 403, description = "Only the manager can end the room", body = ErrorBody)
    )
)]
async fn end_room(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let data = room.end(session.user().id).await?;

    info!("Room {} has ended", data.title);
    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/kick",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    request_body = KickSchema,
    responses(
        (status = 200, description = "The user was removed from every session", body = Room),
        (status = 400, description = "The user does not play in this room", body = ErrorBody),
        (status = 403, description = "Only the manager can kick", body = ErrorBody)
    )
)]
async fn kick_member(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<KickSchema>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let data = room.kick(session.user().id, &body.nickname).await?;

    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/leave",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    responses(
        (status = 200, description = "The caller left every session of the room", body = Room),
        (status = 400, description = "The manager cannot leave", body = ErrorBody)
    )
)]
async fn leave_room(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
) -> RoomResult {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let data = room.leave_room(session.user().id).await?;

    Ok(Json(data.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{room_id}/chat",
    tag = "chat",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    responses(
        (status = 200, description = "Messages of the room, oldest first", body = [ChatMessage])
    )
)]
async fn messages(
    State(context): State<ServerContext>,
    _session: Session,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Vec<ChatMessage>>> {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let messages = room.messages().await?;

    Ok(Json(messages.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/chat",
    tag = "chat",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    request_body = MessageSchema,
    responses(
        (status = 201, description = "The message was posted", body = ChatMessage),
        (status = 400, description = "The message is empty or too long", body = ErrorBody)
    )
)]
async fn post_message(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<MessageSchema>,
) -> ServerResult<(StatusCode, Json<ChatMessage>)> {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let message = room.post_message(session.user(), &body.message).await?;

    Ok((StatusCode::CREATED, Json(message.to_serialized())))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{room_id}/availability",
    tag = "availability",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    responses(
        (status = 200, description = "Proposed times with their voters", body = [AvailabilitySlot])
    )
)]
async fn availability(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Vec<AvailabilitySlot>>> {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let slots = room.availability().await?;

    Ok(Json(AvailabilitySlot::for_user(&slots, session.user().id)))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/availability",
    tag = "availability",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    request_body = AvailabilitySchema,
    responses(
        (status = 200, description = "The caller's votes were replaced", body = [AvailabilitySlot])
    )
)]
async fn submit_availability(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<AvailabilitySchema>,
) -> ServerResult<Json<Vec<AvailabilitySlot>>> {
    let room = context.collab.rooms.room_by_id(room_id)?;
    let user_id = session.user().id;

    let slots = room.submit_availability(user_id, body.times).await?;

    Ok(Json(AvailabilitySlot::for_user(&slots, user_id)))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{room_id}/evaluate",
    tag = "rooms",
    security(("BearerAuth" = [])),
    params(("room_id" = i32, Path, description = "Room id")),
    request_body = EvaluateSchema,
    responses(
        (status = 201, description = "The evaluations were stored", body = [Evaluation]),
        (status = 400, description = "The room has not ended", body = ErrorBody),
        (status = 409, description = "The caller already evaluated this room", body = ErrorBody)
    )
)]
async fn evaluate(
    State(context): State<ServerContext>,
    session: Session,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<EvaluateSchema>,
) -> ServerResult<(StatusCode, Json<Vec<Evaluation>>)> {
    let room = context.collab.rooms.room_by_id(room_id)?;

    let entries = body
        .evaluations
        .into_iter()
        .map(|e| EvaluationEntry {
            target_nickname: e.target_nickname,
            score: e.score,
            comment: e.comment,
            is_mood_maker: e.is_mood_maker,
        })
        .collect();

    let evaluations = room.evaluate(session.user(), entries).await?;

    Ok((StatusCode::CREATED, Json(evaluations.to_serialized())))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/my", get(my_rooms))
        .route("/my/:nickname", get(user_rooms))
        .route(
            "/:room_id",
            get(room).patch(update_room).delete(delete_room),
        )
        .route("/:room_id/sessions/:slot_id/join", post(toggle_session))
        .route("/sessions/:slot_id/reserve", post(reserve_session))
        .route("/sessions/:slot_id/cancel-reserve", post(cancel_reservation))
        .route("/:room_id/confirm", post(confirm_room))
        .route("/:room_id/end", post(end_room))
        .route("/:room_id/kick", post(kick_member))
        .route("/:room_id/leave", post(leave_room))
        .route("/:room_id/chat", get(messages).post(post_message))
        .route(
            "/:room_id/availability",
            get(availability).post(submit_availability),
        )
        .route("/:room_id/evaluate", post(evaluate))
}
