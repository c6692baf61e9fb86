use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json,
};
use bandicon_collab::{Credentials, NewUser, SessionData, UpdatedUser, UserData};

use crate::{
    context::ServerContext,
    errors::{ErrorBody, ServerError, ServerResult},
    schemas::{LoginSchema, RegisterSchema, UpdateUserSchema, ValidatedJson},
    serialized::{LoginResult, ToSerialized, User},
    Router,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> &UserData {
        &self.0.user
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or_else(|| ServerError::Unauthorized("Missing authorization".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServerError::Unauthorized("Authorization must be Bearer".to_string()))?;

        let session = context.collab.auth.session(token).await?;

        Ok(Self(session))
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    tag = "auth",
    request_body = RegisterSchema,
    responses(
        (status = 201, description = "The user was registered", body = User),
        (status = 400, description = "The request body is invalid", body = ErrorBody),
        (status = 409, description = "The username or nickname is taken", body = ErrorBody)
    )
)]
async fn register(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<RegisterSchema>,
) -> ServerResult<(StatusCode, Json<User>)> {
    let user = context
        .collab
        .auth
        .register(NewUser {
            username: body.username,
            password: body.password,
            nickname: body.nickname,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.to_serialized())))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "auth",
    request_body = LoginSchema,
    responses(
        (status = 200, description = "A new session was created", body = LoginResult),
        (status = 400, description = "Invalid credentials", body = ErrorBody)
    )
)]
async fn login(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<LoginResult>> {
    let session = context
        .collab
        .auth
        .login(Credentials {
            username: body.username,
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "auth",
    security(("BearerAuth" = [])),
    responses(
        (status = 204, description = "The session was deleted"),
        (status = 401, description = "Missing or invalid session", body = ErrorBody)
    )
)]
async fn logout(
    State(context): State<ServerContext>,
    session: Session,
) -> ServerResult<StatusCode> {
    context.collab.auth.logout(session.token()).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/auth/user",
    tag = "auth",
    security(("BearerAuth" = [])),
    responses(
        (status = 200, description = "The user of the session", body = User),
        (status = 401, description = "Missing or invalid session", body = ErrorBody)
    )
)]
async fn user(session: Session) -> Json<User> {
    Json(session.user().to_serialized())
}

#[utoipa::path(
    patch,
    path = "/v1/auth/user",
    tag = "auth",
    security(("BearerAuth" = [])),
    request_body = UpdateUserSchema,
    responses(
        (status = 200, description = "The updated user", body = User),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 409, description = "The nickname is taken", body = ErrorBody)
    )
)]
async fn update_user(
    State(context): State<ServerContext>,
    session: Session,
    ValidatedJson(body): ValidatedJson<UpdateUserSchema>,
) -> ServerResult<Json<User>> {
    let user = context
        .collab
        .update_user(UpdatedUser {
            id: session.user().id,
            nickname: body.nickname,
        })
        .await?;

    Ok(Json(user.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user", get(user).patch(update_user))
}
