use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 128))]
    pub username: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterSchema {
    #[validate(length(min = 2, max = 128))]
    pub username: String,
    #[validate(length(min = 8, max = 64))]
    pub password: String,
    #[validate(length(min = 2, max = 32))]
    pub nickname: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserSchema {
    #[validate(length(min = 2, max = 32))]
    pub nickname: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub song: String,
    #[validate(length(min = 1, max = 100))]
    pub artist: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[validate(length(min = 1, max = 64))]
    pub password: Option<String>,
    pub clan_id: Option<i32>,
    /// Names of the sessions in display order, like "보컬" or "드럼"
    #[validate(length(min = 1, max = 16))]
    pub sessions: Vec<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoomSchema {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub song: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub artist: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// The password of a private room. Ignored for public rooms.
#[derive(Debug, Default, ToSchema, Deserialize)]
pub struct RoomPasswordSchema {
    pub password: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KickSchema {
    #[validate(length(min = 1, max = 32))]
    pub nickname: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageSchema {
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvailabilitySchema {
    /// Every time the caller can make it. Replaces the previous submission.
    #[validate(length(max = 100))]
    pub times: Vec<DateTime<Utc>>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluateSchema {
    #[validate(nested)]
    pub evaluations: Vec<EvaluationSchema>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationSchema {
    pub target_nickname: String,
    #[validate(range(min = 0, max = 100))]
    pub score: Option<i32>,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_mood_maker: bool,
}

#[derive(Debug, Clone, Copy, ToSchema, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomSort {
    Latest,
    Oldest,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoomListQuery {
    /// Lists the rooms of this clan instead of the open general rooms
    pub clan: Option<i32>,
    /// Ordering of clan rooms, latest by default
    pub sort: Option<RoomSort>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;

        extracted_json
            .0
            .validate()
            .map_err(|e| ServerError::BadRequest(format!("Request body is invalid: {}", e)))?;

        Ok(Self(extracted_json.0))
    }
}
