use chrono::{Duration, Utc};
use log::info;
use std::sync::Arc;
use thiserror::Error;

use crate::{
    util::{hash_secret, random_string, verify_secret},
    Database, DatabaseError, NewSession, NewUser, SessionData, UpdatedUser, UserData,
};

pub struct Auth {
    db: Arc<dyn Database>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The session does not exist or has expired
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("Password must be at least {} characters long", Auth::MIN_PASSWORD_LENGTH)]
    PasswordTooShort,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: i64 = 7;
    pub const MIN_PASSWORD_LENGTH: usize = 8;

    pub fn new(db: &Arc<dyn Database>) -> Self {
        Self { db: db.clone() }
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.db
            .clear_expired_sessions()
            .await
            .map_err(AuthError::Db)?;

        let user = self
            .db
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let matches =
            verify_secret(&credentials.password, &user.password).map_err(AuthError::HashError)?;

        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let new_session = NewSession {
            token: random_string(32),
            user_id: user.id,
            expires_at: Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS),
        };

        let session = self
            .db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)?;

        info!("User {} logged in", session.user.username);
        Ok(session)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Creates a new user with a hashed password
    pub async fn register(&self, new_user: NewUser) -> Result<UserData, AuthError> {
        if new_user.password.chars().count() < Self::MIN_PASSWORD_LENGTH {
            return Err(AuthError::PasswordTooShort);
        }

        let password = hash_secret(&new_user.password).map_err(AuthError::HashError)?;

        let user = self
            .db
            .create_user(NewUser {
                password,
                ..new_user
            })
            .await
            .map_err(AuthError::Db)?;

        info!("Registered user {} ({})", user.username, user.nickname);
        Ok(user)
    }

    /// Updates a user
    pub async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData, DatabaseError> {
        self.db.update_user(updated_user).await
    }

    /// Returns a session if it exists and has not expired
    pub async fn session(&self, token: &str) -> Result<SessionData, AuthError> {
        let session = self.db.session_by_token(token).await.map_err(|e| match e {
            DatabaseError::NotFound { .. } => AuthError::InvalidSession,
            err => AuthError::Db(err),
        })?;

        if session.expires_at <= Utc::now() {
            return Err(AuthError::InvalidSession);
        }

        Ok(session)
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
