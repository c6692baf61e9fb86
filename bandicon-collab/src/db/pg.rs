use std::collections::HashMap;

use async_trait::async_trait;
use bandicon_core::{Lineup, Member, Reservation, Slot};
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, FromRow, PgPool,
};

use crate::{
    AvailabilityData, Database, DatabaseError, DatabaseResult, EvaluationData, IntoDatabaseError,
    NewEvaluation, NewReservation, NewRoom, NewRoomMessage, NewSession, NewUser, PrimaryKey,
    Result, RoomData, RoomMessageData, SessionData, UpdatedRoom, UpdatedUser, UserData,
};

const ROOM_COLUMNS: &str = "
    rooms.id, rooms.title, rooms.song, rooms.artist, rooms.description,
    rooms.is_private, rooms.password, rooms.clan_id, rooms.created_at,
    rooms.confirmed_at, rooms.ended_at, rooms.manager_id,
    users.nickname AS manager_nickname";

/// A postgres database implementation for bandicon
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    password: String,
    nickname: String,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    title: String,
    song: String,
    artist: String,
    description: Option<String>,
    is_private: bool,
    password: Option<String>,
    clan_id: Option<PrimaryKey>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    manager_id: PrimaryKey,
    manager_nickname: String,
}

#[derive(FromRow)]
struct SlotRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    session_name: String,
    participant_id: Option<PrimaryKey>,
    participant_nickname: Option<String>,
}

#[derive(FromRow)]
struct ReservationRow {
    slot_id: PrimaryKey,
    user_id: PrimaryKey,
    nickname: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct VoteRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    time: DateTime<Utc>,
    user_id: Option<PrimaryKey>,
    nickname: Option<String>,
}

#[derive(FromRow)]
struct MessageRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    sender: String,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(FromRow)]
struct EvaluationRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    evaluator_id: PrimaryKey,
    target_id: PrimaryKey,
    score: i32,
    comment: Option<String>,
    is_mood_maker: bool,
    created_at: DateTime<Utc>,
}

impl PgDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Runs the pending migrations in `migrations/`
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }

    /// Loads the slots and reservations of the given rooms and assembles them
    async fn assemble_rooms(&self, rows: Vec<RoomRow>) -> Result<Vec<RoomData>> {
        let room_ids: Vec<_> = rows.iter().map(|r| r.id).collect();

        let slot_rows: Vec<SlotRow> = query_as(
            "
            SELECT
                room_slots.id,
                room_slots.room_id,
                room_slots.session_name,
                room_slots.participant_id,
                users.nickname AS participant_nickname
            FROM room_slots
                LEFT JOIN users ON room_slots.participant_id = users.id
            WHERE room_slots.room_id = ANY($1)
            ORDER BY room_slots.position, room_slots.id",
        )
        .bind(&room_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let slot_ids: Vec<_> = slot_rows.iter().map(|s| s.id).collect();

        let reservation_rows: Vec<ReservationRow> = query_as(
            "
            SELECT
                slot_reservations.slot_id,
                slot_reservations.user_id,
                slot_reservations.created_at,
                users.nickname
            FROM slot_reservations
                INNER JOIN users ON slot_reservations.user_id = users.id
            WHERE slot_reservations.slot_id = ANY($1)
            ORDER BY slot_reservations.created_at, slot_reservations.id",
        )
        .bind(&slot_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let mut reservations: HashMap<PrimaryKey, Vec<Reservation>> = HashMap::new();
        for row in reservation_rows {
            reservations
                .entry(row.slot_id)
                .or_default()
                .push(Reservation {
                    member: Member::new(row.user_id, row.nickname),
                    created_at: row.created_at,
                });
        }

        let mut slots: HashMap<PrimaryKey, Vec<Slot>> = HashMap::new();
        for row in slot_rows {
            let participant = row
                .participant_id
                .zip(row.participant_nickname)
                .map(|(id, nickname)| Member::new(id, nickname));

            slots.entry(row.room_id).or_default().push(Slot {
                id: row.id,
                name: row.session_name,
                participant,
                reservations: reservations.remove(&row.id).unwrap_or_default(),
            });
        }

        let rooms = rows
            .into_iter()
            .map(|row| RoomData {
                id: row.id,
                title: row.title,
                song: row.song,
                artist: row.artist,
                description: row.description,
                is_private: row.is_private,
                password: row.password,
                clan_id: row.clan_id,
                created_at: row.created_at,
                lineup: Lineup {
                    manager: Member::new(row.manager_id, row.manager_nickname),
                    confirmed_at: row.confirmed_at,
                    ended_at: row.ended_at,
                    slots: slots.remove(&row.id).unwrap_or_default(),
                },
            })
            .collect();

        Ok(rooms)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn user_by_nickname(&self, nickname: &str) -> Result<UserData> {
        query_as("SELECT * FROM users WHERE nickname = $1")
            .bind(nickname)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "nickname"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        self.user_by_nickname(&new_user.nickname)
            .await
            .conflict_or_ok("user", "nickname", &new_user.nickname)?;

        query_as(
            "INSERT INTO users (username, password, nickname) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(new_user.username)
        .bind(new_user.password)
        .bind(new_user.nickname)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_user(&self, updated_user: UpdatedUser) -> Result<UserData> {
        let user = self.user_by_id(updated_user.id).await?;

        if let Some(nickname) = &updated_user.nickname {
            if *nickname != user.nickname {
                self.user_by_nickname(nickname)
                    .await
                    .conflict_or_ok("user", "nickname", nickname)?;
            }
        }

        query("UPDATE users SET nickname = $1 WHERE id = $2")
            .bind(updated_user.nickname.unwrap_or(user.nickname))
            .bind(updated_user.id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.user_by_id(updated_user.id).await
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row: SessionRow = query_as(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.password,
                users.nickname
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                password: row.password,
                nickname: row.nickname,
            },
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let token: String = query_scalar(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3) RETURNING token",
        )
        .bind(new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.session_by_token(&token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE now() > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let row: RoomRow = query_as(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms
                INNER JOIN users ON rooms.manager_id = users.id
            WHERE rooms.id = $1"
        ))
        .bind(room_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room", "id"))?;

        let mut rooms = self.assemble_rooms(vec![row]).await?;

        rooms.pop().ok_or(DatabaseError::NotFound {
            resource: "room",
            identifier: "id",
        })
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        let rows: Vec<RoomRow> = query_as(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms
                INNER JOIN users ON rooms.manager_id = users.id
            ORDER BY rooms.created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.assemble_rooms(rows).await
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        // Ensure the manager exists
        let user = self.user_by_id(new_room.user_id).await?;

        let mut transaction = self.pool.begin().await.map_err(|e| e.any())?;

        let room_id: PrimaryKey = query_scalar(
            "
            INSERT INTO rooms (title, song, artist, description, is_private, password, clan_id, manager_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id",
        )
        .bind(new_room.title)
        .bind(new_room.song)
        .bind(new_room.artist)
        .bind(new_room.description)
        .bind(new_room.is_private)
        .bind(new_room.password)
        .bind(new_room.clan_id)
        .bind(user.id)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|e| e.any())?;

        for (position, session_name) in new_room.sessions.into_iter().enumerate() {
            query("INSERT INTO room_slots (room_id, position, session_name) VALUES ($1, $2, $3)")
                .bind(room_id)
                .bind(position as i32)
                .bind(session_name)
                .execute(&mut *transaction)
                .await
                .map_err(|e| e.any())?;
        }

        transaction.commit().await.map_err(|e| e.any())?;

        self.room_by_id(room_id).await
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        let room = self.room_by_id(updated_room.id).await?;

        query(
            "UPDATE rooms SET
                title = $1,
                song = $2,
                artist = $3,
                description = $4
            WHERE id = $5",
        )
        .bind(updated_room.title.unwrap_or(room.title))
        .bind(updated_room.song.unwrap_or(room.song))
        .bind(updated_room.artist.unwrap_or(room.artist))
        .bind(updated_room.description.or(room.description))
        .bind(updated_room.id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.room_by_id(updated_room.id).await
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let result = query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            });
        }

        Ok(())
    }

    async fn set_room_confirmed(&self, room_id: PrimaryKey, at: DateTime<Utc>) -> Result<()> {
        query("UPDATE rooms SET confirmed_at = $1 WHERE id = $2 AND confirmed_at IS NULL")
            .bind(at)
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn set_room_ended(&self, room_id: PrimaryKey, at: DateTime<Utc>) -> Result<()> {
        query("UPDATE rooms SET ended_at = $1 WHERE id = $2 AND ended_at IS NULL")
            .bind(at)
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn occupy_slot(&self, slot_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut transaction = self.pool.begin().await.map_err(|e| e.any())?;

        // Only a vacant slot can be occupied
        let result = query(
            "UPDATE room_slots SET participant_id = $1 WHERE id = $2 AND participant_id IS NULL",
        )
        .bind(user_id)
        .bind(slot_id)
        .execute(&mut *transaction)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::Conflict {
                resource: "room slot",
                field: "participant",
                value: slot_id.to_string(),
            });
        }

        query("DELETE FROM slot_reservations WHERE slot_id = $1 AND user_id = $2")
            .bind(slot_id)
            .bind(user_id)
            .execute(&mut *transaction)
            .await
            .map_err(|e| e.any())?;

        transaction.commit().await.map_err(|e| e.any())
    }

    async fn vacate_slots(&self, slot_ids: &[PrimaryKey]) -> Result<()> {
        query("UPDATE room_slots SET participant_id = NULL WHERE id = ANY($1)")
            .bind(slot_ids)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_reservation(&self, new_reservation: NewReservation) -> Result<()> {
        let result = query(
            "
            INSERT INTO slot_reservations (slot_id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (slot_id, user_id) DO NOTHING",
        )
        .bind(new_reservation.slot_id)
        .bind(new_reservation.user_id)
        .bind(new_reservation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::Conflict {
                resource: "reservation",
                field: "slot:user",
                value: format!("{}:{}", new_reservation.slot_id, new_reservation.user_id),
            });
        }

        Ok(())
    }

    async fn delete_reservation(&self, slot_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        query("DELETE FROM slot_reservations WHERE slot_id = $1 AND user_id = $2")
            .bind(slot_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_messages(&self, room_id: PrimaryKey) -> Result<Vec<RoomMessageData>> {
        let rows: Vec<MessageRow> = query_as(
            "SELECT * FROM room_messages WHERE room_id = $1 ORDER BY timestamp, id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_room_message(&self, new_message: NewRoomMessage) -> Result<RoomMessageData> {
        let row: MessageRow = query_as(
            "INSERT INTO room_messages (room_id, sender, message) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(new_message.room_id)
        .bind(new_message.sender)
        .bind(new_message.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(row.into())
    }

    async fn availability(&self, room_id: PrimaryKey) -> Result<Vec<AvailabilityData>> {
        let rows: Vec<VoteRow> = query_as(
            "
            SELECT
                availability_slots.id,
                availability_slots.room_id,
                availability_slots.time,
                users.id AS user_id,
                users.nickname
            FROM availability_slots
                LEFT JOIN availability_votes ON availability_votes.slot_id = availability_slots.id
                LEFT JOIN users ON availability_votes.user_id = users.id
            WHERE availability_slots.room_id = $1
            ORDER BY availability_slots.time, users.id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let mut slots: Vec<AvailabilityData> = vec![];

        for row in rows {
            let voter = row
                .user_id
                .zip(row.nickname)
                .map(|(id, nickname)| Member::new(id, nickname));

            match slots.last_mut() {
                Some(slot) if slot.id == row.id => slot.voters.extend(voter),
                _ => slots.push(AvailabilityData {
                    id: row.id,
                    room_id: row.room_id,
                    time: row.time,
                    voters: voter.into_iter().collect(),
                }),
            }
        }

        Ok(slots)
    }

    async fn replace_availability(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        times: Vec<DateTime<Utc>>,
    ) -> Result<()> {
        let mut transaction = self.pool.begin().await.map_err(|e| e.any())?;

        query(
            "
            DELETE FROM availability_votes
            USING availability_slots
            WHERE availability_votes.slot_id = availability_slots.id
                AND availability_slots.room_id = $1
                AND availability_votes.user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *transaction)
        .await
        .map_err(|e| e.any())?;

        for time in times {
            let slot_id: PrimaryKey = query_scalar(
                "
                INSERT INTO availability_slots (room_id, time) VALUES ($1, $2)
                ON CONFLICT (room_id, time) DO UPDATE SET time = EXCLUDED.time
                RETURNING id",
            )
            .bind(room_id)
            .bind(time)
            .fetch_one(&mut *transaction)
            .await
            .map_err(|e| e.any())?;

            query(
                "
                INSERT INTO availability_votes (slot_id, user_id) VALUES ($1, $2)
                ON CONFLICT DO NOTHING",
            )
            .bind(slot_id)
            .bind(user_id)
            .execute(&mut *transaction)
            .await
            .map_err(|e| e.any())?;
        }

        query(
            "
            DELETE FROM availability_slots
            WHERE room_id = $1 AND NOT EXISTS (
                SELECT 1 FROM availability_votes WHERE availability_votes.slot_id = availability_slots.id
            )",
        )
        .bind(room_id)
        .execute(&mut *transaction)
        .await
        .map_err(|e| e.any())?;

        transaction.commit().await.map_err(|e| e.any())
    }

    async fn has_evaluated(&self, room_id: PrimaryKey, evaluator_id: PrimaryKey) -> Result<bool> {
        query_scalar(
            "SELECT EXISTS (SELECT 1 FROM evaluations WHERE room_id = $1 AND evaluator_id = $2)",
        )
        .bind(room_id)
        .bind(evaluator_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_evaluations(
        &self,
        new_evaluations: Vec<NewEvaluation>,
    ) -> Result<Vec<EvaluationData>> {
        let mut transaction = self.pool.begin().await.map_err(|e| e.any())?;
        let mut created = vec![];

        for evaluation in new_evaluations {
            let row: EvaluationRow = query_as(
                "
                INSERT INTO evaluations (room_id, evaluator_id, target_id, score, comment, is_mood_maker)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *",
            )
            .bind(evaluation.room_id)
            .bind(evaluation.evaluator_id)
            .bind(evaluation.target_id)
            .bind(evaluation.score)
            .bind(evaluation.comment)
            .bind(evaluation.is_mood_maker)
            .fetch_one(&mut *transaction)
            .await
            .map_err(|e| e.any())?;

            created.push(row.into());
        }

        transaction.commit().await.map_err(|e| e.any())?;

        Ok(created)
    }
}

impl From<MessageRow> for RoomMessageData {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            room_id: row.room_id,
            sender: row.sender,
            message: row.message,
            timestamp: row.timestamp,
        }
    }
}

impl From<EvaluationRow> for EvaluationData {
    fn from(row: EvaluationRow) -> Self {
        Self {
            id: row.id,
            room_id: row.room_id,
            evaluator_id: row.evaluator_id,
            target_id: row.target_id,
            score: row.score,
            comment: row.comment,
            is_mood_maker: row.is_mood_maker,
            created_at: row.created_at,
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
