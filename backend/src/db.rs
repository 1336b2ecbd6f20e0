use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use common::req::{PressureStatus, SessionStatus, UpdateProfileRequest};

use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    pressure_from_measurements, ApiKey, Measurement, NewApiKey, NewMeasurement, NewSession,
    NewUser, Session, User,
};
use crate::schema::{api_keys, measurements, sessions, users};
use crate::utils::{datetime_from_ms, ms_since_epoch};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub type SharedDb = Arc<Mutex<Db>>;

/// Map a poisoned lock to a 500 instead of panicking the worker.
pub fn lock(shared: &SharedDb) -> ApiResult<MutexGuard<'_, Db>> {
    shared
        .lock()
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("database mutex poisoned")))
}

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(database_url)?;
        // sqlite leaves referential integrity off unless asked
        conn.batch_execute("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn run_migrations(&mut self) -> Result<()> {
        self.conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("running migrations: {e}"))?;
        Ok(())
    }

    /// First-boot provisioning: if no device key exists, persist the
    /// configured one. Only the digest is stored.
    pub fn ensure_device_key(&mut self, plaintext: &str) -> Result<()> {
        let existing: i64 = api_keys::table.count().get_result(&mut self.conn)?;
        if existing > 0 {
            return Ok(());
        }
        let key = NewApiKey {
            key_name: "Default Device Key".to_owned(),
            key_hash: auth::hash_key(plaintext),
            is_active: true,
            created_at: ms_since_epoch(),
            usage_count: 0,
        };
        diesel::insert_into(api_keys::table)
            .values(&key)
            .execute(&mut self.conn)?;
        log::info!("provisioned device API key {:?}", key.key_name);
        Ok(())
    }

    /// Digest comparison against active keys; a hit stamps last_used and
    /// bumps the usage counter so key telemetry comes for free.
    pub fn verify_api_key(&mut self, presented: &str) -> ApiResult<bool> {
        let digest = auth::hash_key(presented);
        self.conn.transaction(|conn| {
            let key: Option<ApiKey> = api_keys::table
                .filter(api_keys::key_hash.eq(&digest))
                .filter(api_keys::is_active.eq(true))
                .first(conn)
                .optional()?;

            match key {
                Some(key) => {
                    diesel::update(api_keys::table.find(key.id))
                        .set((
                            api_keys::usage_count.eq(key.usage_count + 1),
                            api_keys::last_used.eq(Some(ms_since_epoch())),
                        ))
                        .execute(conn)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    // ------------------------------------------------------------------
    // users
    // ------------------------------------------------------------------

    pub fn insert_user(&mut self, new: NewUser) -> ApiResult<User> {
        self.conn.transaction(|conn| {
            diesel::insert_into(users::table)
                .values(&new)
                .returning(User::as_returning())
                .get_result(conn)
                .map_err(|e| match e {
                    diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => ApiError::Validation(
                        "Username already exists. Please choose a different one.".to_owned(),
                    ),
                    other => other.into(),
                })
        })
    }

    pub fn user_by_id(&mut self, id: i32) -> ApiResult<Option<User>> {
        Ok(users::table.find(id).first(&mut self.conn).optional()?)
    }

    pub fn user_by_username(&mut self, username: &str) -> ApiResult<Option<User>> {
        Ok(users::table
            .filter(users::username.eq(username))
            .filter(users::is_active.eq(true))
            .first(&mut self.conn)
            .optional()?)
    }

    pub fn user_by_token(&mut self, token: &str) -> ApiResult<Option<User>> {
        Ok(users::table
            .filter(users::remember_token.eq(token))
            .filter(users::is_active.eq(true))
            .first(&mut self.conn)
            .optional()?)
    }

    /// Login bookkeeping: last_login stamp plus the fresh session token.
    pub fn record_login(&mut self, user_id: i32, token: &str) -> ApiResult<()> {
        diesel::update(users::table.find(user_id))
            .set((
                users::last_login.eq(Some(ms_since_epoch())),
                users::remember_token.eq(Some(token)),
            ))
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn clear_token(&mut self, user_id: i32) -> ApiResult<()> {
        diesel::update(users::table.find(user_id))
            .set(users::remember_token.eq(None::<String>))
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn update_profile(&mut self, user_id: i32, req: &UpdateProfileRequest) -> ApiResult<User> {
        self.conn.transaction(|conn| {
            Ok(diesel::update(users::table.find(user_id))
                .set((
                    users::first_name.eq(req.first_name.trim()),
                    users::surname.eq(req.surname.trim()),
                    users::middle_initial
                        .eq(req.middle_initial.as_deref().map(|mi| mi.trim().to_uppercase())),
                    users::hospital_name.eq(req.hospital_name.trim()),
                    users::hospital_room_no.eq(req.hospital_room_no.trim()),
                ))
                .returning(User::as_returning())
                .get_result(conn)?)
        })
    }

    pub fn update_password(&mut self, user_id: i32, password_hash: &str) -> ApiResult<()> {
        diesel::update(users::table.find(user_id))
            .set(users::password_hash.eq(password_hash))
            .execute(&mut self.conn)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // sessions
    // ------------------------------------------------------------------

    pub fn create_session(&mut self, new: NewSession) -> ApiResult<Session> {
        self.conn.transaction(|conn| create_session_row(conn, new))
    }

    pub fn session_for_user(&mut self, session_id: i32, user_id: i32) -> ApiResult<Session> {
        sessions::table
            .find(session_id)
            .filter(sessions::user_id.eq(user_id))
            .first(&mut self.conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Session not found".to_owned()))
    }

    pub fn sessions_for_user(&mut self, user_id: i32) -> ApiResult<Vec<Session>> {
        Ok(sessions::table
            .filter(sessions::user_id.eq(user_id))
            .order(sessions::created_at.desc())
            .load(&mut self.conn)?)
    }

    pub fn pause_session(&mut self, session_id: i32) -> ApiResult<Session> {
        self.conn.transaction(|conn| {
            let session = load_session(conn, session_id)?;
            match session.lifecycle()? {
                SessionStatus::Active => {}
                other => {
                    return Err(ApiError::Validation(format!("cannot pause a {other} session")))
                }
            }
            set_status(conn, session_id, SessionStatus::Paused)
        })
    }

    pub fn resume_session(&mut self, session_id: i32) -> ApiResult<Session> {
        self.conn.transaction(|conn| {
            let session = load_session(conn, session_id)?;
            match session.lifecycle()? {
                SessionStatus::Paused => {}
                other => {
                    return Err(ApiError::Validation(format!("cannot resume a {other} session")))
                }
            }
            set_status(conn, session_id, SessionStatus::Active)
        })
    }

    pub fn cancel_session(&mut self, session_id: i32) -> ApiResult<Session> {
        self.conn.transaction(|conn| {
            let session = load_session(conn, session_id)?;
            let status = session.lifecycle()?;
            if status.is_terminal() {
                return Err(ApiError::Validation(format!("cannot cancel a {status} session")));
            }
            set_status(conn, session_id, SessionStatus::Cancelled)
        })
    }

    /// Completion stamps completed_at and derives the plantar-pressure
    /// status: an explicitly supplied value wins, otherwise the mean-VPT
    /// rule runs over the session's measurements.
    pub fn complete_session(
        &mut self,
        session_id: i32,
        explicit: Option<PressureStatus>,
    ) -> ApiResult<(Session, Vec<Measurement>)> {
        self.conn.transaction(|conn| {
            let session = load_session(conn, session_id)?;
            match session.lifecycle()? {
                SessionStatus::Active | SessionStatus::Paused => {}
                other => {
                    return Err(ApiError::Validation(format!(
                        "cannot complete a {other} session"
                    )))
                }
            }

            let rows = session_measurements(conn, session_id)?;
            let pressure = explicit.unwrap_or_else(|| pressure_from_measurements(&rows));

            let updated = diesel::update(sessions::table.find(session_id))
                .set((
                    sessions::status.eq(SessionStatus::Completed.as_str()),
                    sessions::completed_at.eq(Some(ms_since_epoch())),
                    sessions::plantar_pressure_status.eq(pressure.as_str()),
                ))
                .returning(Session::as_returning())
                .get_result(conn)?;
            Ok((updated, rows))
        })
    }

    /// Cascade is explicit even though the schema declares ON DELETE
    /// CASCADE, so the row counts in the log stay honest.
    pub fn delete_session(&mut self, session_id: i32) -> ApiResult<()> {
        self.conn.transaction(|conn| {
            let removed = diesel::delete(
                measurements::table.filter(measurements::session_id.eq(session_id)),
            )
            .execute(conn)?;
            let deleted = diesel::delete(sessions::table.find(session_id)).execute(conn)?;
            if deleted == 0 {
                return Err(ApiError::NotFound("Session not found".to_owned()));
            }
            log::debug!("deleted session {session_id} and {removed} measurements");
            Ok(())
        })
    }

    /// Copies the point/reading tuples into a fresh active session;
    /// timestamps are re-stamped and the advisory range check re-runs.
    pub fn duplicate_session(&mut self, original: &Session) -> ApiResult<Session> {
        self.conn.transaction(|conn| {
            let copy = create_session_row(
                conn,
                NewSession {
                    user_id: original.user_id,
                    session_name: format!("{} (Copy)", original.session_name),
                    protocol: original.protocol.clone(),
                    status: SessionStatus::Active.as_str().to_owned(),
                    created_at: ms_since_epoch(),
                    plantar_pressure_status: PressureStatus::Unknown.as_str().to_owned(),
                    notes: None,
                    expected_points: original.expected_points.clone(),
                },
            )?;

            for m in session_measurements(conn, original.id)? {
                insert_measurement_row(
                    conn,
                    NewMeasurement::now(
                        copy.id,
                        &m.point_name,
                        m.vpt_voltage,
                        m.temperature,
                        m.spo2,
                        None,
                    ),
                )?;
            }
            Ok(copy)
        })
    }

    // ------------------------------------------------------------------
    // measurements
    // ------------------------------------------------------------------

    pub fn measurements_for_session(&mut self, session_id: i32) -> ApiResult<Vec<Measurement>> {
        self.conn
            .transaction(|conn| session_measurements(conn, session_id))
    }

    pub fn measurements_for_user(&mut self, user_id: i32) -> ApiResult<Vec<Measurement>> {
        Ok(measurements::table
            .inner_join(sessions::table)
            .filter(sessions::user_id.eq(user_id))
            .order((measurements::timestamp.asc(), measurements::id.asc()))
            .select(Measurement::as_select())
            .load(&mut self.conn)?)
    }

    pub fn measurements_for_user_in_window(
        &mut self,
        user_id: i32,
        from_ms: i64,
        to_ms: i64,
    ) -> ApiResult<Vec<Measurement>> {
        Ok(measurements::table
            .inner_join(sessions::table)
            .filter(sessions::user_id.eq(user_id))
            .filter(measurements::timestamp.ge(from_ms))
            .filter(measurements::timestamp.le(to_ms))
            .order((measurements::timestamp.asc(), measurements::id.asc()))
            .select(Measurement::as_select())
            .load(&mut self.conn)?)
    }

    // ------------------------------------------------------------------
    // ingestion
    // ------------------------------------------------------------------

    /// Device ingestion addressed by user id. Runs as one IMMEDIATE
    /// transaction so two devices racing on "no open session" cannot
    /// both create one.
    pub fn ingest(
        &mut self,
        user_id: i32,
        explicit_session: Option<i32>,
        point_name: &str,
        vpt: Option<f64>,
        temperature: Option<f64>,
        spo2: Option<i32>,
    ) -> ApiResult<(Session, Measurement)> {
        self.conn.immediate_transaction(|conn| {
            let user: User = users::table
                .find(user_id)
                .first(conn)
                .optional()?
                .ok_or_else(|| ApiError::Validation("Invalid user_id".to_owned()))?;

            let session = match explicit_session {
                Some(id) => sessions::table
                    .find(id)
                    .filter(sessions::user_id.eq(user.id))
                    .first::<Session>(conn)
                    .optional()?
                    .ok_or_else(|| ApiError::Validation("Invalid session_id".to_owned()))?,
                None => find_or_create_open_session(conn, user.id, "Session")?,
            };

            let measurement = insert_measurement_row(
                conn,
                NewMeasurement::now(session.id, point_name, vpt, temperature, spo2, None),
            )?;
            Ok((session, measurement))
        })
    }

    /// Combined-reading ingestion addressed by username.
    pub fn ingest_by_username(
        &mut self,
        username: &str,
        point_name: &str,
        vpt: f64,
        temperature: f64,
        spo2: i32,
    ) -> ApiResult<(Session, Measurement)> {
        self.conn.immediate_transaction(|conn| {
            let user: User = users::table
                .filter(users::username.eq(username))
                .first(conn)
                .optional()?
                .ok_or_else(|| ApiError::NotFound(format!("User not found: {username}")))?;

            let session = find_or_create_open_session(conn, user.id, "Auto Session")?;
            let measurement = insert_measurement_row(
                conn,
                NewMeasurement::now(
                    session.id,
                    point_name,
                    Some(vpt),
                    Some(temperature),
                    Some(spo2),
                    None,
                ),
            )?;
            Ok((session, measurement))
        })
    }
}

fn load_session(conn: &mut SqliteConnection, session_id: i32) -> Result<Session, ApiError> {
    sessions::table
        .find(session_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_owned()))
}

fn set_status(
    conn: &mut SqliteConnection,
    session_id: i32,
    status: SessionStatus,
) -> Result<Session, ApiError> {
    Ok(diesel::update(sessions::table.find(session_id))
        .set(sessions::status.eq(status.as_str()))
        .returning(Session::as_returning())
        .get_result(conn)?)
}

fn create_session_row(conn: &mut SqliteConnection, new: NewSession) -> Result<Session, ApiError> {
    Ok(diesel::insert_into(sessions::table)
        .values(&new)
        .returning(Session::as_returning())
        .get_result(conn)?)
}

fn insert_measurement_row(
    conn: &mut SqliteConnection,
    new: NewMeasurement,
) -> Result<Measurement, ApiError> {
    Ok(diesel::insert_into(measurements::table)
        .values(&new)
        .returning(Measurement::as_returning())
        .get_result(conn)?)
}

fn session_measurements(
    conn: &mut SqliteConnection,
    session_id: i32,
) -> Result<Vec<Measurement>, ApiError> {
    Ok(measurements::table
        .filter(measurements::session_id.eq(session_id))
        .order((measurements::timestamp.asc(), measurements::id.asc()))
        .load(conn)?)
}

/// Most recent open session, or a fresh active one named by timestamp.
/// Callers must already hold a write transaction.
fn find_or_create_open_session(
    conn: &mut SqliteConnection,
    user_id: i32,
    label_prefix: &str,
) -> Result<Session, ApiError> {
    let open: Option<Session> = sessions::table
        .filter(sessions::user_id.eq(user_id))
        .filter(sessions::completed_at.is_null())
        .order(sessions::created_at.desc())
        .first(conn)
        .optional()?;
    if let Some(session) = open {
        return Ok(session);
    }

    let now = ms_since_epoch();
    let name = format!("{label_prefix} {}", datetime_from_ms(now).format("%Y-%m-%d %H:%M"));
    create_session_row(conn, NewSession::now(user_id, name, None, None, None))
}
