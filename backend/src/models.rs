use std::collections::HashSet;

use diesel::prelude::*;

use common::req::{MeasurementRecord, PressureStatus, SessionStatus, SessionSummary, UserInfo};

use crate::error::{ApiError, ApiResult};
use crate::schema::{api_keys, measurements, sessions, users};
use crate::utils::{iso8601, ms_since_epoch};

// Advisory reading ranges; out-of-range data is flagged, never rejected.
pub const VPT_RANGE_V: (f64, f64) = (0.0, 50.0);
pub const TEMPERATURE_RANGE_C: (f64, f64) = (25.0, 45.0);
pub const SPO2_RANGE_PCT: (i32, i32) = (70, 100);

// Mean-VPT thresholds for the plantar-pressure classification.
const PRESSURE_LOW_BELOW_V: f64 = 3.0;
const PRESSURE_HIGH_ABOVE_V: f64 = 7.0;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub surname: String,
    pub middle_initial: Option<String>,
    pub hospital_name: String,
    pub hospital_room_no: String,
    pub profile_picture: Option<String>,
    pub created_at: i64, // ms
    pub last_login: Option<i64>,
    pub is_active: bool,
    pub remember_token: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        match &self.middle_initial {
            Some(mi) => format!("{} {}. {}", self.first_name, mi, self.surname),
            None => format!("{} {}", self.first_name, self.surname),
        }
    }

    pub fn to_info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name(),
            hospital_name: self.hospital_name.clone(),
            hospital_room_no: self.hospital_room_no.clone(),
            created_at: iso8601(self.created_at),
            last_login: self.last_login.map(iso8601),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub surname: String,
    pub middle_initial: Option<String>,
    pub hospital_name: String,
    pub hospital_room_no: String,
    pub created_at: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Session {
    pub id: i32,
    pub user_id: i32,
    pub session_name: String,
    pub protocol: Option<String>,
    pub status: String,
    pub created_at: i64, // ms
    pub completed_at: Option<i64>,
    pub plantar_pressure_status: String,
    pub notes: Option<String>,
    pub expected_points: Option<String>, // JSON array of point names
}

impl Session {
    pub fn lifecycle(&self) -> ApiResult<SessionStatus> {
        SessionStatus::parse(&self.status).ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("unknown session status {:?}", self.status))
        })
    }

    pub fn pressure(&self) -> PressureStatus {
        PressureStatus::parse(&self.plantar_pressure_status).unwrap_or(PressureStatus::Unknown)
    }

    /// Open sessions accept implicit measurement attachment.
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn expected_point_names(&self) -> Vec<String> {
        self.expected_points
            .as_deref()
            .map(|raw| serde_json::from_str(raw).unwrap_or_default())
            .unwrap_or_default()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub user_id: i32,
    pub session_name: String,
    pub protocol: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub plantar_pressure_status: String,
    pub notes: Option<String>,
    pub expected_points: Option<String>,
}

impl NewSession {
    pub fn now(
        user_id: i32,
        session_name: String,
        protocol: Option<String>,
        notes: Option<String>,
        expected_points: Option<&[String]>,
    ) -> Self {
        Self {
            user_id,
            session_name,
            protocol,
            status: SessionStatus::Active.as_str().to_owned(),
            created_at: ms_since_epoch(),
            plantar_pressure_status: PressureStatus::Unknown.as_str().to_owned(),
            notes,
            expected_points: expected_points
                .map(|points| serde_json::to_string(points).unwrap_or_else(|_| "[]".to_owned())),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = measurements)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Measurement {
    pub id: i32,
    pub session_id: i32,
    pub point_name: String,
    pub vpt_voltage: Option<f64>, // V
    pub temperature: Option<f64>, // °C
    pub spo2: Option<i32>,        // percent
    pub timestamp: i64,           // ms, server-assigned
    pub notes: Option<String>,
    pub is_valid: bool,
    pub retry_count: i32,
}

impl Measurement {
    /// Completeness of the three readings plus a validity bonus, clamped
    /// to [0, 100]. Derived on read, never stored.
    pub fn quality_score(&self) -> f64 {
        let filled = [
            self.vpt_voltage.is_some(),
            self.temperature.is_some(),
            self.spo2.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let completeness = filled as f64 / 3.0 * 100.0;
        let bonus = if self.is_valid { 10.0 } else { -20.0 };
        (completeness + bonus).clamp(0.0, 100.0)
    }

    pub fn to_record(&self) -> MeasurementRecord {
        MeasurementRecord {
            id: self.id,
            session_id: self.session_id,
            point_name: self.point_name.clone(),
            vpt_voltage: self.vpt_voltage,
            temperature: self.temperature,
            spo2: self.spo2,
            timestamp: iso8601(self.timestamp),
            notes: self.notes.clone(),
            is_valid: self.is_valid,
            quality_score: self.quality_score(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = measurements)]
pub struct NewMeasurement {
    pub session_id: i32,
    pub point_name: String,
    pub vpt_voltage: Option<f64>,
    pub temperature: Option<f64>,
    pub spo2: Option<i32>,
    pub timestamp: i64,
    pub notes: Option<String>,
    pub is_valid: bool,
    pub retry_count: i32,
}

impl NewMeasurement {
    /// Server-stamps the timestamp and runs the advisory range check.
    pub fn now(
        session_id: i32,
        point_name: &str,
        vpt_voltage: Option<f64>,
        temperature: Option<f64>,
        spo2: Option<i32>,
        notes: Option<String>,
    ) -> Self {
        Self {
            session_id,
            point_name: point_name.to_owned(),
            vpt_voltage,
            temperature,
            spo2,
            timestamp: ms_since_epoch(),
            notes,
            is_valid: readings_in_range(vpt_voltage, temperature, spo2),
            retry_count: 0,
        }
    }
}

/// True when every populated reading is inside its advisory range.
pub fn readings_in_range(
    vpt_voltage: Option<f64>,
    temperature: Option<f64>,
    spo2: Option<i32>,
) -> bool {
    vpt_voltage.map_or(true, |v| (VPT_RANGE_V.0..=VPT_RANGE_V.1).contains(&v))
        && temperature.map_or(true, |t| {
            (TEMPERATURE_RANGE_C.0..=TEMPERATURE_RANGE_C.1).contains(&t)
        })
        && spo2.map_or(true, |s| (SPO2_RANGE_PCT.0..=SPO2_RANGE_PCT.1).contains(&s))
}

/// Mean of the non-null VPT readings, classified. No VPT data stays Unknown.
pub fn pressure_from_measurements(measurements: &[Measurement]) -> PressureStatus {
    let vpts: Vec<f64> = measurements.iter().filter_map(|m| m.vpt_voltage).collect();
    if vpts.is_empty() {
        return PressureStatus::Unknown;
    }
    let mean = vpts.iter().sum::<f64>() / vpts.len() as f64;
    if mean < PRESSURE_LOW_BELOW_V {
        PressureStatus::Low
    } else if mean > PRESSURE_HIGH_ABOVE_V {
        PressureStatus::High
    } else {
        PressureStatus::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub percent: u32,
    pub missing_points: Vec<String>,
}

/// Fraction of the expected point set with at least one measurement,
/// floored to an integer percentage. Without an expected set, any
/// measurement at all counts as done.
pub fn session_progress(expected: &[String], measurements: &[Measurement]) -> SessionProgress {
    if expected.is_empty() {
        return SessionProgress {
            percent: if measurements.is_empty() { 0 } else { 100 },
            missing_points: Vec::new(),
        };
    }

    let measured: HashSet<&str> = measurements.iter().map(|m| m.point_name.as_str()).collect();
    let hit = expected
        .iter()
        .filter(|p| measured.contains(p.as_str()))
        .count();

    SessionProgress {
        percent: (hit * 100 / expected.len()) as u32,
        missing_points: expected
            .iter()
            .filter(|p| !measured.contains(p.as_str()))
            .cloned()
            .collect(),
    }
}

pub fn session_summary(session: &Session, measurements: &[Measurement]) -> ApiResult<SessionSummary> {
    let progress = session_progress(&session.expected_point_names(), measurements);
    Ok(SessionSummary {
        id: session.id,
        session_name: session.session_name.clone(),
        protocol: session.protocol.clone(),
        status: session.lifecycle()?,
        created_at: iso8601(session.created_at),
        completed_at: session.completed_at.map(iso8601),
        plantar_pressure_status: session.pressure(),
        notes: session.notes.clone(),
        measurement_count: measurements.len() as i64,
        progress: progress.percent,
        missing_points: progress.missing_points,
    })
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = api_keys)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ApiKey {
    pub id: i32,
    pub key_name: String,
    pub key_hash: String,
    pub is_active: bool,
    pub created_at: i64,
    pub last_used: Option<i64>,
    pub usage_count: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = api_keys)]
pub struct NewApiKey {
    pub key_name: String,
    pub key_hash: String,
    pub is_active: bool,
    pub created_at: i64,
    pub usage_count: i32,
}
