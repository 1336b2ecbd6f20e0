use std::collections::BTreeMap;
use std::fmt;

/// Session lifecycle state as stored and served over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "paused" => Some(SessionStatus::Paused),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plantar-pressure classification derived at session completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PressureStatus {
    Low,
    Normal,
    High,
    Unknown,
}

impl PressureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureStatus::Low => "Low",
            PressureStatus::Normal => "Normal",
            PressureStatus::High => "High",
            PressureStatus::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Low" => Some(PressureStatus::Low),
            "Normal" => Some(PressureStatus::Normal),
            "High" => Some(PressureStatus::High),
            "Unknown" => Some(PressureStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for PressureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reading field that device firmware may send either as a JSON number
/// or as a numeric string ("5.2"). Anything else fails deserialization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Number(f64),
    Text(String),
}

impl NumericField {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumericField::Number(v) => Some(*v),
            NumericField::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Integer reading. A fractional number truncates; a fractional
    /// string does not parse.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            NumericField::Number(v) => Some(*v as i32),
            NumericField::Text(s) => s.trim().parse().ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Device API
// ---------------------------------------------------------------------------

/// `POST /api/data` body, per-user ingestion with explicit or implicit
/// session resolution.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IngestRequest {
    pub user_id: i32,
    pub session_id: Option<i32>,
    pub vpt: Option<f64>,
    pub temp: Option<f64>,
    pub spo2: Option<i32>,
    pub toe: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    pub measurement_id: i32,
    pub session_id: i32,
    pub timestamp: String,
}

/// `POST /api/data-json-send` body, combined reading addressed by
/// username, every field required.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SensorDataRequest {
    pub username: String,
    pub vpt: NumericField,
    pub temp: NumericField,
    pub spo2: NumericField,
    pub toe: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SensorDataEcho {
    pub vpt: f64,
    pub temperature: f64,
    pub spo2: i32,
    pub timestamp: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SensorDataResponse {
    pub success: bool,
    pub message: String,
    pub measurement_id: i32,
    pub session_id: i32,
    pub point_name: String,
    pub data: SensorDataEcho,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CompleteSessionRequest {
    pub session_id: i32,
    pub plantar_pressure_status: Option<PressureStatus>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CompleteSessionResponse {
    pub success: bool,
    pub message: String,
    pub session: SessionSummary,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionSummary {
    pub id: i32,
    pub session_name: String,
    pub protocol: Option<String>,
    pub status: SessionStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub plantar_pressure_status: PressureStatus,
    pub notes: Option<String>,
    pub measurement_count: i64,
    pub progress: u32,
    pub missing_points: Vec<String>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct UserSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CreateSessionRequest {
    #[serde(alias = "sessionName")]
    pub session_name: String,
    pub protocol: Option<String>,
    pub notes: Option<String>,
    pub expected_points: Option<Vec<String>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CreateSessionResponse {
    pub success: bool,
    pub message: String,
    pub session_id: i32,
}

/// Optional body for the dashboard complete call.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionCompleteBody {
    pub plantar_pressure_status: Option<PressureStatus>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct DuplicateSessionResponse {
    pub success: bool,
    pub message: String,
    pub new_session_id: i32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MeasurementRecord {
    pub id: i32,
    pub session_id: i32,
    pub point_name: String,
    pub vpt_voltage: Option<f64>,
    pub temperature: Option<f64>,
    pub spo2: Option<i32>,
    pub timestamp: String,
    pub notes: Option<String>,
    pub is_valid: bool,
    pub quality_score: f64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct SessionMeasurementsResponse {
    pub success: bool,
    pub session_id: i32,
    pub measurements: Vec<MeasurementRecord>,
    pub count: usize,
}

/// Generic success acknowledgement.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct OkResponse {
    pub success: bool,
    pub message: String,
}

/// Uniform error body for every non-2xx response.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Charts and snapshots
// ---------------------------------------------------------------------------

/// One VPT series per canonical slot, parallel to `labels`. `None` marks
/// a bucket with no reading for that slot.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FootSeries {
    pub labels: Vec<String>,
    pub heel: Vec<Option<f64>>,
    pub instep: Vec<Option<f64>>,
    pub fifth_mt: Vec<Option<f64>>,
    pub third_mt: Vec<Option<f64>>,
    pub first_mt: Vec<Option<f64>>,
    pub big_toe: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VitalsSeries {
    pub labels: Vec<String>,
    pub temperature: Vec<Option<f64>>,
    pub spo2: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub right_foot: FootSeries,
    pub left_foot: FootSeries,
    pub vitals: VitalsSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VptStatus {
    Normal,
    Elevated,
    High,
    #[serde(rename = "No Data")]
    NoData,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VptReading {
    pub value: f64,
    pub status: VptStatus,
    pub time: String,
}

/// Keyed by snapshot slot name (`heel`, `instep`, `5th_mt`, ...).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VptSnapshot {
    pub right: BTreeMap<String, VptReading>,
    pub left: BTreeMap<String, VptReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VitalsStatus {
    Normal,
    #[serde(rename = "Temp Abnormal")]
    TempAbnormal,
    #[serde(rename = "SpO2 Abnormal")]
    Spo2Abnormal,
    #[serde(rename = "Both Abnormal")]
    BothAbnormal,
    #[serde(rename = "No Data")]
    NoData,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VitalsReading {
    pub temperature: f64,
    pub spo2: i32,
    pub status: VitalsStatus,
    pub time: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VitalsSnapshot {
    pub right: BTreeMap<String, VitalsReading>,
    pub left: BTreeMap<String, VitalsReading>,
}

/// Raw per-point timeline, parallel vectors per point name.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimelineSeries {
    pub timestamps: Vec<String>,
    pub vpt_values: Vec<Option<f64>>,
    pub temp_values: Vec<Option<f64>>,
    pub spo2_values: Vec<Option<i32>>,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserInfo {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub hospital_name: String,
    pub hospital_room_no: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub surname: String,
    pub middle_initial: Option<String>,
    pub hospital_name: String,
    pub hospital_room_no: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: String,
    pub surname: String,
    pub middle_initial: Option<String>,
    pub hospital_name: String,
    pub hospital_room_no: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}
