//! Device-facing ingestion gateway. Every endpoint authenticates against
//! the API-key store and server-stamps measurement timestamps.

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};

use common::req::{
    CompleteSessionRequest, CompleteSessionResponse, IngestRequest, IngestResponse,
    SensorDataEcho, SensorDataRequest, SensorDataResponse, UserSessionsResponse,
};

use crate::auth;
use crate::db::{self, SharedDb};
use crate::error::{ApiError, ApiResult};
use crate::models::session_summary;
use crate::utils::iso8601;

/// Per-user ingestion with explicit or implicit session resolution.
/// Unresolvable ids are the device's fault, hence 400 rather than 404.
#[post("/api/data")]
pub async fn receive_data(
    req: HttpRequest,
    body: web::Json<IngestRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    auth::require_api_key(&req, &mut db)?;

    let toe = body.toe.trim();
    if toe.is_empty() {
        return Err(ApiError::Validation("Missing required field: toe".to_owned()));
    }

    let (session, measurement) =
        db.ingest(body.user_id, body.session_id, toe, body.vpt, body.temp, body.spo2)?;

    Ok(HttpResponse::Created().json(IngestResponse {
        success: true,
        message: "Data received successfully".to_owned(),
        measurement_id: measurement.id,
        session_id: session.id,
        timestamp: iso8601(measurement.timestamp),
    }))
}

/// Combined-reading shape used by the older firmware: addressed by
/// username, all three readings required, numbers may arrive as strings.
#[post("/api/data-json-send")]
pub async fn receive_sensor_data(
    req: HttpRequest,
    body: web::Json<SensorDataRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    auth::require_api_key(&req, &mut db)?;

    let vpt = body
        .vpt
        .as_f64()
        .ok_or_else(|| ApiError::Validation("Invalid numeric value for vpt".to_owned()))?;
    let temperature = body
        .temp
        .as_f64()
        .ok_or_else(|| ApiError::Validation("Invalid numeric value for temp".to_owned()))?;
    let spo2 = body
        .spo2
        .as_i32()
        .ok_or_else(|| ApiError::Validation("Invalid numeric value for spo2".to_owned()))?;

    let toe = body.toe.trim();
    if toe.is_empty() {
        return Err(ApiError::Validation("Missing required field: toe".to_owned()));
    }

    let username = body.username.trim().to_lowercase();
    let (session, measurement) = db.ingest_by_username(&username, toe, vpt, temperature, spo2)?;

    Ok(HttpResponse::Ok().json(SensorDataResponse {
        success: true,
        message: "Sensor data received successfully".to_owned(),
        measurement_id: measurement.id,
        session_id: session.id,
        point_name: measurement.point_name.clone(),
        data: SensorDataEcho {
            vpt,
            temperature,
            spo2,
            timestamp: iso8601(measurement.timestamp),
        },
    }))
}

/// Device-initiated completion, e.g. when the operator ends a screening
/// from the instrument itself.
#[post("/api/session/complete")]
pub async fn complete_session(
    req: HttpRequest,
    body: web::Json<CompleteSessionRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    auth::require_api_key(&req, &mut db)?;

    let (session, rows) = db.complete_session(body.session_id, body.plantar_pressure_status)?;
    Ok(web::Json(CompleteSessionResponse {
        success: true,
        message: "Session completed successfully".to_owned(),
        session: session_summary(&session, &rows)?,
    }))
}

#[get("/api/users/{user_id}/sessions")]
pub async fn user_sessions(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    auth::require_api_key(&req, &mut db)?;

    let user = db
        .user_by_id(path.into_inner())?
        .ok_or_else(|| ApiError::NotFound("User not found".to_owned()))?;

    let sessions = db.sessions_for_user(user.id)?;
    let mut summaries = Vec::with_capacity(sessions.len());
    for session in &sessions {
        let rows = db.measurements_for_session(session.id)?;
        summaries.push(session_summary(session, &rows)?);
    }

    Ok(web::Json(UserSessionsResponse { sessions: summaries }))
}
