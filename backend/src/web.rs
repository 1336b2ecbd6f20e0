//! Dashboard API and HTTP server wiring. Dashboard endpoints
//! authenticate by login token (cookie or bearer) and are scoped to the
//! logged-in user; foreign session ids read as not found.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use actix_cors::Cors;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{
    delete, get, http::header, post, put, web, App, HttpRequest, HttpResponse, HttpServer,
    Responder,
};
use chrono::Utc;

use common::req::{
    ChangePasswordRequest, CreateSessionRequest, CreateSessionResponse, DuplicateSessionResponse,
    LoginRequest, LoginResponse, OkResponse, RegisterRequest, SessionCompleteBody,
    SessionMeasurementsResponse, UpdateProfileRequest, UserSessionsResponse,
};

use crate::auth;
use crate::chart;
use crate::config::Config;
use crate::db::{self, SharedDb};
use crate::error::{ApiError, ApiResult};
use crate::models::{session_summary, NewSession, NewUser};
use crate::points::{self, Foot};
use crate::utils::{iso8601, ms_since_epoch};

const LOGIN_COOKIE_DAYS: i64 = 30;

#[get("/")]
async fn hello() -> impl Responder {
    HttpResponse::Ok().body("liwanag backend")
}

// ---------------------------------------------------------------------------
// accounts
// ---------------------------------------------------------------------------

#[post("/api/auth/register")]
async fn register(
    body: web::Json<RegisterRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    auth::validate_registration(&body)?;

    let mut db = db::lock(&shared)?;
    let user = db.insert_user(NewUser {
        username: body.username.trim().to_lowercase(),
        password_hash: auth::hash_password(&body.password)?,
        first_name: body.first_name.trim().to_owned(),
        surname: body.surname.trim().to_owned(),
        middle_initial: body
            .middle_initial
            .as_deref()
            .map(|mi| mi.trim().to_uppercase())
            .filter(|mi| !mi.is_empty()),
        hospital_name: body.hospital_name.trim().to_owned(),
        hospital_room_no: body.hospital_room_no.trim().to_owned(),
        created_at: ms_since_epoch(),
        is_active: true,
    })?;

    Ok(HttpResponse::Created().json(user.to_info()))
}

#[post("/api/auth/login")]
async fn login(
    body: web::Json<LoginRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;

    let user = db
        .user_by_username(&body.username.trim().to_lowercase())?
        .filter(|u| auth::verify_password(&body.password, &u.password_hash))
        .ok_or_else(|| ApiError::Auth("Invalid username or password.".to_owned()))?;

    let token = auth::generate_token();
    db.record_login(user.id, &token)?;

    let cookie = Cookie::build(auth::TOKEN_COOKIE, token.clone())
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::days(LOGIN_COOKIE_DAYS))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        token,
        user: user.to_info(),
    }))
}

#[post("/api/auth/logout")]
async fn logout(req: HttpRequest, shared: web::Data<SharedDb>) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;
    db.clear_token(user.id)?;

    let mut cookie = Cookie::build(auth::TOKEN_COOKIE, "").path("/").finish();
    cookie.make_removal();

    Ok(HttpResponse::Ok().cookie(cookie).json(OkResponse {
        success: true,
        message: "You have been logged out.".to_owned(),
    }))
}

#[get("/api/profile")]
async fn profile(req: HttpRequest, shared: web::Data<SharedDb>) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;
    Ok(web::Json(user.to_info()))
}

#[put("/api/profile")]
async fn update_profile(
    req: HttpRequest,
    body: web::Json<UpdateProfileRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    auth::validate_profile(&body)?;
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;
    let updated = db.update_profile(user.id, &body)?;
    Ok(web::Json(updated.to_info()))
}

#[post("/api/change-password")]
async fn change_password(
    req: HttpRequest,
    body: web::Json<ChangePasswordRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    if !auth::verify_password(&body.current_password, &user.password_hash) {
        return Err(ApiError::Validation("Current password is incorrect.".to_owned()));
    }
    let mut errors = Vec::new();
    auth::validate_password_strength(&mut errors, &body.new_password);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors.join(" ")));
    }

    db.update_password(user.id, &auth::hash_password(&body.new_password)?)?;
    Ok(web::Json(OkResponse {
        success: true,
        message: "Password changed successfully!".to_owned(),
    }))
}

// ---------------------------------------------------------------------------
// charts and snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct ChartQuery {
    days: Option<i64>,
}

#[get("/api/chart-data")]
async fn chart_data(
    req: HttpRequest,
    query: web::Query<ChartQuery>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let now = Utc::now();
    let days = query.days.unwrap_or(7).max(0);
    let to = now.timestamp_millis();
    let from = to - days * 24 * 3600 * 1000;

    let rows = db.measurements_for_user_in_window(user.id, from, to)?;
    Ok(web::Json(chart::aggregate(&rows, now)))
}

#[derive(Debug, serde::Deserialize)]
struct TimelineQuery {
    days: Option<i64>,
    point: Option<String>,
}

#[get("/api/measurement-timeline")]
async fn measurement_timeline(
    req: HttpRequest,
    query: web::Query<TimelineQuery>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let days = query.days.unwrap_or(7).max(0);
    let to = Utc::now().timestamp_millis();
    let from = to - days * 24 * 3600 * 1000;

    let rows = db.measurements_for_user_in_window(user.id, from, to)?;
    Ok(web::Json(chart::measurement_timeline(
        &rows,
        query.point.as_deref(),
    )))
}

#[get("/api/current-vpt-readings")]
async fn current_vpt_readings(
    req: HttpRequest,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;
    let rows = db.measurements_for_user(user.id)?;
    Ok(web::Json(chart::current_vpt_readings(&rows)))
}

#[get("/api/current-vitals-readings")]
async fn current_vitals_readings(
    req: HttpRequest,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;
    let rows = db.measurements_for_user(user.id)?;
    Ok(web::Json(chart::current_vitals_readings(&rows)))
}

// ---------------------------------------------------------------------------
// sessions
// ---------------------------------------------------------------------------

/// Static reference data: the canonical point names grouped by foot,
/// in the order the capture UI walks them.
#[get("/api/measurement-points")]
async fn measurement_points() -> impl Responder {
    let grouped: BTreeMap<&str, Vec<String>> = Foot::BOTH
        .iter()
        .map(|foot| (foot.as_str(), points::foot_point_names(*foot)))
        .collect();
    web::Json(grouped)
}

#[get("/api/sessions")]
async fn list_sessions(req: HttpRequest, shared: web::Data<SharedDb>) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let sessions = db.sessions_for_user(user.id)?;
    let mut summaries = Vec::with_capacity(sessions.len());
    for session in &sessions {
        let rows = db.measurements_for_session(session.id)?;
        summaries.push(session_summary(session, &rows)?);
    }
    Ok(web::Json(UserSessionsResponse { sessions: summaries }))
}

#[post("/api/sessions/create")]
async fn create_session(
    req: HttpRequest,
    body: web::Json<CreateSessionRequest>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let name = body.session_name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Session name is required".to_owned()));
    }

    // an explicit point list wins; otherwise the protocol's template applies
    let expected = body
        .expected_points
        .clone()
        .or_else(|| body.protocol.as_deref().and_then(points::protocol_points));

    let session = db.create_session(NewSession::now(
        user.id,
        name.to_owned(),
        body.protocol.clone(),
        body.notes.clone(),
        expected.as_deref(),
    ))?;

    Ok(web::Json(CreateSessionResponse {
        success: true,
        message: "Session created successfully".to_owned(),
        session_id: session.id,
    }))
}

#[delete("/api/sessions/{id}")]
async fn delete_session(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    db.delete_session(session.id)?;
    Ok(web::Json(OkResponse {
        success: true,
        message: "Session deleted successfully".to_owned(),
    }))
}

#[post("/api/sessions/{id}/pause")]
async fn pause_session(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    db.pause_session(session.id)?;
    Ok(web::Json(OkResponse {
        success: true,
        message: "Session paused successfully".to_owned(),
    }))
}

#[post("/api/sessions/{id}/resume")]
async fn resume_session(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    db.resume_session(session.id)?;
    Ok(web::Json(OkResponse {
        success: true,
        message: "Session resumed successfully".to_owned(),
    }))
}

#[post("/api/sessions/{id}/cancel")]
async fn cancel_session(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    db.cancel_session(session.id)?;
    Ok(web::Json(OkResponse {
        success: true,
        message: "Session cancelled successfully".to_owned(),
    }))
}

#[post("/api/sessions/{id}/complete")]
async fn complete_session(
    req: HttpRequest,
    path: web::Path<i32>,
    body: Option<web::Json<SessionCompleteBody>>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    let explicit = body.and_then(|b| b.plantar_pressure_status);
    db.complete_session(session.id, explicit)?;
    Ok(web::Json(OkResponse {
        success: true,
        message: "Session completed successfully".to_owned(),
    }))
}

#[post("/api/sessions/{id}/duplicate")]
async fn duplicate_session(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    let copy = db.duplicate_session(&session)?;
    Ok(web::Json(DuplicateSessionResponse {
        success: true,
        message: "Session duplicated successfully".to_owned(),
        new_session_id: copy.id,
    }))
}

#[get("/api/sessions/{id}/export")]
async fn export_session(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    let rows = db.measurements_for_session(session.id)?;

    let mut csv = String::from("Timestamp,Point Name,VPT Voltage,Temperature,SpO2\n");
    for m in &rows {
        let _ = writeln!(
            csv,
            "{},{},{},{},{}",
            iso8601(m.timestamp),
            m.point_name,
            csv_field(m.vpt_voltage),
            csv_field(m.temperature),
            csv_field(m.spo2),
        );
    }

    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=session_{}_data.csv", session.id),
        ))
        .body(csv))
}

/// Nulls export as empty fields, not a printed placeholder.
fn csv_field<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[get("/api/sessions/{id}/measurements")]
async fn session_measurements(
    req: HttpRequest,
    path: web::Path<i32>,
    shared: web::Data<SharedDb>,
) -> ApiResult<impl Responder> {
    let mut db = db::lock(&shared)?;
    let user = auth::current_user(&req, &mut db)?;

    let session = db.session_for_user(path.into_inner(), user.id)?;
    let rows = db.measurements_for_session(session.id)?;
    let records: Vec<_> = rows.iter().map(|m| m.to_record()).collect();

    Ok(web::Json(SessionMeasurementsResponse {
        success: true,
        session_id: session.id,
        count: records.len(),
        measurements: records,
    }))
}

// ---------------------------------------------------------------------------
// wiring
// ---------------------------------------------------------------------------

/// Route registry shared by the server and the integration tests.
pub fn services(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::Validation(format!("invalid request body: {err}")).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::Validation(format!("invalid query string: {err}")).into()
    }))
    .service(hello)
    // device API
    .service(crate::api::receive_data)
    .service(crate::api::receive_sensor_data)
    .service(crate::api::complete_session)
    .service(crate::api::user_sessions)
    // accounts
    .service(register)
    .service(login)
    .service(logout)
    .service(profile)
    .service(update_profile)
    .service(change_password)
    // charts
    .service(chart_data)
    .service(measurement_timeline)
    .service(current_vpt_readings)
    .service(current_vitals_readings)
    // sessions
    .service(measurement_points)
    .service(list_sessions)
    .service(create_session)
    .service(delete_session)
    .service(pause_session)
    .service(resume_session)
    .service(cancel_session)
    .service(complete_session)
    .service(duplicate_session)
    .service(export_session)
    .service(session_measurements);
}

pub async fn new_http_server(db: SharedDb, config: Config) -> std::io::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let cors_origin = config.cors_origin.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(db.clone()))
            .configure(services)
            .wrap(
                Cors::default()
                    .allowed_origin(&cors_origin)
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .allowed_header("x-api-key")
                    .supports_credentials()
                    .max_age(3600),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
