//! Credential handling: device API keys, user passwords, login tokens.

use std::collections::HashMap;

use actix_web::{web, HttpRequest};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::models::User;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const API_KEY_PARAM: &str = "api_key";
pub const TOKEN_COOKIE: &str = "remember_token";

/// One-way digest for API keys; only the hex digest is ever persisted.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// URL-safe login token, 43 chars of alphanumeric entropy.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect()
}

/// Device authentication: `X-API-Key` header or `api_key` query param,
/// verified by digest. Each successful verification bumps the key's
/// usage counter.
pub fn require_api_key(req: &HttpRequest, db: &mut Db) -> ApiResult<()> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            web::Query::<HashMap<String, String>>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.get(API_KEY_PARAM).cloned())
        })
        .ok_or_else(|| ApiError::Auth("API key is required".to_owned()))?;

    if !db.verify_api_key(&presented)? {
        return Err(ApiError::Auth("Invalid API key".to_owned()));
    }
    Ok(())
}

/// Dashboard authentication: bearer token or the login cookie, resolved
/// against the persisted token on the user row.
pub fn current_user(req: &HttpRequest, db: &mut Db) -> ApiResult<User> {
    let token = bearer_token(req)
        .or_else(|| req.cookie(TOKEN_COOKIE).map(|c| c.value().to_owned()))
        .ok_or_else(|| ApiError::Auth("login required".to_owned()))?;

    db.user_by_token(&token)?
        .ok_or_else(|| ApiError::Auth("login required".to_owned()))
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// Registration field rules carried over from the clinical intake form.
pub fn validate_registration(req: &common::req::RegisterRequest) -> ApiResult<()> {
    let mut errors = Vec::new();

    let username = req.username.trim();
    if !(3..=80).contains(&username.chars().count()) {
        errors.push("Username must be between 3 and 80 characters".to_owned());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        errors.push(
            "Username can only contain letters, numbers, underscores, dots, and hyphens"
                .to_owned(),
        );
    }

    validate_name_field(&mut errors, "First name", &req.first_name);
    validate_name_field(&mut errors, "Surname", &req.surname);

    if let Some(mi) = &req.middle_initial {
        let mi = mi.trim();
        if mi.chars().count() > 1 || !mi.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push("Middle initial must be a single letter".to_owned());
        }
    }

    if !(3..=100).contains(&req.hospital_name.trim().chars().count()) {
        errors.push("Hospital name must be between 3 and 100 characters".to_owned());
    }
    if !(1..=20).contains(&req.hospital_room_no.trim().chars().count()) {
        errors.push("Room number must be between 1 and 20 characters".to_owned());
    }

    validate_password_strength(&mut errors, &req.password);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors.join(" ")))
    }
}

/// Profile edits reuse the intake-form rules minus the credentials.
pub fn validate_profile(req: &common::req::UpdateProfileRequest) -> ApiResult<()> {
    let mut errors = Vec::new();

    validate_name_field(&mut errors, "First name", &req.first_name);
    validate_name_field(&mut errors, "Surname", &req.surname);

    if let Some(mi) = &req.middle_initial {
        let mi = mi.trim();
        if mi.chars().count() > 1 || !mi.chars().all(|c| c.is_ascii_alphabetic()) {
            errors.push("Middle initial must be a single letter".to_owned());
        }
    }

    if !(3..=100).contains(&req.hospital_name.trim().chars().count()) {
        errors.push("Hospital name must be between 3 and 100 characters".to_owned());
    }
    if !(1..=20).contains(&req.hospital_room_no.trim().chars().count()) {
        errors.push("Room number must be between 1 and 20 characters".to_owned());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors.join(" ")))
    }
}

fn validate_name_field(errors: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !(2..=50).contains(&value.chars().count()) {
        errors.push(format!("{label} must be between 2 and 50 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphabetic() || matches!(c, ' ' | '-' | '\''))
    {
        errors.push(format!(
            "{label} can only contain letters, spaces, hyphens, and apostrophes"
        ));
    }
}

pub fn validate_password_strength(errors: &mut Vec<String>, password: &str) {
    if !(8..=128).contains(&password.chars().count()) {
        errors.push("Password must be between 8 and 128 characters".to_owned());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_owned());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_owned());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_owned());
    }
    if !password
        .chars()
        .any(|c| "!@#$%^&*(),.?\":{}|<>".contains(c))
    {
        errors.push("Password must contain at least one special character".to_owned());
    }
    if matches!(
        password.to_lowercase().as_str(),
        "password" | "12345678" | "qwerty123" | "admin123"
    ) {
        errors.push("Password is too common. Please choose a more secure password".to_owned());
    }
}
