//! # Authentication
//!
//! Bearer-token verification for the analysis/preview relay endpoints.
//!
//! ## Token sources (checked in order):
//! 1. `Authorization: Bearer <token>` header (preferred)
//! 2. `?token=<token>` query parameter (for WebSocket connections where
//!    browsers can't set headers)
//!
//! ## Identity provider:
//! The hackathon demo ships a preset user table instead of a full identity
//! service. A token is simply the id of a preset user; anything else is
//! rejected with 401. The verified identity must match the `user_id` the
//! request body claims, otherwise the request is rejected with 403 — before
//! any upstream call is made.
//!
//! When `auth.require_auth` is false the relay runs open and every request is
//! attributed to the default demo user.

use crate::error::AppError;
use crate::state::AppState;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use tracing::{debug, warn};

/// The identity a request was verified as.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub name: String,
    pub department: String,
    pub role: String,
}

impl AuthUser {
    /// Reject the request when the body's `user_id` disagrees with the
    /// verified identity.
    pub fn ensure_matches(&self, claimed_user_id: &str) -> Result<(), AppError> {
        if self.user_id != claimed_user_id {
            warn!(
                verified = %self.user_id,
                claimed = %claimed_user_id,
                "user_id mismatch, rejecting request"
            );
            return Err(AppError::Forbidden(
                "user_id does not match authenticated user".to_string(),
            ));
        }
        Ok(())
    }
}

/// Preset demo users. Token == user id.
const DEMO_USERS: &[(&str, &str, &str, &str)] = &[
    ("1", "田中マネージャー", "engineering", "manager"),
    ("2", "佐藤エンジニア", "engineering", "member"),
    ("3", "鈴木営業", "sales", "member"),
    ("4", "HR山田", "hr", "admin"),
];

/// User every request is attributed to when authentication is disabled.
const DEFAULT_DEMO_USER_ID: &str = "2";

/// Look up a preset user by token.
fn lookup_demo_user(token: &str) -> Option<AuthUser> {
    DEMO_USERS
        .iter()
        .find(|(id, _, _, _)| *id == token)
        .map(|(id, name, department, role)| AuthUser {
            user_id: (*id).to_string(),
            name: (*name).to_string(),
            department: (*department).to_string(),
            role: (*role).to_string(),
        })
}

/// Extract the bearer token from the Authorization header or the `token`
/// query parameter.
fn extract_token(req: &HttpRequest) -> Result<String, AppError> {
    if let Some(auth_header) = req.headers().get("authorization") {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            debug!("Token extracted from Authorization header");
            return Ok(token.to_string());
        }
        return Err(AppError::Unauthorized(
            "Authorization header must use the Bearer scheme".to_string(),
        ));
    }

    // Query parameter fallback for WebSocket upgrades
    if let Some(query) = req.uri().query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "token" {
                debug!("Token extracted from query parameter");
                return Ok(value.to_string());
            }
        }
    }

    Err(AppError::Unauthorized(
        "Missing authentication token".to_string(),
    ))
}

/// Verify a token against the preset user table.
pub fn verify_token(token: &str) -> Result<AuthUser, AppError> {
    lookup_demo_user(token).ok_or_else(|| {
        warn!("Token verification failed: unknown token");
        AppError::Unauthorized("Invalid authentication token".to_string())
    })
}

/// Verify the request's credential, honoring the `require_auth` setting.
pub fn authenticate(req: &HttpRequest, state: &AppState) -> Result<AuthUser, AppError> {
    if !state.get_config().auth.require_auth {
        debug!("Authentication disabled, using default demo user");
        return Ok(lookup_demo_user(DEFAULT_DEMO_USER_ID)
            .expect("default demo user must exist in the preset table"));
    }

    let token = extract_token(req)?;
    verify_token(&token)
}

/// Extractor so handlers can take `user: AuthUser` directly.
///
/// Rejections map to 401 through `AppError`'s `ResponseError` impl, which
/// short-circuits the handler — unauthenticated requests never reach the
/// upstream-calling code.
impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<AppState>>() {
            Some(state) => authenticate(req, state),
            None => Err(AppError::Internal(
                "Application state not configured".to_string(),
            )),
        };
        ready(result)
    }
}
