//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sop_compliance_core::domain::{NewUser, Role, User};
use sop_compliance_core::PortError;
use sop_compliance_core::validation::{require_non_empty, validate_email, validate_new_password};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_error_response, HandlerError};
use crate::web::middleware::{session_id_from_cookies, SESSION_COOKIE};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// Either `company_name` (creates a company, the caller becomes its admin) or
/// `company_id` (joins an existing company as an employee) must be given.
#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    pub department: Option<String>,
    pub company_name: Option<String>,
    pub company_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub full_name: String,
    #[schema(value_type = String)]
    pub role: Role,
}

impl From<User> for AuthResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            company_id: user.company_id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Stores a fresh auth session and returns the `Set-Cookie` value for it.
async fn start_session(state: &AppState, user_id: Uuid) -> Result<String, HandlerError> {
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(state.config.session_ttl_days);

    state
        .db
        .create_auth_session(&auth_session_id, user_id, Utc::now() + ttl)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;

    Ok(format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        ttl.num_seconds()
    ))
}

fn hash_password(password: &str) -> Result<String, HandlerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
        })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Company not found"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Validate before touching the store
    validate_email(&req.email).map_err(|e| port_error_response(e.into()))?;
    validate_new_password(
        &req.password,
        &req.confirm_password,
        state.config.min_password_length,
    )
    .map_err(|e| port_error_response(e.into()))?;
    require_non_empty(&req.full_name, "full_name").map_err(|e| port_error_response(e.into()))?;

    // 2. The email must be free before a company is created for it
    match state.db.get_user_by_email(&req.email).await {
        Ok(_) => {
            return Err((
                StatusCode::CONFLICT,
                "An account with this email already exists".to_string(),
            ))
        }
        Err(PortError::NotFound(_)) => {}
        Err(e) => {
            error!("Failed to look up email: {:?}", e);
            return Err(port_error_response(e));
        }
    }
    let hashed_password = hash_password(&req.password)?;

    // 3. Resolve the tenant
    let (company_id, role) = match (req.company_name.as_deref(), req.company_id) {
        (Some(name), None) => {
            require_non_empty(name, "company_name").map_err(|e| port_error_response(e.into()))?;
            let company = state.db.create_company(name).await.map_err(port_error_response)?;
            info!("Company '{}' created", company.name);
            (company.id, Role::Admin)
        }
        (None, Some(company_id)) => {
            let company = state
                .db
                .get_company(company_id)
                .await
                .map_err(port_error_response)?;
            (company.id, Role::Employee)
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Provide either company_name or company_id".to_string(),
            ))
        }
    };

    // 4. Create the user
    let user = state
        .db
        .create_user(NewUser {
            company_id,
            email: req.email.trim().to_string(),
            full_name: req.full_name.trim().to_string(),
            department: req
                .department
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            role,
            hashed_password,
        })
        .await
        .map_err(|e| {
            error!("Failed to create user: {:?}", e);
            port_error_response(e)
        })?;

    // 5. Sign them in
    let cookie = start_session(&state, user.id).await?;
    info!("User {} signed up", user.id);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(user)),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    // 1. Get user by email
    let user_creds = state
        .db
        .get_user_by_email(&req.email)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();

    if !valid {
        return Err((StatusCode::UNAUTHORIZED, "Invalid email or password".to_string()));
    }

    // 3. Load the profile and start the session
    let user = state
        .db
        .get_user_by_id(user_creds.user_id)
        .await
        .map_err(port_error_response)?;
    let cookie = start_session(&state, user.id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(user)),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let auth_session_id = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_id_from_cookies)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}
