use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::{info, warn};

use quill_auth::password::{hash_password, verify_password};
use quill_auth::token::{Claims, TokenIssuer};
use quill_db::Database;
use quill_db::comments::Comments;
use quill_db::posts::Posts;
use quill_db::records::UserRecord;
use quill_db::users::Users;
use quill_types::api::{AccountView, AuthResponse, LoginRequest, RegisterRequest};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub users: Users,
    pub posts: Posts,
    pub comments: Comments,
    pub tokens: TokenIssuer,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, tokens: TokenIssuer) -> Self {
        Self {
            users: Users::new(db.clone()),
            posts: Posts::new(db.clone()),
            comments: Comments::new(db),
            tokens,
        }
    }
}

pub(crate) fn account_view(user: &UserRecord) -> AccountView {
    AccountView {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        profile_image: user.profile_image.clone(),
        created_at: user.created_at,
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = tokio::task::spawn_blocking(move || register_account(&state, req))
        .await
        .map_err(ApiError::from_join)??;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = tokio::task::spawn_blocking(move || login_account(&state, req))
        .await
        .map_err(ApiError::from_join)??;
    Ok(Json(resp))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let view = tokio::task::spawn_blocking(move || {
        let user = state
            .users
            .store
            .get_by_id(claims.sub)?
            .ok_or(ApiError::NotFound {
                kind: "account",
                id: claims.sub,
            })?;
        Ok::<_, ApiError>(account_view(&user))
    })
    .await
    .map_err(ApiError::from_join)??;
    Ok(Json(view))
}

fn validate_register(req: &RegisterRequest) -> Result<(), ApiError> {
    if req.username.len() < 3 || req.username.len() > 50 {
        return Err(ApiError::BadRequest(
            "username must be 3-50 characters".into(),
        ));
    }
    if !req.email.contains('@') || req.email.len() > 100 {
        return Err(ApiError::BadRequest("email is not valid".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }
    if req.display_name.is_empty() || req.display_name.len() > 100 {
        return Err(ApiError::BadRequest(
            "display name must be 1-100 characters".into(),
        ));
    }
    Ok(())
}

/// Username is checked before email; the first taken one wins.
pub(crate) fn register_account(
    state: &AppStateInner,
    req: RegisterRequest,
) -> Result<AuthResponse, ApiError> {
    validate_register(&req)?;

    if state.users.username_exists(&req.username)? {
        return Err(ApiError::DuplicateUsername);
    }
    if state.users.email_exists(&req.email)? {
        return Err(ApiError::DuplicateEmail);
    }

    let password_hash = hash_password(&req.password)?;

    let user = state.users.store.add(UserRecord {
        id: 0,
        username: req.username,
        email: req.email,
        password_hash,
        display_name: req.display_name,
        profile_image: None,
        created_at: Utc::now(),
    })?;

    info!("new account registered: {}", user.username);

    let issued = state
        .tokens
        .issue(user.id, &user.username, &user.email)
        .map_err(|err| ApiError::Internal(err.into()))?;

    Ok(AuthResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: account_view(&user),
    })
}

/// Unknown username and wrong password are indistinguishable to the caller.
pub(crate) fn login_account(
    state: &AppStateInner,
    req: LoginRequest,
) -> Result<AuthResponse, ApiError> {
    let user = state
        .users
        .get_by_username(&req.username)?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&req.password, &user.password_hash)? {
        warn!("failed login attempt for {}", req.username);
        return Err(ApiError::InvalidCredentials);
    }

    let issued = state
        .tokens
        .issue(user.id, &user.username, &user.email)
        .map_err(|err| ApiError::Internal(err.into()))?;

    Ok(AuthResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: account_view(&user),
    })
}
