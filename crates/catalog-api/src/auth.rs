use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use catalog_db::queries::NewUser;
use catalog_types::api::{
    AuthResponse, AuthTokens, Claims, ForgotPasswordRequest, LoginRequest, RefreshTokenRequest,
    RegisterRequest, ResetPasswordRequest, TokenInfo, TokenKind, TokenQuery,
};
use catalog_types::models::Role;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{CurrentUser, ValidJson};
use crate::state::{AppState, AuthConfig};

// -- Passwords --

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Random alphanumeric password for accounts created on the user's behalf.
pub fn random_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// -- Tokens --

pub fn create_token(
    auth: &AuthConfig,
    user_id: &str,
    role: Role,
    kind: TokenKind,
) -> anyhow::Result<(String, DateTime<Utc>)> {
    let now = Utc::now();
    let expires = now + auth.ttl(kind);
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        kind,
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp() as usize,
        exp: expires.timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )?;
    Ok((token, expires))
}

/// Signature, expiry and kind must all check out.
pub fn decode_token(secret: &str, token: &str, kind: TokenKind) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::unauthenticated())?;
    if data.claims.kind != kind {
        return Err(ApiError::unauthenticated());
    }
    Ok(data.claims)
}

/// Issues a token of `kind` and records it so it can be revoked or consumed.
pub async fn issue_stored_token(
    state: &AppState,
    user_id: &str,
    role: Role,
    kind: TokenKind,
) -> Result<(String, DateTime<Utc>), ApiError> {
    let (token, expires) = create_token(&state.auth, user_id, role, kind)?;
    let stored = token.clone();
    let uid = user_id.to_string();
    state
        .db(move |db| Ok(db.store_token(&stored, &uid, kind, expires)?))
        .await?;
    Ok((token, expires))
}

pub async fn issue_auth_tokens(
    state: &AppState,
    user_id: &str,
    role: Role,
) -> Result<AuthTokens, ApiError> {
    let (access, access_expires) = create_token(&state.auth, user_id, role, TokenKind::Access)?;
    let (refresh, refresh_expires) =
        issue_stored_token(state, user_id, role, TokenKind::Refresh).await?;
    Ok(AuthTokens {
        access: TokenInfo {
            token: access,
            expires: access_expires,
        },
        refresh: TokenInfo {
            token: refresh,
            expires: refresh_expires,
        },
    })
}

/// Checks a stored single-use token and returns its claims. The stored
/// record must still exist and not be expired.
async fn consume_stored_token(
    state: &AppState,
    token: &str,
    kind: TokenKind,
) -> Result<Claims, ApiError> {
    let claims = decode_token(&state.auth.jwt_secret, token, kind)?;
    let raw = token.to_string();
    let sub = claims.sub.clone();
    let row = state
        .db(move |db| Ok(db.find_token(&raw, kind, &sub)?))
        .await?
        .ok_or_else(ApiError::unauthenticated)?;
    if row.expires <= Utc::now() {
        return Err(ApiError::unauthenticated());
    }
    let id = row.id;
    state.db(move |db| Ok(db.delete_token(&id)?)).await?;
    Ok(claims)
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password_hash = hash_password(&req.password)?;
    let user = state
        .db(move |db| {
            if db.email_taken(&req.email, None)? {
                return Err(ApiError::BadRequest("Email already taken".into()));
            }
            Ok(db.create_user(&NewUser {
                email: req.email,
                name: req.name,
                password_hash,
                role: Role::User,
                is_manually_created: false,
                expiration_date: None,
            })?)
        })
        .await?;

    info!("Registered user {}", user.id);
    let tokens = issue_auth_tokens(&state, &user.id, user.role).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.clone();
    let row = state
        .db(move |db| Ok(db.get_user_row_by_email(&email)?))
        .await?
        .filter(|row| verify_password(&req.password, &row.password))
        .ok_or_else(|| ApiError::Unauthorized("Incorrect email or password".into()))?;

    if !row.can_sign_in(Utc::now()) {
        warn!("Sign-in refused for inactive or expired user {}", row.id);
        return Err(ApiError::inactive());
    }

    let tokens = issue_auth_tokens(&state, &row.id, row.role).await?;
    Ok(Json(AuthResponse {
        user: row.into_user(),
        tokens,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshTokenRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .db(move |db| {
            let row = db
                .find_token_any_user(&req.refresh_token, TokenKind::Refresh)?
                .ok_or_else(|| ApiError::NotFound("Not found".into()))?;
            db.delete_token(&row.id)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotates the refresh token: the presented one is consumed, a fresh pair issued.
pub async fn refresh_tokens(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshTokenRequest>,
) -> Result<Json<AuthTokens>, ApiError> {
    let claims = consume_stored_token(&state, &req.refresh_token, TokenKind::Refresh).await?;
    let sub = claims.sub.clone();
    let row = state
        .db(move |db| Ok(db.get_user_row(&sub)?))
        .await?
        .ok_or_else(ApiError::unauthenticated)?;
    if !row.can_sign_in(Utc::now()) {
        warn!("Refresh refused for inactive or expired user {}", row.id);
        return Err(ApiError::inactive());
    }
    let tokens = issue_auth_tokens(&state, &row.id, row.role).await?;
    Ok(Json(tokens))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ForgotPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let email = req.email.clone();
    let row = state
        .db(move |db| Ok(db.get_user_row_by_email(&email)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("No users found with this email".into()))?;

    let (token, _) =
        issue_stored_token(&state, &row.id, row.role, TokenKind::ResetPassword).await?;
    state
        .mailer
        .send_reset_password(&row.email, &state.app_url, &token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let claims = consume_stored_token(&state, &query.token, TokenKind::ResetPassword)
        .await
        .map_err(|_| ApiError::Unauthorized("Password reset failed".into()))?;
    let password_hash = hash_password(&req.password)?;
    state
        .db(move |db| {
            if !db.set_user_password(&claims.sub, &password_hash)? {
                return Err(ApiError::Unauthorized("Password reset failed".into()));
            }
            db.delete_user_tokens(&claims.sub, TokenKind::ResetPassword)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_verification_email(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, ApiError> {
    let id = user.id().to_string();
    let row = state
        .db(move |db| Ok(db.get_user_row(&id)?))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let (token, _) = issue_stored_token(&state, &row.id, row.role, TokenKind::VerifyEmail).await?;
    state
        .mailer
        .send_verification(&row.email, &state.app_url, &token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, ApiError> {
    let claims = consume_stored_token(&state, &query.token, TokenKind::VerifyEmail)
        .await
        .map_err(|_| ApiError::Unauthorized("Email verification failed".into()))?;
    state
        .db(move |db| {
            db.delete_user_tokens(&claims.sub, TokenKind::VerifyEmail)?;
            if !db.mark_email_verified(&claims.sub)? {
                return Err(ApiError::Unauthorized("Email verification failed".into()));
            }
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
