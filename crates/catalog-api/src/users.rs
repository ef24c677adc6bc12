use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use catalog_db::USER_SORTS;
use catalog_db::queries::{NewUser, UserUpdate};
use catalog_types::api::{
    CreateUserRequest, TokenKind, UpdateUserRequest, UserListQuery, UserStatusRequest,
};
use catalog_types::models::{Role, User, UserDetail};
use catalog_types::pagination::Paginated;
use tracing::info;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::error::ApiError;
use crate::extract::{AdminUser, CurrentUser, Path, ValidJson, list_query};
use crate::state::AppState;

pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<UserListQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    let role = params
        .role
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(str::parse::<Role>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let page = state
        .db(move |db| {
            let query = list_query(&params.page, USER_SORTS)?;
            let (users, total) = db.list_users(&query, role)?;
            Ok(Paginated::new("users", query.page, total, users))
        })
        .await?;
    Ok(Json(page))
}

/// Manual account creation by an admin.
pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateUserRequest>,
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
                role: req.role.unwrap_or(Role::User),
                is_manually_created: true,
                expiration_date: req.expiration_date,
            })?)
        })
        .await?;
    info!("Admin created user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<User>, ApiError> {
    let id = user.id().to_string();
    let user = state
        .db(move |db| Ok(db.get_user(&id)?))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .db(move |db| Ok(db.get_user(&user_id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

/// Everything attached to a user: orders with their relations, favorites
/// and the user's own stickers.
pub async fn get_user_detail(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserDetail>, ApiError> {
    let detail = state
        .db(move |db| Ok(db.get_user_detail(&user_id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(detail))
}

/// Admins may update anyone; other users only themselves, and never their role.
pub async fn update_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(user_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let user_id = user_id.to_string();
    if !caller.is_admin() {
        if caller.id() != user_id {
            return Err(ApiError::Forbidden("Forbidden".into()));
        }
        if req.role.is_some() {
            return Err(ApiError::Forbidden("Only admins can change roles".into()));
        }
    }

    let password_hash = req.password.as_deref().map(hash_password).transpose()?;
    let user = state
        .db(move |db| {
            if let Some(email) = &req.email {
                if db.email_taken(email, Some(&user_id))? {
                    return Err(ApiError::BadRequest("Email already taken".into()));
                }
            }
            let update = UserUpdate {
                name: req.name,
                email: req.email,
                password_hash,
                avatar_id: req.avatar_id.map(|id| id.to_string()),
                first_access: req.first_access,
                role: req.role,
            };
            Ok(db.update_user(&user_id, &update)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

pub async fn set_user_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
    ValidJson(req): ValidJson<UserStatusRequest>,
) -> Result<StatusCode, ApiError> {
    let status = req.status;
    let found = state
        .db(move |db| {
            let id = user_id.to_string();
            if !db.set_user_status(&id, status)? {
                return Ok(false);
            }
            if !status {
                db.delete_user_tokens(&id, TokenKind::Refresh)?;
            }
            Ok(true)
        })
        .await?;
    if !found {
        return Err(ApiError::not_found("User"));
    }
    info!("Set status of user {} to {}", user_id, status);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let keys = state
        .db(move |db| Ok(db.delete_user(&user_id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    state.delete_objects(&keys).await;
    info!("Deleted user {} and {} stored objects", user_id, keys.len());
    Ok(StatusCode::NO_CONTENT)
}
