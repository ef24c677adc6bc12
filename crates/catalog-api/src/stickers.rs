use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use catalog_db::queries::{NewSticker, StickerScope, StickerUpdate};
use catalog_db::{Database, STICKER_SORTS};
use catalog_types::api::{
    CreateStickerRequest, MessageResponse, TotalResponse, UpdateStickerRequest, normalize_name,
};
use catalog_types::models::Sticker;
use catalog_types::pagination::{PageQuery, Paginated};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{AdminUser, CurrentUser, Path, ValidJson, list_query};
use crate::state::AppState;
use crate::user_stickers::visible_to;

/// Referenced rows must exist before a sticker points at them.
fn check_references(
    db: &Database,
    attachment_id: Option<&str>,
    category_id: Option<&str>,
    subniche_id: Option<&str>,
) -> Result<(), ApiError> {
    if let Some(id) = attachment_id {
        if !db.attachment_exists(id)? {
            return Err(ApiError::not_found("Attachment"));
        }
    }
    if let Some(id) = category_id {
        if !db.category_exists(id)? {
            return Err(ApiError::not_found("Category"));
        }
    }
    if let Some(id) = subniche_id {
        if !db.subniche_exists(id)? {
            return Err(ApiError::not_found("Subniche"));
        }
    }
    Ok(())
}

async fn list_scoped(
    state: &AppState,
    viewer: String,
    params: PageQuery,
    scope: Scope,
) -> Result<Paginated<Sticker>, ApiError> {
    state
        .db(move |db| {
            let query = list_query(&params, STICKER_SORTS)?;
            let scope = match &scope {
                Scope::Curated => StickerScope::Curated,
                Scope::Category(id) => {
                    if !db.category_exists(id)? {
                        return Err(ApiError::not_found("Category"));
                    }
                    StickerScope::Category(id)
                }
                Scope::Subniche(id) => {
                    if !db.subniche_exists(id)? {
                        return Err(ApiError::not_found("Subniche"));
                    }
                    StickerScope::Subniche(id)
                }
            };
            let (stickers, total) = db.list_stickers(&query, scope, Some(&viewer))?;
            Ok(Paginated::new("stickers", query.page, total, stickers))
        })
        .await
}

/// Owned form of `StickerScope` that can cross into the blocking pool.
enum Scope {
    Curated,
    Category(String),
    Subniche(String),
}

pub async fn list_stickers(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Sticker>>, ApiError> {
    let page = list_scoped(&state, user.0.sub, params, Scope::Curated).await?;
    Ok(Json(page))
}

pub async fn stickers_by_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(category_id): Path<Uuid>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Sticker>>, ApiError> {
    let scope = Scope::Category(category_id.to_string());
    let page = list_scoped(&state, user.0.sub, params, scope).await?;
    Ok(Json(page))
}

pub async fn stickers_by_subniche(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(subniche_id): Path<Uuid>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Sticker>>, ApiError> {
    let scope = Scope::Subniche(subniche_id.to_string());
    let page = list_scoped(&state, user.0.sub, params, scope).await?;
    Ok(Json(page))
}

pub async fn total_stickers(
    State(state): State<AppState>,
) -> Result<Json<TotalResponse>, ApiError> {
    let total = state.db(|db| Ok(db.count_stickers()?)).await?;
    Ok(Json(TotalResponse { total }))
}

pub async fn create_sticker(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateStickerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sticker = state
        .db(move |db| {
            let new = NewSticker {
                name: normalize_name(req.name),
                attachment_id: req.attachment_id.to_string(),
                category_id: Some(req.category_id.to_string()),
                subniche_id: req.subniche_id.map(|id| id.to_string()),
                user_id: req.user_id.map(|id| id.to_string()),
                is_user_created: false,
                translations: req.translations.unwrap_or_default(),
            };
            check_references(
                db,
                Some(&new.attachment_id),
                new.category_id.as_deref(),
                new.subniche_id.as_deref(),
            )?;
            Ok(db.create_sticker(&new)?)
        })
        .await?;
    info!("Created sticker {}", sticker.id);
    Ok((StatusCode::CREATED, Json(sticker)))
}

pub async fn get_sticker(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(sticker_id): Path<Uuid>,
) -> Result<Json<Sticker>, ApiError> {
    let is_admin = user.is_admin();
    let viewer = user.0.sub;
    let sticker = state
        .db(move |db| {
            let sticker = db
                .get_sticker(&sticker_id.to_string(), Some(&viewer))?
                .ok_or_else(|| ApiError::not_found("Sticker"))?;
            if !is_admin && !visible_to(&sticker, &viewer) {
                return Err(ApiError::Forbidden("Access denied".into()));
            }
            Ok(sticker)
        })
        .await?;
    Ok(Json(sticker))
}

/// Partial update; `translations`, when present, replaces the whole set.
pub async fn update_sticker(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(sticker_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateStickerRequest>,
) -> Result<Json<Sticker>, ApiError> {
    let sticker = state
        .db(move |db| {
            let update = StickerUpdate {
                name: normalize_name(req.name),
                attachment_id: req.attachment_id.map(|id| id.to_string()),
                category_id: req.category_id.map(|id| id.to_string()),
                subniche_id: req.subniche_id.map(|id| id.to_string()),
                user_id: req.user_id.map(|id| id.to_string()),
                translations: req.translations,
            };
            check_references(
                db,
                update.attachment_id.as_deref(),
                update.category_id.as_deref(),
                update.subniche_id.as_deref(),
            )?;
            Ok(db.update_sticker(&sticker_id.to_string(), &update)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Sticker"))?;
    Ok(Json(sticker))
}

pub async fn delete_sticker(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(sticker_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state
        .db(move |db| Ok(db.delete_sticker(&sticker_id.to_string())?))
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Sticker"));
    }
    Ok(Json(MessageResponse::new("Sticker deleted successfully")))
}
