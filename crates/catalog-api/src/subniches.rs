use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use catalog_db::CATALOG_SORTS;
use catalog_types::api::{
    CreateSubnicheRequest, DisplayOrderRequest, ImportanceRequest, MessageResponse, TotalResponse,
    UpdateSubnicheRequest,
};
use catalog_types::models::Subniche;
use catalog_types::pagination::{PageQuery, Paginated};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{AdminUser, Path, ValidJson, list_query};
use crate::state::AppState;

pub async fn list_subniches(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Subniche>>, ApiError> {
    let page = state
        .db(move |db| {
            let query = list_query(&params, CATALOG_SORTS)?;
            let (subniches, total) = db.list_subniches(&query, None)?;
            Ok(Paginated::new("subniches", query.page, total, subniches))
        })
        .await?;
    Ok(Json(page))
}

pub async fn subniches_by_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Subniche>>, ApiError> {
    let page = state
        .db(move |db| {
            let query = list_query(&params, CATALOG_SORTS)?;
            let category_id = category_id.to_string();
            if !db.category_exists(&category_id)? {
                return Err(ApiError::not_found("Category"));
            }
            let (subniches, total) = db.list_subniches(&query, Some(&category_id))?;
            Ok(Paginated::new("subniches", query.page, total, subniches))
        })
        .await?;
    Ok(Json(page))
}

pub async fn total_subniches(
    State(state): State<AppState>,
) -> Result<Json<TotalResponse>, ApiError> {
    let total = state.db(|db| Ok(db.count_subniches()?)).await?;
    Ok(Json(TotalResponse { total }))
}

pub async fn important_subniches(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subniche>>, ApiError> {
    let subniches = state.db(|db| Ok(db.important_subniches()?)).await?;
    Ok(Json(subniches))
}

pub async fn create_subniche(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateSubnicheRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subniche = state
        .db(move |db| {
            let category_id = req.category_id.to_string();
            if !db.category_exists(&category_id)? {
                return Err(ApiError::not_found("Category"));
            }
            let attachment_id = req.attachment_id.map(|id| id.to_string());
            Ok(db.create_subniche(req.name.trim(), &category_id, attachment_id.as_deref())?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(subniche)))
}

pub async fn get_subniche(
    State(state): State<AppState>,
    Path(subniche_id): Path<Uuid>,
) -> Result<Json<Subniche>, ApiError> {
    let subniche = state
        .db(move |db| Ok(db.get_subniche(&subniche_id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found("Subniche"))?;
    Ok(Json(subniche))
}

pub async fn update_subniche(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(subniche_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateSubnicheRequest>,
) -> Result<Json<Subniche>, ApiError> {
    let subniche = state
        .db(move |db| {
            let category_id = req.category_id.map(|id| id.to_string());
            if let Some(category_id) = &category_id {
                if !db.category_exists(category_id)? {
                    return Err(ApiError::not_found("Category"));
                }
            }
            let attachment_id = req.attachment_id.map(|id| id.to_string());
            Ok(db.update_subniche(
                &subniche_id.to_string(),
                req.name.as_deref().map(str::trim),
                category_id.as_deref(),
                attachment_id.as_deref(),
            )?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Subniche"))?;
    Ok(Json(subniche))
}

pub async fn delete_subniche(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(subniche_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state
        .db(move |db| Ok(db.delete_subniche(&subniche_id.to_string())?))
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Subniche"));
    }
    Ok(Json(MessageResponse::new("Subniche deleted successfully")))
}

async fn set_importance(state: &AppState, id: Uuid, important: bool) -> Result<Subniche, ApiError> {
    state
        .db(move |db| {
            let id = id.to_string();
            if !db.set_subniche_importance(&id, important)? {
                return Ok(None);
            }
            Ok(db.get_subniche(&id)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Subniche"))
}

pub async fn mark_important(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<ImportanceRequest>,
) -> Result<Json<Subniche>, ApiError> {
    set_importance(&state, req.id, true).await.map(Json)
}

pub async fn remove_important(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<ImportanceRequest>,
) -> Result<Json<Subniche>, ApiError> {
    set_importance(&state, req.id, false).await.map(Json)
}

pub async fn set_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<DisplayOrderRequest>,
) -> Result<Json<Subniche>, ApiError> {
    let subniche = state
        .db(move |db| {
            let id = req.id.to_string();
            if !db.set_subniche_order(&id, req.display_order)? {
                return Ok(None);
            }
            Ok(db.get_subniche(&id)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Subniche"))?;
    Ok(Json(subniche))
}
