use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use catalog_db::CATALOG_SORTS;
use catalog_types::api::{
    CreateCategoryRequest, DisplayOrderRequest, ImportanceRequest, MessageResponse, TotalResponse,
    UpdateCategoryRequest,
};
use catalog_types::models::Category;
use catalog_types::pagination::{PageQuery, Paginated};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{AdminUser, Path, ValidJson, list_query};
use crate::state::AppState;

pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Category>>, ApiError> {
    let page = state
        .db(move |db| {
            let query = list_query(&params, CATALOG_SORTS)?;
            let (categories, total) = db.list_categories(&query)?;
            Ok(Paginated::new("categories", query.page, total, categories))
        })
        .await?;
    Ok(Json(page))
}

pub async fn total_categories(
    State(state): State<AppState>,
) -> Result<Json<TotalResponse>, ApiError> {
    let total = state.db(|db| Ok(db.count_categories()?)).await?;
    Ok(Json(TotalResponse { total }))
}

pub async fn important_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = state.db(|db| Ok(db.important_categories()?)).await?;
    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .db(move |db| {
            let attachment_id = req.attachment_id.map(|id| id.to_string());
            Ok(db.create_category(req.name.trim(), attachment_id.as_deref())?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .db(move |db| Ok(db.get_category(&category_id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;
    Ok(Json(category))
}

pub async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(category_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .db(move |db| {
            let attachment_id = req.attachment_id.map(|id| id.to_string());
            Ok(db.update_category(
                &category_id.to_string(),
                req.name.as_deref().map(str::trim),
                attachment_id.as_deref(),
            )?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(category_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state
        .db(move |db| Ok(db.delete_category(&category_id.to_string())?))
        .await?;
    if !deleted {
        return Err(ApiError::not_found("Category"));
    }
    Ok(Json(MessageResponse::new("Category deleted successfully")))
}

async fn set_importance(state: &AppState, id: Uuid, important: bool) -> Result<Category, ApiError> {
    state
        .db(move |db| {
            let id = id.to_string();
            if !db.set_category_importance(&id, important)? {
                return Ok(None);
            }
            Ok(db.get_category(&id)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))
}

pub async fn mark_important(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<ImportanceRequest>,
) -> Result<Json<Category>, ApiError> {
    set_importance(&state, req.id, true).await.map(Json)
}

pub async fn remove_important(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<ImportanceRequest>,
) -> Result<Json<Category>, ApiError> {
    set_importance(&state, req.id, false).await.map(Json)
}

pub async fn set_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<DisplayOrderRequest>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .db(move |db| {
            let id = req.id.to_string();
            if !db.set_category_order(&id, req.display_order)? {
                return Ok(None);
            }
            Ok(db.get_category(&id)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;
    Ok(Json(category))
}
