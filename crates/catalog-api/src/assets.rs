//! Fonts, icons and tutorials. One set of handlers serves all three; the
//! router fixes the kind per mount.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use catalog_db::CATALOG_SORTS;
use catalog_db::queries::{AssetUpdate, NewAsset};
use catalog_types::api::{
    CreateAssetRequest, DisplayOrderRequest, ImportanceRequest, MessageResponse, TotalResponse,
    UpdateAssetRequest,
};
use catalog_types::models::{Asset, AssetKind};
use catalog_types::pagination::{PageQuery, Paginated};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{AdminUser, Path, ValidJson, list_query};
use crate::state::AppState;

pub async fn list_assets(
    kind: AssetKind,
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Asset>>, ApiError> {
    let page = state
        .db(move |db| {
            let query = list_query(&params, CATALOG_SORTS)?;
            let (assets, total) = db.list_assets(kind, &query)?;
            Ok(Paginated::new(kind.plural(), query.page, total, assets))
        })
        .await?;
    Ok(Json(page))
}

pub async fn total_assets(
    kind: AssetKind,
    State(state): State<AppState>,
) -> Result<Json<TotalResponse>, ApiError> {
    let total = state.db(move |db| Ok(db.count_assets(kind)?)).await?;
    Ok(Json(TotalResponse { total }))
}

pub async fn important_assets(
    kind: AssetKind,
    State(state): State<AppState>,
) -> Result<Json<Vec<Asset>>, ApiError> {
    let assets = state.db(move |db| Ok(db.important_assets(kind)?)).await?;
    Ok(Json(assets))
}

pub async fn create_asset(
    kind: AssetKind,
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<CreateAssetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let asset = state
        .db(move |db| {
            Ok(db.create_asset(
                kind,
                &NewAsset {
                    name: req.name.trim().to_string(),
                    attachment_id: req.attachment_id.map(|id| id.to_string()),
                    youtube_link: req.youtube_link,
                },
            )?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

pub async fn get_asset(
    kind: AssetKind,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Asset>, ApiError> {
    let asset = state
        .db(move |db| Ok(db.get_asset(kind, &id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::not_found(kind.label()))?;
    Ok(Json(asset))
}

pub async fn update_asset(
    kind: AssetKind,
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateAssetRequest>,
) -> Result<Json<Asset>, ApiError> {
    let asset = state
        .db(move |db| {
            let update = AssetUpdate {
                name: req.name.map(|n| n.trim().to_string()),
                attachment_id: req.attachment_id.map(|id| id.to_string()),
                youtube_link: req.youtube_link,
            };
            Ok(db.update_asset(kind, &id.to_string(), &update)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found(kind.label()))?;
    Ok(Json(asset))
}

pub async fn delete_asset(
    kind: AssetKind,
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = state
        .db(move |db| Ok(db.delete_asset(kind, &id.to_string())?))
        .await?;
    if !deleted {
        return Err(ApiError::not_found(kind.label()));
    }
    Ok(Json(MessageResponse::new(format!(
        "{} deleted successfully",
        kind.label()
    ))))
}

async fn set_importance(
    kind: AssetKind,
    state: &AppState,
    id: Uuid,
    important: bool,
) -> Result<Asset, ApiError> {
    state
        .db(move |db| {
            let id = id.to_string();
            if !db.set_asset_importance(kind, &id, important)? {
                return Ok(None);
            }
            Ok(db.get_asset(kind, &id)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found(kind.label()))
}

/// Marks as important and clears any previous display order.
pub async fn mark_important(
    kind: AssetKind,
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<ImportanceRequest>,
) -> Result<Json<Asset>, ApiError> {
    set_importance(kind, &state, req.id, true).await.map(Json)
}

pub async fn remove_important(
    kind: AssetKind,
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<ImportanceRequest>,
) -> Result<Json<Asset>, ApiError> {
    set_importance(kind, &state, req.id, false).await.map(Json)
}

pub async fn set_order(
    kind: AssetKind,
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(req): ValidJson<DisplayOrderRequest>,
) -> Result<Json<Asset>, ApiError> {
    let asset = state
        .db(move |db| {
            let id = req.id.to_string();
            if !db.set_asset_order(kind, &id, req.display_order)? {
                return Ok(None);
            }
            Ok(db.get_asset(kind, &id)?)
        })
        .await?
        .ok_or_else(|| ApiError::not_found(kind.label()))?;
    Ok(Json(asset))
}
