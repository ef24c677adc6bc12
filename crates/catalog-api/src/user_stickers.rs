use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use catalog_db::queries::{NewSticker, StickerScope, StickerUpdate};
use catalog_db::{Database, STICKER_SORTS};
use catalog_types::api::{
    CreateUserStickerRequest, MessageResponse, UpdateUserStickerRequest, normalize_name,
};
use catalog_types::models::Sticker;
use catalog_types::pagination::{PageQuery, Paginated};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{CurrentUser, Path, ValidJson, list_query};
use crate::state::AppState;

fn owned_by(sticker: &Sticker, user_id: &str) -> bool {
    sticker.is_user_created && sticker.user_id.as_deref() == Some(user_id)
}

/// Curated stickers are visible to everyone, user-created ones only to their owner.
pub(crate) fn visible_to(sticker: &Sticker, user_id: &str) -> bool {
    !sticker.is_user_created || owned_by(sticker, user_id)
}

/// Loads a sticker the caller is allowed to modify.
fn own_sticker(db: &Database, id: &str, user_id: &str) -> Result<Sticker, ApiError> {
    let sticker = db
        .get_sticker(id, Some(user_id))?
        .ok_or_else(|| ApiError::not_found("Sticker"))?;
    if !owned_by(&sticker, user_id) {
        return Err(ApiError::Forbidden(
            "You can only modify your own stickers".into(),
        ));
    }
    Ok(sticker)
}

pub async fn create_user_sticker(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidJson(req): ValidJson<CreateUserStickerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = user.0.sub;
    let sticker = state
        .db(move |db| {
            let attachment_id = req.attachment_id.to_string();
            if !db.attachment_exists(&attachment_id)? {
                return Err(ApiError::not_found("Attachment"));
            }
            Ok(db.create_sticker(&NewSticker {
                name: normalize_name(req.name),
                attachment_id,
                category_id: None,
                subniche_id: None,
                user_id: Some(owner),
                is_user_created: true,
                translations: req.translations.unwrap_or_default(),
            })?)
        })
        .await?;
    info!("User sticker {} created", sticker.id);
    Ok((StatusCode::CREATED, Json(sticker)))
}

/// The caller's own stickers, paged.
pub async fn my_stickers(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paginated<Sticker>>, ApiError> {
    let owner = user.0.sub;
    let page = state
        .db(move |db| {
            let query = list_query(&params, STICKER_SORTS)?;
            let (stickers, total) =
                db.list_stickers(&query, StickerScope::Owner(&owner), Some(&owner))?;
            Ok(Paginated::new("stickers", query.page, total, stickers))
        })
        .await?;
    Ok(Json(page))
}

/// Curated stickers are visible to everyone; user-created ones only to their owner.
pub async fn get_user_sticker(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(sticker_id): Path<Uuid>,
) -> Result<Json<Sticker>, ApiError> {
    let viewer = user.0.sub;
    let sticker = state
        .db(move |db| {
            let sticker = db
                .get_sticker(&sticker_id.to_string(), Some(&viewer))?
                .ok_or_else(|| ApiError::not_found("Sticker"))?;
            if !visible_to(&sticker, &viewer) {
                return Err(ApiError::Forbidden("Access denied".into()));
            }
            Ok(sticker)
        })
        .await?;
    Ok(Json(sticker))
}

pub async fn update_user_sticker(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(sticker_id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateUserStickerRequest>,
) -> Result<Json<Sticker>, ApiError> {
    let owner = user.0.sub;
    let sticker = state
        .db(move |db| {
            let id = sticker_id.to_string();
            own_sticker(db, &id, &owner)?;
            let update = StickerUpdate {
                name: normalize_name(req.name),
                translations: req.translations,
                ..Default::default()
            };
            db.update_sticker(&id, &update)?;
            db.get_sticker(&id, Some(&owner))?
                .ok_or_else(|| ApiError::not_found("Sticker"))
        })
        .await?;
    Ok(Json(sticker))
}

/// Removes the sticker and, when nothing else uses it, its attachment and
/// stored object.
pub async fn delete_user_sticker(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(sticker_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let owner = user.0.sub;
    let orphan = state
        .db(move |db| {
            let id = sticker_id.to_string();
            own_sticker(db, &id, &owner)?;
            Ok(db.delete_sticker_and_orphan(&id)?)
        })
        .await?;
    if let Some(key) = orphan {
        state.delete_objects(&[key]).await;
    }
    Ok(Json(MessageResponse::new("Sticker deleted successfully")))
}
