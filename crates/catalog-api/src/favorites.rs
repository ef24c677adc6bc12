use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use catalog_types::api::{FavoriteRequest, MessageResponse};
use catalog_types::models::FavoriteSticker;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{CurrentUser, Path, ValidJson};
use crate::state::AppState;
use crate::user_stickers::visible_to;

pub async fn list_favorites(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<FavoriteSticker>>, ApiError> {
    let user_id = user.0.sub;
    let favorites = state.db(move |db| Ok(db.list_favorites(&user_id)?)).await?;
    Ok(Json(favorites))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidJson(req): ValidJson<FavoriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.0.sub;
    let favorite = state
        .db(move |db| {
            let sticker_id = req.sticker_id.to_string();
            let sticker = db
                .get_sticker(&sticker_id, None)?
                .ok_or_else(|| ApiError::not_found("Sticker"))?;
            if !visible_to(&sticker, &user_id) {
                return Err(ApiError::Forbidden("Access denied".into()));
            }
            db.add_favorite(&user_id, &sticker_id)
                .map_err(|e| match ApiError::from(e) {
                    ApiError::Conflict(_) => {
                        ApiError::Conflict("Sticker is already a favorite".into())
                    }
                    other => other,
                })
        })
        .await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(sticker_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = user.0.sub;
    let removed = state
        .db(move |db| Ok(db.remove_favorite(&user_id, &sticker_id.to_string())?))
        .await?;
    if !removed {
        return Err(ApiError::not_found("Favorite"));
    }
    Ok(Json(MessageResponse::new("Sticker removed from favorites")))
}
