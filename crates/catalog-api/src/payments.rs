use axum::{
    Json,
    extract::State,
};
use catalog_types::models::PaymentStatus;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{CurrentUser, Path};
use crate::state::AppState;

/// Subscription state reached through the user's orders. Users may only
/// read their own; admins anyone's.
pub async fn payment_status(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentStatus>>, ApiError> {
    let user_id = user_id.to_string();
    if !caller.is_admin() && caller.id() != user_id {
        return Err(ApiError::Forbidden("Forbidden".into()));
    }

    let statuses = state
        .db(move |db| Ok(db.payment_status(&user_id)?))
        .await?;
    if statuses.is_empty() {
        return Err(ApiError::NotFound(
            "No subscriptions found for user".into(),
        ));
    }
    Ok(Json(statuses))
}
