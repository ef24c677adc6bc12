use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use catalog_types::api::TokenKind;
use chrono::Utc;
use tracing::warn;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the access JWT from the Authorization header.
///
/// The account behind the token must still exist and be allowed to sign
/// in; the role is taken from the account, not the token.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(ApiError::unauthenticated)?;
    let mut claims = decode_token(&state.auth.jwt_secret, bearer.token(), TokenKind::Access)?;

    let sub = claims.sub.clone();
    let row = state
        .db(move |db| Ok(db.get_user_row(&sub)?))
        .await?
        .ok_or_else(ApiError::unauthenticated)?;
    if !row.can_sign_in(Utc::now()) {
        warn!("Rejected access token of inactive or expired user {}", row.id);
        return Err(ApiError::inactive());
    }
    claims.role = row.role;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
