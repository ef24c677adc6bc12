use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use catalog_types::api::MessageResponse;
use catalog_types::webhook::OrderEvent;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use tracing::{info, warn};

use crate::auth::{hash_password, random_password};
use crate::error::ApiError;
use crate::state::AppState;

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Deserialize)]
pub struct SignatureQuery {
    pub signature: Option<String>,
}

/// Checks a hex HMAC-SHA1 of `body` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Lowercase hex signature the platform would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub async fn order_single(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    handle_order_approved(&state, &state.webhooks.single, query, body).await
}

pub async fn order_subscription(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    handle_order_approved(&state, &state.webhooks.subscription, query, body).await
}

/// Verifies the signature, then applies the order atomically. A buyer
/// without an account gets one, and the access email goes out only after
/// the transaction committed.
async fn handle_order_approved(
    state: &AppState,
    secret: &str,
    query: SignatureQuery,
    body: Bytes,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let signed = query
        .signature
        .as_deref()
        .is_some_and(|sig| verify_signature(secret, &body, sig));
    if !signed {
        warn!("Rejected webhook with bad or missing signature");
        return Err(ApiError::BadRequest("Incorrect signature".into()));
    }

    let event: OrderEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order payload: {}", e)))?;
    event.validate().map_err(ApiError::BadRequest)?;

    let password = random_password(12);
    let hash_source = password.clone();
    let (event, ingest) = state
        .db(move |db| {
            let ingest = db.ingest_order(&event, || hash_password(&hash_source))?;
            Ok((event, ingest))
        })
        .await?;
    info!(
        "Processed order {} ({}) for user {}",
        event.order_ref, event.order_status, ingest.user_id
    );

    if ingest.created_user {
        if let Err(e) = state
            .mailer
            .send_access(&event.customer.email, &state.app_url, &password)
            .await
        {
            warn!("Failed to send access email to {}: {:#}", event.customer.email, e);
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Order processed successfully")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"order_ref":"x"}"#;
        let sig = sign("secret", body).unwrap();
        assert_eq!(sig.len(), 40);
        assert!(verify_signature("secret", body, &sig));
        assert!(verify_signature("secret", body, &sig.to_uppercase()));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("secret", b"tampered", &sig));
        assert!(!verify_signature("secret", body, "not-hex"));
        assert!(!verify_signature("secret", body, ""));
    }

    #[test]
    fn known_vector() {
        // RFC 2202 test case 2
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?").unwrap(),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }
}
