use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use catalog_db::{Constraint, constraint_violation};
use serde_json::json;
use tracing::error;

/// Every handler failure. The message is what the client sees, except for
/// `Internal`, whose cause is only logged.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized("Please authenticate".into())
    }

    /// Deactivated accounts and accounts past their expiration date.
    pub fn inactive() -> Self {
        ApiError::Forbidden("Account is inactive or expired".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Constraint violations from the database become 409s; anything else is a 500.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match constraint_violation(&err) {
            Some(Constraint::Unique) => ApiError::Conflict("Resource already exists".into()),
            Some(Constraint::ForeignKey) => {
                ApiError::Conflict("Referenced resource does not exist".into())
            }
            Some(Constraint::Other) => ApiError::Conflict("Constraint violation".into()),
            None => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(err) => {
                error!("Request failed: {:#}", err);
                "Internal server error".to_string()
            }
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::PayloadTooLarge(m) => m,
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_db::Database;

    #[test]
    fn plain_errors_are_internal() {
        let err = ApiError::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unique_violation_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user(&catalog_db::queries::NewUser {
                email: "ana@example.com".into(),
                name: None,
                password_hash: "x".into(),
                role: catalog_types::models::Role::User,
                is_manually_created: false,
                expiration_date: None,
            })
            .unwrap();
        let attachment = db
            .insert_attachment(&catalog_db::queries::NewAttachment {
                filename: "a.png".into(),
                filetype: "image/png".into(),
                filesize: 1,
                url: "http://x/a.png".into(),
                object_key: "a.png".into(),
                user_id: Some(user.id.clone()),
            })
            .unwrap();
        let sticker = db
            .create_sticker(&catalog_db::queries::NewSticker {
                name: None,
                attachment_id: attachment.id,
                category_id: None,
                subniche_id: None,
                user_id: None,
                is_user_created: false,
                translations: vec![],
            })
            .unwrap();
        db.add_favorite(&user.id, &sticker.id).unwrap();

        let err = ApiError::from(db.add_favorite(&user.id, &sticker.id).unwrap_err());
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_details_stay_out_of_the_body() {
        let response = ApiError::Internal(anyhow::anyhow!("secret path /var/db")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
