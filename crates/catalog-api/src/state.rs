use std::sync::Arc;

use catalog_db::Database;
use catalog_storage::Storage;
use catalog_types::api::TokenKind;
use chrono::Duration;
use tracing::error;

use crate::error::ApiError;
use crate::mail::Mailer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub storage: Arc<Storage>,
    pub auth: AuthConfig,
    pub webhooks: WebhookSecrets,
    pub mailer: Mailer,
    /// Front-end base URL used in emailed links.
    pub app_url: String,
}

pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub reset_ttl: Duration,
    pub verify_ttl: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_ttl: Duration::minutes(300),
            refresh_ttl: Duration::days(30),
            reset_ttl: Duration::minutes(10),
            verify_ttl: Duration::minutes(10),
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::ResetPassword => self.reset_ttl,
            TokenKind::VerifyEmail => self.verify_ttl,
        }
    }
}

/// HMAC keys for the two payment-platform integrations.
pub struct WebhookSecrets {
    pub single: String,
    pub subscription: String,
}

impl AppStateInner {
    /// Runs blocking database work off the async runtime.
    pub async fn db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
    }

    /// Best-effort removal of stored objects whose records are already gone.
    pub async fn delete_objects(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                error!("Failed to delete object {}: {:#}", key, e);
            }
        }
    }
}
