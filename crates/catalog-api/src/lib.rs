//! HTTP surface of the catalog: handlers, extractors and the router.

pub mod assets;
pub mod auth;
pub mod categories;
pub mod error;
pub mod extract;
pub mod favorites;
pub mod files;
pub mod mail;
pub mod middleware;
pub mod payments;
pub mod routes;
pub mod search;
pub mod state;
pub mod stickers;
pub mod subniches;
pub mod user_stickers;
pub mod users;
pub mod webhooks;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner, AuthConfig, WebhookSecrets};
