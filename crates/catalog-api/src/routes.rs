use axum::{
    Router,
    extract::{DefaultBodyLimit, Query, State},
    middleware,
    routing::{get, patch, post},
};
use catalog_types::api::{
    CreateAssetRequest, DisplayOrderRequest, ImportanceRequest, UpdateAssetRequest,
};
use catalog_types::models::AssetKind;
use catalog_types::pagination::PageQuery;
use uuid::Uuid;

use crate::extract::{AdminUser, Path, ValidJson};
use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{
    assets, auth, categories, favorites, files, payments, search, stickers, subniches,
    user_stickers, users, webhooks,
};

/// Request bodies up to this size are accepted on the upload routes.
const MAX_UPLOAD_BODY: usize = 200 * 1024 * 1024;

pub async fn health() -> &'static str {
    "ok"
}

/// The full application: `/health` plus the versioned API under `/v1`.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh-tokens", post(auth::refresh_tokens))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/webhook/single", post(webhooks::order_single))
        .route("/webhook/subscription", post(webhooks::order_subscription));

    let protected = Router::new()
        .route("/auth/send-verification-email", post(auth::send_verification_email))
        .nest("/users", user_routes())
        .nest("/categories", category_routes())
        .nest("/subniches", subniche_routes())
        .nest("/stickers", sticker_routes())
        .nest("/user-stickers", user_sticker_routes())
        .nest("/favoriteSticker", favorite_routes())
        .nest("/fonts", asset_routes(AssetKind::Font))
        .nest("/icons", asset_routes(AssetKind::Icon))
        .nest("/tutorials", asset_routes(AssetKind::Tutorial))
        .route("/search", get(search::search))
        .route(
            "/payment/user/{user_id}/payment-status",
            get(payments::payment_status),
        )
        .nest("/files", file_routes())
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", public.merge(protected))
        .with_state(state)
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/me", get(users::me))
        .route(
            "/{user_id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/{user_id}/detail", get(users::get_user_detail))
        .route("/{user_id}/status", patch(users::set_user_status))
}

fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(categories::list_categories))
        .route("/total", get(categories::total_categories))
        .route("/important", get(categories::important_categories))
        .route("/create", post(categories::create_category))
        .route("/markImportant", post(categories::mark_important))
        .route("/removeImportant", post(categories::remove_important))
        .route("/setOrder", post(categories::set_order))
        .route(
            "/{category_id}",
            get(categories::get_category)
                .patch(categories::update_category)
                .delete(categories::delete_category),
        )
}

fn subniche_routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(subniches::list_subniches))
        .route("/total", get(subniches::total_subniches))
        .route("/important", get(subniches::important_subniches))
        .route("/create", post(subniches::create_subniche))
        .route("/markImportant", post(subniches::mark_important))
        .route("/removeImportant", post(subniches::remove_important))
        .route("/setOrder", post(subniches::set_order))
        .route("/category/{category_id}", get(subniches::subniches_by_category))
        .route(
            "/{subniche_id}",
            get(subniches::get_subniche)
                .patch(subniches::update_subniche)
                .delete(subniches::delete_subniche),
        )
}

fn sticker_routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(stickers::list_stickers))
        .route("/total", get(stickers::total_stickers))
        .route("/create", post(stickers::create_sticker))
        .route("/category/{category_id}", get(stickers::stickers_by_category))
        .route("/subniche/{subniche_id}", get(stickers::stickers_by_subniche))
        .route(
            "/{sticker_id}",
            get(stickers::get_sticker)
                .patch(stickers::update_sticker)
                .delete(stickers::delete_sticker),
        )
}

fn user_sticker_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(user_stickers::create_user_sticker))
        .route("/user", get(user_stickers::my_stickers))
        .route(
            "/{sticker_id}",
            get(user_stickers::get_user_sticker)
                .patch(user_stickers::update_user_sticker)
                .delete(user_stickers::delete_user_sticker),
        )
}

fn favorite_routes() -> Router<AppState> {
    Router::new()
        .route("/all", get(favorites::list_favorites))
        .route("/create", post(favorites::add_favorite))
        .route("/{sticker_id}", axum::routing::delete(favorites::remove_favorite))
}

/// Same handlers for every asset kind; each closure pins its kind.
fn asset_routes(kind: AssetKind) -> Router<AppState> {
    Router::new()
        .route(
            "/all",
            get(move |state: State<AppState>, query: Query<PageQuery>| {
                assets::list_assets(kind, state, query)
            }),
        )
        .route(
            "/total",
            get(move |state: State<AppState>| assets::total_assets(kind, state)),
        )
        .route(
            "/important",
            get(move |state: State<AppState>| assets::important_assets(kind, state)),
        )
        .route(
            "/create",
            post(
                move |state: State<AppState>, admin: AdminUser, body: ValidJson<CreateAssetRequest>| {
                    assets::create_asset(kind, state, admin, body)
                },
            ),
        )
        .route(
            "/markImportant",
            post(
                move |state: State<AppState>, admin: AdminUser, body: ValidJson<ImportanceRequest>| {
                    assets::mark_important(kind, state, admin, body)
                },
            ),
        )
        .route(
            "/removeImportant",
            post(
                move |state: State<AppState>, admin: AdminUser, body: ValidJson<ImportanceRequest>| {
                    assets::remove_important(kind, state, admin, body)
                },
            ),
        )
        .route(
            "/setOrder",
            post(
                move |state: State<AppState>,
                      admin: AdminUser,
                      body: ValidJson<DisplayOrderRequest>| {
                    assets::set_order(kind, state, admin, body)
                },
            ),
        )
        .route(
            "/{id}",
            get(move |state: State<AppState>, id: Path<Uuid>| assets::get_asset(kind, state, id))
                .patch(
                    move |state: State<AppState>,
                          admin: AdminUser,
                          id: Path<Uuid>,
                          body: ValidJson<UpdateAssetRequest>| {
                        assets::update_asset(kind, state, admin, id, body)
                    },
                )
                .delete(
                    move |state: State<AppState>, admin: AdminUser, id: Path<Uuid>| {
                        assets::delete_asset(kind, state, admin, id)
                    },
                ),
        )
}

fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(files::list_files))
        .route("/upload", post(files::upload_file))
        .route("/multi-upload", post(files::upload_files))
        .route("/{id}", get(files::get_file).delete(files::delete_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY))
}
