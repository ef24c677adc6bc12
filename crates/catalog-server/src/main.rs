mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use catalog_api::mail::Mailer;
use catalog_api::{AppStateInner, WebhookSecrets};
use catalog_db::Database;
use catalog_storage::Storage;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = match config.s3.clone() {
        Some(s3) => Storage::s3(s3).await?,
        None => {
            warn!("CATALOG_S3_ENDPOINT not set, storing uploads on local disk");
            Storage::local(config.storage_dir.clone(), &config.bucket, &config.public_url).await?
        }
    };
    let storage = Arc::new(storage);

    let mailer = match &config.smtp {
        Some(smtp) => Mailer::smtp(smtp, &config.mail_from)?,
        None => {
            warn!("CATALOG_SMTP_HOST not set, emails will be dropped");
            Mailer::log(&config.mail_from)?
        }
    };

    let state = Arc::new(AppStateInner {
        db,
        storage: storage.clone(),
        auth: config.auth,
        webhooks: WebhookSecrets {
            single: config.webhook_secret_single,
            subscription: config.webhook_secret_subscription,
        },
        mailer,
        app_url: config.app_url,
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let mut app = Router::new().merge(catalog_api::router(state));
    // Only the bucket directory is exposed when objects are on disk.
    if let Some(dir) = storage.local_dir() {
        app = app.nest_service(
            &format!("/public/{}", storage.bucket()),
            ServeDir::new(dir),
        );
    }
    let app = app
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Catalog server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
