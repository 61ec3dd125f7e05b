//! Asset storage HTTP service
//!
//! Multipart upload routes per asset kind, idempotent deletes, listings, and
//! the stored files themselves under `/assets` with caching disabled so an
//! overwritten photo is never served stale.

pub mod error;
pub mod routes;

use crate::config::Config;
use crate::models::AssetKind;
use crate::storage::AssetStore;
use crate::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::{self, ctrl_c};
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info};

pub type SharedState = Arc<AssetStore>;

/// Room for multipart boundaries, headers and text fields on top of the file
/// size limit.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

fn body_limit(store: &AssetStore, kind: AssetKind) -> DefaultBodyLimit {
    let max = store.limits().max_bytes(kind).saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(max).unwrap_or(usize::MAX))
}

fn static_files(store: &AssetStore) -> Router {
    Router::new()
        .route_service("/{*path}", ServeDir::new(store.root()))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
}

pub fn router(store: AssetStore) -> Router {
    let assets = static_files(&store);
    let photo_limit = body_limit(&store, AssetKind::Photo);
    let cv_limit = body_limit(&store, AssetKind::Cv);
    let project_limit = body_limit(&store, AssetKind::ProjectImage);
    let certificate_limit = body_limit(&store, AssetKind::CertificateImage);

    Router::new()
        .route("/api/upload", post(routes::upload_photo).layer(photo_limit))
        .route("/api/upload-cv", post(routes::upload_cv).layer(cv_limit))
        .route(
            "/api/proyectos/upload",
            post(routes::upload_project_image).layer(project_limit),
        )
        .route(
            "/api/certificados/upload",
            post(routes::upload_certificate_image).layer(certificate_limit),
        )
        .route(
            "/api/proyectos/imagen/{filename}",
            delete(routes::delete_project_image),
        )
        .route(
            "/api/certificados/imagen/{filename}",
            delete(routes::delete_certificate_image),
        )
        .route("/api/assets/{kind}", get(routes::list_assets))
        .route("/api/assets/{kind}/{filename}", delete(routes::delete_asset))
        .nest_service("/assets", assets)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(store))
}

pub async fn start_server(config: &Config) -> Result<()> {
    let store = AssetStore::new(config.assets_dir.clone(), config.limits);
    info!("Serving assets from {}", store.root().display());

    let app = router(store);

    let address = config.bind_address();
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Asset service running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Asset service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
