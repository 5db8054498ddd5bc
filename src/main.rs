//! AnimeFlow API Server
//!
//! Main entry point for the AnimeFlow REST API service.

use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use anime_flow::auth::AuthConfig;
use anime_flow::catalog::Catalog;
use anime_flow::config::Config;
use anime_flow::routes::{configure_routes, ApiDoc, AppState};
use anime_flow::store;

/// Health check endpoint
async fn health_check(data: web::Data<AppState>) -> impl Responder {
    let status = data.catalog.status().await;
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "backend": status.backend,
        "lastSync": status.last_sync,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Refresh the catalog from the store on a fixed interval
fn spawn_sync_task(catalog: Arc<Catalog>, config: &Config) {
    let Some(period) = config.sync_interval() else {
        info!("Background sync disabled");
        return;
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick completes immediately and the catalog was just loaded
        interval.tick().await;
        loop {
            interval.tick().await;
            match catalog.sync().await {
                Ok(freshness) => debug!("Background sync: {:?}", freshness),
                Err(e) => warn!("Background sync failed: {}", e),
            }
        }
    });
}

/// Log catalog change events
fn spawn_event_logger(catalog: &Catalog) {
    let mut events = catalog.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!("Catalog event: {:?}", event),
                Err(RecvError::Lagged(missed)) => warn!("Event logger missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };
    let bind_address = format!("{}:{}", config.host, config.port);

    let remote = store::from_config(&config.store, config.http_timeout())
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    info!("Opening {} on {}", config.document_path, remote.name());

    let catalog = match Catalog::open(remote, &config.document_path).await {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!("Failed to load catalog: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    spawn_event_logger(&catalog);
    spawn_sync_task(catalog.clone(), &config);

    let auth_config = web::Data::new(AuthConfig {
        jwt_secret: config.jwt_secret.clone(),
        admin_usernames: config.admin_usernames.clone(),
    });
    let app_state = web::Data::new(AppState {
        catalog,
        config: config.clone(),
    });

    info!("Starting AnimeFlow API server on {}", bind_address);

    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .app_data(auth_config.clone())
            .route("/health", web::get().to(health_check))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
