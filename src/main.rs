// Módulos de la aplicación
mod api;
mod app_state;
mod auth;
mod classify;
mod config;
mod error;
mod export;
mod filter;
mod models;
mod stats;
mod store;
mod tree;

use crate::app_state::{AppState, Status};
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env()?;

    // 3. Abrir almacenamiento y tabla de clasificación
    let store = store::open_store(&cfg).await?;
    let classifier = classify::Classifier::load(cfg.classifier_path.as_deref())?;

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 4. Crear estado compartido de la aplicación
    let app_state = AppState {
        sessions: auth::SessionStore::new(cfg.session_ttl_hours),
        status: Arc::new(Mutex::new(Status {
            message: "Servidor listo.".to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            classifier_version: classifier.version().to_string(),
        })),
        config: cfg.clone(),
        store,
        classifier: Arc::new(classifier),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 5. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new(&cfg.frontend_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr).await?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
