mod api_error;
mod config;
mod inference;
mod intake;
mod routes;
mod state;
mod storage;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use config::{AppConfig, ConfigError};
use inference::openai_client::OpenAiClient;
use inference::prompts::PromptConfig;
use intake::upload::IntakeConfig;
use routes::configure_routes;
use state::AppState;
use std::env;
use std::sync::Arc;
use storage::detection_store::MemoryDetectionStore;

fn build_state(config: &AppConfig) -> Result<AppState, ConfigError> {
    std::fs::create_dir_all(&config.upload_dir)?;
    log::info!("Spooling uploads to {}", config.upload_dir.display());

    let prompts = PromptConfig::load(config.prompts_file.as_deref())?;
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()?;
    let inference = OpenAiClient::new(
        http,
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.openai_model.clone(),
        Arc::new(prompts),
    );

    Ok(AppState {
        inference: Arc::new(inference),
        store: Arc::new(MemoryDetectionStore::new()),
        intake: IntakeConfig {
            upload_dir: config.upload_dir.clone(),
            max_bytes: config.max_upload_bytes,
        },
        upstream_timeout: config.upstream_timeout,
    })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    if config.upstream_configured() {
        log::info!(
            "Inference service: model {} at {}",
            config.openai_model,
            config.openai_base_url
        );
    } else {
        log::warn!("OPENAI_API_KEY is not set. Detection requests will return 503 until it is configured.");
    }

    let state = build_state(&config).map_err(|e| {
        log::error!("Failed to initialise services: {}", e);
        std::io::Error::other(e.to_string())
    })?;
    let state = web::Data::new(state);

    let static_dir = config.static_dir.clone();
    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(state.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
