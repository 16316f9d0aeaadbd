use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use session_keeper::auth::handlers;
use session_keeper::{health_check, AppError, AppState, Settings};
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> session_keeper::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully ({})", config.environment);

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let state = AppState::new(config.clone()).await?;
    let sweeper = state.expiry_sweeper().start();
    let state = web::Data::new(state);

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    let workers = config.server.workers as usize;

    let served = HttpServer::new(move || {
        let cors = if config.cors.enabled {
            let cors_config = Cors::default();

            let cors_config = if config.cors.allow_any_origin {
                cors_config
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_any_header()
                    .supports_credentials()
            } else {
                cors_config
                    .allowed_origin("http://localhost:8080")
                    .allowed_origin("http://127.0.0.1:8080")
                    .allowed_methods(vec!["GET", "POST", "DELETE"])
                    .allowed_headers(vec!["Authorization", "Content-Type"])
                    .supports_credentials()
            };

            cors_config.max_age(config.cors.max_age as usize)
        } else {
            // CORS disabled - use most restrictive settings
            Cors::default()
        };

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .route("/health", web::get().to(health_check))
            .configure(handlers::configure)
    })
    .listen(listener)?
    .workers(workers)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()));

    sweeper.stop().await;
    info!("Server stopped");

    served
}
