use actix_web::{dev::Service, web, App, HttpServer};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recommendation_service::config::{Config, SERVICE_NAME};
use recommendation_service::db::PgFeatureRepo;
use recommendation_service::handlers::{get_recommendations, RecommendationHandlerState};
use recommendation_service::services::{Bucketer, FsModelLoader, RecommendationService};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load configuration before logging so LOG_LEVEL can seed the filter
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Structured JSON logging; RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},actix_web=info", config.app.log_level).into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    tracing::info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    // Initialize database
    let db_pool = match db_pool::create_pool(config.database.to_db_config()).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database pool creation failed: {}", e);
            eprintln!("ERROR: Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    let features = Arc::new(PgFeatureRepo::new(
        db_pool,
        config.database.page_size,
        SERVICE_NAME,
    ));

    let model_base = config.model.resolved_base_path();
    tracing::info!("Model base path: {}", model_base.display());
    let models = Arc::new(FsModelLoader::new(model_base));

    let bucketer = Bucketer::from_config(&config.experiment);
    tracing::info!(
        control_percentage = config.experiment.control_percentage,
        "Experiment bucketing configured"
    );

    let rec_handler_state = web::Data::new(RecommendationHandlerState {
        service: Arc::new(RecommendationService::new(bucketer, models, features)),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(rec_handler_state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route(
                "/metrics",
                web::get().to(recommendation_service::metrics::serve_metrics),
            )
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            recommendation_service::metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            recommendation_service::metrics::observe_http_request(
                                &method,
                                &path,
                                500,
                                start.elapsed(),
                            );
                            Err(err)
                        }
                    }
                }
            })
            .service(get_recommendations)
    })
    .bind(format!("0.0.0.0:{}", config.app.port))?
    .run()
    .await
}
