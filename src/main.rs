use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use trainer_backend::{
    config::{get_config, init_config},
    middleware::telemetry::telemetry_middleware,
    routes,
    services::seed_service,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let app_state = AppState::new();
    seed_service::load_seeds(&app_state.bank, &config.seed_dir).await;

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .route("/exams", post(routes::exam_routes::create_exam))
        .route("/exams/:exam_id", get(routes::exam_routes::get_exam))
        .route(
            "/exams/:exam_id/submissions",
            post(routes::exam_routes::submit_answers),
        )
        .route(
            "/submissions/:submission_id/analysis",
            post(routes::analysis_routes::analyze_submission),
        )
        .route("/ai/ping", get(routes::diag::ai_ping))
        .route("/seed/status", get(routes::diag::seed_status))
        .with_state(app_state)
        .layer(axum::middleware::from_fn(telemetry_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
