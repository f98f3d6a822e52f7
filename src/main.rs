use std::sync::Arc;

use qr_tracking::api;
use qr_tracking::api::grpc::pb::tracking_service_server::TrackingServiceServer;
use qr_tracking::api::grpc::GrpcTrackingService;
use qr_tracking::config::{Config, LogFormat};
use qr_tracking::engine::notifier::run_notification_worker;
use qr_tracking::error::AppError;
use qr_tracking::state::AppState;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    init_tracing(&config);

    let (app_state, notification_rx) =
        AppState::new(config.notification_queue_size, config.event_buffer_size);
    let shared_state = Arc::new(
        app_state
            .with_qr_id_attempts(config.qr_id_max_attempts)
            .with_static_dir(config.static_dir.clone()),
    );

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_notification_worker(
        shared_state.clone(),
        notification_rx,
        config.sender_email.clone(),
    ));

    let grpc_addr = format!("0.0.0.0:{}", config.grpc_port)
        .parse()
        .map_err(|err| AppError::Internal(format!("invalid grpc address: {err}")))?;
    let grpc_service = GrpcTrackingService::new(shared_state.clone());

    tokio::spawn(async move {
        tracing::info!(grpc_port = %grpc_addr, "grpc server started");
        if let Err(err) = TonicServer::builder()
            .add_service(TrackingServiceServer::new(grpc_service))
            .serve(grpc_addr)
            .await
        {
            tracing::error!(error = %err, "grpc server failed");
        }
    });

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
