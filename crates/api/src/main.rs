use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use swimlens_api::background::retention::{self, RetentionSettings};
use swimlens_api::config::ServerConfig;
use swimlens_api::router::build_app_router;
use swimlens_api::state::AppState;
use swimlens_pipeline::ffmpeg::Reencoder;
use swimlens_pipeline::frames::FfmpegOverlayRenderer;
use swimlens_pipeline::pose_source::HttpPoseSource;
use swimlens_pipeline::probe::FfprobeProbe;
use swimlens_pipeline::{AnalysisPipeline, PipelineConfig};
use swimlens_worker::{JobStore, Orchestrator, OrchestratorConfig, SlidingWindowLimiter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "swimlens_api=debug,swimlens_worker=debug,swimlens_pipeline=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        app_env = %config.app_env,
        workers = config.max_concurrent_jobs,
        "Loaded server configuration"
    );

    // --- Storage ---
    for dir in [&config.upload_dir, &config.results_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .unwrap_or_else(|e| panic!("Failed to create {}: {e}", dir.display()));
    }

    // --- Analysis pipeline ---
    let pipeline = build_pipeline(&config);

    // --- Orchestrator ---
    let dispatcher_cancel = CancellationToken::new();
    let orchestrator = Arc::new(Orchestrator::start(
        Arc::new(JobStore::new()),
        Arc::new(SlidingWindowLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window(),
        )),
        Arc::new(pipeline),
        OrchestratorConfig {
            upload_dir: config.upload_dir.clone(),
            max_concurrent_jobs: config.max_concurrent_jobs,
        },
        dispatcher_cancel.clone(),
    ));

    // --- Retention (first sweep runs immediately) ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(retention::run(
        RetentionSettings {
            dirs: vec![config.upload_dir.clone(), config.results_dir.clone()],
            ttl: config.retention_ttl(),
            interval: config.retention_interval(),
        },
        Arc::clone(&orchestrator),
        retention_cancel.clone(),
    ));

    // --- Router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Retention job stopped");

    dispatcher_cancel.cancel();
    tracing::info!("Graceful shutdown complete");
}

fn build_pipeline(config: &ServerConfig) -> AnalysisPipeline {
    let mut pipeline_config = PipelineConfig::new(config.results_dir.clone());
    pipeline_config.sample_every = config.pose_sample_every;

    let pipeline = AnalysisPipeline::new(
        Arc::new(HttpPoseSource::new(config.pose_service_url.clone())),
        Arc::new(FfprobeProbe::new(config.ffprobe_bin.clone())),
        Arc::new(FfmpegOverlayRenderer::new(config.ffmpeg_bin.clone())),
        pipeline_config,
    );

    if config.reencode_enabled {
        pipeline.with_reencoder(Reencoder::new(
            config.ffmpeg_bin.clone(),
            Duration::from_secs(config.reencode_timeout_secs),
        ))
    } else {
        tracing::info!("Browser re-encode disabled");
        pipeline
    }
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
