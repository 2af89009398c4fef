use std::sync::Arc;

use clap::Parser;
use eyre::WrapErr;
use stemsplit_job_manager::JobManager;
use stemsplit_local_jobs::LocalComputation;
use stemsplit_server::{
    config::{Cli, DEFAULT_LOG_FILTER},
    router, AppState,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cors = cli.cors_layer()?;
    let manager = Arc::new(JobManager::new(
        LocalComputation::demucs(&cli.separator),
        cli.job_settings(),
    ));

    let app = router(
        AppState {
            manager: manager.clone(),
        },
        cli.max_upload_bytes(),
    )
    .layer(TraceLayer::new_for_http())
    .layer(cors);

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .wrap_err_with(|| format!("Failed to listen on {}", cli.bind))?;
    tracing::info!(addr = %cli.bind, separator = %cli.separator, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .wrap_err("Server error")?;

    tracing::info!("Shut down");
    Ok(())
}

/// Wait for Ctrl-C, then stop admitting jobs. Streams that are already open run until their
/// jobs end.
async fn shutdown_signal(manager: Arc<JobManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutting down");
    manager.close();
}
