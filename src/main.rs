use clap::Parser;
use faqline::{
    app::Application,
    config::AppConfig,
    telemetry::{build_telemetry, register_telemetry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let app_config = AppConfig::parse();

    let telemetry = build_telemetry(
        env!("CARGO_CRATE_NAME").into(),
        app_config.log_level.clone(),
        std::io::stdout,
    );
    register_telemetry(telemetry);

    let app = Application::build(app_config).await?;
    tracing::info!(port = app.port, "faqline-api listening");

    let (close_tx, close_rx) = tokio::sync::oneshot::channel();
    let server_handle = tokio::spawn(async move { app.run_gracefully(close_rx).await });

    shutdown_signal().await;
    tracing::info!("shutdown requested");

    _ = close_tx.send(());
    _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
