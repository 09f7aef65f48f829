use std::net::SocketAddr;
use std::sync::Arc;

use creative_generator::{
    bfl::BflClient,
    config::AppConfig,
    openai::OpenAiClient,
    routes::{router, AppState},
    workflow::CreativeWorkflow,
};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before tracing so RUST_LOG from the file applies
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env();
    tracing::info!(
        bfl_key = %mask(&config.bfl.api_key),
        openai_key = %mask(&config.openai.api_key),
        wait_for_image = config.workflow.wait_for_image,
        "Loaded configuration"
    );

    let workflow = CreativeWorkflow::new(
        Arc::new(BflClient::new(config.bfl.clone())),
        Arc::new(OpenAiClient::new(config.openai.clone())),
        config.workflow.clone(),
    );
    let app = router(AppState { workflow: Arc::new(workflow) });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

fn mask(key: &str) -> String {
    format!("{}***", key.chars().take(4).collect::<String>())
}
