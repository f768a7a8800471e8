use anyhow::Context;

use stockledger_infra::AppConfig;
use stockledger_observability::TracingOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("STOCKLEDGER_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("failed to load configuration")?;

    stockledger_observability::init(&TracingOptions::new(
        config.logging.level.clone(),
        config.logging.json,
    ));

    if config.auth.jwt_secret == "dev-secret" {
        tracing::warn!("auth.jwt_secret not set; using insecure dev default");
    }

    let app = stockledger_api::app::build_app(&config).await?;

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(env = %env, "listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
