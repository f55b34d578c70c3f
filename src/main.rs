mod bedrock;
mod config;
mod error;
mod event;
mod extract;
mod fetch;
mod inject;
mod lambda;
mod mirror;
mod models;
mod pipeline;
mod prompts;
mod publish;
mod retry;
mod routes;
mod storage;
mod theme;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    bedrock::BedrockInvoker,
    config::Settings,
    fetch::HttpFetcher,
    pipeline::{Laas, Services},
    prompts::SsmParameters,
    routes::AppState,
    storage::S3Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let in_lambda = std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if in_lambda {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let settings = Settings::from_env().context("invalid configuration")?;

    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let bedrock = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(settings.region.clone()))
        .load()
        .await;

    let services = Services {
        store: Arc::new(S3Store::new(&aws)),
        model: Arc::new(BedrockInvoker::new(&bedrock)),
        params: Arc::new(SsmParameters::new(&aws)),
        fetcher: Arc::new(HttpFetcher::new(settings.fetch_timeout)?),
    };
    let function = settings.function;
    let port = settings.port;
    let laas = Arc::new(Laas::new(settings, services));

    if in_lambda {
        let kind = function.context("LAAS_FUNCTION must be set when running in Lambda")?;
        return lambda::run(laas, kind).await.map_err(|e| anyhow::anyhow!(e));
    }

    let app = routes::router(AppState { laas });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
