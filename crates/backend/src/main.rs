use anyhow::Context;
use clap::Parser;
use ecolink_backend::{
    auth::store::InMemoryCredentialStore, config::AuthConfig, create_app, AppState,
};
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ecolink-backend")]
#[command(about = "EcoLink authentication and session API server")]
struct Args {
    /// Address the HTTP server listens on.
    #[arg(short, long, default_value = "0.0.0.0:8080", env = "BIND_ADDR")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecolink_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = AuthConfig::from_env()?;

    // Accounts live only as long as the process.
    let store = Arc::new(InMemoryCredentialStore::spawn());
    let state = AppState::new(config, store).context("Failed to initialise auth service")?;
    let app = create_app(state);

    tracing::info!("Server listening on {}", args.bind);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    axum::serve(listener, app).await?;

    Ok(())
}
