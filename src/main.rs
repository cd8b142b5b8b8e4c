//! MatchFunction plugin server binary.

use std::sync::Arc;

use matchfn_grpc::auth::{IdentityProvider, StaticIdentityProvider};
use matchfn_grpc::matchmaker::PairMatchmaker;
use matchfn_grpc::server::{shutdown_signal, Lifecycle};
use matchfn_shared::AppConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    info!(
        grpc_port = config.grpc_port,
        auth = config.auth_enabled,
        service_name = %config.service_name,
        "configuration resolved"
    );

    let identity: Option<Arc<dyn IdentityProvider>> = config
        .auth_enabled
        .then(|| Arc::new(StaticIdentityProvider::new()) as Arc<dyn IdentityProvider>);

    let lifecycle = Lifecycle::new(config, Arc::new(PairMatchmaker), identity);

    let shutdown = lifecycle.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    lifecycle.run().await?;
    Ok(())
}
