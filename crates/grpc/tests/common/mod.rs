#![allow(dead_code)]

use async_trait::async_trait;
use matchfn_grpc::auth::{AuthError, IdentityProvider, ValidationMaterial};
use matchfn_grpc::matchmaker::PairMatchmaker;
use matchfn_grpc::server::{Lifecycle, LifecycleError};
use matchfn_shared::AppConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

/// Running server under test.
pub struct Harness {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<Result<(), LifecycleError>>,
}

impl Harness {
    pub async fn channel(&self) -> Channel {
        Channel::from_shared(format!("http://{}", self.addr))
            .expect("endpoint")
            .connect()
            .await
            .expect("connect")
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// Configuration with every listener on an ephemeral port.
pub fn ephemeral_config() -> AppConfig {
    AppConfig {
        grpc_port: 0,
        metrics_port: 0,
        diagnostics_port: 0,
        service_name: "matchfn-test".to_string(),
        ..AppConfig::default()
    }
}

/// Starts a lifecycle and waits until the gRPC listener is bound.
pub async fn start(config: AppConfig, identity: Option<Arc<dyn IdentityProvider>>) -> Harness {
    let lifecycle = Lifecycle::new(config, Arc::new(PairMatchmaker), identity);
    let shutdown = lifecycle.shutdown_token();
    let mut bound = lifecycle.bound_addr();
    let handle = tokio::spawn(lifecycle.run());

    let addr = tokio::time::timeout(Duration::from_secs(5), bound.wait_for(|a| a.is_some()))
        .await
        .expect("server did not bind in time")
        .expect("lifecycle dropped before binding");
    let addr = (*addr).expect("bound address");

    Harness {
        addr,
        shutdown,
        handle,
    }
}

/// Identity provider serving a fixed grant set.
pub struct FixedProvider {
    grants: Vec<String>,
}

impl FixedProvider {
    pub fn new<I, S>(grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            grants: grants.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FixedProvider {
    async fn fetch_validation_material(&self) -> Result<ValidationMaterial, AuthError> {
        Ok(ValidationMaterial::from_grants(self.grants.iter().cloned()))
    }
}
