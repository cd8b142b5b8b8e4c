//! Server lifecycle orchestration.
//!
//! [`Lifecycle::run`] drives the server through its phases: bind the
//! auxiliary HTTP listeners, prepare auth when enabled, compose the
//! interceptor chain, start the gRPC listener, install the span export
//! pipeline, then supervise until shutdown is requested or a subsystem
//! fails.
//!
//! A metrics or gRPC listener failure tears the server down; a
//! diagnostics failure only degrades it. On shutdown the health responder
//! flips to NOT_SERVING, the gRPC listener stops accepting while in-flight
//! calls drain, and buffered spans are flushed. A failed flush is reported
//! as an error so lost spans are visible in the exit status.

use matchfn_proto::match_function_server::MatchFunctionServer;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tracing::{error, info, warn};

use matchfn_shared::AppConfig;

use crate::auth::{AuthError, IdentityProvider, TokenValidator};
use crate::interceptors::{AuthHook, CallHook, ChainLayer, InterceptorChain, MetricsHook, TracingHook};
use crate::matchmaker::Matchmaker;
use crate::observability::{
    build_tracer_provider, diagnostics_router, install_global, metrics_router, shutdown_tracing,
    ObservabilityError, RpcMetrics,
};
use crate::services::{MatchFunctionService, STREAMING_METHODS};

/// Lifecycle phases, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Starting,
    Serving,
    ShuttingDown,
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::Starting => "starting",
            Phase::Serving => "serving",
            Phase::ShuttingDown => "shutting_down",
            Phase::Terminated => "terminated",
        }
    }
}

/// Errors that abort the lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to bind {endpoint} listener: {source}")]
    Bind {
        endpoint: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("auth is enabled but no identity provider was supplied")]
    MissingIdentityProvider,

    #[error("auth initialization failed: {0}")]
    AuthInit(#[from] AuthError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("reflection registry construction failed: {0}")]
    Reflection(String),

    #[error(transparent)]
    Observability(#[from] ObservabilityError),

    #[error("{name} subsystem failed: {message}")]
    Subsystem { name: &'static str, message: String },
}

struct SubsystemFailure {
    name: &'static str,
    message: String,
    fatal: bool,
}

/// Owns the server components and drives them through the phases.
pub struct Lifecycle {
    config: AppConfig,
    matchmaker: Arc<dyn Matchmaker>,
    identity: Option<Arc<dyn IdentityProvider>>,
    shutdown: CancellationToken,
    bound_addr: watch::Sender<Option<SocketAddr>>,
}

impl Lifecycle {
    pub fn new(
        config: AppConfig,
        matchmaker: Arc<dyn Matchmaker>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let (bound_addr, _) = watch::channel(None);
        Self {
            config,
            matchmaker,
            identity,
            shutdown: CancellationToken::new(),
            bound_addr,
        }
    }

    /// Token that requests shutdown when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Receives the gRPC listener address once it is bound.
    pub fn bound_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.bound_addr.subscribe()
    }

    /// Runs the server to completion.
    pub async fn run(self) -> Result<(), LifecycleError> {
        let mut phase = Phase::Initializing;
        info!(phase = phase.as_str(), "lifecycle started");

        let registry = Arc::new(prometheus::Registry::new());
        let metrics = Arc::new(RpcMetrics::register(&registry)?);
        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let metrics_listener = bind("metrics", self.config.metrics_port).await?;
        let diagnostics_listener = match bind("diagnostics", self.config.diagnostics_port).await {
            Ok(listener) => Some(listener),
            Err(err) => {
                warn!(error = %err, "diagnostics endpoint unavailable, continuing without it");
                None
            }
        };

        let auth_hook: Option<Arc<dyn CallHook>> = if self.config.auth_enabled {
            let identity = self
                .identity
                .clone()
                .ok_or(LifecycleError::MissingIdentityProvider)?;
            let validator = Arc::new(TokenValidator::new(identity, self.config.token_refresh));
            validator.initialize().await?;
            validator.spawn_refresh(self.shutdown.clone());
            Some(Arc::new(AuthHook::new(validator)))
        } else {
            None
        };

        let chain = InterceptorChain::build(
            Arc::new(TracingHook::new()),
            Arc::new(MetricsHook::new(Arc::clone(&metrics))),
            auth_hook,
            STREAMING_METHODS,
        );

        phase = Phase::Starting;
        info!(phase = phase.as_str(), auth = self.config.auth_enabled, "starting listeners");

        let grpc_listener = bind("grpc", self.config.grpc_port).await?;
        let grpc_addr = grpc_listener.local_addr().map_err(|source| {
            LifecycleError::Bind {
                endpoint: "grpc",
                source,
            }
        })?;
        let _ = self.bound_addr.send(Some(grpc_addr));

        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<MatchFunctionServer<MatchFunctionService>>()
            .await;

        let reflection_service = ReflectionBuilder::configure()
            .register_encoded_file_descriptor_set(matchfn_proto::FILE_DESCRIPTOR_SET)
            .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| LifecycleError::Reflection(e.to_string()))?;

        let (failure_tx, mut failure_rx) = mpsc::channel::<SubsystemFailure>(8);

        spawn_http(
            "metrics",
            metrics_listener,
            metrics_router(Arc::clone(&registry)),
            self.shutdown.clone(),
            failure_tx.clone(),
            true,
        );
        if let Some(listener) = diagnostics_listener {
            spawn_http(
                "diagnostics",
                listener,
                diagnostics_router(),
                self.shutdown.clone(),
                failure_tx.clone(),
                false,
            );
        }

        let service = MatchFunctionService::new(Arc::clone(&self.matchmaker));
        let grpc_shutdown = self.shutdown.clone();
        let grpc_failure = failure_tx.clone();
        let grpc_task = tokio::spawn(async move {
            let result = Server::builder()
                .layer(ChainLayer::new(chain))
                .add_service(health_service)
                .add_service(reflection_service)
                .add_service(MatchFunctionServer::new(service))
                .serve_with_incoming_shutdown(
                    TcpListenerStream::new(grpc_listener),
                    grpc_shutdown.cancelled_owned(),
                )
                .await;
            if let Err(err) = result {
                let _ = grpc_failure
                    .send(SubsystemFailure {
                        name: "grpc",
                        message: err.to_string(),
                        fatal: true,
                    })
                    .await;
            }
        });

        // The accept loop is already taking calls at this point; spans for
        // the earliest requests go to the noop provider and are dropped.
        let tracer_provider = build_tracer_provider(
            &self.config.service_name,
            &self.config.trace_collector_endpoint,
        )?;
        install_global(tracer_provider.clone());

        phase = Phase::Serving;
        info!(
            phase = phase.as_str(),
            grpc = %grpc_addr,
            metrics_port = self.config.metrics_port,
            "server is serving"
        );

        let failure = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break None,
                Some(failure) = failure_rx.recv() => {
                    if failure.fatal {
                        break Some(failure);
                    }
                    warn!(subsystem = failure.name, error = %failure.message, "subsystem degraded");
                }
            }
        };

        phase = Phase::ShuttingDown;
        info!(phase = phase.as_str(), "shutting down");
        self.shutdown.cancel();

        health_reporter
            .set_not_serving::<MatchFunctionServer<MatchFunctionService>>()
            .await;

        // Let in-flight calls drain before flushing their spans.
        if let Err(err) = grpc_task.await {
            error!(error = %err, "grpc task panicked during shutdown");
        }

        let flush_result = shutdown_tracing(&tracer_provider);

        phase = Phase::Terminated;
        info!(phase = phase.as_str(), "lifecycle finished");

        if let Some(failure) = failure {
            return Err(LifecycleError::Subsystem {
                name: failure.name,
                message: failure.message,
            });
        }
        flush_result?;
        Ok(())
    }
}

async fn bind(endpoint: &'static str, port: u16) -> Result<TcpListener, LifecycleError> {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .await
        .map_err(|source| LifecycleError::Bind { endpoint, source })
}

fn spawn_http(
    name: &'static str,
    listener: TcpListener,
    router: axum::Router,
    shutdown: CancellationToken,
    failures: mpsc::Sender<SubsystemFailure>,
    fatal: bool,
) {
    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
        if let Err(err) = result {
            let _ = failures
                .send(SubsystemFailure {
                    name,
                    message: err.to_string(),
                    fatal,
                })
                .await;
        }
    });
}

/// Resolves when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
