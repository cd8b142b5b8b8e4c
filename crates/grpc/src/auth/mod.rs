//! Token validation with periodically refreshed material.
//!
//! The validation material (the set of accepted grants) comes from an
//! [`IdentityProvider`]. It is fetched once during startup, which must
//! succeed for the server to come up when auth is enabled, and then
//! refreshed in the background. Refresh failures keep the last good
//! material and are logged, so a flaky provider degrades token freshness
//! but never availability.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Errors raised while validating credentials or fetching material.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("missing bearer token")]
    MissingCredential,

    #[error("invalid bearer token")]
    InvalidCredential,
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ProviderUnavailable(_) => Status::unavailable(err.to_string()),
            AuthError::MissingCredential | AuthError::InvalidCredential => {
                Status::unauthenticated(err.to_string())
            }
        }
    }
}

/// Snapshot of the credentials currently accepted by the validator.
#[derive(Debug, Clone, Default)]
pub struct ValidationMaterial {
    grants: HashSet<String>,
}

impl ValidationMaterial {
    pub fn from_grants<I, S>(grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            grants: grants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, token: &str) -> bool {
        self.grants.contains(token)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Source of token validation material.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_validation_material(&self) -> Result<ValidationMaterial, AuthError>;
}

/// Validates bearer tokens against cached material.
pub struct TokenValidator {
    provider: Arc<dyn IdentityProvider>,
    refresh_interval: Duration,
    material: RwLock<ValidationMaterial>,
}

impl TokenValidator {
    pub fn new(provider: Arc<dyn IdentityProvider>, refresh_interval: Duration) -> Self {
        Self {
            provider,
            refresh_interval,
            material: RwLock::new(ValidationMaterial::default()),
        }
    }

    /// Performs the initial material fetch. Failure here is fatal to
    /// startup: serving with auth enabled but no material would reject
    /// every call.
    pub async fn initialize(&self) -> Result<(), AuthError> {
        let material = self.provider.fetch_validation_material().await?;
        tracing::info!(grants = material.len(), "token validation material loaded");
        *self.material.write() = material;
        Ok(())
    }

    /// Spawns the background refresh loop. Stops when `shutdown` fires.
    pub fn spawn_refresh(self: &Arc<Self>, shutdown: CancellationToken) {
        let validator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(validator.refresh_interval);
            // The first tick fires immediately; initialize() already ran.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => validator.refresh_once().await,
                }
            }
        });
    }

    async fn refresh_once(&self) {
        match self.provider.fetch_validation_material().await {
            Ok(material) => {
                tracing::debug!(grants = material.len(), "token validation material refreshed");
                *self.material.write() = material;
            }
            Err(err) => {
                // Keep serving with the last good material.
                tracing::warn!(error = %err, "token material refresh failed, keeping cached material");
            }
        }
    }

    /// Checks a token against the cached material. Synchronous so it can
    /// run inside the interceptor chain without awaiting.
    pub fn validate(&self, token: &str) -> Result<(), AuthError> {
        if self.material.read().accepts(token) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }
}

/// Identity provider backed by a static token list in the environment.
///
/// Reads `PLUGIN_GRPC_SERVER_AUTH_TOKENS` (comma separated) on every
/// fetch, so changing the variable between refreshes revokes or grants
/// tokens on the next cycle.
pub struct StaticIdentityProvider {
    var_name: String,
}

impl StaticIdentityProvider {
    pub const DEFAULT_VAR: &'static str = "PLUGIN_GRPC_SERVER_AUTH_TOKENS";

    pub fn new() -> Self {
        Self::from_var(Self::DEFAULT_VAR)
    }

    pub fn from_var(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

impl Default for StaticIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn fetch_validation_material(&self) -> Result<ValidationMaterial, AuthError> {
        let raw = std::env::var(&self.var_name).map_err(|_| {
            AuthError::ProviderUnavailable(format!("{} is not set", self.var_name))
        })?;
        Ok(ValidationMaterial::from_grants(
            raw.split(',').map(str::trim).filter(|t| !t.is_empty()),
        ))
    }
}
