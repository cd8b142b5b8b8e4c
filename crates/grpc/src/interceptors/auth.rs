//! Auth stage of the interceptor chain.
//!
//! Validates the bearer token on every call against cached validation
//! material. Only present in the chain when auth is enabled; token
//! refresh happens off the hot path in [`crate::auth::TokenValidator`].

use http::{Extensions, HeaderMap};
use std::sync::Arc;
use tonic::Status;

use crate::auth::{AuthError, TokenValidator};

use super::{CallHook, CallInfo, HookState};

pub struct AuthHook {
    validator: Arc<TokenValidator>,
}

impl AuthHook {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }
}

impl CallHook for AuthHook {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn on_call(
        &self,
        _call: &CallInfo,
        headers: &HeaderMap,
        _extensions: &mut Extensions,
    ) -> Result<HookState, Status> {
        let token = bearer_token(headers).ok_or(AuthError::MissingCredential)?;
        self.validator.validate(token)?;
        Ok(None)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
