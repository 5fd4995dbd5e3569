//! Static API-key gate for internal service paths.
//!
//! Requests whose path lies under the internal prefix must carry the
//! configured key in `X-API-Key`; every other path passes straight through.
//!
//! ```no_run
//! use paygate_auth::InternalApiKeyFilter;
//! use paygate_core::MiddlewareChain;
//!
//! let mut chain = MiddlewareChain::new();
//! chain.use_middleware(InternalApiKeyFilter::new("s3cret"));
//! ```

use crate::{AuthError, Result, ServicePrincipal};
use async_trait::async_trait;
use paygate_config::{DEFAULT_INTERNAL_PATH_PREFIX, SecuritySettings};
use paygate_core::{Error, HttpRequest, HttpResponse, Middleware, Next};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Header carrying the internal key. Matched case-insensitively.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Body of every rejection.
pub const UNAUTHORIZED_BODY: &str = r#"{"error":"Invalid or missing API key"}"#;

pub struct InternalApiKeyFilter {
    api_key: Option<SecretString>,
    path_prefix: String,
}

impl InternalApiKeyFilter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::new(api_key.into().into())),
            path_prefix: DEFAULT_INTERNAL_PATH_PREFIX.to_string(),
        }
    }

    /// A filter with no key refuses every internal request.
    pub fn from_settings(settings: &SecuritySettings) -> Self {
        Self {
            api_key: settings
                .internal_api_key
                .as_ref()
                .map(|key| SecretString::new(key.expose_secret().into())),
            path_prefix: normalize_prefix(&settings.internal_path_prefix),
        }
    }

    pub fn with_path_prefix(mut self, prefix: impl AsRef<str>) -> Self {
        self.path_prefix = normalize_prefix(prefix.as_ref());
        self
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// `/api/internal` and `/api/internal/...` are protected,
    /// `/api/internalx` is not.
    pub fn is_protected(&self, path: &str) -> bool {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.path_prefix.ends_with('/'),
            None => false,
        }
    }

    /// Check the request's key without touching the request.
    pub fn authenticate(&self, req: &HttpRequest) -> Result<ServicePrincipal> {
        let provided = req
            .header(API_KEY_HEADER)
            .filter(|value| !value.trim().is_empty())
            .ok_or(AuthError::MissingApiKey)?;

        let expected = self.api_key.as_ref().ok_or(AuthError::NotConfigured)?;

        if constant_time_eq(provided.as_bytes(), expected.expose_secret().as_bytes()) {
            Ok(ServicePrincipal::internal())
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }
}

#[async_trait]
impl Middleware for InternalApiKeyFilter {
    async fn handle(&self, mut req: HttpRequest, next: Next) -> std::result::Result<HttpResponse, Error> {
        if !self.is_protected(&req.path) {
            return next(req).await;
        }

        match self.authenticate(&req) {
            Ok(principal) => {
                paygate_log::trace!(target: "paygate::auth", "Internal caller accepted for {}", req.path);
                req.extensions.insert(principal);
                next(req).await
            }
            Err(err) => {
                paygate_log::warn!(target: "paygate::auth", "Rejected {} {}: {}", req.method, req.path, err);
                Ok(err.to_response())
            }
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hashing first gives both sides the same length, so the comparison time
/// does not depend on the length of the guess either.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let hash_a = Sha256::digest(a);
    let hash_b = Sha256::digest(b);
    hash_a.ct_eq(&hash_b).into()
}
