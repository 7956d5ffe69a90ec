//! API key authentication for push and delete
//!
//! The registry checks keys through [`KeyValidator`] before touching an
//! upload. [`ApiKeys`] validates against the keys listed in the security
//! config; when authentication is disabled every request is accepted.

use std::collections::HashSet;
use tracing::warn;

use crate::{config::SecurityConfig, error::AppError, error::AppResult};

/// Header clients send the API key in.
pub const API_KEY_HEADER: &str = "X-NuGet-ApiKey";

pub trait KeyValidator {
    fn is_valid_key(&self, key: &str) -> bool;

    /// Whether requests must carry a key at all.
    fn is_required(&self) -> bool {
        true
    }
}

/// Keys from [`SecurityConfig`].
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    required: bool,
    keys: HashSet<String>,
}

impl ApiKeys {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            required: true,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        Self {
            required: security.require_authentication,
            ..Self::new(security.api_keys.iter().cloned())
        }
    }
}

impl KeyValidator for ApiKeys {
    fn is_valid_key(&self, key: &str) -> bool {
        !key.is_empty() && self.keys.contains(key)
    }

    fn is_required(&self) -> bool {
        self.required
    }
}

/// Reject a request whose key is missing or unknown.
pub fn require_api_key<V: KeyValidator + ?Sized>(validator: &V, key: Option<&str>) -> AppResult<()> {
    if !validator.is_required() {
        return Ok(());
    }

    let Some(key) = key.map(str::trim).filter(|key| !key.is_empty()) else {
        warn!("Missing API key");
        return Err(AppError::Unauthorized(format!(
            "Missing {API_KEY_HEADER} header"
        )));
    };

    if !validator.is_valid_key(key) {
        warn!("Invalid API key");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(())
}
