use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use tracing::warn;

use crate::{AuthenticationProperties, OAuthError};

const CORRELATION_BYTES: usize = 32;
const CORRELATION_PREFIX: &str = ".oauth.correlation.";

/// Per-browser-session storage for correlation ids, owned by the host.
///
/// The axum adapter backs this with a cookie; anything that survives the trip to
/// the provider and back for the same user agent works.
pub trait CorrelationStore: Send {
    fn insert(&mut self, key: &str, value: String);

    /// Removes and returns the value. Correlation ids are single use.
    fn take(&mut self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCorrelationStore {
    values: HashMap<String, String>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl CorrelationStore for InMemoryCorrelationStore {
    fn insert(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn take(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

pub fn correlation_key(authentication_type: &str) -> String {
    format!("{CORRELATION_PREFIX}{authentication_type}")
}

pub(crate) fn generate_correlation_id(
    authentication_type: &str,
    properties: &mut AuthenticationProperties,
    store: &mut dyn CorrelationStore,
) -> Result<(), OAuthError> {
    let mut bytes = [0u8; CORRELATION_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| OAuthError::OsRng {
            message: err.to_string(),
        })?;
    let correlation_id = URL_SAFE_NO_PAD.encode(bytes);

    store.insert(&correlation_key(authentication_type), correlation_id.clone());
    properties.set_correlation_id(correlation_id);
    Ok(())
}

/// Consumes the stored id and the one embedded in `properties`; true only when both exist and match.
pub(crate) fn validate_correlation_id(
    authentication_type: &str,
    properties: &mut AuthenticationProperties,
    store: &mut dyn CorrelationStore,
) -> bool {
    let Some(stored) = store.take(&correlation_key(authentication_type)) else {
        warn!(authentication_type, "correlation value not found in store");
        return false;
    };

    let Some(embedded) = properties.take_correlation_id() else {
        warn!(authentication_type, "correlation id missing from state");
        return false;
    };

    if stored != embedded {
        warn!(authentication_type, "correlation id mismatch");
        return false;
    }

    true
}
