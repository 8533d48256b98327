//! Opaque, integrity-protected encoding of [`AuthenticationProperties`] for the `state` parameter.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::{TryRngCore, rngs::OsRng};
use sha2::Sha256;

use crate::{AuthenticationProperties, OAuthError};

type HmacSha256 = Hmac<Sha256>;

const KEY_BYTES: usize = 32;

/// Serializes properties into an opaque string and back, rejecting anything it did not produce.
pub trait StateProtector: Send + Sync {
    fn protect(&self, properties: &AuthenticationProperties) -> Result<String, OAuthError>;

    /// Returns `None` for tampered, truncated or foreign input.
    fn unprotect(&self, protected: &str) -> Option<AuthenticationProperties>;
}

/// HMAC-SHA256 signed JSON. The payload is readable but not forgeable.
///
/// The purpose string is mixed into the MAC so that state minted for one handler
/// cannot be replayed against another that shares the key.
#[derive(Clone)]
pub struct HmacStateProtector {
    key: Vec<u8>,
    purpose: String,
}

impl std::fmt::Debug for HmacStateProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacStateProtector")
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

impl HmacStateProtector {
    pub fn new(key: impl Into<Vec<u8>>, purpose: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            purpose: purpose.into(),
        }
    }

    /// Fresh random key. State does not survive a process restart with this key.
    pub fn generate(purpose: impl Into<String>) -> Result<Self, OAuthError> {
        let mut key = vec![0u8; KEY_BYTES];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|err| OAuthError::OsRng {
                message: err.to_string(),
            })?;
        Ok(Self::new(key, purpose))
    }

    fn mac(&self, payload: &[u8]) -> Result<HmacSha256, OAuthError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|err| OAuthError::StateProtection {
                message: err.to_string(),
            })?;
        mac.update(self.purpose.as_bytes());
        mac.update(&[0]);
        mac.update(payload);
        Ok(mac)
    }
}

impl StateProtector for HmacStateProtector {
    fn protect(&self, properties: &AuthenticationProperties) -> Result<String, OAuthError> {
        let payload = serde_json::to_vec(properties)?;
        let signature = self.mac(&payload)?.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn unprotect(&self, protected: &str) -> Option<AuthenticationProperties> {
        let (payload, signature) = protected.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.mac(&payload).ok()?.verify_slice(&signature).ok()?;
        serde_json::from_slice(&payload).ok()
    }
}
