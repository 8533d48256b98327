use std::sync::Arc;
use std::time::Duration;

use crate::{AuthenticationEvents, AuthenticationMode, DefaultEvents, StateProtector};

pub const DEFAULT_SIGN_IN_AS_AUTHENTICATION_TYPE: &str = "ExternalCookie";
pub const DEFAULT_BACKCHANNEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Static handler configuration, shared read-only by every request.
#[derive(Clone)]
pub struct OAuthOptions {
    pub authentication_type: String,
    pub caption: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    /// Path the handler owns; compared exactly against the request path.
    pub callback_path: String,
    /// Requested permissions, comma-joined into the `scope` parameter.
    /// The provider's default scope is used when empty.
    pub scope: Vec<String>,
    pub sign_in_as_authentication_type: String,
    pub authentication_mode: AuthenticationMode,
    pub backchannel_timeout: Duration,
    /// A random-keyed HMAC protector is created when unset.
    pub state_protector: Option<Arc<dyn StateProtector>>,
    pub events: Arc<dyn AuthenticationEvents>,
}

impl OAuthOptions {
    pub fn new(
        authentication_type: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let authentication_type = authentication_type.into();
        Self {
            callback_path: format!("/signin-{}", authentication_type.to_lowercase()),
            caption: Some(authentication_type.clone()),
            authentication_type,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: Vec::new(),
            sign_in_as_authentication_type: DEFAULT_SIGN_IN_AS_AUTHENTICATION_TYPE.to_string(),
            authentication_mode: AuthenticationMode::Passive,
            backchannel_timeout: DEFAULT_BACKCHANNEL_TIMEOUT,
            state_protector: None,
            events: Arc::new(DefaultEvents),
        }
    }

    /// Display name for sign-in links, falling back to the authentication type.
    pub fn caption(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.authentication_type)
    }

    pub fn with_callback_path(mut self, callback_path: impl Into<String>) -> Self {
        self.callback_path = normalize_path(callback_path.into());
        self
    }

    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_sign_in_as_authentication_type(
        mut self,
        authentication_type: impl Into<String>,
    ) -> Self {
        self.sign_in_as_authentication_type = authentication_type.into();
        self
    }

    pub fn with_authentication_mode(mut self, mode: AuthenticationMode) -> Self {
        self.authentication_mode = mode;
        self
    }

    pub fn with_backchannel_timeout(mut self, timeout: Duration) -> Self {
        self.backchannel_timeout = timeout;
        self
    }

    pub fn with_state_protector(mut self, protector: impl StateProtector + 'static) -> Self {
        self.state_protector = Some(Arc::new(protector));
        self
    }

    pub fn with_events(mut self, events: impl AuthenticationEvents + 'static) -> Self {
        self.events = Arc::new(events);
        self
    }
}

impl std::fmt::Debug for OAuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthOptions")
            .field("authentication_type", &self.authentication_type)
            .field("caption", &self.caption)
            .field("client_id", &self.client_id)
            .field("callback_path", &self.callback_path)
            .field("scope", &self.scope)
            .field(
                "sign_in_as_authentication_type",
                &self.sign_in_as_authentication_type,
            )
            .field("authentication_mode", &self.authentication_mode)
            .field("backchannel_timeout", &self.backchannel_timeout)
            .finish_non_exhaustive()
    }
}

fn normalize_path(path: String) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}
