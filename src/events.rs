//! Hooks the host uses to observe or reshape the outcome of a callback.

use async_trait::async_trait;
use serde_json::Value;

use crate::{AuthenticationProperties, ClaimsIdentity};

/// Handed to [`AuthenticationEvents::authenticated`] once the profile has been mapped.
#[derive(Debug, Clone)]
pub struct AuthenticatedContext {
    /// Clearing this rejects the sign-in.
    pub identity: Option<ClaimsIdentity>,
    pub properties: AuthenticationProperties,
    /// Full provider profile, including the fields that were not mapped to claims.
    pub profile: Value,
    pub access_token: String,
    pub token_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReturnEndpointContext {
    pub identity: Option<ClaimsIdentity>,
    pub sign_in_as_authentication_type: Option<String>,
    pub redirect_uri: Option<String>,
    pub properties: AuthenticationProperties,
    request_completed: bool,
}

impl ReturnEndpointContext {
    pub(crate) fn new(
        identity: Option<ClaimsIdentity>,
        properties: AuthenticationProperties,
        sign_in_as_authentication_type: Option<String>,
    ) -> Self {
        Self {
            identity,
            sign_in_as_authentication_type,
            redirect_uri: properties.redirect_uri().map(str::to_string),
            properties,
            request_completed: false,
        }
    }

    /// The hook wrote the response itself; no default redirect is issued.
    pub fn request_completed(&mut self) {
        self.request_completed = true;
    }

    pub fn is_request_completed(&self) -> bool {
        self.request_completed
    }
}

#[async_trait]
pub trait AuthenticationEvents: Send + Sync {
    async fn authenticated(&self, _context: &mut AuthenticatedContext) {}

    async fn return_endpoint(&self, _context: &mut ReturnEndpointContext) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvents;

impl AuthenticationEvents for DefaultEvents {}

type AuthenticatedFn = Box<dyn Fn(&mut AuthenticatedContext) + Send + Sync>;
type ReturnEndpointFn = Box<dyn Fn(&mut ReturnEndpointContext) + Send + Sync>;

/// Closure-backed events for hosts that do not want a dedicated type.
#[derive(Default)]
pub struct EventHandlers {
    on_authenticated: Option<AuthenticatedFn>,
    on_return_endpoint: Option<ReturnEndpointFn>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_authenticated(
        mut self,
        handler: impl Fn(&mut AuthenticatedContext) + Send + Sync + 'static,
    ) -> Self {
        self.on_authenticated = Some(Box::new(handler));
        self
    }

    pub fn on_return_endpoint(
        mut self,
        handler: impl Fn(&mut ReturnEndpointContext) + Send + Sync + 'static,
    ) -> Self {
        self.on_return_endpoint = Some(Box::new(handler));
        self
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_authenticated", &self.on_authenticated.is_some())
            .field("on_return_endpoint", &self.on_return_endpoint.is_some())
            .finish()
    }
}

#[async_trait]
impl AuthenticationEvents for EventHandlers {
    async fn authenticated(&self, context: &mut AuthenticatedContext) {
        if let Some(handler) = &self.on_authenticated {
            handler(context);
        }
    }

    async fn return_endpoint(&self, context: &mut ReturnEndpointContext) {
        if let Some(handler) = &self.on_return_endpoint {
            handler(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_endpoint_context_seeds_redirect_from_properties() {
        let properties = AuthenticationProperties::new().with_redirect_uri("/home");
        let context = ReturnEndpointContext::new(None, properties, Some("Cookies".to_string()));
        assert_eq!(context.redirect_uri.as_deref(), Some("/home"));
        assert!(!context.is_request_completed());
    }

    #[tokio::test]
    async fn event_handlers_invoke_closures() {
        let events = EventHandlers::new().on_return_endpoint(|context| {
            context.redirect_uri = Some("/welcome".to_string());
            context.request_completed();
        });
        let mut context =
            ReturnEndpointContext::new(None, AuthenticationProperties::new(), None);

        events.return_endpoint(&mut context).await;

        assert_eq!(context.redirect_uri.as_deref(), Some("/welcome"));
        assert!(context.is_request_completed());
    }

    #[tokio::test]
    async fn default_events_leave_context_untouched() {
        let mut context = AuthenticatedContext {
            identity: Some(ClaimsIdentity::new("Strava")),
            properties: AuthenticationProperties::new(),
            profile: Value::Null,
            access_token: "tok".to_string(),
            token_type: None,
        };
        DefaultEvents.authenticated(&mut context).await;
        assert!(context.identity.is_some());
    }
}
