//! Challenge issuance and the callback state machine.

use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, error, warn};
use url::{Url, form_urlencoded};

use crate::claims::map_profile;
use crate::correlation::{generate_correlation_id, validate_correlation_id};
use crate::exchange::{TokenRequest, exchange_code};
use crate::{
    AuthFailure, AuthenticatedContext, AuthenticationMode, AuthenticationProperties,
    AuthenticationTicket, CallbackParams, Challenge, CorrelationStore, FailureReason,
    HmacStateProtector, HostRequest, InvokeOutcome, OAuthError, OAuthOptions, OAuthProvider,
    ReturnEndpointContext, SignIn, StateProtector,
};

const UNAUTHORIZED: u16 = 401;

pub struct OAuthHandler<P: OAuthProvider> {
    provider: P,
    options: OAuthOptions,
    state_protector: Arc<dyn StateProtector>,
    http: Client,
}

impl<P: OAuthProvider> OAuthHandler<P> {
    pub fn new(provider: P, options: OAuthOptions) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .timeout(options.backchannel_timeout)
            .build()?;
        Self::with_http_client(provider, options, http)
    }

    pub fn with_http_client(
        provider: P,
        options: OAuthOptions,
        http: Client,
    ) -> Result<Self, OAuthError> {
        if options.client_id.is_empty() {
            return Err(OAuthError::InvalidOptions("client_id is required".to_string()));
        }
        if options.client_secret.is_empty() {
            return Err(OAuthError::InvalidOptions(
                "client_secret is required".to_string(),
            ));
        }
        if options.authentication_type.is_empty() {
            return Err(OAuthError::InvalidOptions(
                "authentication_type is required".to_string(),
            ));
        }

        let state_protector = match &options.state_protector {
            Some(protector) => protector.clone(),
            None => Arc::new(HmacStateProtector::generate(format!(
                "oauth-signin/{}/v1",
                options.authentication_type
            ))?),
        };

        Ok(Self {
            provider,
            options,
            state_protector,
            http,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn options(&self) -> &OAuthOptions {
        &self.options
    }

    pub fn authentication_type(&self) -> &str {
        &self.options.authentication_type
    }

    /// Must match byte for byte between the challenge and the token request.
    pub fn redirect_uri(&self, request: &HostRequest) -> String {
        format!("{}{}", request.base_uri(), self.options.callback_path)
    }

    /// Comma-joined options scope, or the provider default when none is configured.
    pub fn scope(&self) -> String {
        if self.options.scope.is_empty() {
            self.provider.default_scope().join(",")
        } else {
            self.options.scope.join(",")
        }
    }

    /// Authorization URL for a 401 response that asks for this handler; `None` when it does not.
    pub fn challenge(
        &self,
        request: &HostRequest,
        status: u16,
        challenge: Option<&Challenge>,
        correlation: &mut dyn CorrelationStore,
    ) -> Result<Option<String>, OAuthError> {
        if status != UNAUTHORIZED {
            return Ok(None);
        }

        let Some(properties) = self.lookup_challenge(challenge) else {
            return Ok(None);
        };

        self.authorization_url(request, properties, correlation)
            .map(Some)
    }

    fn lookup_challenge(&self, challenge: Option<&Challenge>) -> Option<AuthenticationProperties> {
        let active = self.options.authentication_mode == AuthenticationMode::Active;
        match challenge {
            Some(challenge) if challenge.authentication_types.is_empty() => {
                active.then(|| challenge.properties.clone())
            }
            Some(challenge) => challenge
                .authentication_types
                .iter()
                .any(|kind| kind == self.authentication_type())
                .then(|| challenge.properties.clone()),
            None => active.then(AuthenticationProperties::default),
        }
    }

    pub fn authorization_url(
        &self,
        request: &HostRequest,
        mut properties: AuthenticationProperties,
        correlation: &mut dyn CorrelationStore,
    ) -> Result<String, OAuthError> {
        let redirect_uri = self.redirect_uri(request);

        if properties.redirect_uri().is_none() {
            properties.set_redirect_uri(Some(request.current_uri()));
        }

        generate_correlation_id(self.authentication_type(), &mut properties, correlation)?;

        let scope = match properties.scope_override() {
            Some(scope) => scope.to_string(),
            None => self.scope(),
        };

        let state = self.state_protector.protect(&properties)?;

        // Form encoding: a space in the scope goes out as `+`.
        let mut url = Url::parse(self.provider.authorize_url())?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.options.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("state", &state);

        debug!(
            authentication_type = self.authentication_type(),
            "issuing authorization redirect"
        );
        Ok(url.to_string())
    }

    /// Runs the callback phase when the request targets the callback path.
    pub async fn invoke(
        &self,
        request: &HostRequest,
        correlation: &mut dyn CorrelationStore,
    ) -> InvokeOutcome {
        if request.path != self.options.callback_path {
            return InvokeOutcome::NotHandled;
        }

        let ticket = self.authenticate(request, correlation).await;
        self.return_endpoint(ticket).await
    }

    /// Validates the callback, exchanges the code and builds the ticket.
    ///
    /// Every failure is logged here and reported through [`AuthFailure`]; nothing
    /// from the transport reaches the caller as an error of its own.
    pub async fn authenticate(
        &self,
        request: &HostRequest,
        correlation: &mut dyn CorrelationStore,
    ) -> Result<AuthenticationTicket, AuthFailure> {
        let authentication_type = self.authentication_type();

        let params = CallbackParams::from_request(request).inspect_err(|_| {
            warn!(authentication_type, "callback requires a single code and state");
        })?;

        let Some(mut properties) = self.state_protector.unprotect(&params.state) else {
            warn!(authentication_type, "state could not be unprotected");
            return Err(AuthFailure::malformed());
        };

        if !validate_correlation_id(authentication_type, &mut properties, correlation) {
            return Err(AuthFailure::new(
                FailureReason::CsrfMismatch,
                Some(properties),
            ));
        }

        let redirect_uri = self.redirect_uri(request);
        let token_request = TokenRequest {
            code: &params.code,
            redirect_uri: &redirect_uri,
            client_id: &self.options.client_id,
            client_secret: &self.options.client_secret,
        };

        let token = match exchange_code(&self.http, &self.provider, &token_request).await {
            Ok(token) => token,
            Err(OAuthError::MissingAccessToken) => {
                warn!(authentication_type, "access token was not found");
                return Err(AuthFailure::new(
                    FailureReason::MissingToken,
                    Some(properties),
                ));
            }
            Err(err) => {
                warn!(authentication_type, error = %err, "authentication failed");
                error!(authentication_type, error = ?err, "token exchange failed");
                return Err(AuthFailure::new(
                    FailureReason::TransportError,
                    Some(properties),
                ));
            }
        };

        let identity = map_profile(
            &self.provider.profile_fields(),
            self.provider.id(),
            authentication_type,
            &token.profile,
        );

        let mut context = AuthenticatedContext {
            identity: Some(identity),
            properties,
            profile: token.profile,
            access_token: token.access_token,
            token_type: token.token_type,
        };
        self.options.events.authenticated(&mut context).await;

        match context.identity {
            Some(identity) => Ok(AuthenticationTicket {
                identity: Some(identity),
                properties: context.properties,
            }),
            None => {
                debug!(authentication_type, "authenticated hook rejected the identity");
                Err(AuthFailure::new(
                    FailureReason::HookRejected,
                    Some(context.properties),
                ))
            }
        }
    }

    /// Turns the ticket into sign-in and redirect instructions for the host.
    pub async fn return_endpoint(
        &self,
        ticket: Result<AuthenticationTicket, AuthFailure>,
    ) -> InvokeOutcome {
        let authentication_type = self.authentication_type();
        let (identity, properties) = match ticket {
            Ok(ticket) => (ticket.identity, ticket.properties),
            Err(AuthFailure {
                reason,
                properties: Some(properties),
            }) => {
                debug!(authentication_type, %reason, "authentication did not succeed");
                (None, properties)
            }
            Err(AuthFailure {
                reason,
                properties: None,
            }) => {
                warn!(authentication_type, %reason, "invalid return state, unable to redirect");
                return InvokeOutcome::ServerError;
            }
        };

        let mut context = ReturnEndpointContext::new(
            identity,
            properties,
            Some(self.options.sign_in_as_authentication_type.clone()),
        );
        self.options.events.return_endpoint(&mut context).await;

        let sign_in = match (&context.sign_in_as_authentication_type, &context.identity) {
            (Some(sign_in_as), Some(identity)) => Some(SignIn {
                identity: identity.clone().with_authentication_type(sign_in_as.clone()),
                properties: context.properties.clone(),
            }),
            _ => None,
        };

        let mut redirect = None;
        let mut request_completed = context.is_request_completed();
        if !request_completed {
            if let Some(redirect_uri) = context.redirect_uri.take() {
                redirect = Some(if context.identity.is_none() {
                    add_query_string(&redirect_uri, "error", "access_denied")
                } else {
                    redirect_uri
                });
                request_completed = true;
            }
        }

        InvokeOutcome::Handled {
            sign_in,
            redirect,
            request_completed,
        }
    }
}

/// Appends `name=value` to `uri`, keeping any fragment last.
fn add_query_string(uri: &str, name: &str, value: &str) -> String {
    let (base, fragment) = match uri.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (uri, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    let pair: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(name, value)
        .finish();

    let mut result = format!("{base}{separator}{pair}");
    if let Some(fragment) = fragment {
        result.push('#');
        result.push_str(fragment);
    }
    result
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::claims::claim_types;
    use crate::{EventHandlers, InMemoryCorrelationStore, StravaProvider, correlation_key};

    const KEY: &[u8] = b"test-key-test-key-test-key-test!";

    fn options() -> OAuthOptions {
        OAuthOptions::new("Strava", "client-id", "client-secret")
            .with_callback_path("/signin-example")
            .with_scope(["a", "b"])
            .with_state_protector(HmacStateProtector::new(KEY, "test"))
    }

    fn handler(token_url: &str, options: OAuthOptions) -> OAuthHandler<StravaProvider> {
        let provider = StravaProvider::new()
            .with_authorize_url("https://provider.example/oauth/authorize")
            .with_token_url(token_url);
        OAuthHandler::new(provider, options).unwrap()
    }

    fn query_pairs(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    fn app_request(path: &str) -> HostRequest {
        HostRequest::new("https", "app.example", path)
    }

    /// Runs a challenge and returns the callback request the provider would send back.
    fn challenge_round_trip(
        handler: &OAuthHandler<StravaProvider>,
        properties: AuthenticationProperties,
        store: &mut InMemoryCorrelationStore,
    ) -> HostRequest {
        let url = handler
            .authorization_url(&app_request("/account").with_query("tab=1"), properties, store)
            .unwrap();
        let state = query_pairs(&url).remove("state").unwrap();
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("code", "ABC")
            .append_pair("state", &state)
            .finish();
        app_request("/signin-example").with_query(query)
    }

    async fn mount_token(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn strava_token() -> serde_json::Value {
        json!({
            "access_token": "tok123",
            "token_type": "Bearer",
            "athlete": {
                "id": "42",
                "firstname": "Jane",
                "lastname": "Doe",
                "email": "jane@x.com"
            }
        })
    }

    #[test]
    fn authorization_url_includes_required_params() {
        let handler = handler("https://provider.example/token", options());
        let mut store = InMemoryCorrelationStore::new();
        let url = handler
            .authorization_url(
                &app_request("/account"),
                AuthenticationProperties::new(),
                &mut store,
            )
            .unwrap();

        assert!(url.starts_with(
            "https://provider.example/oauth/authorize?response_type=code&client_id=client-id&redirect_uri=https%3A%2F%2Fapp.example%2Fsignin-example&scope=a%2Cb&state="
        ));

        let pairs = query_pairs(&url);
        let properties = HmacStateProtector::new(KEY, "test")
            .unprotect(&pairs["state"])
            .unwrap();
        assert_eq!(properties.redirect_uri(), Some("https://app.example/account"));
        assert_eq!(
            properties.correlation_id(),
            store.get(&correlation_key("Strava"))
        );
    }

    #[test]
    fn scope_override_is_used_verbatim() {
        let handler = handler("https://provider.example/token", options());
        let mut store = InMemoryCorrelationStore::new();
        let url = handler
            .authorization_url(
                &app_request("/"),
                AuthenticationProperties::new().with_scope("read,write"),
                &mut store,
            )
            .unwrap();

        assert!(url.contains("&scope=read%2Cwrite&"));
        assert!(!url.contains("scope=a%2Cb"));
    }

    #[test]
    fn scope_spaces_are_form_encoded() {
        let handler = handler("https://provider.example/token", options());
        let mut store = InMemoryCorrelationStore::new();
        let url = handler
            .authorization_url(
                &app_request("/"),
                AuthenticationProperties::new().with_scope("read write"),
                &mut store,
            )
            .unwrap();

        assert!(url.contains("&scope=read+write&"));
        assert_eq!(query_pairs(&url)["scope"], "read write");
    }

    #[test]
    fn empty_scope_falls_back_to_provider_default() {
        let handler = handler(
            "https://provider.example/token",
            options().with_scope(Vec::<String>::new()),
        );
        assert_eq!(handler.scope(), "read");
    }

    #[test]
    fn caller_redirect_uri_is_kept() {
        let handler = handler("https://provider.example/token", options());
        let mut store = InMemoryCorrelationStore::new();
        let url = handler
            .authorization_url(
                &app_request("/account"),
                AuthenticationProperties::new().with_redirect_uri("/after"),
                &mut store,
            )
            .unwrap();
        let properties = HmacStateProtector::new(KEY, "test")
            .unprotect(&query_pairs(&url)["state"])
            .unwrap();
        assert_eq!(properties.redirect_uri(), Some("/after"));
    }

    #[test]
    fn challenge_requires_401_and_matching_type() {
        let handler = handler("https://provider.example/token", options());
        let mut store = InMemoryCorrelationStore::new();
        let request = app_request("/account");
        let challenge = Challenge::new("Strava");

        assert!(handler
            .challenge(&request, 200, Some(&challenge), &mut store)
            .unwrap()
            .is_none());
        assert!(handler
            .challenge(&request, 401, Some(&Challenge::new("Untappd")), &mut store)
            .unwrap()
            .is_none());
        assert!(handler.challenge(&request, 401, None, &mut store).unwrap().is_none());
        assert!(store.is_empty());

        let url = handler
            .challenge(&request, 401, Some(&challenge), &mut store)
            .unwrap()
            .unwrap();
        assert!(url.starts_with("https://provider.example/oauth/authorize?"));
    }

    #[test]
    fn active_mode_answers_bare_401() {
        let handler = handler(
            "https://provider.example/token",
            options().with_authentication_mode(AuthenticationMode::Active),
        );
        let mut store = InMemoryCorrelationStore::new();
        let url = handler
            .challenge(&app_request("/account"), 401, None, &mut store)
            .unwrap();
        assert!(url.is_some());
    }

    #[tokio::test]
    async fn other_paths_are_not_handled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let handler = handler(&format!("{}/token", server.uri()), options());
        let mut store = InMemoryCorrelationStore::new();

        for path in ["/", "/signin-example/", "/SIGNIN-EXAMPLE", "/signin-examples"] {
            let request = app_request(path).with_query("code=a&state=b");
            assert_eq!(
                handler.invoke(&request, &mut store).await,
                InvokeOutcome::NotHandled
            );
        }
    }

    #[tokio::test]
    async fn end_to_end_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=ABC"))
            .and(body_string_contains(
                "redirect_uri=https%3A%2F%2Fapp.example%2Fsignin-example",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(strava_token()))
            .expect(1)
            .mount(&server)
            .await;

        let handler = handler(&format!("{}/token", server.uri()), options());
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(&handler, AuthenticationProperties::new(), &mut store);

        let ticket = handler.authenticate(&request, &mut store).await.unwrap();
        let identity = ticket.identity.unwrap();
        assert_eq!(identity.authentication_type(), "Strava");
        assert_eq!(
            identity.find_first(claim_types::NAME_IDENTIFIER).unwrap().value,
            "42"
        );
        assert_eq!(identity.name(), Some("Jane Doe"));
        assert_eq!(
            identity.find_first(claim_types::EMAIL).unwrap().value,
            "jane@x.com"
        );
        assert_eq!(
            ticket.properties.redirect_uri(),
            Some("https://app.example/account?tab=1")
        );
    }

    #[tokio::test]
    async fn invoke_signs_in_and_redirects() {
        let server = MockServer::start().await;
        mount_token(&server, strava_token()).await;
        let handler = handler(
            &format!("{}/token", server.uri()),
            options().with_sign_in_as_authentication_type("Cookies"),
        );
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(&handler, AuthenticationProperties::new(), &mut store);

        let InvokeOutcome::Handled {
            sign_in,
            redirect,
            request_completed,
        } = handler.invoke(&request, &mut store).await
        else {
            panic!("expected handled outcome");
        };

        let sign_in = sign_in.unwrap();
        assert_eq!(sign_in.identity.authentication_type(), "Cookies");
        assert_eq!(sign_in.identity.name(), Some("Jane Doe"));
        assert_eq!(redirect.as_deref(), Some("https://app.example/account?tab=1"));
        assert!(request_completed);
    }

    #[tokio::test]
    async fn redirect_uri_matches_between_challenge_and_exchange() {
        let server = MockServer::start().await;
        mount_token(&server, strava_token()).await;
        let handler = handler(&format!("{}/token", server.uri()), options());
        let mut store = InMemoryCorrelationStore::new();
        let url = handler
            .authorization_url(
                &HostRequest::new("http", "localhost:5000", "/x").with_path_base("/app"),
                AuthenticationProperties::new(),
                &mut store,
            )
            .unwrap();
        let pairs = query_pairs(&url);
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("code", "ABC")
            .append_pair("state", &pairs["state"])
            .finish();
        let callback = HostRequest::new("http", "localhost:5000", "/signin-example")
            .with_path_base("/app")
            .with_query(query);

        handler.authenticate(&callback, &mut store).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let form: HashMap<String, String> = form_urlencoded::parse(&requests[0].body)
            .into_owned()
            .collect();
        assert_eq!(form["redirect_uri"], pairs["redirect_uri"]);
        assert_eq!(form["redirect_uri"], "http://localhost:5000/app/signin-example");
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["client_id"], "client-id");
        assert_eq!(form["client_secret"], "client-secret");
    }

    #[tokio::test]
    async fn missing_access_token_fails_with_properties() {
        let server = MockServer::start().await;
        mount_token(&server, json!({ "token_type": "Bearer", "athlete": { "id": 1 } })).await;
        let handler = handler(&format!("{}/token", server.uri()), options());
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(
            &handler,
            AuthenticationProperties::new().with_redirect_uri("/done"),
            &mut store,
        );

        let failure = handler.authenticate(&request, &mut store).await.unwrap_err();
        assert_eq!(failure.reason, FailureReason::MissingToken);
        assert_eq!(failure.properties.unwrap().redirect_uri(), Some("/done"));
    }

    #[tokio::test]
    async fn token_endpoint_error_becomes_failed_ticket() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let handler = handler(&format!("{}/token", server.uri()), options());
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(
            &handler,
            AuthenticationProperties::new().with_redirect_uri("/done"),
            &mut store,
        );

        let outcome = handler.invoke(&request, &mut store).await;
        assert_eq!(
            outcome,
            InvokeOutcome::Handled {
                sign_in: None,
                redirect: Some("/done?error=access_denied".to_string()),
                request_completed: true,
            }
        );
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[tokio::test]
    async fn token_endpoint_error_is_logged_not_raised() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let handler = handler(&format!("{}/token", server.uri()), options());
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(&handler, AuthenticationProperties::new(), &mut store);

        let failure = handler.authenticate(&request, &mut store).await.unwrap_err();
        assert_eq!(failure.reason, FailureReason::TransportError);

        let lines = logs.lines();
        assert!(
            lines
                .iter()
                .any(|line| line.contains("WARN") && line.contains("authentication failed")),
            "{lines:?}"
        );
        assert!(
            lines
                .iter()
                .any(|line| line.contains("ERROR") && line.contains("token exchange failed")),
            "{lines:?}"
        );
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_becomes_failed_ticket() {
        let handler = handler("http://127.0.0.1:9/token", options());
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(&handler, AuthenticationProperties::new(), &mut store);

        let failure = handler.authenticate(&request, &mut store).await.unwrap_err();
        assert_eq!(failure.reason, FailureReason::TransportError);
        assert!(failure.properties.is_some());
    }

    #[tokio::test]
    async fn correlation_mismatch_fails_without_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(strava_token()))
            .expect(0)
            .mount(&server)
            .await;
        let handler = handler(&format!("{}/token", server.uri()), options());
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(
            &handler,
            AuthenticationProperties::new().with_redirect_uri("/done"),
            &mut store,
        );
        store.insert(&correlation_key("Strava"), "someone-else".to_string());

        let failure = handler.authenticate(&request, &mut store).await.unwrap_err();
        assert_eq!(failure.reason, FailureReason::CsrfMismatch);
        assert_eq!(failure.properties.clone().unwrap().redirect_uri(), Some("/done"));

        let outcome = handler.return_endpoint(Err(failure)).await;
        assert_eq!(
            outcome,
            InvokeOutcome::Handled {
                sign_in: None,
                redirect: Some("/done?error=access_denied".to_string()),
                request_completed: true,
            }
        );
    }

    #[tokio::test]
    async fn forged_or_missing_state_is_a_server_error() {
        let handler = handler("http://127.0.0.1:9/token", options());
        let mut store = InMemoryCorrelationStore::new();

        for query in ["code=ABC&state=forged", "code=ABC", "code=A&code=B&state=s"] {
            let request = app_request("/signin-example").with_query(query);
            let failure = handler.authenticate(&request, &mut store).await.unwrap_err();
            assert_eq!(failure.reason, FailureReason::MalformedRequest);
            assert_eq!(
                handler.invoke(&request, &mut store).await,
                InvokeOutcome::ServerError
            );
        }
    }

    #[tokio::test]
    async fn authenticated_hook_sees_token_and_can_reject() {
        let server = MockServer::start().await;
        mount_token(&server, strava_token()).await;
        let events = EventHandlers::new().on_authenticated(|context| {
            assert_eq!(context.access_token, "tok123");
            assert_eq!(context.token_type.as_deref(), Some("Bearer"));
            assert_eq!(context.profile["lastname"], "Doe");
            context.identity = None;
        });
        let handler = handler(&format!("{}/token", server.uri()), options().with_events(events));
        let mut store = InMemoryCorrelationStore::new();
        let request = challenge_round_trip(&handler, AuthenticationProperties::new(), &mut store);

        let failure = handler.authenticate(&request, &mut store).await.unwrap_err();
        assert_eq!(failure.reason, FailureReason::HookRejected);
    }

    #[tokio::test]
    async fn return_endpoint_hook_can_complete_the_request() {
        let events = EventHandlers::new().on_return_endpoint(|context| {
            context.sign_in_as_authentication_type = None;
            context.request_completed();
        });
        let handler = handler("http://127.0.0.1:9/token", options().with_events(events));
        let ticket = AuthenticationTicket {
            identity: Some(crate::ClaimsIdentity::new("Strava")),
            properties: AuthenticationProperties::new().with_redirect_uri("/done"),
        };

        assert_eq!(
            handler.return_endpoint(Ok(ticket)).await,
            InvokeOutcome::Handled {
                sign_in: None,
                redirect: None,
                request_completed: true,
            }
        );
    }

    #[tokio::test]
    async fn no_redirect_uri_leaves_request_open() {
        let handler = handler("http://127.0.0.1:9/token", options());
        let ticket = AuthenticationTicket {
            identity: Some(crate::ClaimsIdentity::new("Strava")),
            properties: AuthenticationProperties::new(),
        };

        let InvokeOutcome::Handled {
            sign_in,
            redirect,
            request_completed,
        } = handler.return_endpoint(Ok(ticket)).await
        else {
            panic!("expected handled outcome");
        };
        assert_eq!(
            sign_in.unwrap().identity.authentication_type(),
            "ExternalCookie"
        );
        assert!(redirect.is_none());
        assert!(!request_completed);
    }

    #[test]
    fn add_query_string_handles_existing_query_and_fragment() {
        assert_eq!(
            add_query_string("/a", "error", "access_denied"),
            "/a?error=access_denied"
        );
        assert_eq!(
            add_query_string("/a?b=1#top", "error", "access_denied"),
            "/a?b=1&error=access_denied#top"
        );
    }

    #[test]
    fn rejects_missing_credentials() {
        let result = OAuthHandler::new(StravaProvider::new(), OAuthOptions::new("Strava", "", "s"));
        assert!(matches!(result, Err(OAuthError::InvalidOptions(_))));
    }
}
