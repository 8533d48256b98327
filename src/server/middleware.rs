use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::{HOST, LOCATION}},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::{Challenge, HostRequest, InvokeOutcome, OAuthHandler, OAuthProvider, SignIn};

use super::cookies::CookieCorrelationStore;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Host session issuance. Typically sets a session cookie on `response`.
#[async_trait]
pub trait SignInHandler: Send + Sync {
    async fn sign_in(&self, sign_in: SignIn, response: &mut Response);
}

/// State for [`authentication_middleware`].
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(home))
///     .layer(axum::middleware::from_fn_with_state(
///         OAuthMiddleware::new(handler, sign_in),
///         authentication_middleware::<StravaProvider>,
///     ));
/// ```
pub struct OAuthMiddleware<P: OAuthProvider> {
    handler: Arc<OAuthHandler<P>>,
    sign_in: Arc<dyn SignInHandler>,
    path_base: String,
    default_scheme: String,
}

impl<P: OAuthProvider> Clone for OAuthMiddleware<P> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            sign_in: self.sign_in.clone(),
            path_base: self.path_base.clone(),
            default_scheme: self.default_scheme.clone(),
        }
    }
}

impl<P: OAuthProvider> OAuthMiddleware<P> {
    pub fn new(handler: Arc<OAuthHandler<P>>, sign_in: Arc<dyn SignInHandler>) -> Self {
        Self {
            handler,
            sign_in,
            path_base: String::new(),
            default_scheme: "http".to_string(),
        }
    }

    /// Prefix the application is mounted under, e.g. when nested behind a proxy path.
    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into();
        self
    }

    /// Scheme used when neither the request URI nor `X-Forwarded-Proto` carries one.
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    pub fn handler(&self) -> &OAuthHandler<P> {
        &self.handler
    }

    /// `None` when the request names no host, since no redirect URI can be built for it.
    fn host_request(&self, request: &Request) -> Option<HostRequest> {
        let headers = request.headers();
        let uri = request.uri();

        let scheme = headers
            .get(FORWARDED_PROTO)
            .and_then(|value| value.to_str().ok())
            .or_else(|| uri.scheme_str())
            .unwrap_or(&self.default_scheme);
        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|authority| authority.to_string()))
            .filter(|host| !host.is_empty())?;

        Some(
            HostRequest::new(scheme, host, uri.path())
                .with_path_base(self.path_base.clone())
                .with_query(uri.query().unwrap_or_default()),
        )
    }
}

/// Runs the callback phase on the callback path and the challenge on 401 responses
/// that carry a [`Challenge`] extension.
pub async fn authentication_middleware<P: OAuthProvider + 'static>(
    State(state): State<OAuthMiddleware<P>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(host_request) = state.host_request(&request) else {
        warn!(path = request.uri().path(), "request has no host");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let secure = host_request.scheme == "https";
    let mut correlation = CookieCorrelationStore::from_headers(request.headers());

    let outcome = state.handler.invoke(&host_request, &mut correlation).await;
    let mut response = match outcome {
        InvokeOutcome::NotHandled => {
            let mut response = next.run(request).await;
            // Left in place for outer layers; a matching challenge replaces the response.
            let challenge = response.extensions().get::<Challenge>().cloned();
            match state.handler.challenge(
                &host_request,
                response.status().as_u16(),
                challenge.as_ref(),
                &mut correlation,
            ) {
                Ok(Some(location)) => response = found(&location),
                Ok(None) => {}
                Err(err) => {
                    error!(error = %err, "failed to build authorization redirect");
                    response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
            response
        }
        InvokeOutcome::ServerError => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        InvokeOutcome::Handled {
            sign_in,
            redirect,
            request_completed,
        } => {
            let mut response = match (request_completed, redirect) {
                (_, Some(location)) => found(&location),
                (true, None) => StatusCode::NO_CONTENT.into_response(),
                (false, None) => next.run(request).await,
            };
            if let Some(sign_in) = sign_in {
                state.sign_in.sign_in(sign_in, &mut response).await;
            }
            response
        }
    };

    correlation.apply(response.headers_mut(), secure);
    response
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(_) => {
            error!(location, "redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
