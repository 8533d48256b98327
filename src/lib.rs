//! OAuth 2.0 authorization-code sign-in for web applications.
//!
//! The handler issues the redirect to the provider, validates the callback
//! (state integrity and a correlation id against CSRF), exchanges the code,
//! maps the provider profile to claims and tells the host whom to sign in and
//! where to send the browser next. Hosts on axum can use the `axum` feature's
//! middleware; others drive [`OAuthHandler`] directly.

pub mod claims;
mod correlation;
mod error;
mod events;
mod exchange;
mod handler;
mod options;
mod properties;
mod providers;
#[cfg(feature = "axum")]
pub mod server;
mod state;
mod types;

pub use claims::{Claim, ClaimsIdentity};
pub use correlation::{CorrelationStore, InMemoryCorrelationStore, correlation_key};
pub use error::{AuthFailure, FailureReason, OAuthError};
pub use events::{
    AuthenticatedContext, AuthenticationEvents, DefaultEvents, EventHandlers,
    ReturnEndpointContext,
};
pub use handler::OAuthHandler;
pub use options::OAuthOptions;
pub use properties::AuthenticationProperties;
pub use providers::{
    OAuthProvider, ProfileFields, ProfileSource, StravaProvider, UntappdProvider, UserInfoAuth,
};
pub use state::{HmacStateProtector, StateProtector};
pub use types::{
    AuthenticationMode, AuthenticationTicket, CallbackParams, Challenge, HostRequest,
    InvokeOutcome, SignIn, TokenResponse,
};
