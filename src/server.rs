//! axum integration: cookie-backed correlation and a middleware that runs the handler.

mod cookies;
mod middleware;

pub use cookies::CookieCorrelationStore;
pub use middleware::{OAuthMiddleware, SignInHandler, authentication_middleware};
