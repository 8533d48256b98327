use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Extension, Router,
    extract::Query,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::{Args, Parser, Subcommand};
use oauth_signin::server::{OAuthMiddleware, SignInHandler, authentication_middleware};
use oauth_signin::{
    Challenge, ClaimsIdentity, OAuthError, OAuthHandler, OAuthOptions, OAuthProvider, SignIn,
    StravaProvider, UntappdProvider,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_COOKIE: &str = "demo_session";
const SESSION_AUTHENTICATION_TYPE: &str = "DemoCookie";

#[derive(Debug, Parser)]
#[command(
    name = "oauth-signin",
    about = "Run a local site that signs users in through an OAuth provider."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = 8080, global = true)]
    port: u16,

    /// Open the site in the default browser once it is listening.
    #[arg(long, global = true)]
    open: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    Strava(Credentials),
    Untappd(Credentials),
}

#[derive(Debug, Args)]
struct Credentials {
    #[arg(long, env = "OAUTH_CLIENT_ID")]
    client_id: String,

    #[arg(long, env = "OAUTH_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,
}

#[tokio::main]
async fn main() -> Result<(), OAuthError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Strava(credentials) => {
            serve(StravaProvider::new(), "Strava", credentials, cli.port, cli.open).await
        }
        Command::Untappd(credentials) => {
            serve(UntappdProvider::new(), "Untappd", credentials, cli.port, cli.open).await
        }
    }
}

async fn serve<P: OAuthProvider + 'static>(
    provider: P,
    authentication_type: &str,
    credentials: Credentials,
    port: u16,
    open: bool,
) -> Result<(), OAuthError> {
    let options = OAuthOptions::new(
        authentication_type,
        credentials.client_id,
        credentials.client_secret,
    )
    .with_sign_in_as_authentication_type(SESSION_AUTHENTICATION_TYPE);
    let handler = Arc::new(OAuthHandler::new(provider, options)?);
    let callback_path = handler.options().callback_path.clone();
    let caption: Arc<str> = Arc::from(handler.options().caption());
    let state = OAuthMiddleware::new(handler, Arc::new(CookieSignIn));

    let challenge = Challenge::new(authentication_type);
    let app = Router::new()
        .route(
            "/",
            get(move |headers: HeaderMap, query: Query<HashMap<String, String>>| {
                let caption = caption.clone();
                async move { home(&caption, headers, query) }
            }),
        )
        .route(
            "/login",
            get(move || {
                let challenge = challenge.clone();
                async move { (StatusCode::UNAUTHORIZED, Extension(challenge)) }
            }),
        )
        .route("/logout", get(logout))
        .layer(axum::middleware::from_fn_with_state(
            state,
            authentication_middleware::<P>,
        ));

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    let url = format!("http://localhost:{port}/");
    info!(%url, %callback_path, "listening");
    eprintln!("Register http://localhost:{port}{callback_path} as the redirect URI, then visit {url}");

    if open {
        if let Err(err) = webbrowser::open(&url) {
            eprintln!("Failed to open browser automatically: {err}");
        }
    }

    axum::serve(listener, app).await?;
    Ok(())
}

struct CookieSignIn;

#[async_trait]
impl SignInHandler for CookieSignIn {
    async fn sign_in(&self, sign_in: SignIn, response: &mut Response) {
        let payload = match serde_json::to_vec(&sign_in.identity) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize identity");
                return;
            }
        };
        let cookie = format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            URL_SAFE_NO_PAD.encode(payload)
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "session cookie is not a valid header value"),
        }
    }
}

fn session_identity(headers: &HeaderMap) -> Option<ClaimsIdentity> {
    let value = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)?;
    let payload = URL_SAFE_NO_PAD.decode(value).ok()?;
    serde_json::from_slice(&payload).ok()
}

fn home(
    caption: &str,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Html<String> {
    Html(home_page(
        caption,
        session_identity(&headers).as_ref(),
        query.get("error").map(String::as_str),
    ))
}

fn home_page(caption: &str, identity: Option<&ClaimsIdentity>, error: Option<&str>) -> String {
    let mut body = String::from("<!doctype html><html><body>");

    if let Some(error) = error {
        body.push_str(&format!("<p>Sign-in failed: {}</p>", escape(error)));
    }

    match identity {
        Some(identity) => {
            body.push_str(&format!(
                "<p>Signed in as {}</p><ul>",
                escape(identity.name().unwrap_or("(no name)"))
            ));
            for claim in identity.claims() {
                body.push_str(&format!(
                    "<li><code>{}</code>: {}</li>",
                    escape(&claim.kind),
                    escape(&claim.value)
                ));
            }
            body.push_str("</ul><p><a href=\"/logout\">Sign out</a></p>");
        }
        None => body.push_str(&format!(
            "<p><a href=\"/login\">Sign in with {}</a></p>",
            escape(caption)
        )),
    }

    body.push_str("</body></html>");
    body
}

async fn logout() -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"),
            ),
        ],
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_out_page_links_with_caption() {
        let options = OAuthOptions::new("Untappd", "id", "secret").with_caption("Untappd <beta>");
        let page = home_page(options.caption(), None, Some("access_denied"));

        assert!(page.contains("Sign-in failed: access_denied"));
        assert!(page.contains("<a href=\"/login\">Sign in with Untappd &lt;beta&gt;</a>"));
    }
}
