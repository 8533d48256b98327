use reqwest::{
    Client, Response,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::{OAuthError, OAuthProvider, ProfileSource, TokenResponse, UserInfoAuth};

/// Token endpoint fields the handler reads. Unknown fields are ignored and
/// non-string values read as absent, so a numeric token is a missing token.
#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(default, deserialize_with = "string_or_none")]
    access_token: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    token_type: Option<String>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

pub(crate) struct TokenRequest<'a> {
    pub code: &'a str,
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

impl TokenRequest<'_> {
    fn form(&self) -> [(&'static str, &str); 5] {
        [
            ("grant_type", "authorization_code"),
            ("code", self.code),
            ("redirect_uri", self.redirect_uri),
            ("client_id", self.client_id),
            ("client_secret", self.client_secret),
        ]
    }
}

/// Exchanges the code and resolves the profile, inline or through the user-info endpoint.
pub(crate) async fn exchange_code<P: OAuthProvider>(
    http: &Client,
    provider: &P,
    request: &TokenRequest<'_>,
) -> Result<TokenResponse, OAuthError> {
    let response = http
        .post(provider.token_url())
        .header(ACCEPT, "application/json")
        .form(&request.form())
        .send()
        .await?;
    let raw = read_json(response).await?;

    let envelope = match provider.token_envelope() {
        Some(pointer) => raw.pointer(pointer),
        None => Some(&raw),
    };
    let Some(envelope) = envelope else {
        return Err(OAuthError::MissingAccessToken);
    };
    let TokenEnvelope {
        access_token,
        token_type,
    } = TokenEnvelope::deserialize(envelope).map_err(|err| OAuthError::InvalidResponse {
        message: err.to_string(),
        body: raw.to_string(),
    })?;

    let access_token = match access_token {
        Some(token) if !token.trim().is_empty() => token,
        _ => return Err(OAuthError::MissingAccessToken),
    };

    let profile = match provider.profile_source() {
        ProfileSource::Inline(pointer) => raw.pointer(pointer).cloned().unwrap_or(Value::Null),
        ProfileSource::UserInfo(pointer) => {
            let body = fetch_user_info(http, provider, &access_token).await?;
            body.pointer(pointer).cloned().unwrap_or(Value::Null)
        }
    };

    Ok(TokenResponse {
        access_token,
        token_type,
        profile,
        raw,
    })
}

async fn fetch_user_info<P: OAuthProvider>(
    http: &Client,
    provider: &P,
    access_token: &str,
) -> Result<Value, OAuthError> {
    let Some(url) = provider.user_info_url() else {
        return Err(OAuthError::InvalidOptions(format!(
            "provider {} reads the profile from a user-info endpoint but has none",
            provider.id()
        )));
    };
    debug!(provider = provider.id(), "fetching user info");

    let mut builder = http.get(url).header(ACCEPT, "application/json");
    builder = match provider.user_info_auth() {
        UserInfoAuth::Bearer => builder.header(AUTHORIZATION, format!("Bearer {access_token}")),
        UserInfoAuth::QueryParameter(name) => builder.query(&[(name, access_token)]),
    };

    read_json(builder.send().await?).await
}

async fn read_json(response: Response) -> Result<Value, OAuthError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(OAuthError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
        message: err.to_string(),
        body,
    })
}
