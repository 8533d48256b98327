use serde_json::Value;
use url::{Url, form_urlencoded};

use crate::{AuthFailure, AuthenticationProperties, ClaimsIdentity, OAuthError};

/// The parts of the inbound request the handler reads. Built by the host adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRequest {
    pub scheme: String,
    /// Host with the port when it is not the scheme default, as sent in `Host`.
    pub host: String,
    /// Mount point of the application, empty or starting with `/`.
    pub path_base: String,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
}

impl HostRequest {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            path_base: String::new(),
            path: path.into(),
            query: String::new(),
        }
    }

    pub fn with_path_base(mut self, path_base: impl Into<String>) -> Self {
        self.path_base = path_base.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn from_url(url: &str) -> Result<Self, OAuthError> {
        let url = Url::parse(url)?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(OAuthError::InvalidOptions(format!(
                    "request url has no host: {url}"
                )));
            }
        };
        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            path_base: String::new(),
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
        })
    }

    /// scheme + host + path base
    pub fn base_uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path_base)
    }

    pub fn current_uri(&self) -> String {
        let mut uri = format!("{}{}", self.base_uri(), self.path);
        if !self.query.is_empty() {
            uri.push('?');
            uri.push_str(&self.query);
        }
        uri
    }

    /// Every value of `name` in the query, decoded.
    pub fn query_values(&self, name: &str) -> Vec<String> {
        form_urlencoded::parse(self.query.as_bytes())
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .collect()
    }
}

/// `code` and `state` from the callback query, each present exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl CallbackParams {
    pub fn from_request(request: &HostRequest) -> Result<Self, AuthFailure> {
        let code = single_value(request, "code").ok_or_else(AuthFailure::malformed)?;
        let state = single_value(request, "state").ok_or_else(AuthFailure::malformed)?;
        Ok(Self { code, state })
    }
}

fn single_value(request: &HostRequest, name: &str) -> Option<String> {
    let mut values = request.query_values(name);
    if values.len() == 1 { values.pop() } else { None }
}

/// Whether the handler answers bare 401s or only explicit challenges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthenticationMode {
    Active,
    #[default]
    Passive,
}

/// A host's request that one or more authentication types challenge the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    pub authentication_types: Vec<String>,
    pub properties: AuthenticationProperties,
}

impl Challenge {
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_types: vec![authentication_type.into()],
            properties: AuthenticationProperties::default(),
        }
    }

    pub fn with_properties(mut self, properties: AuthenticationProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// Parsed token endpoint answer. Lives for one callback only.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub profile: Value,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationTicket {
    pub identity: Option<ClaimsIdentity>,
    pub properties: AuthenticationProperties,
}

/// Identity the host should issue a session for.
#[derive(Debug, Clone, PartialEq)]
pub struct SignIn {
    pub identity: ClaimsIdentity,
    pub properties: AuthenticationProperties,
}

/// What the host should do after the callback phase.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    /// Not the callback path; continue the pipeline.
    NotHandled,
    /// No ticket could be produced; respond 500 and stop.
    ServerError,
    Handled {
        sign_in: Option<SignIn>,
        redirect: Option<String>,
        /// When false the host keeps running the pipeline after signing in.
        request_completed: bool,
    },
}
