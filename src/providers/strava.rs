use crate::{OAuthProvider, ProfileFields, ProfileSource};

// References:
// - https://developers.strava.com/docs/authentication/

const AUTHORIZE_URL: &str = "https://www.strava.com/oauth/authorize";
const TOKEN_URL: &str = "https://www.strava.com/oauth/token";

const DEFAULT_SCOPE: &[&str] = &["read"];

const PROFILE_FIELDS: ProfileFields = ProfileFields {
    id: "/id",
    display_name: &["/firstname", "/lastname"],
    email: "/email",
    link: "/profile",
};

/// Strava returns the athlete inline with the token, so no second request is made.
#[derive(Debug, Clone)]
pub struct StravaProvider {
    authorize_url: String,
    token_url: String,
}

impl Default for StravaProvider {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }
}

impl OAuthProvider for StravaProvider {
    fn id(&self) -> &'static str {
        "strava"
    }

    fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    fn token_url(&self) -> &str {
        &self.token_url
    }

    fn default_scope(&self) -> &'static [&'static str] {
        DEFAULT_SCOPE
    }

    fn profile_source(&self) -> ProfileSource {
        ProfileSource::Inline("/athlete")
    }

    fn profile_fields(&self) -> ProfileFields {
        PROFILE_FIELDS
    }
}

impl StravaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}
