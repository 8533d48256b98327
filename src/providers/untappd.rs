use crate::{OAuthProvider, ProfileFields, ProfileSource, UserInfoAuth};

// References:
// - https://untappd.com/api/docs#authentication

const AUTHORIZE_URL: &str = "https://untappd.com/oauth/authenticate/";
const TOKEN_URL: &str = "https://untappd.com/oauth/authorize/";
const USER_INFO_URL: &str = "https://api.untappd.com/v4/user/info";

const PROFILE_FIELDS: ProfileFields = ProfileFields {
    id: "/uid",
    display_name: &["/user_name"],
    email: "/settings/email_address",
    link: "/untappd_url",
};

/// Untappd wraps every payload in `response` and needs a user-info call for the profile.
#[derive(Debug, Clone)]
pub struct UntappdProvider {
    authorize_url: String,
    token_url: String,
    user_info_url: String,
}

impl Default for UntappdProvider {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            user_info_url: USER_INFO_URL.to_string(),
        }
    }
}

impl OAuthProvider for UntappdProvider {
    fn id(&self) -> &'static str {
        "untappd"
    }

    fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    fn token_url(&self) -> &str {
        &self.token_url
    }

    fn default_scope(&self) -> &'static [&'static str] {
        &[]
    }

    fn profile_source(&self) -> ProfileSource {
        ProfileSource::UserInfo("/response/user")
    }

    fn profile_fields(&self) -> ProfileFields {
        PROFILE_FIELDS
    }

    fn user_info_url(&self) -> Option<&str> {
        Some(&self.user_info_url)
    }

    fn user_info_auth(&self) -> UserInfoAuth {
        UserInfoAuth::QueryParameter("access_token")
    }

    fn token_envelope(&self) -> Option<&'static str> {
        Some("/response")
    }
}

impl UntappdProvider {
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

    pub fn with_user_info_url(mut self, url: impl Into<String>) -> Self {
        self.user_info_url = url.into();
        self
    }
}
