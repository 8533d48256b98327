/// Where the user profile lives once the code has been exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// Embedded in the token response at this JSON pointer.
    Inline(&'static str),
    /// Fetched from [`OAuthProvider::user_info_url`]; the profile is at this pointer of that body.
    UserInfo(&'static str),
}

/// How the user-info request carries the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInfoAuth {
    Bearer,
    QueryParameter(&'static str),
}

/// JSON pointers into the provider's profile document. Anything not listed is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileFields {
    pub id: &'static str,
    /// Joined with a single space, skipping empty parts.
    pub display_name: &'static [&'static str],
    pub email: &'static str,
    pub link: &'static str,
}

pub trait OAuthProvider: Send + Sync {
    /// Lowercase provider name, used to namespace provider-specific claims.
    fn id(&self) -> &'static str;
    fn authorize_url(&self) -> &str;
    fn token_url(&self) -> &str;
    fn default_scope(&self) -> &'static [&'static str];
    fn profile_source(&self) -> ProfileSource;
    fn profile_fields(&self) -> ProfileFields;

    fn user_info_url(&self) -> Option<&str> {
        None
    }

    fn user_info_auth(&self) -> UserInfoAuth {
        UserInfoAuth::Bearer
    }

    /// Pointer to the object holding `access_token` and `token_type`; root when `None`.
    fn token_envelope(&self) -> Option<&'static str> {
        None
    }
}
