mod provider;
mod strava;
mod untappd;

pub use provider::{OAuthProvider, ProfileFields, ProfileSource, UserInfoAuth};
pub use strava::StravaProvider;
pub use untappd::UntappdProvider;
