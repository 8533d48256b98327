use std::collections::HashMap;

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, SET_COOKIE},
};
use tracing::warn;

use crate::CorrelationStore;

/// Correlation values kept in cookies on the user agent.
///
/// Reads the `Cookie` headers of the inbound request and records every change so
/// it can be written back as `Set-Cookie` on the response.
#[derive(Debug, Clone, Default)]
pub struct CookieCorrelationStore {
    cookies: HashMap<String, String>,
    pending: Vec<(String, Option<String>)>,
}

impl CookieCorrelationStore {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self {
            cookies,
            pending: Vec::new(),
        }
    }

    /// Appends one `Set-Cookie` per change. `secure` adds the `Secure` attribute.
    pub fn apply(self, headers: &mut HeaderMap, secure: bool) {
        for (name, value) in self.pending {
            let cookie = render_cookie(&name, value.as_deref(), secure);
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(_) => warn!(cookie = %name, "skipping cookie with invalid characters"),
            }
        }
    }
}

impl CorrelationStore for CookieCorrelationStore {
    fn insert(&mut self, key: &str, value: String) {
        self.cookies.insert(key.to_string(), value.clone());
        self.pending.push((key.to_string(), Some(value)));
    }

    fn take(&mut self, key: &str) -> Option<String> {
        let value = self.cookies.remove(key)?;
        self.pending.push((key.to_string(), None));
        Some(value)
    }
}

fn render_cookie(name: &str, value: Option<&str>, secure: bool) -> String {
    let mut cookie = match value {
        Some(value) => format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax"),
        None => format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"),
    };
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_cookies_and_records_changes() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; .oauth.correlation.Strava=xyz"));
        let mut store = CookieCorrelationStore::from_headers(&headers);

        assert_eq!(store.take(".oauth.correlation.Strava").as_deref(), Some("xyz"));
        assert_eq!(store.take(".oauth.correlation.Strava"), None);
        store.insert("b", "2".to_string());

        let mut response = HeaderMap::new();
        store.apply(&mut response, true);
        let cookies: Vec<_> = response
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_string())
            .collect();

        assert_eq!(
            cookies,
            vec![
                ".oauth.correlation.Strava=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax; Secure",
                "b=2; Path=/; HttpOnly; SameSite=Lax; Secure",
            ]
        );
    }
}
