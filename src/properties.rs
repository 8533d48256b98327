use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub(crate) const CORRELATION_KEY: &str = ".xsrf";
pub(crate) const SCOPE_KEY: &str = "scope";

/// Host-owned state carried through the provider round trip inside `state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    items: BTreeMap<String, String>,
}

impl AuthenticationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    /// Overrides the comma-joined scope from the options for this challenge only.
    pub fn with_scope(self, scope: impl Into<String>) -> Self {
        self.with_item(SCOPE_KEY, scope)
    }

    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    pub fn set_redirect_uri(&mut self, redirect_uri: Option<String>) {
        self.redirect_uri = redirect_uri;
    }

    pub fn item(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn items(&self) -> &BTreeMap<String, String> {
        &self.items
    }

    pub fn insert_item(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.insert(key.into(), value.into());
    }

    pub fn remove_item(&mut self, key: &str) -> Option<String> {
        self.items.remove(key)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.item(CORRELATION_KEY)
    }

    pub(crate) fn set_correlation_id(&mut self, correlation_id: String) {
        self.items.insert(CORRELATION_KEY.to_string(), correlation_id);
    }

    pub(crate) fn take_correlation_id(&mut self) -> Option<String> {
        self.items.remove(CORRELATION_KEY)
    }

    pub(crate) fn scope_override(&self) -> Option<&str> {
        self.item(SCOPE_KEY)
    }
}
