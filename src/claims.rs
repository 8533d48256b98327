//! Normalized identity and the profile → claims mapping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProfileFields;

pub mod claim_types {
    pub const NAME_IDENTIFIER: &str =
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
    pub const NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
    pub const EMAIL: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
    pub const ROLE: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";
}

pub const STRING_VALUE_TYPE: &str = "http://www.w3.org/2001/XMLSchema#string";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub kind: String,
    pub value: String,
    pub value_type: String,
    pub issuer: String,
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            value_type: STRING_VALUE_TYPE.to_string(),
            issuer: issuer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    authentication_type: String,
    name_claim_type: String,
    role_claim_type: String,
    claims: Vec<Claim>,
}

impl ClaimsIdentity {
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            name_claim_type: claim_types::NAME.to_string(),
            role_claim_type: claim_types::ROLE.to_string(),
            claims: Vec::new(),
        }
    }

    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    pub fn name_claim_type(&self) -> &str {
        &self.name_claim_type
    }

    pub fn role_claim_type(&self) -> &str {
        &self.role_claim_type
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    pub fn remove_claims(&mut self, kind: &str) {
        self.claims.retain(|claim| claim.kind != kind);
    }

    pub fn find_first(&self, kind: &str) -> Option<&Claim> {
        self.claims.iter().find(|claim| claim.kind == kind)
    }

    pub fn name(&self) -> Option<&str> {
        self.find_first(&self.name_claim_type)
            .map(|claim| claim.value.as_str())
    }

    /// Same claims, name claim type and role claim type under a different authentication type.
    pub fn with_authentication_type(mut self, authentication_type: impl Into<String>) -> Self {
        self.authentication_type = authentication_type.into();
        self
    }
}

pub fn provider_claim_type(provider_id: &str, field: &str) -> String {
    format!("urn:{provider_id}:{field}")
}

/// Builds the identity for `profile`. Missing or empty fields are skipped, never an error.
pub fn map_profile(
    fields: &ProfileFields,
    provider_id: &str,
    authentication_type: &str,
    profile: &Value,
) -> ClaimsIdentity {
    let mut identity = ClaimsIdentity::new(authentication_type);
    let issuer = authentication_type;

    if let Some(id) = profile_string(profile, fields.id) {
        identity.add_claim(Claim::new(claim_types::NAME_IDENTIFIER, id, issuer));
    }

    if let Some(name) = display_name(profile, fields.display_name) {
        identity.add_claim(Claim::new(claim_types::NAME, name.clone(), issuer));
        identity.add_claim(Claim::new(
            provider_claim_type(provider_id, "name"),
            name,
            issuer,
        ));
    }

    if let Some(email) = profile_string(profile, fields.email) {
        identity.add_claim(Claim::new(claim_types::EMAIL, email, issuer));
    }

    if let Some(link) = profile_string(profile, fields.link) {
        identity.add_claim(Claim::new(
            provider_claim_type(provider_id, "url"),
            link,
            issuer,
        ));
    }

    identity
}

/// Strings as-is, numbers rendered; anything else or blank yields `None`.
pub(crate) fn profile_string(profile: &Value, pointer: &str) -> Option<String> {
    let value = match profile.pointer(pointer)? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn display_name(profile: &Value, pointers: &[&str]) -> Option<String> {
    let parts: Vec<String> = pointers
        .iter()
        .filter_map(|pointer| profile_string(profile, pointer))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}
