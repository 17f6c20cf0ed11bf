use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::models::{DocHandle, DocumentSummary, Login};

/// Most recent documents kept in the session
pub const RECENT_DOCS_LIMIT: usize = 20;

/// Signed-in user state, created once at startup and passed to whatever needs it
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub pfp_url: Option<String>,
    #[serde(default)]
    pub recent_docs: Vec<RecentDoc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentDoc {
    pub doc_key: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Claims read from the session token. The signature is not checked here;
/// the backend does that on every request.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    /// Seconds since the epoch
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<u64>,
}

impl Claims {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let now = u64::try_from(now.timestamp()).unwrap_or(0);
        self.exp.is_some_and(|exp| exp <= now)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.exp?).ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

/// NumericDate may carry a fraction; whole seconds are enough here
fn numeric_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let secs = Option::<f64>::deserialize(deserializer)?;
    Ok(secs.filter(|s| s.is_finite() && *s >= 0.0).map(|s| s as u64))
}

impl SessionContext {
    pub fn signed_in(&mut self, email: &str, login: Login) {
        self.token = Some(login.token);
        self.email = Some(email.to_string());
        self.pfp_url = login.pfp_url;
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }

    /// Move `handle` to the front of the recent list
    pub fn remember_doc(&mut self, handle: &DocHandle, title: Option<&str>) {
        let title = title.filter(|t| !t.is_empty()).map(str::to_string);
        let previous = self
            .recent_docs
            .iter()
            .position(|d| d.doc_key == handle.as_str())
            .map(|i| self.recent_docs.remove(i));
        let title = title.or_else(|| previous.and_then(|p| p.title));
        self.recent_docs.insert(0, RecentDoc { doc_key: handle.to_string(), title });
        self.recent_docs.truncate(RECENT_DOCS_LIMIT);
    }

    /// Replace the recent list with a fresh listing from the backend
    pub fn refresh_docs(&mut self, docs: &[DocumentSummary]) {
        self.recent_docs = docs
            .iter()
            .take(RECENT_DOCS_LIMIT)
            .map(|d| RecentDoc { doc_key: d.doc_key.clone(), title: d.title.clone() })
            .collect();
    }

    pub fn claims(&self) -> Option<Claims> {
        self.token.as_deref().and_then(peek_claims)
    }

    /// Token to use for requests, or `None` if absent or already expired
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<String> {
        let token = self.token.as_ref()?;
        match peek_claims(token) {
            Some(claims) if claims.is_expired(now) => {
                warn!("Stored session token expired");
                None
            }
            _ => Some(token.clone()),
        }
    }
}

/// Decode a JWT's claims without verifying its signature or expiry.
/// Tokens that are not JWTs yield `None`.
pub fn peek_claims(token: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    match decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            debug!("Session token is not a readable JWT: {}", e);
            None
        }
    }
}

/// Hand-off URL for a login started by an external tool.
///
/// Appends `token` and `email` to `redirect`, using `&` when it already has a query.
pub fn login_redirect_url(redirect: &str, token: &str, email: &str) -> String {
    let separator = if redirect.contains('?') { '&' } else { '?' };
    let query = reqwest::Url::parse_with_params("http://x/", &[("token", token), ("email", email)])
        .ok()
        .and_then(|u| u.query().map(str::to_string))
        .unwrap_or_default();
    format!("{}{}{}", redirect, separator, query)
}

/// External redirects receive the token instead of the local session
pub fn is_external_redirect(redirect: &str) -> bool {
    redirect.starts_with("vscode://")
}
