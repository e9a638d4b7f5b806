//! Credential and OAuth session models.
//!
//! Credentials are always addressed by a [`CredentialKey`], the composite
//! of tenant and connection. There is no lookup by connection alone, so a
//! caller cannot read another tenant's secret by accident.
//!
//! Secret material lives in [`Secret`], whose `Debug` output is redacted;
//! credentials and tokens can be logged with `?` without leaking.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SyncError};

/// Composite tenant + connection key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialKey {
    tenant_id: String,
    connection_id: String,
}

impl CredentialKey {
    pub fn new(tenant_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            connection_id: connection_id.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.connection_id)
    }
}

/// A secret string with redacted `Debug`/`Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw secret. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Obtained through an OAuth2 code exchange; refreshable.
    OAuth2,
    /// Access token injected directly; never refreshed.
    DirectToken,
    /// Static API key; never expires.
    ApiKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    /// Irrecoverable refresh failure; requires re-authorization.
    Error,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Error => "error",
        }
    }
}

/// Per-tenant, per-connection secret material plus expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub key: CredentialKey,
    /// Source the connection authorizes (e.g. `"github"`).
    pub source: String,
    pub kind: CredentialKind,
    pub access_token: Secret,
    pub refresh_token: Option<Secret>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// A static API key credential.
    pub fn api_key(key: CredentialKey, source: impl Into<String>, api_key: Secret) -> Self {
        let now = Utc::now();
        Self {
            key,
            source: source.into(),
            kind: CredentialKind::ApiKey,
            access_token: api_key,
            refresh_token: None,
            expires_at: None,
            status: CredentialStatus::Active,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An injected access token that will not be refreshed.
    pub fn direct_token(
        key: CredentialKey,
        source: impl Into<String>,
        token: Secret,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            kind: CredentialKind::DirectToken,
            expires_at,
            ..Self::api_key(key, source, token)
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.kind == CredentialKind::OAuth2 && self.refresh_token.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// True when the token expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at.is_some_and(|exp| exp - margin <= now)
    }

    pub fn token(&self) -> Token {
        Token {
            value: self.access_token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// An access token handed to a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub value: Secret,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn secret(&self) -> &str {
        self.value.expose()
    }
}

/// States of the two-phase OAuth flow.
///
/// ```text
/// Initiated ──exchange ok──▶ Exchanged ──stored──▶ Active
///     │                          │
///     └──────── failure ─────────┴──────────────▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSessionState {
    Initiated,
    Exchanged,
    Active,
    Failed,
}

impl AuthSessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthSessionState::Initiated => "initiated",
            AuthSessionState::Exchanged => "exchanged",
            AuthSessionState::Active => "active",
            AuthSessionState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(AuthSessionState::Initiated),
            "exchanged" => Some(AuthSessionState::Exchanged),
            "active" => Some(AuthSessionState::Active),
            "failed" => Some(AuthSessionState::Failed),
            _ => None,
        }
    }
}

/// A short-lived OAuth authorization session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Opaque `state` value round-tripped through the provider redirect.
    pub state_token: String,
    pub key: CredentialKey,
    pub source: String,
    pub state: AuthSessionState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Move to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: AuthSessionState) -> Result<()> {
        use AuthSessionState::*;
        let allowed = matches!(
            (self.state, next),
            (Initiated, Exchanged) | (Exchanged, Active) | (Initiated, Failed) | (Exchanged, Failed)
        );
        if !allowed {
            return Err(SyncError::Credential(format!(
                "auth session cannot move from {} to {}",
                self.state.as_str(),
                next.as_str()
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.transition(AuthSessionState::Failed).is_ok() {
            self.error = Some(reason.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth(expires_in: i64) -> Credential {
        let now = Utc::now();
        Credential {
            key: CredentialKey::new("t1", "c1"),
            source: "github".into(),
            kind: CredentialKind::OAuth2,
            access_token: Secret::new("access-secret-value"),
            refresh_token: Some(Secret::new("refresh-secret-value")),
            expires_at: Some(now + Duration::seconds(expires_in)),
            status: CredentialStatus::Active,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let cred = oauth(3600);
        let dbg = format!("{cred:?}");
        assert!(!dbg.contains("secret-value"));
        assert!(dbg.contains("***"));
    }

    #[test]
    fn test_expiry_margin() {
        let now = Utc::now();
        let cred = oauth(30);
        assert!(cred.expires_within(now, Duration::seconds(60)));
        assert!(!cred.is_expired(now));
        let fresh = oauth(3600);
        assert!(!fresh.expires_within(now, Duration::seconds(60)));
    }

    #[test]
    fn test_direct_token_cannot_refresh() {
        let cred = Credential::direct_token(
            CredentialKey::new("t", "c"),
            "slack",
            Secret::new("x"),
            None,
        );
        assert!(!cred.can_refresh());
        assert!(oauth(10).can_refresh());
    }

    #[test]
    fn test_session_transitions() {
        let now = Utc::now();
        let mut s = AuthSession {
            state_token: "st".into(),
            key: CredentialKey::new("t", "c"),
            source: "github".into(),
            state: AuthSessionState::Initiated,
            error: None,
            created_at: now,
            expires_at: now + Duration::minutes(10),
        };
        assert!(s.transition(AuthSessionState::Active).is_err());
        s.transition(AuthSessionState::Exchanged).unwrap();
        s.transition(AuthSessionState::Active).unwrap();
        assert!(s.transition(AuthSessionState::Failed).is_err());
        assert_eq!(s.state, AuthSessionState::Active);
    }
}
