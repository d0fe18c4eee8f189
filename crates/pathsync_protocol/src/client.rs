//! Client identity, registration and authentication messages.

use crate::types::ClientId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of sync client agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Desktop application.
    Desktop,
    /// Command-line tool.
    Cli,
}

/// Platform and version fingerprint of a client installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Host node name.
    pub node: String,
    /// Operating system family.
    pub os: String,
    /// Operating system release.
    pub os_release: String,
    /// Client kind.
    pub client_type: ClientType,
    /// Client version.
    pub version: String,
}

/// User credentials submitted at registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Login name.
    pub login: String,
    /// Password.
    pub password: String,
    /// Second factor code, when the account requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp_code: Option<String>,
}

impl Credentials {
    /// Creates credentials without a second factor.
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            totp_code: None,
        }
    }

    /// Attaches a second factor code.
    pub fn with_totp(mut self, code: impl Into<String>) -> Self {
        self.totp_code = Some(code.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("totp_code", &self.totp_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Registration request from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Account credentials.
    pub credentials: Credentials,
    /// Client-generated identifier.
    pub client_id: ClientId,
    /// Device fingerprint.
    pub info: ClientInfo,
}

/// Registration response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// The registered client id.
    pub client_id: ClientId,
    /// Bearer secret the client must persist.
    pub client_token: String,
}

/// How an authenticated session is handed back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    /// Browser session cookies.
    Cookie,
    /// Access/refresh bearer tokens.
    Token,
}

/// Authentication request from a registered client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Session kind requested.
    pub kind: AuthKind,
    /// Client identifier.
    pub client_id: ClientId,
    /// Client bearer secret.
    pub token: String,
    /// Current device fingerprint.
    pub info: ClientInfo,
}

/// Access/refresh token pair issued for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    /// Short-lived access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
}

/// A session cookie to set on the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Lifetime in seconds.
    pub max_age: u64,
    /// Whether the cookie is hidden from scripts.
    pub http_only: bool,
}

/// Owner-facing view of a registered client. Never carries the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncClientSummary {
    /// Client id.
    pub id: ClientId,
    /// Device fingerprint.
    pub info: ClientInfo,
    /// Administrative switch.
    pub enabled: bool,
    /// Token expiry (Unix seconds).
    pub token_expiration: u64,
    /// Address of the latest access.
    pub current_ip: Option<String>,
    /// Address of the access before it.
    pub last_ip: Option<String>,
    /// Latest access (Unix seconds).
    pub current_access: Option<u64>,
    /// Access before it (Unix seconds).
    pub last_access: Option<u64>,
    /// Registration time (Unix seconds).
    pub created_at: u64,
    /// Number of sync paths bound to this client.
    pub paths: usize,
}

/// Authentication response.
///
/// Both variants may carry a rotated client token that the client must
/// persist in place of the one it authenticated with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthResponse {
    /// Bearer token session.
    #[serde(rename_all = "camelCase")]
    Tokens {
        /// Short-lived access token.
        access_token: String,
        /// Refresh token.
        refresh_token: String,
        /// Rotated client token, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token_update: Option<String>,
    },
    /// Cookie session.
    #[serde(rename_all = "camelCase")]
    Cookies {
        /// Cookies to set.
        cookies: Vec<SessionCookie>,
        /// Rotated client token, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token_update: Option<String>,
    },
}

impl AuthResponse {
    /// Creates a token response.
    pub fn tokens(tokens: SessionTokens, client_token_update: Option<String>) -> Self {
        Self::Tokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            client_token_update,
        }
    }

    /// Creates a cookie response.
    pub fn cookies(cookies: Vec<SessionCookie>, client_token_update: Option<String>) -> Self {
        Self::Cookies {
            cookies,
            client_token_update,
        }
    }

    /// Returns the rotated client token, if one was issued.
    pub fn client_token_update(&self) -> Option<&str> {
        match self {
            Self::Tokens {
                client_token_update,
                ..
            }
            | Self::Cookies {
                client_token_update,
                ..
            } => client_token_update.as_deref(),
        }
    }
}
