//! Per-user session types.
//!
//! Users reach the assistant through heterogeneous identifier spaces
//! (phone number, email address, web session). A [`SessionKey`] keeps the
//! space and the identifier together so that `+15551234567` as a phone and
//! the same string as a web-session id never collapse into one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AbotError;

/// The identifier space a flexible id belongs to.
///
/// The numeric values are the `flexidtype` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexIdType {
    Email,
    Phone,
    WebSession,
}

impl FlexIdType {
    /// The integer code used on the HTTP surface.
    pub fn code(&self) -> u8 {
        match self {
            Self::Email => 1,
            Self::Phone => 2,
            Self::WebSession => 3,
        }
    }
}

impl TryFrom<i64> for FlexIdType {
    type Error = AbotError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Email),
            2 => Ok(Self::Phone),
            3 => Ok(Self::WebSession),
            other => Err(AbotError::bad_request(format!(
                "unknown flexidtype {other}"
            ))),
        }
    }
}

impl std::str::FromStr for FlexIdType {
    type Err = AbotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code: i64 = s
            .trim()
            .parse()
            .map_err(|_| AbotError::bad_request(format!("flexidtype is not an integer: {s:?}")))?;
        Self::try_from(code)
    }
}

impl std::fmt::Display for FlexIdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::WebSession => "web",
        })
    }
}

/// Identity of a session: `(identifier space, identifier)`.
///
/// Equality and hashing cover the pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub space: FlexIdType,
    pub id: String,
}

impl SessionKey {
    /// Build a key, rejecting blank identifiers.
    pub fn new(space: FlexIdType, id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AbotError::bad_request("flexid is empty"));
        }
        Ok(Self { space, id })
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.space, self.id)
    }
}

/// Ephemeral per-user state.
///
/// Lives only in memory; used to serialize a user's requests and to
/// remember which plugin the conversation is currently with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,

    /// Most recent utterance received from the user.
    #[serde(default)]
    pub last_utterance: Option<String>,

    /// Plugin that answered the most recent dispatched utterance.
    #[serde(default)]
    pub last_plugin: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session for `key`.
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            last_utterance: None,
            last_plugin: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record an incoming utterance.
    pub fn record_utterance(&mut self, utterance: &str) {
        self.last_utterance = Some(utterance.to_string());
        self.updated_at = Utc::now();
    }

    /// Record the plugin that handled the latest utterance.
    pub fn record_plugin(&mut self, plugin: &str) {
        self.last_plugin = Some(plugin.to_string());
        self.updated_at = Utc::now();
    }
}
