//! Process configuration.
//!
//! [`AbotConfig`] is resolved from environment variables with documented
//! defaults. Every field has a default so a bare environment produces a
//! working local setup:
//!
//! | variable | default |
//! |---|---|
//! | `ABOT_RPC_HOST` | `127.0.0.1` |
//! | `ABOT_RPC_PORT` | `4001` |
//! | `ABOT_HTTP_ADDR` | `:8080` |
//! | `ABOT_DISPATCH_TIMEOUT_MS` | `5000` |
//! | `ABOT_FALLBACK_REPLY` | unset |
//! | `ABOT_REJECT_BUSY` | `false` |
//! | `ABOT_SESSION_IDLE_SECS` | `1800` |
//! | `ABOT_MAX_SESSIONS` | `10000` |
//! | `ABOT_MODEL_PATH` | unset |
//! | `ABOT_TRAINING_PATH` | unset |
//! | `ABOT_URL` | unset |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::Environment;
use crate::error::{AbotError, Result};

/// Root configuration for the abot core process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbotConfig {
    /// Host the RPC endpoint binds to.
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,

    /// Port the RPC endpoint binds to.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// HTTP listen address. A leading `:` means all interfaces.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Per-call plugin dispatch deadline.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Reply sent with 200 when no plugin matches. Unset means 503.
    #[serde(default)]
    pub fallback_reply: Option<String>,

    /// Answer 429 instead of queueing when a session already has a
    /// request in flight.
    #[serde(default)]
    pub reject_busy_sessions: bool,

    /// Idle sessions older than this are evicted.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Session count that triggers eviction of idle sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Where the trained classifier model is loaded from and saved to.
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Annotated training corpus used when no model file exists.
    #[serde(default)]
    pub training_path: Option<PathBuf>,

    /// Public URL of the deployment. Not used by the core.
    #[serde(default)]
    pub url: Option<String>,
}

fn default_rpc_host() -> String {
    "127.0.0.1".into()
}

fn default_rpc_port() -> u16 {
    4001
}

fn default_http_addr() -> String {
    ":8080".into()
}

fn default_dispatch_timeout_ms() -> u64 {
    5000
}

fn default_session_idle_secs() -> u64 {
    1800
}

fn default_max_sessions() -> usize {
    10_000
}

impl Default for AbotConfig {
    fn default() -> Self {
        Self {
            rpc_host: default_rpc_host(),
            rpc_port: default_rpc_port(),
            http_addr: default_http_addr(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            fallback_reply: None,
            reject_busy_sessions: false,
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
            model_path: None,
            training_path: None,
            url: None,
        }
    }
}

impl AbotConfig {
    /// Resolve configuration from environment variables.
    ///
    /// Unset variables take their default; set but unparseable values are
    /// a configuration error.
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(host) = non_empty(env, "ABOT_RPC_HOST") {
            cfg.rpc_host = host;
        }
        if let Some(port) = non_empty(env, "ABOT_RPC_PORT") {
            cfg.rpc_port = parse_var("ABOT_RPC_PORT", &port)?;
        }
        if let Some(addr) = non_empty(env, "ABOT_HTTP_ADDR") {
            cfg.http_addr = addr;
        }
        if let Some(ms) = non_empty(env, "ABOT_DISPATCH_TIMEOUT_MS") {
            cfg.dispatch_timeout_ms = parse_var("ABOT_DISPATCH_TIMEOUT_MS", &ms)?;
        }
        cfg.fallback_reply = non_empty(env, "ABOT_FALLBACK_REPLY");
        if let Some(flag) = non_empty(env, "ABOT_REJECT_BUSY") {
            cfg.reject_busy_sessions = parse_bool("ABOT_REJECT_BUSY", &flag)?;
        }
        if let Some(secs) = non_empty(env, "ABOT_SESSION_IDLE_SECS") {
            cfg.session_idle_secs = parse_var("ABOT_SESSION_IDLE_SECS", &secs)?;
        }
        if let Some(max) = non_empty(env, "ABOT_MAX_SESSIONS") {
            cfg.max_sessions = parse_var("ABOT_MAX_SESSIONS", &max)?;
        }
        cfg.model_path = non_empty(env, "ABOT_MODEL_PATH").map(PathBuf::from);
        cfg.training_path = non_empty(env, "ABOT_TRAINING_PATH").map(PathBuf::from);
        cfg.url = non_empty(env, "ABOT_URL");

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check semantic constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_timeout_ms == 0 {
            return Err(AbotError::config("dispatch timeout must be positive"));
        }
        if self.max_sessions == 0 {
            return Err(AbotError::config("max sessions must be positive"));
        }
        self.http_socket_addr()?;
        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// `host:port` of the RPC endpoint.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }

    /// Resolve [`http_addr`](Self::http_addr) to a socket address.
    pub fn http_socket_addr(&self) -> Result<SocketAddr> {
        let raw = self.http_addr.trim();
        let full = match raw.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => raw.to_string(),
        };
        full.parse()
            .map_err(|_| AbotError::config(format!("invalid http address: {raw:?}")))
    }
}

fn non_empty(env: &dyn Environment, name: &str) -> Option<String> {
    env.get_var(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| AbotError::config(format!("{name} has invalid value {raw:?}")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AbotError::config(format!("{name} has invalid value {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvironment;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_from_empty_env() {
        let cfg = AbotConfig::from_env(&MapEnvironment::new()).unwrap();
        assert_eq!(cfg.rpc_port, 4001);
        assert_eq!(cfg.http_addr, ":8080");
        assert_eq!(cfg.dispatch_timeout(), Duration::from_secs(5));
        assert!(cfg.fallback_reply.is_none());
        assert!(!cfg.reject_busy_sessions);
        assert_eq!(cfg.session_idle(), Duration::from_secs(1800));
        assert_eq!(cfg.max_sessions, 10_000);
        assert_eq!(cfg.rpc_addr(), "127.0.0.1:4001");
        assert_eq!(
            cfg.http_socket_addr().unwrap(),
            "0.0.0.0:8080".parse().unwrap()
        );
    }

    #[test]
    fn env_overrides() {
        let env = MapEnvironment::new()
            .with("ABOT_RPC_PORT", "5001")
            .with("ABOT_HTTP_ADDR", "127.0.0.1:9000")
            .with("ABOT_DISPATCH_TIMEOUT_MS", "250")
            .with("ABOT_FALLBACK_REPLY", "Sorry, I can't help with that.")
            .with("ABOT_REJECT_BUSY", "true")
            .with("ABOT_SESSION_IDLE_SECS", "60")
            .with("ABOT_MAX_SESSIONS", "500")
            .with("ABOT_MODEL_PATH", "/tmp/ner.bin")
            .with("ABOT_URL", "https://example.com");
        let cfg = AbotConfig::from_env(&env).unwrap();
        assert_eq!(cfg.rpc_port, 5001);
        assert_eq!(cfg.dispatch_timeout_ms, 250);
        assert_eq!(
            cfg.fallback_reply.as_deref(),
            Some("Sorry, I can't help with that.")
        );
        assert!(cfg.reject_busy_sessions);
        assert_eq!(cfg.session_idle_secs, 60);
        assert_eq!(cfg.max_sessions, 500);
        assert_eq!(cfg.model_path, Some(PathBuf::from("/tmp/ner.bin")));
        assert_eq!(
            cfg.http_socket_addr().unwrap(),
            "127.0.0.1:9000".parse().unwrap()
        );
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let env = MapEnvironment::new().with("ABOT_RPC_PORT", "not-a-port");
        let err = AbotConfig::from_env(&env).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let env = MapEnvironment::new().with("ABOT_DISPATCH_TIMEOUT_MS", "0");
        assert!(AbotConfig::from_env(&env).is_err());

        let env = MapEnvironment::new().with("ABOT_HTTP_ADDR", "nowhere");
        assert!(AbotConfig::from_env(&env).is_err());

        let env = MapEnvironment::new().with("ABOT_REJECT_BUSY", "maybe");
        assert!(AbotConfig::from_env(&env).is_err());

        let env = MapEnvironment::new().with("ABOT_MAX_SESSIONS", "0");
        assert!(AbotConfig::from_env(&env).is_err());
    }

    #[test]
    fn blank_values_use_defaults() {
        let env = MapEnvironment::new()
            .with("ABOT_RPC_PORT", "  ")
            .with("ABOT_FALLBACK_REPLY", "");
        let cfg = AbotConfig::from_env(&env).unwrap();
        assert_eq!(cfg.rpc_port, 4001);
        assert!(cfg.fallback_reply.is_none());
    }

    #[test]
    fn deserialize_partial_json() {
        let cfg: AbotConfig = serde_json::from_str(r#"{"rpc_port": 7000}"#).unwrap();
        assert_eq!(cfg.rpc_port, 7000);
        assert_eq!(cfg.dispatch_timeout_ms, 5000);
    }
}
