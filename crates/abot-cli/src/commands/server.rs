//! `abot server` -- run the core.
//!
//! Loads (or trains) the intent model, binds the plugin RPC endpoint and
//! the HTTP front-end, and serves until Ctrl+C.
//!
//! Settings come from `ABOT_*` environment variables; flags override
//! them.
//!
//! # Example
//!
//! ```text
//! abot server
//! abot server --rpc-port 4001 --http-addr :8080 --model ~/.abot/intent.bin
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use abot_services::Abot;
use abot_types::config::AbotConfig;
use abot_types::env::{Environment, NativeEnvironment};

/// Arguments for the `abot server` subcommand.
#[derive(Args, Debug, Default)]
pub struct ServerArgs {
    /// Interface the plugin RPC endpoint binds to.
    #[arg(long)]
    pub rpc_host: Option<String>,

    /// Port of the plugin RPC endpoint.
    #[arg(long)]
    pub rpc_port: Option<u16>,

    /// HTTP listen address; a leading `:` means all interfaces.
    #[arg(long)]
    pub http_addr: Option<String>,

    /// Per-dispatch deadline in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Binary intent model to load, or to write after training.
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Annotated corpus to train from when no model exists.
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Reply (with 200) when no plugin matches instead of a 503.
    #[arg(long)]
    pub fallback: Option<String>,

    /// Answer 429 to a session that already has a request in flight.
    #[arg(long)]
    pub reject_busy: bool,
}

/// Resolve the environment, then apply flags on top.
pub fn resolve_config(args: &ServerArgs, env: &dyn Environment) -> anyhow::Result<AbotConfig> {
    let mut cfg = AbotConfig::from_env(env)?;
    if let Some(host) = &args.rpc_host {
        cfg.rpc_host = host.clone();
    }
    if let Some(port) = args.rpc_port {
        cfg.rpc_port = port;
    }
    if let Some(addr) = &args.http_addr {
        cfg.http_addr = addr.clone();
    }
    if let Some(ms) = args.timeout_ms {
        cfg.dispatch_timeout_ms = ms;
    }
    if let Some(path) = &args.model {
        cfg.model_path = Some(path.clone());
    }
    if let Some(path) = &args.corpus {
        cfg.training_path = Some(path.clone());
    }
    if let Some(reply) = &args.fallback {
        cfg.fallback_reply = Some(reply.clone());
    }
    if args.reject_busy {
        cfg.reject_busy_sessions = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Run the `server` command.
pub async fn run(args: ServerArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args, &NativeEnvironment)?;
    info!(
        rpc = %config.rpc_addr(),
        http = %config.http_addr,
        timeout_ms = config.dispatch_timeout_ms,
        "starting abot"
    );

    let abot = Arc::new(Abot::from_config(config).await?);
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl+C"),
        }
        signal_cancel.cancel();
    });

    abot.run(cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use abot_types::env::MapEnvironment;

    #[test]
    fn env_defaults_apply() {
        let cfg = resolve_config(&ServerArgs::default(), &MapEnvironment::new()).unwrap();
        assert_eq!(cfg.rpc_port, 4001);
        assert_eq!(cfg.http_addr, ":8080");
        assert_eq!(cfg.dispatch_timeout_ms, 5000);
    }

    #[test]
    fn flags_override_env() {
        let env = MapEnvironment::new()
            .with("ABOT_RPC_PORT", "5000")
            .with("ABOT_DISPATCH_TIMEOUT_MS", "900");
        let args = ServerArgs {
            rpc_port: Some(6000),
            fallback: Some("nope".into()),
            reject_busy: true,
            ..ServerArgs::default()
        };
        let cfg = resolve_config(&args, &env).unwrap();
        assert_eq!(cfg.rpc_port, 6000);
        assert_eq!(cfg.dispatch_timeout_ms, 900);
        assert_eq!(cfg.fallback_reply.as_deref(), Some("nope"));
        assert!(cfg.reject_busy_sessions);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let env = MapEnvironment::new().with("ABOT_RPC_PORT", "many");
        assert!(resolve_config(&ServerArgs::default(), &env).is_err());

        let args = ServerArgs {
            timeout_ms: Some(0),
            ..ServerArgs::default()
        };
        assert!(resolve_config(&args, &MapEnvironment::new()).is_err());
    }
}
