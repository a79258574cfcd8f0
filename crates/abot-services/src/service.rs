//! The `Abot` service: owns the registry, the intent model, the dispatcher
//! and the session table, and runs the RPC endpoint next to the HTTP
//! front-end.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use abot_core::bootstrap::{load_tagger, save_model};
use abot_core::nlp::tokenize;
use abot_core::{DispatchOutcome, Dispatcher, PluginConnector, Registry, SessionManager, Tagger};
use abot_rpc::{RpcServer, TcpPluginConnector};
use abot_types::config::AbotConfig;
use abot_types::{AbotError, SessionKey};

use crate::api;
use crate::error::{Result, ServiceError};

/// Prefix of a command that retrains the live model.
pub const TRAIN_PREFIX: &str = "train ";

/// Reply to a successful retrain.
pub const TRAINED_REPLY: &str = "trained";

/// Reply when the model cannot score an utterance.
pub const NOT_UNDERSTOOD_REPLY: &str = "Sorry, I didn't understand that.";

/// Reply when a session already has a request in flight.
pub const BUSY_REPLY: &str = "Still working on your last message.";

/// What became of one user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Dispatched(DispatchOutcome),
    Trained,
    /// Turned away because the session is busy.
    Busy,
    /// The model underflowed on the utterance.
    NotUnderstood,
}

pub struct Abot {
    config: AbotConfig,
    registry: Arc<Registry>,
    tagger: RwLock<Tagger>,
    dispatcher: Dispatcher,
    sessions: SessionManager,
}

impl Abot {
    pub fn new(config: AbotConfig, tagger: Tagger, connector: Arc<dyn PluginConnector>) -> Self {
        let registry = Arc::new(Registry::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            connector,
            config.dispatch_timeout(),
        );
        let sessions = SessionManager::with_limits(config.session_idle(), config.max_sessions);
        Self {
            config,
            registry,
            tagger: RwLock::new(tagger),
            dispatcher,
            sessions,
        }
    }

    /// Build the service for `config`: load or train the model and reach
    /// plugins over TCP.
    pub async fn from_config(config: AbotConfig) -> Result<Self> {
        config.validate()?;
        let tagger = load_tagger(&config).await?;
        Ok(Self::new(config, tagger, Arc::new(TcpPluginConnector::new())))
    }

    pub fn config(&self) -> &AbotConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run one command for a session: retrain, or tokenize, tag and
    /// dispatch.
    pub async fn handle(&self, key: &SessionKey, cmd: &str) -> std::result::Result<Handled, AbotError> {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return Err(AbotError::bad_request("cmd is empty"));
        }
        if let Some(corpus) = cmd.strip_prefix(TRAIN_PREFIX) {
            self.retrain(corpus).await?;
            return Ok(Handled::Trained);
        }

        let tokens = tokenize(cmd);
        if tokens.is_empty() {
            return Err(AbotError::bad_request("cmd has no words"));
        }

        let mut session = if self.config.reject_busy_sessions {
            match self.sessions.try_acquire(key) {
                Some(session) => session,
                None => {
                    debug!(session = %key, "session busy, rejecting");
                    return Ok(Handled::Busy);
                }
            }
        } else {
            self.sessions.acquire(key).await
        };

        let tagged = {
            let tagger = self.tagger.read().await;
            tagger.classify(&tokens)
        };
        let tagged = match tagged {
            Ok(tagged) => tagged,
            Err(AbotError::Underflow) => {
                warn!(session = %key, "classifier underflow");
                return Ok(Handled::NotUnderstood);
            }
            Err(e) => return Err(e),
        };
        debug!(
            session = %key,
            annotated = %tagged.annotated,
            needs_training = tagged.needs_training,
            "tagged"
        );

        session.record_utterance(cmd);
        let outcome = self.dispatcher.dispatch(&mut session, &tagged.input, cmd).await;
        Ok(Handled::Dispatched(outcome))
    }

    /// Train the live model on annotated lines.
    ///
    /// The update is all-or-nothing: a malformed line leaves the model as
    /// it was.
    pub async fn retrain(&self, corpus: &str) -> std::result::Result<(), AbotError> {
        let snapshot = {
            let mut tagger = self.tagger.write().await;
            let mut next = tagger.clone();
            let sentences = next.train_corpus(corpus).strict()?;
            *tagger = next;
            info!(sentences, "retrained intent model");
            tagger.classifier().clone()
        };

        if let Some(path) = &self.config.model_path {
            if let Err(e) = save_model(snapshot, path.clone()).await {
                warn!(path = %path.display(), error = %e, "could not save retrained model");
            }
        }
        Ok(())
    }

    /// Bind both listeners from the configuration and serve until
    /// `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let rpc_addr = self.config.rpc_addr();
        let rpc = TcpListener::bind(&rpc_addr)
            .await
            .map_err(|source| ServiceError::Bind {
                addr: rpc_addr,
                source,
            })?;
        let http_addr = self.config.http_socket_addr()?;
        let http = TcpListener::bind(http_addr)
            .await
            .map_err(|source| ServiceError::Bind {
                addr: http_addr.to_string(),
                source,
            })?;
        self.serve(rpc, http, cancel).await
    }

    /// Serve the RPC endpoint on `rpc` and the HTTP front-end on `http`.
    pub async fn serve(
        self: Arc<Self>,
        rpc: TcpListener,
        http: TcpListener,
        cancel: CancellationToken,
    ) -> Result<()> {
        let endpoint = RpcServer::new(Arc::clone(&self.registry));
        let rpc_cancel = cancel.clone();
        let rpc_task = tokio::spawn(async move { endpoint.serve(rpc, rpc_cancel).await });
        tokio::spawn(sweep_sessions(Arc::clone(&self), cancel.clone()));

        info!(addr = %http.local_addr()?, "http front-end listening");
        let router = api::build_router(Arc::clone(&self));
        let shutdown = cancel.clone();
        let served = axum::serve(http, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        cancel.cancel();
        if let Err(e) = rpc_task.await {
            warn!(error = %e, "rpc endpoint task failed");
        }
        served?;
        info!("abot stopped");
        Ok(())
    }
}

/// Periodically evict idle sessions until `cancel` fires.
async fn sweep_sessions(abot: Arc<Abot>, cancel: CancellationToken) {
    let every = (abot.sessions.idle_limit() / 2).max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(every);
    // Skip the first immediate tick.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                abot.sessions.sweep();
            }
        }
    }
}
