//! Dispatcher: selects a plugin for a classified utterance and calls it.
//!
//! Each plugin gets one pooled channel, tracked by a small state machine:
//!
//! ```text
//! Absent -> Opening -> Open -> Reconnecting -> Dead
//!                       ^            |
//!                       +------------+  (retry succeeded)
//! ```
//!
//! A transport error on an `Open` channel moves it to `Reconnecting` and the
//! call is retried once on a fresh connection. A deadline expiry also moves
//! it to `Reconnecting`, marks the registration stale and reports a
//! timeout; the next call reconnects. An answer on the fresh channel
//! returns it to `Open` and clears the stale mark. Any failure while
//! `Reconnecting` kills the channel, drops the plugin from the registry and
//! releases the slot.
//!
//! The whole call, including connecting and waiting on the opener lock,
//! runs under one deadline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use abot_types::{AbotError, PluginMessage, Result, Session, StructuredInput};

use crate::registry::{Registry, Route};

/// Reply sent when no plugin can take an utterance.
pub const NO_HANDLER_REPLY: &str = "Sorry, I don't know how to help with that.";
/// Reply sent when a plugin missed its deadline.
pub const TIMED_OUT_REPLY: &str = "Sorry, that took too long. Please try again.";
/// Reply sent after a plugin has been dropped as unreachable.
pub const UNAVAILABLE_REPLY: &str = "handler unavailable";

// ── Transport seam ──────────────────────────────────────────────────────

/// Opens channels to plugins.
#[async_trait]
pub trait PluginConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn PluginConnection>>;
}

/// One open channel to a plugin.
///
/// Implementations serialize concurrent calls themselves. An
/// [`AbotError::Plugin`] means the plugin answered with an error and the
/// channel is healthy; every other error is treated as a transport failure.
#[async_trait]
pub trait PluginConnection: Send + Sync {
    async fn respond_to(&self, message: &PluginMessage) -> Result<String>;
}

// ── Channel state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Absent,
    Opening,
    Open,
    Reconnecting,
    Dead,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Dead => "dead",
        };
        f.write_str(s)
    }
}

struct SlotState {
    state: ChannelState,
    conn: Option<Arc<dyn PluginConnection>>,
}

/// Channel to one registration of one plugin.
struct ChannelSlot {
    name: String,
    generation: u64,
    inner: Mutex<SlotState>,
    /// Held while connecting so concurrent callers share one connect.
    opening: AsyncMutex<()>,
}

impl ChannelSlot {
    fn new(route: &Route) -> Self {
        Self {
            name: route.name.clone(),
            generation: route.generation,
            inner: Mutex::new(SlotState {
                state: ChannelState::Absent,
                conn: None,
            }),
            opening: AsyncMutex::new(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ChannelState {
        self.lock().state
    }

    fn transition(&self, to: ChannelState) {
        let mut inner = self.lock();
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if matches!(to, ChannelState::Reconnecting | ChannelState::Dead) {
            inner.conn = None;
        }
        drop(inner);
        debug!(plugin = %self.name, generation = self.generation, %from, %to, "channel state");
    }
}

// ── Outcome ─────────────────────────────────────────────────────────────

/// What became of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Reply {
        plugin: String,
        reply: String,
        /// The session's previous utterance went to the same plugin.
        followup: bool,
    },
    NoHandler,
    TimedOut {
        plugin: String,
    },
    /// The plugin could not be reached after a retry and was dropped.
    Unavailable {
        plugin: String,
    },
    /// The plugin answered with an error.
    PluginFailed {
        plugin: String,
        message: String,
    },
}

impl DispatchOutcome {
    /// The text shown to the user.
    pub fn reply_text(&self) -> &str {
        match self {
            Self::Reply { reply, .. } => reply,
            Self::NoHandler => NO_HANDLER_REPLY,
            Self::TimedOut { .. } => TIMED_OUT_REPLY,
            Self::Unavailable { .. } => UNAVAILABLE_REPLY,
            Self::PluginFailed { message, .. } => message,
        }
    }
}

enum Attempt {
    Reply(String),
    PluginError(String),
    Transport(AbotError),
    TimedOut,
}

// ── Dispatcher ──────────────────────────────────────────────────────────

/// Routes classified input to plugins.
pub struct Dispatcher {
    registry: Arc<Registry>,
    connector: Arc<dyn PluginConnector>,
    channels: Mutex<HashMap<String, Arc<ChannelSlot>>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        connector: Arc<dyn PluginConnector>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connector,
            channels: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of channel slots currently held.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Current state of a plugin's channel. A released channel reads as
    /// `Absent`.
    pub fn channel_state(&self, plugin: &str) -> ChannelState {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(plugin)
            .map_or(ChannelState::Absent, |slot| slot.state())
    }

    /// Dispatch with the configured per-call timeout.
    ///
    /// The caller holds `session` exclusively, which is what keeps one
    /// dispatch in flight per session.
    pub async fn dispatch(
        &self,
        session: &mut Session,
        input: &StructuredInput,
        sentence: &str,
    ) -> DispatchOutcome {
        let deadline = Instant::now() + self.timeout;
        self.dispatch_until(session, input, sentence, deadline).await
    }

    /// Dispatch with an explicit deadline.
    pub async fn dispatch_until(
        &self,
        session: &mut Session,
        input: &StructuredInput,
        sentence: &str,
        deadline: Instant,
    ) -> DispatchOutcome {
        let Some((route, followup)) = self.resolve(session, input) else {
            debug!(session = %session.key, input = %input, "no handler");
            return DispatchOutcome::NoHandler;
        };

        let message = PluginMessage {
            input: input.clone(),
            sentence: sentence.to_string(),
            flexid_type: session.key.space,
            flexid: session.key.id.clone(),
            followup,
        };

        let outcome = self.call(&route, &message, deadline).await;
        if let DispatchOutcome::Reply { plugin, .. } = &outcome {
            session.record_plugin(plugin);
        }
        outcome
    }

    /// Pick the plugin: a matching subscription, else the session's last
    /// plugin if it is still registered.
    fn resolve(&self, session: &Session, input: &StructuredInput) -> Option<(Route, bool)> {
        let last = session.last_plugin.as_deref();
        if let Some(route) = self.registry.lookup(input) {
            let followup = last == Some(route.name.as_str());
            return Some((route, followup));
        }
        let record = self.registry.get(last?)?;
        debug!(plugin = %record.name, "routing follow-up to previous plugin");
        Some((Route::from(&record), true))
    }

    async fn call(&self, route: &Route, message: &PluginMessage, deadline: Instant) -> DispatchOutcome {
        let slot = self.slot_for(route);
        let reconnecting = match slot.state() {
            ChannelState::Dead => return self.unavailable(&slot),
            ChannelState::Reconnecting => true,
            _ => false,
        };

        match self.attempt(&slot, route, message, reconnecting, deadline).await {
            Attempt::Reply(reply) => self.replied(&slot, route, reply, message.followup),
            Attempt::PluginError(msg) => self.plugin_failed(&slot, route, msg),
            Attempt::TimedOut | Attempt::Transport(_) if reconnecting => self.kill(&slot),
            Attempt::TimedOut => {
                warn!(plugin = %route.name, timeout_ms = self.timeout.as_millis() as u64, "dispatch timed out");
                slot.transition(ChannelState::Reconnecting);
                self.registry.mark_stale(&route.name, route.generation);
                DispatchOutcome::TimedOut {
                    plugin: route.name.clone(),
                }
            }
            Attempt::Transport(err) => {
                warn!(plugin = %route.name, error = %err, "transport error, reconnecting");
                slot.transition(ChannelState::Reconnecting);
                match self.attempt(&slot, route, message, true, deadline).await {
                    Attempt::Reply(reply) => self.replied(&slot, route, reply, message.followup),
                    Attempt::PluginError(msg) => self.plugin_failed(&slot, route, msg),
                    Attempt::TimedOut | Attempt::Transport(_) => self.kill(&slot),
                }
            }
        }
    }

    /// One connect-if-needed plus call, bounded by `deadline`.
    async fn attempt(
        &self,
        slot: &ChannelSlot,
        route: &Route,
        message: &PluginMessage,
        fresh: bool,
        deadline: Instant,
    ) -> Attempt {
        let exchange = async {
            let conn = self.connection(slot, route, fresh).await?;
            conn.respond_to(message).await
        };
        match timeout_at(deadline, exchange).await {
            Ok(Ok(reply)) => Attempt::Reply(reply),
            Ok(Err(AbotError::Plugin { message })) => Attempt::PluginError(message),
            Ok(Err(err)) => Attempt::Transport(err),
            Err(_) => Attempt::TimedOut,
        }
    }

    async fn connection(
        &self,
        slot: &ChannelSlot,
        route: &Route,
        fresh: bool,
    ) -> Result<Arc<dyn PluginConnection>> {
        let _opening = slot.opening.lock().await;
        {
            let mut inner = slot.lock();
            if let Some(conn) = &inner.conn {
                if !fresh || inner.state == ChannelState::Open {
                    return Ok(Arc::clone(conn));
                }
            }
            inner.conn = None;
        }
        if slot.state() == ChannelState::Absent {
            slot.transition(ChannelState::Opening);
        }
        let conn = self.connector.connect(&route.address).await?;
        slot.lock().conn = Some(Arc::clone(&conn));
        Ok(conn)
    }

    fn replied(&self, slot: &ChannelSlot, route: &Route, reply: String, followup: bool) -> DispatchOutcome {
        self.reopened(slot, route);
        DispatchOutcome::Reply {
            plugin: route.name.clone(),
            reply,
            followup,
        }
    }

    fn plugin_failed(&self, slot: &ChannelSlot, route: &Route, message: String) -> DispatchOutcome {
        self.reopened(slot, route);
        warn!(plugin = %route.name, error = %message, "plugin reported an error");
        DispatchOutcome::PluginFailed {
            plugin: route.name.clone(),
            message,
        }
    }

    /// The plugin answered, so the channel is healthy again.
    fn reopened(&self, slot: &ChannelSlot, route: &Route) {
        let previous = slot.state();
        if previous != ChannelState::Open {
            info!(plugin = %route.name, from = %previous, "channel open");
        }
        slot.transition(ChannelState::Open);
        if previous == ChannelState::Reconnecting {
            self.registry.clear_stale(&route.name, route.generation);
        }
    }

    fn kill(&self, slot: &ChannelSlot) -> DispatchOutcome {
        slot.transition(ChannelState::Dead);
        self.registry.drop_generation(&slot.name, slot.generation);
        self.release(slot);
        self.unavailable(slot)
    }

    /// Forget a slot unless a newer registration already replaced it.
    fn release(&self, slot: &ChannelSlot) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if channels
            .get(&slot.name)
            .is_some_and(|current| current.generation == slot.generation)
        {
            channels.remove(&slot.name);
        }
    }

    fn unavailable(&self, slot: &ChannelSlot) -> DispatchOutcome {
        DispatchOutcome::Unavailable {
            plugin: slot.name.clone(),
        }
    }

    /// The slot for this registration, replacing one left by an older
    /// generation. Slots of registrations that are gone are pruned
    /// whenever a new slot is made.
    fn slot_for(&self, route: &Route) -> Arc<ChannelSlot> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        match channels.get(&route.name) {
            Some(slot) if slot.generation == route.generation => Arc::clone(slot),
            _ => {
                channels.retain(|name, slot| {
                    self.registry
                        .get(name)
                        .is_some_and(|record| record.generation == slot.generation)
                });
                let slot = Arc::new(ChannelSlot::new(route));
                channels.insert(route.name.clone(), Arc::clone(&slot));
                slot
            }
        }
    }
}
