//! Plugin registry.
//!
//! Maps plugin names to their listen address and keeps the global,
//! insertion-ordered list of subscriptions. The whole registry sits behind
//! one `RwLock`; every operation holds it only for the in-memory update and
//! never across I/O.
//!
//! Each registration carries a *generation* number. The dispatcher drops
//! plugins by `(name, generation)` so that a failure observed on an old
//! channel cannot remove a plugin that has since re-registered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use abot_types::{AbotError, Result, StructuredInput};

/// A registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRecord {
    pub name: String,
    /// `host:port` the plugin's RespondTo listener is bound to.
    pub address: String,
    pub registered_at: DateTime<Utc>,
    pub generation: u64,
    /// Set by the dispatcher when the plugin's channel stops answering.
    /// A stale name may be registered again.
    pub stale: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Where to send a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub address: String,
    pub generation: u64,
}

impl From<&PluginRecord> for Route {
    fn from(record: &PluginRecord) -> Self {
        Self {
            name: record.name.clone(),
            address: record.address.clone(),
            generation: record.generation,
        }
    }
}

#[derive(Debug, Clone)]
struct Subscription {
    plugin: String,
    pattern: StructuredInput,
}

#[derive(Debug, Default)]
struct Inner {
    plugins: HashMap<String, PluginRecord>,
    subscriptions: Vec<Subscription>,
}

impl Inner {
    fn remove(&mut self, name: &str) -> Option<PluginRecord> {
        let record = self.plugins.remove(name)?;
        self.subscriptions.retain(|s| s.plugin != name);
        Some(record)
    }
}

/// The process-wide set of plugins and their subscriptions.
#[derive(Debug)]
pub struct Registry {
    inner: RwLock<Inner>,
    next_generation: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Add a plugin.
    ///
    /// Fails with [`AbotError::Duplicate`] when the name is taken by a live
    /// entry. A stale entry is replaced: new address, new generation, and
    /// its old subscriptions removed.
    pub fn register(&self, name: &str, address: &str) -> Result<PluginRecord> {
        let name = plugin_name(name)?;
        let address = address.trim();
        if address.is_empty() {
            return Err(AbotError::bad_request("plugin address is empty"));
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = inner.plugins.get(name) {
            if !existing.stale {
                return Err(AbotError::Duplicate {
                    name: name.to_string(),
                });
            }
            info!(plugin = name, old_address = %existing.address, "replacing stale plugin");
            inner.remove(name);
        }

        let record = PluginRecord {
            name: name.to_string(),
            address: address.to_string(),
            registered_at: Utc::now(),
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            stale: false,
            last_heartbeat: None,
        };
        inner.plugins.insert(name.to_string(), record.clone());
        info!(plugin = name, address, generation = record.generation, "plugin registered");
        Ok(record)
    }

    /// Append a subscription for a registered plugin.
    pub fn subscribe(&self, name: &str, pattern: StructuredInput) -> Result<()> {
        let name = plugin_name(name)?;
        if pattern.is_empty() {
            return Err(AbotError::bad_request("subscription pattern is empty"));
        }
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if !inner.plugins.contains_key(name) {
            return Err(AbotError::UnknownPlugin {
                name: name.to_string(),
            });
        }
        debug!(plugin = name, pattern = %pattern, "subscription added");
        inner.subscriptions.push(Subscription {
            plugin: name.to_string(),
            pattern,
        });
        Ok(())
    }

    /// The plugin owning the first subscription that matches `input`.
    pub fn lookup(&self, input: &StructuredInput) -> Option<Route> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .subscriptions
            .iter()
            .find(|s| input.matches(&s.pattern))
            .and_then(|s| inner.plugins.get(&s.plugin))
            .map(Route::from)
    }

    pub fn get(&self, name: &str) -> Option<PluginRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.plugins.get(name).cloned()
    }

    /// Remove a plugin and all its subscriptions.
    pub fn drop_plugin(&self, name: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.remove(name) {
            Some(record) => {
                info!(plugin = name, generation = record.generation, "plugin dropped");
                true
            }
            None => false,
        }
    }

    /// Remove a plugin only if it is still at `generation`.
    pub fn drop_generation(&self, name: &str, generation: u64) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = inner.plugins.get(name).map(|r| r.generation);
        if current != Some(generation) {
            return false;
        }
        inner.remove(name);
        warn!(plugin = name, generation, "dropped unreachable plugin");
        true
    }

    /// Flag a plugin as stale if it is still at `generation`.
    pub fn mark_stale(&self, name: &str, generation: u64) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.plugins.get_mut(name) {
            Some(record) if record.generation == generation => {
                if !record.stale {
                    debug!(plugin = name, generation, "plugin marked stale");
                }
                record.stale = true;
                true
            }
            _ => false,
        }
    }

    /// Clear the stale mark if the plugin is still at `generation`.
    pub fn clear_stale(&self, name: &str, generation: u64) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.plugins.get_mut(name) {
            Some(record) if record.generation == generation => {
                if record.stale {
                    debug!(plugin = name, generation, "plugin answering again");
                }
                record.stale = false;
                true
            }
            _ => false,
        }
    }

    /// Record liveness and clear the stale mark.
    pub fn heartbeat(&self, name: &str) -> Result<()> {
        let name = name.trim();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let record = inner
            .plugins
            .get_mut(name)
            .ok_or_else(|| AbotError::UnknownPlugin {
                name: name.to_string(),
            })?;
        record.stale = false;
        record.last_heartbeat = Some(Utc::now());
        Ok(())
    }

    /// All plugins, oldest registration first.
    pub fn list(&self) -> Vec<PluginRecord> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<PluginRecord> = inner.plugins.values().cloned().collect();
        records.sort_by_key(|r| r.generation);
        records
    }

    /// Patterns subscribed by one plugin, in insertion order.
    pub fn subscriptions(&self, name: &str) -> Vec<StructuredInput> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .subscriptions
            .iter()
            .filter(|s| s.plugin == name)
            .map(|s| s.pattern.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn plugin_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AbotError::bad_request("plugin name is empty"));
    }
    Ok(name)
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
