//! Environment variable abstraction.
//!
//! Provides an [`Environment`] trait for reading environment-style
//! configuration. [`NativeEnvironment`] delegates to [`std::env`];
//! [`MapEnvironment`] serves a fixed map so configuration resolution can be
//! tested without touching process-global state.

use std::collections::HashMap;

/// Read access to environment-style key-value configuration.
pub trait Environment: Send + Sync {
    /// Get the value of a variable, or `None` if it is not set.
    fn get_var(&self, name: &str) -> Option<String>;
}

/// Native environment implementation using [`std::env`].
pub struct NativeEnvironment;

impl Environment for NativeEnvironment {
    fn get_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// In-memory environment.
#[derive(Debug, Default, Clone)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a variable.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl Environment for MapEnvironment {
    fn get_var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}
