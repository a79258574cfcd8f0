//! # abot-core
//!
//! The routing engine of the abot assistant.
//!
//! Contains the text normalization used everywhere ([`nlp`]), the
//! naive-Bayes [`classifier`] and the [`tagger`] built on it, the plugin
//! [`registry`], per-user [`session`] serialization and the [`dispatch`]
//! layer that calls plugins. Transport to plugins is abstracted behind
//! [`dispatch::PluginConnector`]; the TCP implementation lives in
//! `abot-rpc`.

pub mod bootstrap;
pub mod classifier;
pub mod dispatch;
pub mod nlp;
pub mod registry;
pub mod session;
pub mod tagger;

pub use classifier::{Classifier, ClassifierError};
pub use dispatch::{ChannelState, DispatchOutcome, Dispatcher, PluginConnection, PluginConnector};
pub use registry::{PluginRecord, Registry, Route};
pub use session::{SessionGuard, SessionManager};
pub use tagger::{CorpusReport, RejectedLine, Tagged, Tagger};
