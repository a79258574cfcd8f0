//! The payload the core sends to a plugin with each `RespondTo` call.

use serde::{Deserialize, Serialize};

use crate::input::StructuredInput;
use crate::session::FlexIdType;

/// A classified utterance addressed to one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMessage {
    /// The classified form the plugin was selected by.
    pub input: StructuredInput,

    /// The raw utterance as the user typed it.
    #[serde(default)]
    pub sentence: String,

    pub flexid_type: FlexIdType,

    pub flexid: String,

    /// True when the user's previous utterance went to this same plugin.
    #[serde(default)]
    pub followup: bool,
}
