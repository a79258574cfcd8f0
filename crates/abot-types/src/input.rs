//! Structured input: the classified form of a user utterance.
//!
//! A [`StructuredInput`] summarizes an utterance along five axes. The same
//! record doubles as a plugin subscription pattern, where an unset field
//! is a wildcard.

use serde::{Deserialize, Serialize};

/// One of the five axes of a [`StructuredInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Command,
    Actor,
    Object,
    Time,
    None,
}

impl Field {
    /// All fields, in classifier class order.
    pub const ALL: [Field; 5] = [
        Field::Command,
        Field::Actor,
        Field::Object,
        Field::Time,
        Field::None,
    ];

    /// Class label used by the classifier.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command => "Command",
            Self::Actor => "Actor",
            Self::Object => "Object",
            Self::Time => "Time",
            Self::None => "None",
        }
    }

    /// Single-letter symbol used in annotated sentences (`_C(word)`).
    pub fn symbol(&self) -> char {
        match self {
            Self::Command => 'C',
            Self::Actor => 'A',
            Self::Object => 'O',
            Self::Time => 'T',
            Self::None => 'N',
        }
    }

    /// Inverse of [`Field::symbol`].
    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            'C' => Some(Self::Command),
            'A' => Some(Self::Actor),
            'O' => Some(Self::Object),
            'T' => Some(Self::Time),
            'N' => Some(Self::None),
            _ => None,
        }
    }

    /// Inverse of [`Field::label`].
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.label() == label)
    }
}

/// Tagged record with five optional, case-insensitive string fields.
///
/// Equality compares every field with ASCII case folding; `None` equals only
/// `None`. Use [`StructuredInput::matches`] for wildcard pattern matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StructuredInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none: Option<String>,
}

impl StructuredInput {
    /// An input with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set `field` to `value`.
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        *self.slot_mut(field) = Some(value.into());
        self
    }

    /// Read a field.
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Command => self.command.as_deref(),
            Field::Actor => self.actor.as_deref(),
            Field::Object => self.object.as_deref(),
            Field::Time => self.time.as_deref(),
            Field::None => self.none.as_deref(),
        }
    }

    /// Mutable access to the storage for a field.
    pub fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Command => &mut self.command,
            Field::Actor => &mut self.actor,
            Field::Object => &mut self.object,
            Field::Time => &mut self.time,
            Field::None => &mut self.none,
        }
    }

    /// Append `word` to a field, space-separated from any existing value.
    pub fn push(&mut self, field: Field, word: &str) {
        match self.slot_mut(field) {
            Some(existing) => {
                existing.push(' ');
                existing.push_str(word);
            }
            slot @ None => *slot = Some(word.to_string()),
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Wildcard match: every field set on both sides must be equal
    /// ignoring ASCII case. An unset field on either side matches anything.
    pub fn matches(&self, pattern: &StructuredInput) -> bool {
        Field::ALL.iter().all(|f| match (self.get(*f), pattern.get(*f)) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => true,
        })
    }

    /// Lowercase and trim every set field; empty strings become unset.
    pub fn normalized(&self) -> StructuredInput {
        let mut out = StructuredInput::new();
        for f in Field::ALL {
            if let Some(v) = self.get(f) {
                let v = v.trim().to_lowercase();
                if !v.is_empty() {
                    *out.slot_mut(f) = Some(v);
                }
            }
        }
        out
    }
}

impl PartialEq for StructuredInput {
    fn eq(&self, other: &Self) -> bool {
        Field::ALL.iter().all(|f| match (self.get(*f), other.get(*f)) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => true,
            _ => false,
        })
    }
}

impl Eq for StructuredInput {}

impl std::fmt::Display for StructuredInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        f.write_str("{")?;
        for field in Field::ALL {
            if let Some(v) = self.get(field) {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {v:?}", field.label())?;
                first = false;
            }
        }
        f.write_str("}")
    }
}
