//! Typed script arguments and their shape validation.

use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

/// Input class a script parameter is declared as in the header block.
///
/// The classes only differ in how raw input is shape-checked and how the
/// readiness predicate treats them; storage is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgTag {
    String,
    Int,
    Bool,
    Username,
    Password,
    MultiLine,
    Checkbox,
    RadioButton,
}

impl ArgTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgTag::String => "string",
            ArgTag::Int => "int",
            ArgTag::Bool => "bool",
            ArgTag::Username => "username",
            ArgTag::Password => "password",
            ArgTag::MultiLine => "multiline",
            ArgTag::Checkbox => "checkbox",
            ArgTag::RadioButton => "radiobutton",
        }
    }

    /// Free-text classes must be non-empty before a run may start.
    pub fn is_free_text(self) -> bool {
        matches!(
            self,
            ArgTag::String | ArgTag::Username | ArgTag::Password | ArgTag::MultiLine
        )
    }

    fn accepts(self, raw: &str) -> bool {
        match self {
            ArgTag::String | ArgTag::Username | ArgTag::Password | ArgTag::MultiLine => true,
            ArgTag::Int => raw.parse::<i64>().is_ok(),
            ArgTag::Bool | ArgTag::Checkbox | ArgTag::RadioButton => {
                raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false")
            }
        }
    }
}

impl FromStr for ArgTag {
    type Err = String;

    /// Case-insensitive. The unrecognized token is returned so the parser
    /// can report it in a diagnostic.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(ArgTag::String),
            "int" => Ok(ArgTag::Int),
            "bool" => Ok(ArgTag::Bool),
            "username" => Ok(ArgTag::Username),
            "password" => Ok(ArgTag::Password),
            "multiline" => Ok(ArgTag::MultiLine),
            "checkbox" => Ok(ArgTag::Checkbox),
            "radiobutton" => Ok(ArgTag::RadioButton),
            other => Err(other.to_string()),
        }
    }
}

/// One parameter declaration parsed from a script header. Immutable once
/// parsed; shared between the descriptor and the live argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDefinition {
    pub key: String,
    pub description: String,
    pub tag: ArgTag,
    /// Declaration position within the header block.
    pub ordinal: usize,
}

/// Live, validated holder for one parameter's current user input.
#[derive(Debug, Clone)]
pub struct ArgumentValue {
    definition: Arc<ArgumentDefinition>,
    value: String,
    enabled: bool,
}

impl ArgumentValue {
    pub fn new(definition: Arc<ArgumentDefinition>) -> Self {
        Self {
            definition,
            value: String::new(),
            enabled: true,
        }
    }

    pub fn definition(&self) -> &ArgumentDefinition {
        &self.definition
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    pub fn tag(&self) -> ArgTag {
        self.definition.tag
    }

    /// The last committed value. Empty until a commit succeeds.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Commits `raw` if it passes the shape check for this argument's tag
    /// and returns whether the commit happened. A rejected write leaves the
    /// previous committed value unchanged.
    pub fn set(&mut self, raw: &str) -> bool {
        if !self.definition.tag.accepts(raw) {
            debug!(key = %self.definition.key, raw, "rejected argument value");
            return false;
        }
        self.value = raw.to_string();
        true
    }

    /// One-way decode path for password values that arrive base64-encoded
    /// on the wire. A decode failure commits the empty string instead of
    /// propagating an error.
    pub fn set_base64(&mut self, encoded: &str) -> bool {
        let decoded = BASE64
            .decode(encoded.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default();
        self.set(&decoded)
    }

    pub fn clear(&mut self) {
        self.value.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
