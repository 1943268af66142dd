//! Live argument collection for the currently selected script.

use std::sync::Arc;

use crate::argument::{ArgTag, ArgumentDefinition, ArgumentValue};
use crate::session::ExecutionState;

/// Holds one [`ArgumentValue`] per parsed definition and aggregates the
/// "ready to execute" status across them.
#[derive(Debug, Default)]
pub struct ArgumentStore {
    values: Vec<ArgumentValue>,
}

impl ArgumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the store contents with one empty value per definition,
    /// in declaration order.
    pub fn populate(&mut self, definitions: &[Arc<ArgumentDefinition>]) {
        self.values = definitions
            .iter()
            .map(|d| ArgumentValue::new(Arc::clone(d)))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[ArgumentValue] {
        &self.values
    }

    /// Values of one class, relative declaration order preserved.
    pub fn values_of(&self, tag: ArgTag) -> impl Iterator<Item = &ArgumentValue> {
        self.values.iter().filter(move |v| v.tag() == tag)
    }

    pub fn get(&self, key: &str) -> Option<&ArgumentValue> {
        self.values.iter().find(|v| v.key() == key)
    }

    /// Commits `raw` into the argument named `key`. Returns false for an
    /// unknown key or a shape-rejected value.
    pub fn set(&mut self, key: &str, raw: &str) -> bool {
        match self.values.iter_mut().find(|v| v.key() == key) {
            Some(v) => v.set(raw),
            None => false,
        }
    }

    /// Base64 wire variant of [`set`](Self::set), for password values that
    /// arrive pre-encoded.
    pub fn set_base64(&mut self, key: &str, encoded: &str) -> bool {
        match self.values.iter_mut().find(|v| v.key() == key) {
            Some(v) => v.set_base64(encoded),
            None => false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        for v in &mut self.values {
            v.set_enabled(enabled);
        }
    }

    /// Drops every argument value. Used when the selection changes or the
    /// session is reset.
    pub fn clear_all(&mut self) {
        self.values.clear();
    }

    /// The readiness predicate gating execution. Pure and recomputed on
    /// every call so it always reflects the latest committed values:
    ///
    /// 1. no script selected: not ready
    /// 2. a run already in flight: not ready
    /// 3. any free-text value (string, username, password, multiline)
    ///    still empty: not ready
    /// 4. if radiobutton arguments exist, one of them must be "true"
    /// 5. checkbox arguments never block
    pub fn is_ready_to_execute(&self, script_selected: bool, state: ExecutionState) -> bool {
        if !script_selected {
            return false;
        }
        if state != ExecutionState::Idle {
            return false;
        }
        for v in &self.values {
            if v.tag().is_free_text() && v.is_empty() {
                return false;
            }
        }
        let mut radios = self.values_of(ArgTag::RadioButton).peekable();
        if radios.peek().is_some() {
            return radios.any(|v| v.value() == "true");
        }
        true
    }

    /// Key/value pairs for the interpreter invocation. Every definition is
    /// covered, including those left at their default empty value.
    pub fn parameters(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|v| (v.key().to_string(), v.value().to_string()))
            .collect()
    }
}
