//! Transient, in-memory state of one open form.
//!
//! A session holds the current step index, the current field values, the
//! defaults the form was opened with, and the dirty tracker baseline. It is
//! never persisted itself; its [`FormSnapshot`] is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::shared::error::{FormError, FormResult};
use crate::shared::snapshot::DirtyTracker;

/// Serializable form state: `{"step": n, ...fields}`
///
/// The `step` key is reserved for the step index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSnapshot {
    #[serde(default)]
    pub step: usize,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl FormSnapshot {
    pub fn new(step: usize, values: Map<String, Value>) -> Self {
        Self { step, values }
    }

    /// Snapshot from a JSON object; non-objects are rejected
    pub fn from_value(value: &Value) -> FormResult<Self> {
        if !value.is_object() {
            return Err(FormError::serialization("form snapshot must be a JSON object"));
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.values.clone();
        map.insert("step".to_string(), Value::from(self.step));
        Value::Object(map)
    }
}

#[derive(Debug, Clone)]
pub struct FormSession {
    current: FormSnapshot,
    defaults: FormSnapshot,
    tracker: DirtyTracker,
}

impl FormSession {
    /// Fresh session at `defaults`; clean until edited
    pub fn new(defaults: FormSnapshot) -> Self {
        let tracker = DirtyTracker::with_baseline(defaults.to_value());
        Self {
            current: defaults.clone(),
            defaults,
            tracker,
        }
    }

    pub fn step(&self) -> usize {
        self.current.step
    }

    pub fn set_step(&mut self, step: usize) {
        self.current.step = step;
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.current.values
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.current.values.get(name)
    }

    /// Set one field; `step` is reserved
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> FormResult<()> {
        let name = name.into();
        if name == "step" {
            return Err(FormError::serialization("'step' is reserved for the step index"));
        }
        self.current.values.insert(name, value);
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.current.values.remove(name)
    }

    pub fn current(&self) -> &FormSnapshot {
        &self.current
    }

    /// Current state as the JSON payload the store receives
    pub fn snapshot(&self) -> Value {
        self.current.to_value()
    }

    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty(&self.snapshot())
    }

    /// `snapshot` was persisted; it becomes the clean baseline
    pub fn mark_saved(&mut self, snapshot: Value) {
        self.tracker.set_baseline(snapshot);
    }

    /// Replace the whole state with a restored payload, baseline included.
    ///
    /// The payload is parsed before anything changes, so a bad payload
    /// leaves the session untouched. The baseline is the parsed snapshot,
    /// so a payload without a `step` key restores clean at step 0.
    pub fn restore(&mut self, payload: &Value) -> FormResult<()> {
        let restored = FormSnapshot::from_value(payload)?;
        self.tracker.set_baseline(restored.to_value());
        self.current = restored;
        Ok(())
    }

    /// Back to defaults, clean
    pub fn reset(&mut self) {
        self.current = self.defaults.clone();
        self.tracker.set_baseline(self.defaults.to_value());
    }
}
