//! # Dirty Tracking
//!
//! A form is dirty when its current snapshot differs from the last snapshot
//! that was persisted or restored. The comparison is whole-snapshot and
//! structural: object key order never matters, array order always does.
//!
//! Equality is decided on a canonical serialization (object keys sorted
//! recursively, no whitespace), so the result does not depend on whether
//! `serde_json` was built with `preserve_order` somewhere in the dependency
//! graph. The same canonical bytes feed [`fingerprint`], which the store uses
//! to tell whether the payload it holds is the one the server last accepted.
//!
//! Numbers compare by their JSON form, so `1` and `1.0` are different
//! snapshots.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical JSON text for a snapshot
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}

/// SHA-256 of the canonical form, hex encoded
pub fn fingerprint(value: &Value) -> String {
    let digest = Sha256::digest(canonical_json(value).as_bytes());
    format!("{:x}", digest)
}

/// Structural snapshot equality
pub fn snapshots_equal(a: &Value, b: &Value) -> bool {
    canonical_json(a) == canonical_json(b)
}

/// `true` when `current` differs from `baseline`; no baseline means dirty
pub fn is_dirty(current: &Value, baseline: Option<&Value>) -> bool {
    match baseline {
        Some(baseline) => !snapshots_equal(current, baseline),
        None => true,
    }
}

/// Holds the last persisted-or-restored snapshot for one form session
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    baseline_canonical: Option<String>,
}

impl DirtyTracker {
    /// Tracker whose baseline is `snapshot`
    pub fn with_baseline(snapshot: Value) -> Self {
        let mut tracker = Self::default();
        tracker.set_baseline(snapshot);
        tracker
    }

    /// Record `snapshot` as the new clean state (after a save or restore)
    pub fn set_baseline(&mut self, snapshot: Value) {
        self.baseline_canonical = Some(canonical_json(&snapshot));
    }

    pub fn is_dirty(&self, current: &Value) -> bool {
        match &self.baseline_canonical {
            Some(canonical) => canonical_json(current) != *canonical,
            None => true,
        }
    }
}
