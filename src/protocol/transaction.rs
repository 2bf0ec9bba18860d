//! Appservice transaction payloads.
//!
//! The Matrix schema is mostly opaque here: events stay as raw JSON and
//! unknown top-level fields are carried through unchanged. Only the fields
//! with legacy MSC aliases are typed, so the aliases can be folded into
//! their stable names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level keys the delivery envelope writes itself.
const ENVELOPE_KEYS: [&str; 2] = ["status", "txn_id"];

/// One homeserver → appservice transaction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    #[serde(default)]
    pub events: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<Vec<Value>>,

    #[serde(
        default,
        rename = "de.sorunome.msc2409.ephemeral",
        skip_serializing_if = "Option::is_none"
    )]
    pub msc2409_ephemeral: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_lists: Option<DeviceLists>,

    #[serde(
        default,
        rename = "org.matrix.msc3202.device_lists",
        skip_serializing_if = "Option::is_none"
    )]
    pub msc3202_device_lists: Option<DeviceLists>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_one_time_keys_count: Option<Map<String, Value>>,

    #[serde(
        default,
        rename = "org.matrix.msc3202.device_one_time_keys_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub msc3202_device_one_time_keys_count: Option<Map<String, Value>>,

    /// Everything else (to-device events, newer MSC fields, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Device list changes for end-to-bridge encryption.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceLists {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub left: Vec<String>,
}

impl Transaction {
    /// Fill each stable field from its legacy alias when the stable one is
    /// absent, and drop pass-through keys that would collide with the
    /// delivery envelope.
    pub fn normalize(&mut self) {
        for key in ENVELOPE_KEYS {
            self.extra.remove(key);
        }
        if self.ephemeral.is_none() {
            self.ephemeral = self.msc2409_ephemeral.clone();
        }
        if self.device_lists.is_none() {
            self.device_lists = self.msc3202_device_lists.clone();
        }
        if self.device_one_time_keys_count.is_none() {
            self.device_one_time_keys_count = self.msc3202_device_one_time_keys_count.clone();
        }
    }

    /// Counts used in log lines.
    pub fn summary(&self) -> TransactionSummary {
        TransactionSummary {
            events: self.events.len(),
            ephemeral: self.ephemeral.as_ref().map_or(0, Vec::len),
            otk_counts: self.device_one_time_keys_count.as_ref().map_or(0, Map::len),
            device_list_changes: self.device_lists.as_ref().map_or(0, |d| d.changed.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSummary {
    pub events: usize,
    pub ephemeral: usize,
    pub otk_counts: usize,
    pub device_list_changes: usize,
}

/// Error report pushed by the sync proxy for a bridge.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SyncProxyErrorReport {
    #[serde(default)]
    pub errcode: String,
    #[serde(default)]
    pub error: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// [`SyncProxyErrorReport`] tagged with the transaction it arrived in.
#[derive(Debug, Serialize)]
pub struct SyncProxyErrorForward<'a> {
    #[serde(flatten)]
    pub report: &'a SyncProxyErrorReport,
    pub txn_id: &'a str,
}
