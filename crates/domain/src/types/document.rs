//! The storage document exchanged by every backend
//!
//! Flat-file shape: a single JSON object keyed by message-id string, with the
//! reserved key `_metadata` holding document metadata.
//!
//! ```json
//! {
//!   "_metadata": { "version": 1 },
//!   "100": { "message_id": 100, "guild_id": 1, ... }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::event::Event;
use super::snowflake;
use crate::constants::METADATA_KEY;
use crate::errors::{ReminderError, Result};

/// Every watched event plus free-form metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageDocument {
    pub events: BTreeMap<u64, Event>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl StorageDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            events: events.into_iter().map(|e| (e.message_id, e)).collect(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, message_id: u64) -> Option<&Event> {
        self.events.get(&message_id)
    }

    /// Insert or replace; returns the previous event for that id
    pub fn insert(&mut self, event: Event) -> Option<Event> {
        self.events.insert(event.message_id, event)
    }

    pub fn remove(&mut self, message_id: u64) -> Option<Event> {
        self.events.remove(&message_id)
    }

    pub fn events_for_guild(&self, guild_id: u64) -> impl Iterator<Item = &Event> {
        self.events.values().filter(move |e| e.guild_id == guild_id)
    }

    pub fn guild_ids(&self) -> BTreeSet<u64> {
        self.events.values().map(|e| e.guild_id).collect()
    }

    pub fn due_events(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Event> {
        self.events.values().filter(move |e| e.is_due_for_reminder(now))
    }

    /// Invariant violations across every event
    pub fn validation_errors(&self, strict: bool) -> Vec<String> {
        self.events.values().flat_map(|e| e.validation_errors(strict)).collect()
    }

    /// Encode to the flat-file shape
    pub fn to_flat_json(&self) -> Result<Value> {
        let mut root = Map::with_capacity(self.events.len() + 1);
        if !self.metadata.is_empty() {
            let metadata: Map<String, Value> =
                self.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            root.insert(METADATA_KEY.to_string(), Value::Object(metadata));
        }
        for (id, event) in &self.events {
            root.insert(id.to_string(), serde_json::to_value(event)?);
        }
        Ok(Value::Object(root))
    }

    /// Decode the flat-file shape
    ///
    /// Every record is attempted; all failures are reported together.
    pub fn from_flat_json(value: &Value) -> Result<Self> {
        let root = value.as_object().ok_or_else(|| {
            ReminderError::Serialization("top-level JSON value must be an object".to_string())
        })?;

        let mut document = Self::new();
        let mut errors = Vec::new();

        for (key, record) in root {
            if key == METADATA_KEY {
                match record {
                    Value::Object(map) => {
                        document.metadata =
                            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    }
                    _ => errors.push(format!("{METADATA_KEY} must be an object")),
                }
                continue;
            }

            let Some(id) = snowflake::parse(key) else {
                errors.push(format!("record key {key:?} is not a message id"));
                continue;
            };
            match serde_json::from_value::<Event>(record.clone()) {
                Ok(event) if event.message_id == id => {
                    document.events.insert(id, event);
                }
                Ok(event) => errors.push(format!(
                    "record {key}: message_id {} does not match its key",
                    event.message_id
                )),
                Err(e) => errors.push(format!("record {key}: {e}")),
            }
        }

        if errors.is_empty() {
            Ok(document)
        } else {
            Err(ReminderError::Serialization(errors.join("; ")))
        }
    }
}
