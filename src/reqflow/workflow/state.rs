// SPDX-License-Identifier: MIT

//! State container for workflow runs
//!
//! A run's state is an immutable snapshot. Steps return a partial update and the
//! executor produces the next snapshot with [`FlowState::merge`]: every field
//! named in the update is replaced wholesale, every other field carries over,
//! and nothing is ever deleted. Merges within a run are strictly sequential.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;

/// State threaded through every step of a run
pub trait FlowState: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Partial update returned by a step
    type Update: Debug + Default + Send;

    /// Produce the next snapshot; `self` is left untouched
    fn merge(&self, update: Self::Update) -> Self;
}

/// Dynamic keyed state for graphs that don't need a typed record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapState {
    fields: Map<String, Value>,
}

/// Partial update for [`MapState`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapUpdate {
    fields: Map<String, Value>,
}

impl MapUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field in the update (builder style)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl MapState {
    /// Create an empty MapState
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a MapState from initial fields
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field value as a string slice
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Convert state to JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl FlowState for MapState {
    type Update = MapUpdate;

    fn merge(&self, update: MapUpdate) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in update.fields {
            fields.insert(key, value);
        }
        Self { fields }
    }
}
