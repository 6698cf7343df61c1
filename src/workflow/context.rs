//! Accumulated data for a single run
//!
//! Every step reads the artifacts of earlier steps from here and merges its
//! own outcome back in. The map lives for the whole run, so the success path
//! and recommendation derivation see everything the steps produced.
//!
//! Embedding vectors are kept in a side table: later steps reuse them for
//! similarity queries, but they never appear in the result's `data`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::engine::error::WorkflowError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowData {
    values: Map<String, Value>,
    vectors: HashMap<String, Vec<f32>>,
}

impl WorkflowData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Serialise and store a typed value
    pub fn put<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), WorkflowError> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Typed read; `None` when absent or of a different shape
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Typed read of a value an earlier step must have produced
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, WorkflowError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| WorkflowError::MissingData(key.to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn merge(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        self.values.extend(entries);
    }

    pub fn set_vector(&mut self, key: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(key.into(), vector);
    }

    pub fn vector(&self, key: &str) -> Option<&[f32]> {
        self.vectors.get(key).map(Vec::as_slice)
    }

    pub fn require_vector(&self, key: &str) -> Result<&[f32], WorkflowError> {
        self.vector(key)
            .ok_or_else(|| WorkflowError::MissingData(format!("{} embedding", key)))
    }

    pub fn merge_vectors(&mut self, entries: impl IntoIterator<Item = (String, Vec<f32>)>) {
        self.vectors.extend(entries);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}
