//! Record type for entity rows.
//!
//! Records arrive from the remote collaborator as plain JSON objects. The
//! engine only relies on an `id` field; everything else is opaque payload.

use crate::{error::Result, Error, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field marking a locally synthesized, not yet confirmed record.
pub const OPTIMISTIC_FIELD: &str = "_optimistic";

/// Field carrying the record identifier.
pub const ID_FIELD: &str = "id";

/// Optional field carrying the server-side revision of a record.
pub const VERSION_FIELD: &str = "version";

/// A data record: a JSON object with an `id`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Build a record from a JSON value, requiring an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(Error::NotAnObject),
        }
    }

    /// Build a record from a JSON value and require an `id`.
    pub fn with_id(value: Value) -> Result<Self> {
        let record = Self::from_value(value)?;
        if record.id().is_none() {
            return Err(Error::MissingRecordId);
        }
        Ok(record)
    }

    /// Record identifier, if present.
    ///
    /// Numeric ids are rendered as strings so every table keys uniformly.
    pub fn id(&self) -> Option<RecordId> {
        match self.fields.get(ID_FIELD)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Set the record identifier.
    pub fn set_id(&mut self, id: impl Into<RecordId>) {
        self.fields
            .insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Server revision, if the record carries one.
    pub fn version(&self) -> Option<&Value> {
        self.fields.get(VERSION_FIELD)
    }

    /// Whether the record is an unconfirmed local synthesis.
    pub fn is_optimistic(&self) -> bool {
        matches!(self.fields.get(OPTIMISTIC_FIELD), Some(Value::Bool(true)))
    }

    /// Flag the record as optimistic.
    pub fn mark_optimistic(&mut self) {
        self.fields
            .insert(OPTIMISTIC_FIELD.to_string(), Value::Bool(true));
    }

    /// Drop the optimistic flag.
    pub fn clear_optimistic(&mut self) {
        self.fields.remove(OPTIMISTIC_FIELD);
    }

    /// Shallow merge: every top-level field of `patch` overwrites ours.
    pub fn patch(&mut self, patch: &Record) {
        for (key, value) in &patch.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Get a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Borrow the underlying object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Copy into a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
