//! Partial updates in the persistence API's field vocabulary.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field-level partial update, keyed by wire field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    fields: BTreeMap<String, Value>,
}

impl Patch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Fields that differ between two serialized records.
    ///
    /// A field present before and absent after becomes an explicit `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if either record fails to serialize.
    pub fn diff<R: Serialize>(before: &R, after: &R) -> Result<Self, serde_json::Error> {
        let before = to_object(before)?;
        let after = to_object(after)?;

        let mut patch = Self::new();
        for (field, value) in &after {
            if before.get(field) != Some(value) {
                patch.set(field.clone(), value.clone());
            }
        }
        for field in before.keys() {
            if !after.contains_key(field) {
                patch.set(field.clone(), Value::Null);
            }
        }
        Ok(patch)
    }

    /// Apply this patch to a record, returning the patched copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the patched fields do not deserialize back into
    /// the record type.
    pub fn apply_to<R: Serialize + DeserializeOwned>(
        &self,
        record: &R,
    ) -> Result<R, serde_json::Error> {
        let mut object = to_object(record)?;
        for (field, value) in &self.fields {
            object.insert(field.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(object))
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// JSON request body.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

fn to_object<R: Serialize>(record: &R) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(record)? {
        Value::Object(object) => Ok(object),
        other => {
            let mut object = Map::new();
            object.insert(String::new(), other);
            Ok(object)
        }
    }
}
