//! Documents: request-scoped, schema-checked records with a primary key.

use super::{Collection, MethodDescriptor, Suite};
use crate::error::{DispatchError, ValidationError};
use crate::store::{key_text, WriteMode};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// One record of a collection. Never shared across requests; persistence happens only on `save`/`delete`.
#[derive(Clone)]
pub struct Document {
    collection: Arc<Collection>,
    key: Value,
    fields: Map<String, Value>,
    revision: Option<u64>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("collection", &self.collection.name())
            .field("key", &self.key)
            .field("revision", &self.revision)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Document {
    /// `fields` must already be valid against the collection schema and carry the key.
    pub(crate) fn from_valid(collection: Arc<Collection>, key: Value, fields: Map<String, Value>, revision: Option<u64>) -> Self {
        Document {
            collection,
            key,
            fields,
            revision,
        }
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn key_string(&self) -> String {
        key_text(&self.key)
    }

    /// Store revision this document was read at; `None` until first saved.
    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    pub(crate) fn set_revision(&mut self, revision: Option<u64>) {
        self.revision = revision;
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Validate `value` against the field's schema fragment, then commit it.
    /// On error the document is unchanged.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), ValidationError> {
        if field == self.collection.primary_key() && !crate::schema::value_eq(&value, &self.key) {
            return Err(ValidationError::single(field, None, "primary key cannot be changed"));
        }
        let registry = self.collection.registry();
        let value = registry.validate_property(self.collection.schema(), field, &value)?;
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Apply several fields. Every field is checked before any is committed.
    pub fn update(&mut self, changes: &Map<String, Value>) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        let mut staged = self.clone();
        for (field, value) in changes {
            if let Err(e) = staged.set(field, value.clone()) {
                errors.extend(e);
            }
        }
        errors.into_result()?;
        self.fields = staged.fields;
        Ok(())
    }

    /// Whole-document check, as done before every write.
    pub fn validate(&self) -> Result<Value, ValidationError> {
        self.collection.registry().validate(self.collection.schema(), &Value::Object(self.fields.clone()))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn url(&self) -> String {
        format!("{}/{}", self.collection.url(), urlencoding::encode(&self.key_string()))
    }

    /// Instance-level methods declared on the owning collection.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.collection.document_methods()
    }

    /// Persist. A document never saved is inserted; a loaded one is replaced only over the revision it was read at.
    pub async fn save(&mut self) -> Result<(), DispatchError> {
        let value = self.validate()?;
        let mode = match self.revision {
            None => WriteMode::Insert,
            Some(r) => WriteMode::Replace {
                expected_revision: Some(r),
            },
        };
        let record = self
            .collection
            .store()
            .put(self.collection.table(), &self.key, value.clone(), mode)
            .await?;
        if let Value::Object(fields) = value {
            self.fields = fields;
        }
        self.revision = Some(record.revision);
        tracing::debug!(collection = %self.collection.name(), key = %self.key_string(), revision = record.revision, "document saved");
        Ok(())
    }

    pub async fn delete(self) -> Result<(), DispatchError> {
        let removed = self.collection.store().delete(self.collection.table(), &self.key).await?;
        if removed {
            Ok(())
        } else {
            Err(DispatchError::NotFound(format!("{} '{}'", self.collection.name(), self.key_string())))
        }
    }

    /// Follow a relation declared on the collection: the field of the same name holds the related key.
    pub async fn related(&self, suite: &Suite, relation: &str) -> Result<Option<Document>, DispatchError> {
        let target = self.collection.related(suite, relation)?;
        match self.fields.get(relation) {
            None | Some(Value::Null) => Ok(None),
            Some(key) => target.by_key(key).await.map(Some),
        }
    }
}
