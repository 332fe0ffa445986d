//! In-memory stand-in for the remote resource API, used by unit tests.

use crate::client::{ApiError, ResourceApi};
use crate::resource::Resource;
use crate::upload::FileType;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Stores documents per collection and hands out sequential ids like
/// `sample-3`. Equality filters compare the stringified field value, the
/// same way the wire filters do.
#[derive(Default)]
pub struct FakeApi {
    docs: RefCell<BTreeMap<Resource, Vec<Value>>>,
    attachments: RefCell<Vec<(String, FileType, String, bool)>>,
}

impl FakeApi {
    pub fn seed(&self, resource: Resource, mut doc: Value) -> Value {
        let mut docs = self.docs.borrow_mut();
        let collection = docs.entry(resource).or_default();
        doc["_id"] = json!(format!(
            "{}-{}",
            resource.collection(),
            collection.len() + 1
        ));
        collection.push(doc.clone());
        doc
    }

    pub fn all(&self, resource: Resource) -> Vec<Value> {
        self.docs
            .borrow()
            .get(&resource)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, resource: Resource) -> usize {
        self.all(resource).len()
    }

    pub fn attachments(&self) -> Vec<(String, FileType, String, bool)> {
        self.attachments.borrow().clone()
    }
}

fn field_matches(doc: &Value, key: &str, value: &str) -> bool {
    match &doc[key] {
        Value::String(s) => s == value,
        Value::Number(n) => n.to_string() == value,
        Value::Bool(b) => b.to_string() == value,
        _ => false,
    }
}

impl ResourceApi for FakeApi {
    fn find(&self, resource: Resource, filter: &[(&str, String)]) -> Result<Vec<Value>, ApiError> {
        Ok(self
            .all(resource)
            .into_iter()
            .filter(|doc| filter.iter().all(|(key, value)| field_matches(doc, key, value)))
            .collect())
    }

    fn create(&self, resource: Resource, body: Value) -> Result<Value, ApiError> {
        Ok(self.seed(resource, body))
    }

    fn delete(&self, resource: Resource, id: &str) -> Result<Value, ApiError> {
        let mut docs = self.docs.borrow_mut();
        let collection = docs.entry(resource).or_default();
        let position = collection
            .iter()
            .position(|doc| doc["_id"] == json!(id))
            .ok_or_else(|| ApiError::Shape(format!("no {resource} with id {id}")))?;
        Ok(collection.remove(position))
    }

    fn attach(
        &self,
        study_id: &str,
        file_type: FileType,
        filename: &str,
        _bytes: Vec<u8>,
        import: bool,
    ) -> Result<Value, ApiError> {
        self.attachments.borrow_mut().push((
            study_id.to_string(),
            file_type,
            filename.to_string(),
            import,
        ));
        Ok(json!({"filename": filename}))
    }

    fn user_id(&self) -> &str {
        "user-1"
    }
}
