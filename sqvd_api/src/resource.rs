//! The closed set of remote collections and the key rewriting the backing
//! store requires for mutating bodies.

use serde_json::Value;
use std::fmt;

/// A remote SQVD collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Panel,
    Track,
    Sample,
    Dataset,
    Study,
}

impl Resource {
    /// The collection name used in endpoint paths.
    pub fn collection(self) -> &'static str {
        match self {
            Resource::Panel => "panel",
            Resource::Track => "track",
            Resource::Sample => "sample",
            Resource::Dataset => "dataset",
            Resource::Study => "study",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Recursively substitute the key characters `.` and `$`, which are reserved
/// in the backing store, in every object key of a JSON body.
pub fn safe_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| (key.replace('.', "-").replace('$', "£"), safe_keys(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(safe_keys).collect()),
        other => other,
    }
}
