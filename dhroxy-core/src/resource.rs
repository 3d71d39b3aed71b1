use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Any FHIR resource, typed only as far as `resourceType` and `id`.
///
/// Nested responses produced by the serving pipeline are parsed back into
/// this shape; everything beyond the two header fields is kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// All other fields are stored here
    #[serde(flatten)]
    pub rest: Value,
}

impl Resource {
    /// Parse a resource from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Convert the resource back into a JSON value
    pub fn into_value(self) -> Value {
        let mut map = match self.rest {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        map.insert("resourceType".to_string(), Value::String(self.resource_type));
        if let Some(id) = self.id {
            map.insert("id".to_string(), Value::String(id));
        }
        Value::Object(map)
    }
}
