use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// The persisted resume document. One per install, replaced wholesale on save.
///
/// Every field defaults to empty so that `{}` (the "never initialized" reply)
/// decodes to the same shape the relay seeds at install time. Keys this type
/// does not know about are carried in `extra` so a replace writes them back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileDocument {
    pub personal_info: Map<String, Value>,
    pub experience: Vec<Value>,
    pub education: Vec<Value>,
    pub skills: Vec<Value>,
    pub certifications: Vec<Value>,
    pub projects: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProfileDocument {
    /// Decodes a stored or relayed payload field by field.
    ///
    /// A field of the wrong shape is dropped on its own; the rest of the
    /// document survives. Anything that is not an object is the empty
    /// document.
    pub fn from_value_lossy(value: &Value) -> Self {
        let mut doc = Self::default();
        let Value::Object(fields) = value else {
            return doc;
        };
        for (key, field) in fields {
            match key.as_str() {
                "personalInfo" => decode_field(key, field, &mut doc.personal_info),
                "experience" => decode_field(key, field, &mut doc.experience),
                "education" => decode_field(key, field, &mut doc.education),
                "skills" => decode_field(key, field, &mut doc.skills),
                "certifications" => decode_field(key, field, &mut doc.certifications),
                "projects" => decode_field(key, field, &mut doc.projects),
                _ => {
                    doc.extra.insert(key.clone(), field.clone());
                }
            }
        }
        doc
    }

    pub fn is_empty(&self) -> bool {
        self.personal_info.is_empty()
            && self.experience.is_empty()
            && self.education.is_empty()
            && self.skills.is_empty()
            && self.certifications.is_empty()
            && self.projects.is_empty()
            && self.extra.is_empty()
    }
}

fn decode_field<T: DeserializeOwned>(key: &str, value: &Value, slot: &mut T) {
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => *slot = decoded,
        Err(e) => warn!("Dropping malformed {key} field: {e}"),
    }
}
