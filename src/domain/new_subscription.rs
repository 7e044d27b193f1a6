use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;

use super::SubscriberEmail;

/// Used when the caller does not say where the signup came from.
pub const DEFAULT_SOURCE: &str = "website";

/// A subscribe request that has passed validation and is ready to be sent to
/// the provider.
#[derive(Debug)]
pub struct NewSubscription {
    pub email: SubscriberEmail,
    pub first_name: Option<String>,
    pub source: String,
    /// Human-readable tag names, in the order they were requested.
    pub tags: Vec<String>,
    pub custom_fields: HashMap<String, String>,
}

impl NewSubscription {
    /// Subscriber fields as the provider expects them: `source` first, then the
    /// custom fields, which win on a key clash.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("source".to_string(), self.source.clone());
        fields.extend(
            self.custom_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        fields
    }
}

/// One problem with one field of a rejected request. `path` is empty when the
/// problem concerns the body as a whole.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn field(
        name: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: vec![name.to_string()],
            message: message.into(),
        }
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self {
            path: vec![],
            message: message.into(),
        }
    }
}
