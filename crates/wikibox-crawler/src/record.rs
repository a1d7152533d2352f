use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field always holding the keyword a record was extracted for.
pub const NAME_FIELD: &str = "Name";

/// Field name → field value mapping of one infobox.
///
/// An empty record means the extraction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfoboxRecord(BTreeMap<String, String>);

impl InfoboxRecord {
    pub fn named(keyword: &str) -> Self {
        let mut record = Self::default();
        record.insert(NAME_FIELD, keyword);
        record
    }

    /// Inserts a field, overwriting a previous value with the same name.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME_FIELD)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Outcome of extracting one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub record: InfoboxRecord,
    /// Titles found in the related links block, in document order.
    pub related: Vec<String>,
}

impl Extraction {
    pub fn failed(related: Vec<String>) -> Self {
        Self {
            record: InfoboxRecord::default(),
            related,
        }
    }
}
