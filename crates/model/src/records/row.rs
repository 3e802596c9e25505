use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, btree_map};

/// A single item: attribute name to value.
///
/// Attributes are kept ordered by name so two rows with the same content
/// compare and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Copies the named fields into a new row. Fields absent from this row are skipped.
    pub fn project<S: AsRef<str>>(&self, fields: &[S]) -> Row {
        fields
            .iter()
            .filter_map(|f| {
                let name = f.as_ref();
                self.fields
                    .get(name)
                    .map(|v| (name.to_string(), v.clone()))
            })
            .collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl From<BTreeMap<String, Value>> for Row {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_skips_missing_fields() {
        let row = Row::new()
            .with("PK", "user#1")
            .with("SK", "profile")
            .with("name", "Ada");

        let key = row.project(&["PK", "SK", "GSI1PK"]);
        assert_eq!(key, Row::new().with("PK", "user#1").with("SK", "profile"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let row = Row::new().with("PK", "a").with("n", 3i64);
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.is_object());
        assert_eq!(json.as_object().map(|o| o.len()), Some(2));
    }
}
