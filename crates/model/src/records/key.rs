use crate::{core::error::ConfigError, records::row::Row};

/// Derives the primary-key row of an item.
///
/// Implementations name the fields they keep so callers can also use them
/// to synthesize continuation tokens.
pub trait KeyExtractor: Send + Sync {
    fn key_fields(&self) -> &[String];

    fn extract(&self, row: &Row) -> Row {
        row.project(self.key_fields())
    }
}

/// Keeps a fixed list of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldsExtractor {
    fields: Vec<String>,
}

impl FieldsExtractor {
    pub fn new<I, S>(fields: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() || fields.iter().any(|f| f.is_empty()) {
            return Err(ConfigError::MissingKeyFields);
        }
        Ok(Self { fields })
    }

    /// The conventional single-table design key pair `PK` / `SK`.
    pub fn pk_sk() -> Self {
        Self {
            fields: vec!["PK".to_string(), "SK".to_string()],
        }
    }
}

impl KeyExtractor for FieldsExtractor {
    fn key_fields(&self) -> &[String] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_field_list() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            FieldsExtractor::new(empty),
            Err(ConfigError::MissingKeyFields)
        );
        assert!(FieldsExtractor::new([""]).is_err());
    }

    #[test]
    fn pk_sk_extracts_key_pair() {
        let row = Row::new()
            .with("PK", "order#9")
            .with("SK", "line#1")
            .with("qty", 2i64);
        let key = FieldsExtractor::pk_sk().extract(&row);
        assert_eq!(key.len(), 2);
        assert!(!key.contains("qty"));
    }
}
