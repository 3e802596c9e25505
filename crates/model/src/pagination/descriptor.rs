use crate::{
    core::{error::ConfigError, value::Value},
    pagination::cursor::ContinuationToken,
};
use std::collections::BTreeMap;

/// Upper bound the store places on `total_segments`.
pub const MAX_TOTAL_SEGMENTS: u32 = 1_000_000;

/// A resolved condition/filter expression with its placeholder bindings.
///
/// `names` maps `#alias` placeholders to attribute names, `values` maps
/// `:name` placeholders to values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expression {
    pub text: String,
    pub names: BTreeMap<String, String>,
    pub values: BTreeMap<String, Value>,
}

impl Expression {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    pub fn value(mut self, placeholder: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(placeholder.into(), value.into());
        self
    }

    /// Every `:placeholder` in the text must have a bound value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for token in placeholders(&self.text, ':') {
            if !self.values.contains_key(token) {
                return Err(ConfigError::UnboundPlaceholder(token.to_string()));
            }
        }
        Ok(())
    }
}

fn placeholders(text: &str, sigil: char) -> impl Iterator<Item = &str> {
    text.match_indices(sigil).map(move |(start, _)| {
        let rest = &text[start..];
        let end = rest[1..]
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .map(|i| i + 1)
            .unwrap_or(rest.len());
        &rest[..end]
    })
}

/// Segment assignment for one worker of a parallel scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: u32,
    pub total: u32,
}

impl Segment {
    pub fn new(index: u32, total: u32) -> Result<Self, ConfigError> {
        let segment = Self { index, total };
        segment.validate()?;
        Ok(segment)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total == 0 || self.total > MAX_TOTAL_SEGMENTS {
            return Err(ConfigError::InvalidSegmentCount(self.total as usize));
        }
        if self.index >= self.total {
            return Err(ConfigError::SegmentOutOfRange {
                index: self.index,
                total: self.total,
            });
        }
        Ok(())
    }
}

/// What a read returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Select {
    #[default]
    AllAttributes,
    /// Only the matched count; pages carry no rows.
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDescriptor {
    pub table: String,
    pub filter: Option<Expression>,
    pub index: Option<String>,
    /// Per-request item cap as understood by the store.
    pub limit: Option<usize>,
    pub segment: Option<Segment>,
    pub start_key: Option<ContinuationToken>,
    pub consistent_read: bool,
    pub projection: Vec<String>,
    pub select: Select,
}

impl ScanDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            index: None,
            limit: None,
            segment: None,
            start_key: None,
            consistent_read: false,
            projection: Vec::new(),
            select: Select::AllAttributes,
        }
    }

    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    pub fn with_start_key(mut self, token: ContinuationToken) -> Self {
        self.start_key = Some(token);
        self
    }

    pub fn with_projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    pub fn count_only(mut self) -> Self {
        self.select = Select::Count;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.is_empty() {
            return Err(ConfigError::EmptyTableName);
        }
        if self.limit == Some(0) {
            return Err(ConfigError::ZeroLimit);
        }
        if let Some(segment) = &self.segment {
            segment.validate()?;
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub table: String,
    pub key_condition: Expression,
    pub filter: Option<Expression>,
    pub index: Option<String>,
    pub limit: Option<usize>,
    pub start_key: Option<ContinuationToken>,
    pub consistent_read: bool,
    pub ascending: bool,
    pub projection: Vec<String>,
    pub select: Select,
}

impl QueryDescriptor {
    pub fn new(table: impl Into<String>, key_condition: Expression) -> Self {
        Self {
            table: table.into(),
            key_condition,
            filter: None,
            index: None,
            limit: None,
            start_key: None,
            consistent_read: false,
            ascending: true,
            projection: Vec::new(),
            select: Select::AllAttributes,
        }
    }

    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_start_key(mut self, token: ContinuationToken) -> Self {
        self.start_key = Some(token);
        self
    }

    pub fn with_projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    /// Sort order of the range key.
    pub fn sort(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.is_empty() {
            return Err(ConfigError::EmptyTableName);
        }
        if self.key_condition.text.trim().is_empty() {
            return Err(ConfigError::MissingKeyCondition);
        }
        if self.limit == Some(0) {
            return Err(ConfigError::ZeroLimit);
        }
        self.key_condition.validate()?;
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}
