use std::collections::HashMap;

use crate::error::BridgeError;

/// One record from a source: named fields, each of which may be absent.
///
/// Absent names, JSON nulls and empty strings are all treated the same way,
/// so callers never see a placeholder value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: HashMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Stores a field value; blank values are dropped.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row, BridgeError>> + 'a>;

/// Anything that can yield a sequence of rows for the graph builder.
pub trait RowSource {
    /// Short human label used in progress messages.
    fn describe(&self) -> String;

    fn rows(&mut self) -> Result<RowIter<'_>, BridgeError>;
}

/// A source over rows already held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    rows: Vec<Row>,
}

impl StaticSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

impl RowSource for StaticSource {
    fn describe(&self) -> String {
        format!("{} in-memory rows", self.rows.len())
    }

    fn rows(&mut self) -> Result<RowIter<'_>, BridgeError> {
        Ok(Box::new(self.rows.iter().cloned().map(Ok)))
    }
}
