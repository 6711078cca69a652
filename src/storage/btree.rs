// B-Tree Index Implementation
// Maps a column value to the IDs of every row holding it

use super::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Secondary index over one column, backed by BTreeMap
#[derive(Debug, Clone)]
pub struct BTreeIndex {
    /// Maps index key (Value) to row IDs, in insertion order
    tree: BTreeMap<IndexKey, Vec<usize>>,
    column_name: String,
}

/// Wrapper for Value to make it totally ordered
/// Values that don't compare fall back to ordering by type
#[derive(Debug, Clone)]
pub struct IndexKey(pub Value);

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Integer(_) | Value::Float(_) => 1,
        Value::Text(_) => 2,
        Value::Boolean(_) => 3,
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .compare(&other.0)
            .unwrap_or_else(|| type_rank(&self.0).cmp(&type_rank(&other.0)))
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl BTreeIndex {
    pub fn new(column_name: String) -> Self {
        Self {
            tree: BTreeMap::new(),
            column_name,
        }
    }

    /// Insert a value into the index
    pub fn insert(&mut self, value: Value, row_id: usize) {
        self.tree.entry(IndexKey(value)).or_default().push(row_id);
    }

    /// Look up the row IDs holding a value
    pub fn lookup(&self, value: &Value) -> Option<&Vec<usize>> {
        self.tree.get(&IndexKey(value.clone()))
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// Number of distinct values in the index
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
