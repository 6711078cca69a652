// Table implementation
// A table combines schema, data (pages), and indexes

use super::{btree::BTreeIndex, page::PageManager, Row, Schema, Value};
use anyhow::{anyhow, Result};
use std::collections::HashMap;

const ROWS_PER_PAGE: usize = 100;

/// Represents a database table
pub struct Table {
    pub name: String,
    pub schema: Schema,
    page_manager: PageManager,
    /// Indexes by column name
    indexes: HashMap<String, BTreeIndex>,
}

impl Table {
    /// Create a new table with the given name and schema
    /// The primary key and every foreign key column get an index
    pub fn new(name: String, schema: Schema) -> Self {
        let indexed: Vec<String> = schema
            .columns
            .iter()
            .filter(|col| col.primary_key || col.references.is_some())
            .map(|col| col.name.clone())
            .collect();

        let indexes = indexed
            .into_iter()
            .map(|col| (col.clone(), BTreeIndex::new(col)))
            .collect();

        Self {
            name,
            schema,
            page_manager: PageManager::new(ROWS_PER_PAGE),
            indexes,
        }
    }

    /// Insert a row into the table
    /// Values are checked against the declared types and constraints
    pub fn insert(&mut self, values: Vec<Value>) -> Result<usize> {
        if values.len() != self.schema.columns.len() {
            return Err(anyhow!(
                "Table '{}': expected {} values, got {}",
                self.name,
                self.schema.columns.len(),
                values.len()
            ));
        }

        let mut checked = Vec::with_capacity(values.len());
        for (column, value) in self.schema.columns.iter().zip(values) {
            let type_name = value.type_name();
            let value = column.data_type.coerce(value).ok_or_else(|| {
                anyhow!(
                    "Table '{}': column '{}' is {:?}, got {}",
                    self.name,
                    column.name,
                    column.data_type,
                    type_name
                )
            })?;

            if value.is_null() && (!column.nullable || column.primary_key) {
                return Err(anyhow!(
                    "Table '{}': column '{}' cannot be NULL",
                    self.name,
                    column.name
                ));
            }
            checked.push(value);
        }

        // Check primary key constraint (no duplicates)
        if let Some(pk_index) = self.schema.get_primary_key_index() {
            let pk_name = &self.schema.columns[pk_index].name;
            if let Some(index) = self.indexes.get(pk_name) {
                if index.lookup(&checked[pk_index]).is_some() {
                    return Err(anyhow!(
                        "Table '{}': duplicate primary key {}",
                        self.name,
                        checked[pk_index]
                    ));
                }
            }
        }

        let row = Row { values: checked };
        let row_id = self.page_manager.insert(row.clone());

        for (col_index, value) in row.values.into_iter().enumerate() {
            let col_name = &self.schema.columns[col_index].name;
            if let Some(index) = self.indexes.get_mut(col_name) {
                index.insert(value, row_id);
            }
        }

        Ok(row_id)
    }

    /// All rows, in insertion order
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.page_manager.scan().map(|(_id, row)| row)
    }

    /// Rows whose column equals the value
    /// Uses the column's index when one exists, otherwise a full scan
    pub fn matching(&self, col_index: usize, value: &Value) -> Vec<&Row> {
        let col_name = &self.schema.columns[col_index].name;

        if let Some(index) = self.indexes.get(col_name) {
            return index
                .lookup(value)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|&row_id| self.page_manager.get(row_id))
                        .collect()
                })
                .unwrap_or_default();
        }

        self.rows()
            .filter(|row| row.values[col_index].compare(value) == Some(std::cmp::Ordering::Equal))
            .collect()
    }

    /// Whether any row holds the value in the named column
    pub fn contains(&self, column_name: &str, value: &Value) -> Result<bool> {
        let col_index = self.column_index(column_name)?;
        Ok(!self.matching(col_index, value).is_empty())
    }

    pub fn column_index(&self, column_name: &str) -> Result<usize> {
        self.schema
            .get_column_index(column_name)
            .ok_or_else(|| anyhow!("Column not found: {}.{}", self.name, column_name))
    }

    pub fn has_index(&self, column_name: &str) -> bool {
        self.indexes.contains_key(column_name)
    }

    pub fn row_count(&self) -> usize {
        self.page_manager.total_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Column, DataType, ForeignKey};

    fn column(name: &str, data_type: DataType) -> Column {
        Column {
            name: name.to_string(),
            data_type,
            primary_key: false,
            nullable: true,
            references: None,
        }
    }

    fn course_table() -> Table {
        let mut id = column("id", DataType::Integer);
        id.primary_key = true;
        let mut student_id = column("student_id", DataType::Integer);
        student_id.nullable = false;
        student_id.references = Some(ForeignKey {
            table: "student".to_string(),
            column: "id".to_string(),
        });

        Table::new(
            "course".to_string(),
            Schema::new(vec![id, column("subject", DataType::Text), student_id]),
        )
    }

    fn course(id: i64, subject: &str, student: i64) -> Vec<Value> {
        vec![
            Value::Integer(id),
            Value::Text(subject.to_string()),
            Value::Integer(student),
        ]
    }

    #[test]
    fn test_keys_are_indexed() {
        let table = course_table();
        assert!(table.has_index("id"));
        assert!(table.has_index("student_id"));
        assert!(!table.has_index("subject"));
    }

    #[test]
    fn test_matching_uses_index_and_scan() {
        let mut table = course_table();
        table.insert(course(1, "Maths", 10)).unwrap();
        table.insert(course(2, "Physics", 11)).unwrap();
        table.insert(course(3, "Chemistry", 10)).unwrap();

        let by_student = table.matching(2, &Value::Integer(10));
        assert_eq!(by_student.len(), 2);
        assert_eq!(by_student[1].values[1], Value::Text("Chemistry".to_string()));

        let by_subject = table.matching(1, &Value::Text("Physics".to_string()));
        assert_eq!(by_subject.len(), 1);
        assert!(table.matching(1, &Value::Text("Art".to_string())).is_empty());
    }

    #[test]
    fn test_insert_rejects_bad_rows() {
        let mut table = course_table();
        table.insert(course(1, "Maths", 10)).unwrap();

        assert!(table.insert(course(1, "Again", 10)).is_err());
        assert!(table
            .insert(vec![Value::Integer(2), Value::Text("X".into())])
            .is_err());
        assert!(table
            .insert(vec![
                Value::Integer(2),
                Value::Integer(5),
                Value::Integer(10)
            ])
            .is_err());
        assert!(table
            .insert(vec![Value::Integer(2), Value::Null, Value::Null])
            .is_err());
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_contains() {
        let mut table = course_table();
        table.insert(course(4, "Art", 2)).unwrap();

        assert!(table.contains("id", &Value::Integer(4)).unwrap());
        assert!(!table.contains("id", &Value::Integer(5)).unwrap());
        assert!(table.contains("nope", &Value::Integer(4)).is_err());
    }
}
