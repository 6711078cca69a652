// Store
// A set of tables loaded from a seed script, read-only once opened

use super::script::{ScriptParser, SeedStatement};
use super::table::Table;
use super::Value;
use crate::error::{Error, Result};
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// An opened relational store
/// Dropping the store releases everything it holds
pub struct Store {
    tables: HashMap<String, Table>,
}

impl Store {
    /// Open a store from a seed script on disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let script = std::fs::read_to_string(path)
            .map_err(|e| Error::storage(format!("cannot read {}: {}", path.display(), e)))?;

        let store = Self::from_script(&script).map_err(|e| match e {
            Error::StorageUnavailable { reason } => {
                Error::storage(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })?;

        debug!(path = %path.display(), tables = store.tables.len(), "store opened");
        Ok(store)
    }

    /// Build a store from seed script text
    pub fn from_script(script: &str) -> Result<Self> {
        Self::load(script).map_err(|e| Error::storage(format!("{:#}", e)))
    }

    fn load(script: &str) -> anyhow::Result<Self> {
        let mut store = Self {
            tables: HashMap::new(),
        };

        for statement in ScriptParser::parse(script)? {
            store.apply(statement)?;
        }
        store.check_references()?;

        Ok(store)
    }

    fn apply(&mut self, statement: SeedStatement) -> anyhow::Result<()> {
        match statement {
            SeedStatement::CreateTable { name, schema } => {
                if self.tables.contains_key(&name) {
                    return Err(anyhow!("Table '{}' already exists", name));
                }
                self.tables.insert(name.clone(), Table::new(name, schema));
            }

            SeedStatement::Insert {
                table_name,
                columns,
                rows,
            } => {
                let table = self
                    .tables
                    .get_mut(&table_name)
                    .ok_or_else(|| anyhow!("Table '{}' not found", table_name))?;

                // Map an explicit column list onto schema order, NULL for the rest
                let positions = match &columns {
                    Some(names) => Some(
                        names
                            .iter()
                            .map(|name| table.column_index(name))
                            .collect::<anyhow::Result<Vec<_>>>()?,
                    ),
                    None => None,
                };

                for values in rows {
                    let values = match &positions {
                        Some(positions) => {
                            if positions.len() != values.len() {
                                return Err(anyhow!(
                                    "Table '{}': {} columns named, {} values given",
                                    table_name,
                                    positions.len(),
                                    values.len()
                                ));
                            }
                            let mut full = vec![Value::Null; table.schema.columns.len()];
                            for (&pos, value) in positions.iter().zip(values) {
                                full[pos] = value;
                            }
                            full
                        }
                        None => values,
                    };
                    table.insert(values)?;
                }
            }
        }
        Ok(())
    }

    /// Every non-null foreign key value must exist in the referenced column
    fn check_references(&self) -> anyhow::Result<()> {
        for table in self.tables.values() {
            for (col_index, column) in table.schema.columns.iter().enumerate() {
                let Some(reference) = &column.references else {
                    continue;
                };
                let target = self.tables.get(&reference.table).ok_or_else(|| {
                    anyhow!(
                        "{}.{} references missing table '{}'",
                        table.name,
                        column.name,
                        reference.table
                    )
                })?;

                for row in table.rows() {
                    let value = &row.values[col_index];
                    if value.is_null() {
                        continue;
                    }
                    let found = target
                        .contains(&reference.column, value)
                        .with_context(|| format!("checking {}.{}", table.name, column.name))?;
                    if !found {
                        return Err(anyhow!(
                            "{}.{} = {} has no matching {}.{}",
                            table.name,
                            column.name,
                            value,
                            reference.table,
                            reference.column
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Get a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Names of all tables, sorted
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        debug!(tables = self.tables.len(), "store released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "
        CREATE TABLE student (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE course (
            id INTEGER PRIMARY KEY,
            subject TEXT NOT NULL,
            student_id INTEGER NOT NULL REFERENCES student(id)
        );
        INSERT INTO student VALUES (1, 'Ada'), (2, 'Grace');
        INSERT INTO course (subject, id, student_id) VALUES ('Maths', 10, 1);
    ";

    #[test]
    fn test_from_script_loads_tables() {
        let store = Store::from_script(SCRIPT).unwrap();

        assert_eq!(store.table_names(), vec!["course", "student"]);
        assert_eq!(store.table("student").unwrap().row_count(), 2);

        let course = store.table("course").unwrap();
        let row = course.rows().next().unwrap();
        assert_eq!(row.values[0], Value::Integer(10));
        assert_eq!(row.values[1], Value::Text("Maths".to_string()));
    }

    #[test]
    fn test_dangling_reference_is_storage_error() {
        let script = format!("{SCRIPT} INSERT INTO course VALUES (11, 'Art', 99);");
        let err = Store::from_script(&script).err().unwrap();

        assert!(matches!(err, Error::StorageUnavailable { .. }));
        assert!(err.to_string().contains("course.student_id = 99"));
    }

    #[test]
    fn test_unknown_table_is_storage_error() {
        let err = Store::from_script("INSERT INTO nowhere VALUES (1);")
            .err()
            .unwrap();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
    }

    #[test]
    fn test_open_missing_file() {
        let err = Store::open("/definitely/not/here.sql").err().unwrap();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
        assert!(err.to_string().contains("cannot read"));
    }
}
