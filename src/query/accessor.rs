// Schema Accessor
// Structural access to the three entities and the joins between them.
// No formatting happens here: rows come back exactly as stored.

use crate::error::{Error, Result};
use crate::storage::{table::Table, Row, Store, Value};
use std::cmp::Ordering;

/// The entities of the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Student,
    Course,
    Review,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Student, Entity::Course, Entity::Review];

    pub fn table_name(self) -> &'static str {
        match self {
            Entity::Student => "student",
            Entity::Course => "course",
            Entity::Review => "review",
        }
    }

    /// Columns the queries rely on
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Entity::Student => &["id", "name"],
            Entity::Course => &["id", "subject", "student_id"],
            Entity::Review => &["id", "course_id", "rating", "comment", "authored_at"],
        }
    }
}

/// Comparison applied by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    AtMost,
    /// Case-insensitive substring match on text
    ContainsIgnoreCase,
}

/// A predicate on one column of one entity
#[derive(Debug, Clone)]
pub struct Filter {
    pub entity: Entity,
    pub column: &'static str,
    pub cmp: Cmp,
    pub value: Value,
}

impl Filter {
    pub fn eq(entity: Entity, column: &'static str, value: Value) -> Self {
        Self {
            entity,
            column,
            cmp: Cmp::Eq,
            value,
        }
    }

    pub fn at_most(entity: Entity, column: &'static str, value: Value) -> Self {
        Self {
            entity,
            column,
            cmp: Cmp::AtMost,
            value,
        }
    }

    pub fn contains(entity: Entity, column: &'static str, text: &str) -> Self {
        Self {
            entity,
            column,
            cmp: Cmp::ContainsIgnoreCase,
            value: Value::Text(text.to_lowercase()),
        }
    }

    fn matches(&self, cell: &Value) -> bool {
        match self.cmp {
            Cmp::Eq => cell.compare(&self.value) == Some(Ordering::Equal),
            Cmp::AtMost => matches!(
                cell.compare(&self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Cmp::ContainsIgnoreCase => match (cell, &self.value) {
                (Value::Text(cell), Value::Text(needle)) => {
                    cell.to_lowercase().contains(needle.as_str())
                }
                _ => false,
            },
        }
    }
}

/// One step of a join plan: rows of `entity` whose `column` equals the
/// already-joined column `on`
#[derive(Debug, Clone, Copy)]
struct JoinStep {
    entity: Entity,
    column: &'static str,
    on: (Entity, &'static str),
}

/// The fixed join shapes the catalog is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Students,
    /// Student ⋈ Course
    StudentCourses,
    /// Course ⋈ Review
    CourseReviews,
    /// Student ⋈ Course ⋈ Review
    StudentCourseReviews,
    /// Review ⋈ Course ⋈ Student, driven from the review side
    ReviewCourseStudents,
}

impl Relation {
    fn driving(self) -> Entity {
        match self {
            Relation::Students | Relation::StudentCourses | Relation::StudentCourseReviews => {
                Entity::Student
            }
            Relation::CourseReviews => Entity::Course,
            Relation::ReviewCourseStudents => Entity::Review,
        }
    }

    fn steps(self) -> &'static [JoinStep] {
        const COURSE_OF_STUDENT: JoinStep = JoinStep {
            entity: Entity::Course,
            column: "student_id",
            on: (Entity::Student, "id"),
        };
        const REVIEW_OF_COURSE: JoinStep = JoinStep {
            entity: Entity::Review,
            column: "course_id",
            on: (Entity::Course, "id"),
        };
        const COURSE_OF_REVIEW: JoinStep = JoinStep {
            entity: Entity::Course,
            column: "id",
            on: (Entity::Review, "course_id"),
        };
        const STUDENT_OF_COURSE: JoinStep = JoinStep {
            entity: Entity::Student,
            column: "id",
            on: (Entity::Course, "student_id"),
        };

        match self {
            Relation::Students => &[],
            Relation::StudentCourses => &[COURSE_OF_STUDENT],
            Relation::CourseReviews => &[REVIEW_OF_COURSE],
            Relation::StudentCourseReviews => &[COURSE_OF_STUDENT, REVIEW_OF_COURSE],
            Relation::ReviewCourseStudents => &[COURSE_OF_REVIEW, STUDENT_OF_COURSE],
        }
    }
}

/// A lazily produced sequence of raw rows with their qualified column names
pub struct RowSet<'s> {
    columns: Vec<String>,
    rows: Box<dyn Iterator<Item = Row> + 's>,
}

impl<'s> RowSet<'s> {
    /// Wrap rows computed elsewhere
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: Box::new(rows.into_iter()),
        }
    }

    /// Qualified column names (`table.column`), in row order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, qualified: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == qualified)
    }
}

impl Iterator for RowSet<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }
}

fn qualified(entity: Entity, column: &str) -> String {
    format!("{}.{}", entity.table_name(), column)
}

/// Read access to an opened store, borrowed for one invocation
pub struct SchemaAccessor<'s> {
    store: &'s Store,
}

impl<'s> SchemaAccessor<'s> {
    /// Check the store holds every entity table and column before any read
    pub fn new(store: &'s Store) -> Result<Self> {
        for entity in Entity::ALL {
            let table = store.table(entity.table_name()).ok_or_else(|| {
                Error::storage(format!("missing table '{}'", entity.table_name()))
            })?;
            for column in entity.required_columns() {
                if table.schema.get_column_index(column).is_none() {
                    return Err(Error::storage(format!(
                        "missing column '{}'",
                        qualified(entity, column)
                    )));
                }
            }
        }
        Ok(Self { store })
    }

    fn table(&self, entity: Entity) -> Result<&'s Table> {
        self.store
            .table(entity.table_name())
            .ok_or_else(|| Error::storage(format!("missing table '{}'", entity.table_name())))
    }

    fn column(table: &Table, entity: Entity, column: &str) -> Result<usize> {
        table
            .schema
            .get_column_index(column)
            .ok_or_else(|| Error::storage(format!("missing column '{}'", qualified(entity, column))))
    }

    /// Whether a row with this primary key exists
    pub fn exists(&self, entity: Entity, id: i64) -> Result<bool> {
        let table = self.table(entity)?;
        let col = Self::column(table, entity, "id")?;
        Ok(!table.matching(col, &Value::Integer(id)).is_empty())
    }

    /// Rows of a relation that satisfy every filter
    /// Joined rows are produced lazily, one driving row at a time
    pub fn scan(&self, relation: Relation, filters: &[Filter]) -> Result<RowSet<'s>> {
        let driving = relation.driving();
        let table = self.table(driving)?;

        let mut columns: Vec<String> = table
            .schema
            .columns
            .iter()
            .map(|c| qualified(driving, &c.name))
            .collect();

        // Resolve each filter to a position in the joined row
        let mut layout = columns.clone();
        for step in relation.steps() {
            let step_table = self.table(step.entity)?;
            layout.extend(
                step_table
                    .schema
                    .columns
                    .iter()
                    .map(|c| qualified(step.entity, &c.name)),
            );
        }
        let mut resolved = Vec::with_capacity(filters.len());
        for filter in filters {
            let name = qualified(filter.entity, filter.column);
            let position = layout
                .iter()
                .position(|c| *c == name)
                .ok_or_else(|| Error::storage(format!("cannot filter on missing column '{}'", name)))?;
            resolved.push((position, filter.clone()));
        }

        // The first equality on the driving table goes through its index
        let driving_width = columns.len();
        let seek = resolved
            .iter()
            .find(|(pos, f)| *pos < driving_width && f.cmp == Cmp::Eq)
            .map(|(pos, f)| (*pos, f.value.clone()));

        let start: Vec<&'s Row> = match seek {
            Some((pos, value)) => table.matching(pos, &value),
            None => table.rows().collect(),
        };

        let (early, late): (Vec<_>, Vec<_>) =
            resolved.into_iter().partition(|(pos, _)| *pos < driving_width);

        let mut rows: Box<dyn Iterator<Item = Row> + 's> = Box::new(
            start
                .into_iter()
                .filter(move |row| early.iter().all(|(pos, f)| f.matches(&row.values[*pos])))
                .cloned(),
        );

        for step in relation.steps() {
            let step_table = self.table(step.entity)?;
            let right_col = Self::column(step_table, step.entity, step.column)?;
            let on = qualified(step.on.0, step.on.1);
            let left_col = columns
                .iter()
                .position(|c| *c == on)
                .ok_or_else(|| Error::storage(format!("missing column '{}'", on)))?;

            columns.extend(
                step_table
                    .schema
                    .columns
                    .iter()
                    .map(|c| qualified(step.entity, &c.name)),
            );

            rows = Box::new(rows.flat_map(move |left| {
                let matches = step_table.matching(right_col, &left.values[left_col]);
                matches.into_iter().map(move |right| {
                    let mut values = left.values.clone();
                    values.extend(right.values.iter().cloned());
                    Row { values }
                })
            }));
        }

        if !late.is_empty() {
            rows = Box::new(rows.filter(move |row| late.iter().all(|(pos, f)| f.matches(&row.values[*pos]))));
        }

        Ok(RowSet { columns, rows })
    }
}
