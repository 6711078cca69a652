// Query Catalog
// The fixed set of named lookups, their parameters and their record shapes

use super::accessor::{Entity, Filter, Relation, RowSet, SchemaAccessor};
use super::normalize::{FieldKind, FieldSpec, RecordSchema, RATING_RANGE};
use crate::error::{Error, Result};
use crate::storage::{Row, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Names of the supported queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryName {
    ListStudents,
    FindStudentsByName,
    CoursesForStudent,
    ReviewsForCourse,
    ReviewsForStudent,
    LowRatedReviews,
    RatingSummaryForStudent,
}

/// What a parameter must hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A non-negative entity identifier
    Id,
    /// An integer on the rating scale
    Rating,
    /// Non-blank text
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

const STUDENT_ID: ParamSpec = ParamSpec {
    name: "student_id",
    kind: ParamKind::Id,
};
const COURSE_ID: ParamSpec = ParamSpec {
    name: "course_id",
    kind: ParamKind::Id,
};

const STUDENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "student.id", FieldKind::Integer),
    FieldSpec::new("name", "student.name", FieldKind::Text),
];

const COURSE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "course.id", FieldKind::Integer),
    FieldSpec::new("subject", "course.subject", FieldKind::Text),
    FieldSpec::new("student_id", "course.student_id", FieldKind::Integer),
];

const COURSE_REVIEW_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "review.id", FieldKind::Integer),
    FieldSpec::new("course_id", "review.course_id", FieldKind::Integer),
    FieldSpec::new("rating", "review.rating", FieldKind::Rating),
    FieldSpec::new("comment", "review.comment", FieldKind::Text).nullable(),
    FieldSpec::new("authored_at", "review.authored_at", FieldKind::Timestamp),
];

const STUDENT_REVIEW_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "review.id", FieldKind::Integer),
    FieldSpec::new("course_id", "course.id", FieldKind::Integer),
    FieldSpec::new("subject", "course.subject", FieldKind::Text),
    FieldSpec::new("rating", "review.rating", FieldKind::Rating),
    FieldSpec::new("comment", "review.comment", FieldKind::Text).nullable(),
    FieldSpec::new("authored_at", "review.authored_at", FieldKind::Timestamp),
];

const LOW_RATED_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("id", "review.id", FieldKind::Integer),
    FieldSpec::new("student_id", "student.id", FieldKind::Integer),
    FieldSpec::new("student_name", "student.name", FieldKind::Text),
    FieldSpec::new("course_id", "course.id", FieldKind::Integer),
    FieldSpec::new("subject", "course.subject", FieldKind::Text),
    FieldSpec::new("rating", "review.rating", FieldKind::Rating),
    FieldSpec::new("comment", "review.comment", FieldKind::Text).nullable(),
    FieldSpec::new("authored_at", "review.authored_at", FieldKind::Timestamp),
];

const SUMMARY_REVIEW_COUNT: &str = "summary.review_count";
const SUMMARY_AVERAGE: &str = "summary.average_rating";

const SUMMARY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("course_id", "course.id", FieldKind::Integer),
    FieldSpec::new("subject", "course.subject", FieldKind::Text),
    FieldSpec::new("review_count", SUMMARY_REVIEW_COUNT, FieldKind::Integer),
    FieldSpec::new("average_rating", SUMMARY_AVERAGE, FieldKind::Float).nullable(),
];

impl QueryName {
    pub const ALL: [QueryName; 7] = [
        QueryName::ListStudents,
        QueryName::FindStudentsByName,
        QueryName::CoursesForStudent,
        QueryName::ReviewsForCourse,
        QueryName::ReviewsForStudent,
        QueryName::LowRatedReviews,
        QueryName::RatingSummaryForStudent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryName::ListStudents => "list_students",
            QueryName::FindStudentsByName => "find_students_by_name",
            QueryName::CoursesForStudent => "courses_for_student",
            QueryName::ReviewsForCourse => "reviews_for_course",
            QueryName::ReviewsForStudent => "reviews_for_student",
            QueryName::LowRatedReviews => "low_rated_reviews",
            QueryName::RatingSummaryForStudent => "rating_summary_for_student",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            QueryName::ListStudents => "all students",
            QueryName::FindStudentsByName => "students whose name contains the given text",
            QueryName::CoursesForStudent => "courses taken by a student",
            QueryName::ReviewsForCourse => "reviews of one course",
            QueryName::ReviewsForStudent => "reviews across all of a student's courses",
            QueryName::LowRatedReviews => "reviews rated at or below max_rating, with their student",
            QueryName::RatingSummaryForStudent => "review count and average rating per course of a student",
        }
    }

    pub fn parameters(self) -> &'static [ParamSpec] {
        match self {
            QueryName::ListStudents => &[],
            QueryName::FindStudentsByName => &[ParamSpec {
                name: "name",
                kind: ParamKind::Text,
            }],
            QueryName::CoursesForStudent
            | QueryName::ReviewsForStudent
            | QueryName::RatingSummaryForStudent => &[STUDENT_ID],
            QueryName::ReviewsForCourse => &[COURSE_ID],
            QueryName::LowRatedReviews => &[ParamSpec {
                name: "max_rating",
                kind: ParamKind::Rating,
            }],
        }
    }

    /// The record shape this query produces
    pub fn schema(self) -> RecordSchema {
        let fields = match self {
            QueryName::ListStudents | QueryName::FindStudentsByName => STUDENT_FIELDS,
            QueryName::CoursesForStudent => COURSE_FIELDS,
            QueryName::ReviewsForCourse => COURSE_REVIEW_FIELDS,
            QueryName::ReviewsForStudent => STUDENT_REVIEW_FIELDS,
            QueryName::LowRatedReviews => LOW_RATED_FIELDS,
            QueryName::RatingSummaryForStudent => SUMMARY_FIELDS,
        };
        RecordSchema { fields }
    }
}

impl FromStr for QueryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        QueryName::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::InvalidQuery {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for QueryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed parameter value, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Integer(i64),
    Text(String),
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Integer(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

/// Named parameters for one query invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, Param>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Param>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A catalog entry with validated arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    ListStudents,
    FindStudentsByName { name: String },
    CoursesForStudent { student_id: i64 },
    ReviewsForCourse { course_id: i64 },
    ReviewsForStudent { student_id: i64 },
    LowRatedReviews { max_rating: i64 },
    RatingSummaryForStudent { student_id: i64 },
}

impl Query {
    /// Validate parameters against the query's declaration
    pub fn resolve(name: QueryName, params: &Params) -> Result<Query> {
        let query = name.as_str();
        let specs = name.parameters();

        if let Some((unexpected, _)) = params
            .iter()
            .find(|(key, _)| !specs.iter().any(|spec| spec.name == *key))
        {
            return Err(Error::parameter(query, unexpected, "unexpected parameter"));
        }

        let int = |spec: &ParamSpec| -> Result<i64> { integer_param(query, spec, params) };
        let text = |spec: &ParamSpec| -> Result<String> { text_param(query, spec, params) };

        Ok(match name {
            QueryName::ListStudents => Query::ListStudents,
            QueryName::FindStudentsByName => Query::FindStudentsByName {
                name: text(&specs[0])?,
            },
            QueryName::CoursesForStudent => Query::CoursesForStudent {
                student_id: int(&specs[0])?,
            },
            QueryName::ReviewsForCourse => Query::ReviewsForCourse {
                course_id: int(&specs[0])?,
            },
            QueryName::ReviewsForStudent => Query::ReviewsForStudent {
                student_id: int(&specs[0])?,
            },
            QueryName::LowRatedReviews => Query::LowRatedReviews {
                max_rating: int(&specs[0])?,
            },
            QueryName::RatingSummaryForStudent => Query::RatingSummaryForStudent {
                student_id: int(&specs[0])?,
            },
        })
    }

    pub fn name(&self) -> QueryName {
        match self {
            Query::ListStudents => QueryName::ListStudents,
            Query::FindStudentsByName { .. } => QueryName::FindStudentsByName,
            Query::CoursesForStudent { .. } => QueryName::CoursesForStudent,
            Query::ReviewsForCourse { .. } => QueryName::ReviewsForCourse,
            Query::ReviewsForStudent { .. } => QueryName::ReviewsForStudent,
            Query::LowRatedReviews { .. } => QueryName::LowRatedReviews,
            Query::RatingSummaryForStudent { .. } => QueryName::RatingSummaryForStudent,
        }
    }

    /// Run the query, returning raw rows carrying every column of
    /// the query's schema
    pub fn execute<'s>(&self, accessor: &SchemaAccessor<'s>) -> Result<RowSet<'s>> {
        debug!(query = %self.name(), "executing");

        match self {
            Query::ListStudents => accessor.scan(Relation::Students, &[]),

            Query::FindStudentsByName { name } => accessor.scan(
                Relation::Students,
                &[Filter::contains(Entity::Student, "name", name)],
            ),

            Query::CoursesForStudent { student_id } => {
                self.require(accessor, Entity::Student, *student_id)?;
                accessor.scan(
                    Relation::StudentCourses,
                    &[Filter::eq(Entity::Student, "id", Value::Integer(*student_id))],
                )
            }

            Query::ReviewsForCourse { course_id } => {
                self.require(accessor, Entity::Course, *course_id)?;
                accessor.scan(
                    Relation::CourseReviews,
                    &[Filter::eq(Entity::Course, "id", Value::Integer(*course_id))],
                )
            }

            Query::ReviewsForStudent { student_id } => {
                self.require(accessor, Entity::Student, *student_id)?;
                accessor.scan(
                    Relation::StudentCourseReviews,
                    &[Filter::eq(Entity::Student, "id", Value::Integer(*student_id))],
                )
            }

            Query::LowRatedReviews { max_rating } => accessor.scan(
                Relation::ReviewCourseStudents,
                &[Filter::at_most(Entity::Review, "rating", Value::Integer(*max_rating))],
            ),

            Query::RatingSummaryForStudent { student_id } => {
                self.require(accessor, Entity::Student, *student_id)?;
                rating_summary(accessor, *student_id)
            }
        }
    }

    /// Parent entities must exist; an existing parent with no children is fine
    fn require(&self, accessor: &SchemaAccessor<'_>, entity: Entity, id: i64) -> Result<()> {
        if accessor.exists(entity, id)? {
            Ok(())
        } else {
            Err(Error::NotFound {
                query: self.name().as_str(),
                entity: entity.table_name(),
                id,
            })
        }
    }
}

fn integer_param(query: &'static str, spec: &ParamSpec, params: &Params) -> Result<i64> {
    let value = match params.get(spec.name) {
        Some(Param::Integer(i)) => *i,
        Some(Param::Text(t)) => {
            return Err(Error::parameter(
                query,
                spec.name,
                format!("expected an integer, got '{}'", t),
            ))
        }
        None => return Err(Error::parameter(query, spec.name, "missing")),
    };

    match spec.kind {
        ParamKind::Id if value < 0 => Err(Error::parameter(
            query,
            spec.name,
            format!("identifier {} is negative", value),
        )),
        ParamKind::Rating if !RATING_RANGE.contains(&value) => Err(Error::parameter(
            query,
            spec.name,
            format!(
                "rating {} is outside {}..={}",
                value,
                RATING_RANGE.start(),
                RATING_RANGE.end()
            ),
        )),
        _ => Ok(value),
    }
}

fn text_param(query: &'static str, spec: &ParamSpec, params: &Params) -> Result<String> {
    match params.get(spec.name) {
        Some(Param::Text(t)) if !t.trim().is_empty() => Ok(t.trim().to_string()),
        Some(Param::Text(_)) => Err(Error::parameter(query, spec.name, "must not be blank")),
        Some(Param::Integer(i)) => Err(Error::parameter(
            query,
            spec.name,
            format!("expected text, got integer {}", i),
        )),
        None => Err(Error::parameter(query, spec.name, "missing")),
    }
}

/// One row per course of the student: review count and mean rating
/// (NULL when the course has no reviews), rounded to two decimals
fn rating_summary<'s>(accessor: &SchemaAccessor<'s>, student_id: i64) -> Result<RowSet<'s>> {
    let courses = accessor.scan(
        Relation::StudentCourses,
        &[Filter::eq(Entity::Student, "id", Value::Integer(student_id))],
    )?;
    let course_id = column(&courses, "course.id")?;
    let subject = column(&courses, "course.subject")?;

    let mut rows = Vec::new();
    for course in courses {
        let id = course.values[course_id].clone();
        let reviews = accessor.scan(
            Relation::CourseReviews,
            &[Filter::eq(Entity::Course, "id", id.clone())],
        )?;
        let rating = column(&reviews, "review.rating")?;

        let mut total = 0i64;
        let mut count = 0i64;
        for review in reviews {
            match review.values[rating] {
                Value::Integer(r) if RATING_RANGE.contains(&r) => {
                    total += r;
                    count += 1;
                }
                ref other => {
                    return Err(Error::storage(format!(
                        "data integrity: review.rating = {} is not on the rating scale",
                        other
                    )))
                }
            }
        }

        let average = if count == 0 {
            Value::Null
        } else {
            Value::Float(((total as f64 / count as f64) * 100.0).round() / 100.0)
        };
        rows.push(Row {
            values: vec![
                id,
                course.values[subject].clone(),
                Value::Integer(count),
                average,
            ],
        });
    }

    let columns = ["course.id", "course.subject", SUMMARY_REVIEW_COUNT, SUMMARY_AVERAGE]
        .into_iter()
        .map(String::from)
        .collect();
    Ok(RowSet::from_rows(columns, rows))
}

fn column(rows: &RowSet<'_>, name: &str) -> Result<usize> {
    rows.column_index(name)
        .ok_or_else(|| Error::storage(format!("missing column '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_names_round_trip() {
        for name in QueryName::ALL {
            assert_eq!(name.as_str().parse::<QueryName>().unwrap(), name);
        }
        assert!(matches!(
            "drop_students".parse::<QueryName>(),
            Err(Error::InvalidQuery { name }) if name == "drop_students"
        ));
    }

    #[test]
    fn test_every_schema_declares_unique_fields() {
        for name in QueryName::ALL {
            let names: Vec<&str> = name.schema().names().collect();
            let mut deduped = names.clone();
            deduped.sort_unstable();
            deduped.dedup();
            assert_eq!(names.len(), deduped.len(), "{}", name);
        }
    }

    #[test]
    fn test_resolve_valid() {
        let params = Params::new().with("student_id", 3);
        assert_eq!(
            Query::resolve(QueryName::CoursesForStudent, &params).unwrap(),
            Query::CoursesForStudent { student_id: 3 }
        );

        let params = Params::new().with("name", "  ada ");
        assert_eq!(
            Query::resolve(QueryName::FindStudentsByName, &params).unwrap(),
            Query::FindStudentsByName {
                name: "ada".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_rejects_malformed_parameters() {
        let cases = [
            (QueryName::CoursesForStudent, Params::new(), "student_id"),
            (
                QueryName::CoursesForStudent,
                Params::new().with("student_id", "one"),
                "student_id",
            ),
            (
                QueryName::ReviewsForCourse,
                Params::new().with("course_id", -1),
                "course_id",
            ),
            (
                QueryName::LowRatedReviews,
                Params::new().with("max_rating", 5),
                "max_rating",
            ),
            (
                QueryName::ListStudents,
                Params::new().with("limit", 10),
                "limit",
            ),
            (
                QueryName::FindStudentsByName,
                Params::new().with("name", "   "),
                "name",
            ),
        ];

        for (name, params, expected) in cases {
            match Query::resolve(name, &params) {
                Err(Error::InvalidParameter {
                    query, parameter, ..
                }) => {
                    assert_eq!(query, name.as_str());
                    assert_eq!(parameter, expected);
                }
                other => panic!("{}: expected InvalidParameter, got {:?}", name, other),
            }
        }
    }
}
