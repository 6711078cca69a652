// Result Normalizer
// Turns raw rows into records with a fixed, declared field list.
// Both serializers consume records only, never rows.

use super::accessor::RowSet;
use crate::error::{Error, Result};
use crate::storage::Value;
use std::fmt;
use std::ops::RangeInclusive;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Reviews are rated on this scale
pub const RATING_RANGE: RangeInclusive<i64> = 0..=4;

/// How a field's value is checked and represented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
    Timestamp,
    /// An integer within [`RATING_RANGE`]
    Rating,
}

/// One declared output field and the column it is read from
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Qualified source column, `table.column`
    pub source: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, source: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            source,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// The record shape of one query
#[derive(Debug, Clone, Copy)]
pub struct RecordSchema {
    pub fields: &'static [FieldSpec],
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }
}

/// A point in time, kept with its canonical RFC 3339 (UTC) text
#[derive(Debug, Clone)]
pub struct Timestamp {
    at: OffsetDateTime,
    text: String,
}

impl Timestamp {
    /// Accepts RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let at = OffsetDateTime::parse(raw, &Rfc3339)
            .ok()
            .or_else(|| {
                PrimitiveDateTime::parse(
                    raw,
                    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
                )
                .ok()
                .map(PrimitiveDateTime::assume_utc)
            })?
            .to_offset(UtcOffset::UTC);
        let text = at.format(&Rfc3339).ok()?;
        Some(Self { at, text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

/// A normalized field value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Explicit absence; never an omitted field
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
}

impl Scalar {
    /// Convert a stored cell for a field, or report why it can't be
    pub fn from_value(spec: &FieldSpec, value: Value) -> std::result::Result<Self, String> {
        let found = value.to_string();
        match (spec.kind, value) {
            (_, Value::Null) if spec.nullable => Ok(Scalar::Null),
            (_, Value::Null) => Err(format!("{} is NULL", spec.source)),
            (FieldKind::Integer, Value::Integer(i)) => Ok(Scalar::Integer(i)),
            (FieldKind::Float, Value::Float(f)) => Ok(Scalar::Float(f)),
            (FieldKind::Float, Value::Integer(i)) => Ok(Scalar::Float(i as f64)),
            (FieldKind::Text, Value::Text(s)) => Ok(Scalar::Text(s)),
            (FieldKind::Rating, Value::Integer(i)) if RATING_RANGE.contains(&i) => {
                Ok(Scalar::Integer(i))
            }
            (FieldKind::Rating, Value::Integer(i)) => Err(format!(
                "{} = {} is outside {}..={}",
                spec.source,
                i,
                RATING_RANGE.start(),
                RATING_RANGE.end()
            )),
            (FieldKind::Timestamp, Value::Text(s)) => Timestamp::parse(&s)
                .map(Scalar::Timestamp)
                .ok_or_else(|| format!("{} = '{}' is not a valid timestamp", spec.source, s)),
            (kind, _) => Err(format!(
                "{} = {} is not a valid {:?} value",
                spec.source, found, kind
            )),
        }
    }
}

/// Textual form, as written into XML leaves; null renders empty
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Integer(i) => write!(f, "{}", i),
            // Whole floats keep their fraction, as serde_json writes them
            Scalar::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Timestamp(t) => f.write_str(t.as_str()),
        }
    }
}

/// A normalized record: field names in declared order, each with a value
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(&'static str, Scalar)>,
}

impl Record {
    pub fn from_fields(fields: Vec<(&'static str, Scalar)>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[(&'static str, Scalar)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Convert every row into a record of the schema
/// Any cell that breaks the schema fails the whole batch
pub fn normalize(schema: &RecordSchema, rows: RowSet<'_>) -> Result<Vec<Record>> {
    let positions = schema
        .fields
        .iter()
        .map(|spec| {
            rows.column_index(spec.source)
                .ok_or_else(|| Error::storage(format!("missing column '{}'", spec.source)))
        })
        .collect::<Result<Vec<_>>>()?;

    rows.map(|row| {
        let fields = schema
            .fields
            .iter()
            .zip(&positions)
            .map(|(spec, &pos)| {
                let value = row.values.get(pos).cloned().ok_or_else(|| {
                    format!("{} is missing from a row of {} cells", spec.source, row.values.len())
                });
                value
                    .and_then(|value| Scalar::from_value(spec, value))
                    .map(|scalar| (spec.name, scalar))
                    .map_err(|reason| Error::storage(format!("data integrity: {}", reason)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Record::from_fields(fields))
    })
    .collect()
}
