// JSON serializer
// A top-level array with one object per record, keys in declared order

use super::{ExportOptions, Format};
use crate::error::{Error, Result};
use crate::query::normalize::{FieldKind, FieldSpec, RATING_RANGE};
use crate::query::{Record, RecordSchema, Scalar, Timestamp};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Integer(i) => serializer.serialize_i64(*i),
            Scalar::Float(f) => serializer.serialize_f64(*f),
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Timestamp(t) => serializer.serialize_str(t.as_str()),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub fn render(records: &[Record], options: &ExportOptions) -> Result<String> {
    let text = if options.pretty {
        serde_json::to_string_pretty(records)
    } else {
        serde_json::to_string(records)
    };

    text.map_err(|e| Error::Export {
        format: Format::Json,
        reason: e.to_string(),
    })
}

pub fn decode(schema: &RecordSchema, text: &str) -> Result<Vec<Record>> {
    let document: JsonValue =
        serde_json::from_str(text).map_err(|e| Error::decode(Format::Json, e.to_string()))?;

    let JsonValue::Array(items) = document else {
        return Err(Error::decode(Format::Json, "expected a top-level array"));
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            decode_record(schema, item)
                .map_err(|reason| Error::decode(Format::Json, format!("record {}: {}", index, reason)))
        })
        .collect()
}

fn decode_record(schema: &RecordSchema, item: &JsonValue) -> std::result::Result<Record, String> {
    let JsonValue::Object(object) = item else {
        return Err("expected an object".to_string());
    };

    if let Some(unknown) = object.keys().find(|key| schema.field(key).is_none()) {
        return Err(format!("unexpected field '{}'", unknown));
    }

    schema
        .fields
        .iter()
        .map(|spec| {
            let value = object
                .get(spec.name)
                .ok_or_else(|| format!("missing field '{}'", spec.name))?;
            decode_value(spec, value).map(|scalar| (spec.name, scalar))
        })
        .collect::<std::result::Result<Vec<_>, String>>()
        .map(Record::from_fields)
}

fn decode_value(spec: &FieldSpec, value: &JsonValue) -> std::result::Result<Scalar, String> {
    let mismatch = || format!("field '{}': {} is not a valid {:?} value", spec.name, value, spec.kind);

    if value.is_null() {
        return if spec.nullable {
            Ok(Scalar::Null)
        } else {
            Err(format!("field '{}' is null", spec.name))
        };
    }

    match spec.kind {
        FieldKind::Integer => value.as_i64().map(Scalar::Integer).ok_or_else(mismatch),
        FieldKind::Rating => value
            .as_i64()
            .filter(|r| RATING_RANGE.contains(r))
            .map(Scalar::Integer)
            .ok_or_else(mismatch),
        FieldKind::Float => value.as_f64().map(Scalar::Float).ok_or_else(mismatch),
        FieldKind::Text => value
            .as_str()
            .map(|s| Scalar::Text(s.to_string()))
            .ok_or_else(mismatch),
        FieldKind::Timestamp => value
            .as_str()
            .and_then(Timestamp::parse)
            .map(Scalar::Timestamp)
            .ok_or_else(mismatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryName;

    fn student(id: i64, name: &str) -> Record {
        Record::from_fields(vec![
            ("id", Scalar::Integer(id)),
            ("name", Scalar::Text(name.to_string())),
        ])
    }

    #[test]
    fn test_render_compact_in_declared_order() {
        let records = vec![student(1, "Ada"), student(2, "Grace")];
        let text = render(&records, &ExportOptions::default()).unwrap();
        assert_eq!(text, r#"[{"id":1,"name":"Ada"},{"id":2,"name":"Grace"}]"#);
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[], &ExportOptions::default()).unwrap(), "[]");
    }

    #[test]
    fn test_null_is_explicit() {
        let record = Record::from_fields(vec![
            ("course_id", Scalar::Integer(1)),
            ("average_rating", Scalar::Null),
        ]);
        let text = render(&[record], &ExportOptions::default()).unwrap();
        assert_eq!(text, r#"[{"course_id":1,"average_rating":null}]"#);
    }

    #[test]
    fn test_decode_rejects_shape_errors() {
        let schema = QueryName::ListStudents.schema();

        assert!(decode(&schema, r#"{"id":1}"#).is_err());
        assert!(decode(&schema, r#"[{"id":1}]"#).is_err());
        assert!(decode(&schema, r#"[{"id":1,"name":"Ada","age":3}]"#).is_err());
        assert!(decode(&schema, r#"[{"id":"1","name":"Ada"}]"#).is_err());
        assert!(decode(&schema, r#"[{"id":1,"name":null}]"#).is_err());

        let records = decode(&schema, r#"[{"name":"Ada","id":1}]"#).unwrap();
        assert_eq!(records, vec![student(1, "Ada")]);
    }
}
