// XML serializer
// <query_name> root, one <result> per record, one leaf per declared field.
// A null field is a self-closing leaf, never a missing one.

use super::{ExportOptions, Format};
use crate::error::{Error, Result};
use crate::query::normalize::{FieldKind, FieldSpec, RATING_RANGE};
use crate::query::{QueryName, Record, RecordSchema, Scalar, Timestamp};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const RECORD_ELEMENT: &str = "result";
const INDENT: &str = "  ";

/// Characters XML 1.0 can't carry, even escaped
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..)
}

fn leaf_text(name: &str, value: &Scalar) -> Result<String> {
    let text = value.to_string();
    if let Some(bad) = text.chars().find(|c| !is_xml_char(*c)) {
        return Err(Error::Export {
            format: Format::Xml,
            reason: format!("field '{}' holds U+{:04X}, which XML cannot represent", name, bad as u32),
        });
    }
    Ok(escape(&text).into_owned())
}

pub fn render(query: QueryName, records: &[Record], options: &ExportOptions) -> Result<String> {
    let root = query.as_str();
    let newline = if options.pretty { "\n" } else { "" };
    let indent = if options.pretty { INDENT } else { "" };

    let mut out = String::from(DECLARATION);
    out.push_str(newline);

    if records.is_empty() {
        out.push_str(&format!("<{}/>", root));
        out.push_str(newline);
        return Ok(out);
    }

    out.push_str(&format!("<{}>", root));
    for record in records {
        out.push_str(newline);
        out.push_str(indent);
        out.push_str(&format!("<{}>", RECORD_ELEMENT));

        for (name, value) in record.fields() {
            out.push_str(newline);
            out.push_str(indent);
            out.push_str(indent);
            match value {
                Scalar::Null => out.push_str(&format!("<{}/>", name)),
                value => out.push_str(&format!(
                    "<{name}>{}</{name}>",
                    leaf_text(name, value)?,
                    name = name
                )),
            }
        }

        out.push_str(newline);
        out.push_str(indent);
        out.push_str(&format!("</{}>", RECORD_ELEMENT));
    }
    out.push_str(newline);
    out.push_str(&format!("</{}>", root));
    out.push_str(newline);
    Ok(out)
}

/// Where the reader is in the document
enum Position {
    BeforeRoot,
    InRoot,
    /// Inside a record, collecting (field, text) pairs; `None` text is null
    InRecord(Vec<(String, Option<String>)>),
    InField {
        fields: Vec<(String, Option<String>)>,
        name: String,
        text: String,
    },
    AfterRoot,
}

pub fn decode(query: QueryName, schema: &RecordSchema, text: &str) -> Result<Vec<Record>> {
    let fail = |reason: String| Error::decode(Format::Xml, reason);
    let root = query.as_str();

    let mut reader = Reader::from_str(text);
    let mut records = Vec::new();
    let mut position = Position::BeforeRoot;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| fail(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        position = match (position, event) {
            (position, Event::Eof) => {
                return match position {
                    Position::AfterRoot => Ok(records),
                    _ => Err(fail("unexpected end of document".to_string())),
                };
            }
            (position, Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => {
                position
            }

            (Position::BeforeRoot, Event::Start(e)) => {
                expect_name(&element_name(e.name().as_ref())?, root)?;
                Position::InRoot
            }
            (Position::BeforeRoot, Event::Empty(e)) => {
                expect_name(&element_name(e.name().as_ref())?, root)?;
                Position::AfterRoot
            }

            (Position::InRoot, Event::Start(e)) => {
                expect_name(&element_name(e.name().as_ref())?, RECORD_ELEMENT)?;
                Position::InRecord(Vec::new())
            }
            (Position::InRoot, Event::Empty(e)) => {
                expect_name(&element_name(e.name().as_ref())?, RECORD_ELEMENT)?;
                records.push(build_record(schema, records.len(), Vec::new())?);
                Position::InRoot
            }
            (Position::InRoot, Event::End(_)) => Position::AfterRoot,

            (Position::InRecord(fields), Event::Start(e)) => Position::InField {
                fields,
                name: element_name(e.name().as_ref())?,
                text: String::new(),
            },
            (Position::InRecord(mut fields), Event::Empty(e)) => {
                fields.push((element_name(e.name().as_ref())?, None));
                Position::InRecord(fields)
            }
            (Position::InRecord(fields), Event::End(_)) => {
                records.push(build_record(schema, records.len(), fields)?);
                Position::InRoot
            }

            (Position::InField { fields, name, mut text }, Event::Text(t)) => {
                let chunk = t.unescape().map_err(|e| fail(e.to_string()))?;
                text.push_str(&chunk);
                Position::InField { fields, name, text }
            }
            (Position::InField { fields, name, mut text }, Event::CData(c)) => {
                text.push_str(&String::from_utf8_lossy(&c));
                Position::InField { fields, name, text }
            }
            (
                Position::InField {
                    mut fields,
                    name,
                    text,
                },
                Event::End(_),
            ) => {
                fields.push((name, Some(text)));
                Position::InRecord(fields)
            }
            (Position::InField { name, .. }, Event::Start(_) | Event::Empty(_)) => {
                return Err(fail(format!("field '{}' contains an element", name)));
            }

            // Whitespace between elements carries no data
            (position, Event::Text(t)) => {
                if t.iter().all(u8::is_ascii_whitespace) {
                    position
                } else {
                    let stray = String::from_utf8_lossy(&t).into_owned();
                    return Err(fail(format!("unexpected text '{}'", stray.trim())));
                }
            }

            (_, Event::Start(e) | Event::Empty(e)) => {
                let name = element_name(e.name().as_ref())?;
                return Err(fail(format!("unexpected element <{}>", name)));
            }
            (_, event) => {
                return Err(fail(format!("unexpected {:?}", event)));
            }
        };
    }
}

fn element_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| Error::decode(Format::Xml, format!("element name is not UTF-8: {}", e)))
}

fn expect_name(found: &str, expected: &str) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(Error::decode(
            Format::Xml,
            format!("expected <{}>, found <{}>", expected, found),
        ))
    }
}

fn build_record(
    schema: &RecordSchema,
    index: usize,
    fields: Vec<(String, Option<String>)>,
) -> Result<Record> {
    let fail = |reason: String| Error::decode(Format::Xml, format!("record {}: {}", index, reason));

    if let Some((unknown, _)) = fields.iter().find(|(name, _)| schema.field(name).is_none()) {
        return Err(fail(format!("unexpected field '{}'", unknown)));
    }
    if fields.len() != schema.fields.len() {
        return Err(fail(format!(
            "expected {} fields, found {}",
            schema.fields.len(),
            fields.len()
        )));
    }

    schema
        .fields
        .iter()
        .map(|spec| {
            let mut matches = fields.iter().filter(|(name, _)| name == spec.name);
            let (_, text) = matches
                .next()
                .ok_or_else(|| fail(format!("missing field '{}'", spec.name)))?;
            if matches.next().is_some() {
                return Err(fail(format!("duplicate field '{}'", spec.name)));
            }
            decode_text(spec, text.as_deref())
                .map(|scalar| (spec.name, scalar))
                .map_err(fail)
        })
        .collect::<Result<Vec<_>>>()
        .map(Record::from_fields)
}

fn decode_text(spec: &FieldSpec, text: Option<&str>) -> std::result::Result<Scalar, String> {
    let Some(text) = text else {
        return if spec.nullable {
            Ok(Scalar::Null)
        } else {
            Err(format!("field '{}' is empty", spec.name))
        };
    };
    let mismatch = || format!("field '{}': '{}' is not a valid {:?} value", spec.name, text, spec.kind);

    match spec.kind {
        FieldKind::Text => Ok(Scalar::Text(text.to_string())),
        FieldKind::Integer => text.trim().parse().map(Scalar::Integer).map_err(|_| mismatch()),
        FieldKind::Rating => text
            .trim()
            .parse()
            .ok()
            .filter(|r| RATING_RANGE.contains(r))
            .map(Scalar::Integer)
            .ok_or_else(mismatch),
        FieldKind::Float => text.trim().parse().map(Scalar::Float).map_err(|_| mismatch()),
        FieldKind::Timestamp => Timestamp::parse(text)
            .map(Scalar::Timestamp)
            .ok_or_else(mismatch),
    }
}
