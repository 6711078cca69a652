// Export module - normalized records to JSON or XML documents, and back
pub mod json;
pub mod xml;

use crate::error::{Error, Result};
use crate::query::{QueryName, Record};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The document formats records can be exported as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Json, Format::Xml];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
        }
    }

    /// The raw extension of a path, for callers that pick the format by
    /// file name; parsing it may still fail with `UnsupportedFormat`
    pub fn extension_of(path: &Path) -> Option<String> {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            _ => Err(Error::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout options shared by both serializers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Indent nested structure and break lines
    pub pretty: bool,
}

/// Serialize records in the requested format
pub fn render(
    format: Format,
    query: QueryName,
    records: &[Record],
    options: &ExportOptions,
) -> Result<String> {
    match format {
        Format::Json => json::render(records, options),
        Format::Xml => xml::render(query, records, options),
    }
}

/// Read an exported document back into records of the query's schema
pub fn decode(format: Format, query: QueryName, text: &str) -> Result<Vec<Record>> {
    match format {
        Format::Json => json::decode(&query.schema(), text),
        Format::Xml => xml::decode(query, &query.schema(), text),
    }
}
