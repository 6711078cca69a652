// Pipeline Orchestrator
// Resolves a request to a catalog query, runs it against a store session
// opened for this invocation only, normalizes the rows and serializes them.

use crate::error::{Error, Result};
use crate::export::{self, ExportOptions, Format};
use crate::query::{normalize, Params, Query, QueryName, Record, SchemaAccessor};
use crate::storage::Store;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where each invocation opens its store from
#[derive(Debug, Clone)]
pub enum StoreSource {
    /// A seed script on disk, read on every invocation
    Path(PathBuf),
    /// Seed script text held in memory
    Script(String),
}

impl StoreSource {
    fn open(&self) -> Result<Store> {
        match self {
            StoreSource::Path(path) => Store::open(path),
            StoreSource::Script(script) => Store::from_script(script),
        }
    }
}

/// One query invocation as supplied by the caller
#[derive(Debug, Clone)]
pub struct Request {
    pub query: String,
    pub params: Params,
    pub format: String,
}

impl Request {
    pub fn new(query: impl Into<String>, params: Params, format: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params,
            format: format.into(),
        }
    }
}

/// A finished export
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub document: String,
    pub record_count: usize,
    pub query: QueryName,
    pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Querying,
    Exporting,
    Failed,
}

/// The store connection for one invocation
/// Released when dropped, whichever way the invocation ends
struct Session {
    store: Store,
}

impl Session {
    fn open(source: &StoreSource) -> Result<Self> {
        let store = source.open()?;
        debug!("session opened");
        Ok(Self { store })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("session closed");
    }
}

pub struct Pipeline {
    source: StoreSource,
    options: ExportOptions,
    state: State,
}

impl Pipeline {
    pub fn new(source: StoreSource) -> Self {
        Self {
            source,
            options: ExportOptions::default(),
            state: State::Idle,
        }
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// State reached by the last invocation
    pub fn state(&self) -> State {
        self.state
    }

    fn transition(&mut self, next: State) {
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    /// Run one request end to end
    /// Either a complete document comes back or an error does, never both
    pub fn run(&mut self, request: &Request) -> Result<Export> {
        self.state = State::Idle;

        match self.execute(request) {
            Ok(export) => {
                self.transition(State::Idle);
                info!(
                    query = %export.query,
                    format = %export.format,
                    records = export.record_count,
                    "export complete"
                );
                Ok(export)
            }
            Err(err) => {
                self.transition(State::Failed);
                warn!(query = %request.query, error = %err, "export failed");
                Err(err)
            }
        }
    }

    fn execute(&mut self, request: &Request) -> Result<Export> {
        // Format first: an unsupported format fails whatever the query
        let format: Format = request.format.parse()?;
        let name: QueryName = request.query.parse()?;
        let query = Query::resolve(name, &request.params)?;

        self.transition(State::Querying);
        let records = self.fetch(&query)?;

        self.transition(State::Exporting);
        let document = export::render(format, name, &records, &self.options)?;

        Ok(Export {
            document,
            record_count: records.len(),
            query: name,
            format,
        })
    }

    /// Open a session, run the query and normalize its rows
    /// The session is closed before this returns
    fn fetch(&self, query: &Query) -> Result<Vec<Record>> {
        let session = Session::open(&self.source)?;
        let accessor = SchemaAccessor::new(&session.store)?;
        let rows = query.execute(&accessor)?;
        let records = normalize(&query.name().schema(), rows)?;
        Ok(records)
    }
}

/// Errors are reported to end users as-is; this names which kind it was
pub fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::InvalidQuery { .. } => "InvalidQueryError",
        Error::InvalidParameter { .. } => "InvalidParameterError",
        Error::NotFound { .. } => "NotFoundError",
        Error::UnsupportedFormat { .. } => "UnsupportedFormatError",
        Error::StorageUnavailable { .. } => "StorageUnavailableError",
        Error::Decode { .. } => "DecodeError",
        Error::Export { .. } => "ExportError",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "
        CREATE TABLE student (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
        CREATE TABLE course (id INTEGER PRIMARY KEY, subject TEXT NOT NULL,
            student_id INTEGER NOT NULL REFERENCES student(id));
        CREATE TABLE review (id INTEGER PRIMARY KEY, course_id INTEGER NOT NULL REFERENCES course(id),
            rating INTEGER NOT NULL, comment TEXT, authored_at TEXT NOT NULL);
        INSERT INTO student VALUES (1, 'Ada'), (2, 'Grace');
    ";

    fn pipeline() -> Pipeline {
        Pipeline::new(StoreSource::Script(SCRIPT.to_string()))
    }

    #[test]
    fn test_list_students_json() {
        let mut pipeline = pipeline();
        let export = pipeline
            .run(&Request::new("list_students", Params::new(), "json"))
            .unwrap();

        assert_eq!(export.document, r#"[{"id":1,"name":"Ada"},{"id":2,"name":"Grace"}]"#);
        assert_eq!(export.record_count, 2);
        assert_eq!(export.query, QueryName::ListStudents);
        assert_eq!(export.format, Format::Json);
        assert_eq!(pipeline.state(), State::Idle);
    }

    #[test]
    fn test_unsupported_format_wins_over_unknown_query() {
        let mut pipeline = pipeline();
        let err = pipeline
            .run(&Request::new("no_such_query", Params::new(), "yaml"))
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedFormat { .. }));
        assert_eq!(error_kind(&err), "UnsupportedFormatError");
        assert_eq!(pipeline.state(), State::Failed);
    }

    #[test]
    fn test_unknown_query() {
        let err = pipeline()
            .run(&Request::new("drop_table", Params::new(), "xml"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn test_failed_state_resets_on_next_run() {
        let mut pipeline = pipeline();
        let params = Params::new().with("student_id", 9);
        assert!(pipeline
            .run(&Request::new("courses_for_student", params, "json"))
            .is_err());
        assert_eq!(pipeline.state(), State::Failed);

        let params = Params::new().with("student_id", 1);
        let export = pipeline
            .run(&Request::new("courses_for_student", params, "json"))
            .unwrap();
        assert_eq!(export.document, "[]");
        assert_eq!(pipeline.state(), State::Idle);
    }

    #[test]
    fn test_storage_unavailable() {
        let mut pipeline = Pipeline::new(StoreSource::Path(PathBuf::from("/no/such/store.sql")));
        let err = pipeline
            .run(&Request::new("list_students", Params::new(), "json"))
            .unwrap_err();
        assert_eq!(error_kind(&err), "StorageUnavailableError");
    }
}
