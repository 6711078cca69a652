// CourseDB - read-only queries over students, courses and reviews
// This is the library root that exposes the public API

pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod query;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use export::{ExportOptions, Format};
pub use pipeline::{error_kind, Export, Pipeline, Request, State, StoreSource};
pub use query::{Param, Params, Query, QueryName, Record, Scalar};
pub use storage::Store;
