// Query module - from named lookups to normalized records
pub mod accessor;
pub mod catalog;
pub mod normalize;

pub use accessor::{Entity, Filter, Relation, RowSet, SchemaAccessor};
pub use catalog::{Param, Params, Query, QueryName};
pub use normalize::{normalize, FieldKind, FieldSpec, Record, RecordSchema, Scalar, Timestamp};
