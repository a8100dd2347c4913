// SQLite Cloud dialect
//
// Keyword quoting, value converters, function mapping and the query tree
// to SQL generator.

pub mod converters;
pub mod functions;
pub mod generator;
pub mod keywords;
pub mod temporal;

pub use converters::{canonical_value, literal_value};
pub use generator::{GeneratedSql, SqlGenerator, JSON_COLUMN};
pub use keywords::{ReservedWords, SQLITE_KEYWORDS};
