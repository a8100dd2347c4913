pub mod connection_pool;
pub mod dialect; // Query tree to SQLite Cloud SQL
pub mod plain_sql;
pub mod remote; // Remote client adapters
pub mod result_stream;
pub mod session_context;
pub mod sqlite_cloud;
pub mod statement;

pub use connection_pool::*;
pub use result_stream::*;
pub use session_context::*;
pub use sqlite_cloud::*;
pub use statement::*;
