// Remote database clients
pub mod adapter;
pub mod in_memory;
pub mod weblite;

pub use adapter::{Connector, RemoteClient, Row, RowBatch};
pub use in_memory::{InMemoryClient, InMemoryConnector, RecordedQuery};
pub use weblite::{WebliteClient, WebliteConnector};
