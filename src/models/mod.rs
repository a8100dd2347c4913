pub mod connection;
pub mod query;
pub mod value;

pub use connection::*;
pub use query::*;
pub use value::*;
