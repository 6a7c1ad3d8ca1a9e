//! The client-facing side of a request: schemas and the client operation.

mod query;
mod schema;

pub use query::Query;
pub use schema::Schema;
pub use schema::SchemaError;
