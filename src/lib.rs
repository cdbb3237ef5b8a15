pub mod error;
pub mod query;
pub mod respond;
pub mod stream;

// Re-export the stream contract and combinators at the crate root
pub use stream::*;

pub use error::{ConfigError, StreamError, StreamResult};
pub use query::{Database, Query, QueryBuilder, Scanner, Transaction};
pub use respond::{IoResponseWriter, Responder, ResponderBuilder, ResponseWriter};
