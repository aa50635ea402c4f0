//! Request resolution and validated dispatch.

mod dispatcher;
mod query;
mod resolver;
mod target;

pub use dispatcher::Dispatcher;
pub use query::{decode_query_value, encode_query_value, QueryArgs, SCHEMA_FLAG};
pub use resolver::Resolver;
pub use target::{Action, ResolvedTarget};
