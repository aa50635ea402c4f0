//! Suite SDK: declarative suites of applications, collections and documents, served as a
//! routed, schema-validated and self-documenting HTTP API.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod model;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{ApplicationDef, CollectionDef, Settings, SuiteConfig};
pub use dispatch::{decode_query_value, encode_query_value, Dispatcher, ResolvedTarget, Resolver};
pub use error::{AppError, ConfigError, DispatchError, RouteError, ValidationError, Violation};
pub use model::{
    Application, Arguments, Collection, Document, Invocation, MethodDescriptor, MethodHandler, Operation, OwnerKind, Receiver,
    Suite, SuiteBuilder,
};
pub use routes::{common_routes, common_routes_with_ready, suite_routes};
pub use schema::{SchemaDefinition, SchemaHandle, SchemaRegistry, SchemaType};
pub use state::AppState;
pub use store::{CompareOp, Condition, Filter, MemoryStore, OrderBy, PgStore, Store, StoreError, Table, WriteMode};
