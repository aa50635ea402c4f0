//! Object model: suite, applications, collections, documents and their methods.

mod application;
mod collection;
mod document;
mod method;
mod suite;

pub use application::Application;
pub use collection::Collection;
pub(crate) use collection::split_target;
pub use document::Document;
pub use method::{Arguments, Invocation, MethodDescriptor, MethodHandler, Operation, OwnerKind, Receiver};
pub use suite::{Suite, SuiteBuilder};
