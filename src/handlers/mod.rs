//! HTTP handlers for the suite API.

pub mod api;
pub use api::*;
