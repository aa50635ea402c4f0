//! Safe SQL builder: identifiers from registered names only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
