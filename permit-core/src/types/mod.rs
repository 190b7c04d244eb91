//! Shared type definitions.

pub mod ids;
pub mod status;

pub use ids::*;
pub use status::*;
