//! Storage layer of the work-permit platform.
//!
//! Provides the persisted entity structs, repository traits with in-memory
//! implementations, the id sequence, and the domain services: audit & alert
//! sink, notification pipeline, access grant lifecycle, training engine, and
//! the work-permit core with its change protocol.
//!
//! Every repository read takes the caller's [`permit_core::TenantContext`]
//! site predicate; nothing touches the shared store without tenant scoping.

pub mod entities;
pub mod outbox;
pub mod repos;
pub mod schema;
pub mod sequence;
pub mod services;

pub use entities::*;
pub use repos::*;
pub use sequence::IdGenerator;
pub use services::*;
