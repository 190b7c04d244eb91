//! Persisted entity structs.

pub mod access;
pub mod audit;
pub mod catalog;
pub mod notification;
pub mod permit;
pub mod training;

pub use access::*;
pub use audit::*;
pub use catalog::*;
pub use notification::*;
pub use permit::*;
pub use training::*;

use permit_core::SiteId;

/// A persisted record.
///
/// Every business table exposes its table name, primary id, and tenant site
/// so repositories can apply the tenant predicate uniformly. Global catalog
/// rows (contractors) return `None` for the site.
pub trait Record {
    /// Table name
    const TABLE: &'static str;

    /// Primary identifier
    fn record_id(&self) -> &str;

    /// Owning site, when the record is tenant-scoped
    fn site(&self) -> Option<&SiteId>;
}
