//! Repository traits and their in-memory implementations.
//!
//! Every read that touches tenant-scoped data takes the caller's
//! [`permit_core::SiteFilter`]; repositories apply it before anything else.
//! Background loops run with `SiteFilter::All`.

pub mod access_repo;
pub mod audit_repo;
pub mod catalog_repo;
pub mod notification_repo;
pub mod outbox_repo;
pub mod permit_repo;
pub mod training_repo;

pub use access_repo::{AccessRepository, MemoryAccessRepo};
pub use audit_repo::{AlertListFilter, AlertStats, AuditRepository, MemoryAuditRepo};
pub use catalog_repo::{CatalogRepository, MemoryCatalogRepo};
pub use notification_repo::{MemoryNotificationRepo, NotificationRepository, QueueStats};
pub use outbox_repo::{MemoryOutboxRepo, OutboxRepository};
pub use permit_repo::{MemoryPermitRepo, PermitListFilter, PermitRepository};
pub use training_repo::{MemoryTrainingRepo, TrainingRepository};

use serde::{Deserialize, Serialize};

/// One page of a listed result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    /// Slice an already-filtered, already-ordered collection into a page.
    /// Pages are 1-based; a zero page or page size yields an empty page.
    pub fn slice(all: Vec<T>, page: usize, page_size: usize) -> Self {
        let total = all.len();
        if page == 0 || page_size == 0 {
            return Self {
                items: Vec::new(),
                total,
                page,
                page_size,
            };
        }
        let start = (page - 1).saturating_mul(page_size);
        let items = all
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect::<Vec<_>>();
        Self {
            items,
            total,
            page,
            page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slicing() {
        let page = Page::slice((1..=10).collect::<Vec<_>>(), 2, 3);
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 10);

        let past_end = Page::slice((1..=10).collect::<Vec<_>>(), 5, 3);
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 10);

        let zero = Page::slice(vec![1, 2, 3], 0, 3);
        assert!(zero.items.is_empty());
    }
}
