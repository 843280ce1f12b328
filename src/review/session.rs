use crate::collab::CatalogFilter;
use crate::review::error::ReviewError;
use crate::review::model::{BatchItem, BatchSession, BatchSummary, ItemStatus};
use chrono::Utc;
use uuid::Uuid;

impl BatchSession {
    pub fn new(filter: CatalogFilter, items: Vec<BatchItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filter,
            items,
            current_index: 0,
            approved_count: 0,
            skipped_count: 0,
            loaded_at: Utc::now(),
            search_running: false,
            last_search: None,
        }
    }

    pub fn index_of(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == item_id)
    }

    #[cfg(test)]
    pub fn item(&self, index: usize) -> Result<&BatchItem, ReviewError> {
        self.items
            .get(index)
            .ok_or_else(|| ReviewError::not_found("item", format!("no item at index {index}")))
    }

    pub fn item_mut(&mut self, index: usize) -> Result<&mut BatchItem, ReviewError> {
        self.items
            .get_mut(index)
            .ok_or_else(|| ReviewError::not_found("item", format!("no item at index {index}")))
    }

    pub fn item_by_id_mut(&mut self, item_id: &str) -> Result<&mut BatchItem, ReviewError> {
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| ReviewError::not_found("item", format!("unknown item `{item_id}`")))
    }

    /// Applies `patch` to the item with `item_id`, if it is still part of the batch.
    ///
    /// Async callbacks resolve in any order; each one only touches the fields it
    /// owns, so keyed patches never clobber one another.
    pub fn update_item<R>(
        &mut self,
        item_id: &str,
        patch: impl FnOnce(&mut BatchItem) -> R,
    ) -> Option<R> {
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .map(patch)
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.items.len(),
            ..BatchSummary::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Pending => summary.pending += 1,
                ItemStatus::Searching => summary.searching += 1,
                ItemStatus::Ready => summary.ready += 1,
                ItemStatus::Approved => summary.approved += 1,
                ItemStatus::Skipped => summary.skipped += 1,
                ItemStatus::Error => summary.error += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::testing::{item, session_with};

    #[test]
    fn new_session_starts_at_zero() {
        let session = session_with(vec![item("a", "A", None), item("b", "B", None)]);
        assert_eq!(session.current_index, 0);
        assert_eq!(session.approved_count, 0);
        assert_eq!(session.skipped_count, 0);
        assert_eq!(session.summary().pending, 2);
        assert_eq!(session.summary().total, 2);
    }

    #[test]
    fn update_item_is_keyed_by_id() {
        let mut session = session_with(vec![item("a", "A", None), item("b", "B", None)]);
        let touched = session.update_item("b", |item| {
            item.status = ItemStatus::Ready;
            item.id.clone()
        });
        assert_eq!(touched.as_deref(), Some("b"));
        assert_eq!(session.items[0].status, ItemStatus::Pending);
        assert_eq!(session.items[1].status, ItemStatus::Ready);
        assert!(session.update_item("zzz", |_| ()).is_none());
    }

    #[test]
    fn out_of_range_index_is_not_found() {
        let session = session_with(vec![item("a", "A", None)]);
        let err = session.item(3).expect_err("missing");
        assert_eq!(err.kind(), crate::review::error::ReviewErrorKind::NotFound);
    }
}
