//! Candidate curation for a single item.
//!
//! A selected image is never in the exclusion set. Every mutation below
//! restores that before returning, so readers never have to re-check it.

use crate::review::error::ReviewError;
use crate::review::model::{AiStatus, BatchItem, ImageCandidate};

impl BatchItem {
    pub fn candidate(&self, image_id: &str) -> Option<&ImageCandidate> {
        self.existing_images
            .iter()
            .chain(self.search_results.iter())
            .find(|image| image.id == image_id)
    }

    pub fn is_excluded(&self, image_id: &str) -> bool {
        self.excluded_image_ids.contains(image_id)
    }

    #[cfg(test)]
    pub fn selection_is_valid(&self) -> bool {
        match &self.selected_image {
            None => true,
            Some(selected) => {
                !self.is_excluded(&selected.id) && self.candidate(&selected.id).is_some()
            }
        }
    }

    pub(crate) fn ensure_mutable(&self, stage: &'static str) -> Result<(), ReviewError> {
        if self.status.is_terminal() {
            return Err(ReviewError::validation(
                stage,
                format!("item `{}` is already {}", self.id, self.status.as_str()),
            ));
        }
        if self.committing {
            return Err(ReviewError::validation(
                stage,
                format!("item `{}` has a commit in flight", self.id),
            ));
        }
        Ok(())
    }

    /// Flips exclusion for `image_id`. Returns whether the image is now excluded.
    ///
    /// Excluding the selected image moves the selection to the first included
    /// search result, or clears it.
    pub fn toggle_exclude(&mut self, image_id: &str) -> Result<bool, ReviewError> {
        self.ensure_mutable("toggle_exclude")?;
        if self.candidate(image_id).is_none() {
            return Err(ReviewError::validation(
                "toggle_exclude",
                format!("unknown image `{image_id}`"),
            ));
        }
        let excluded = if self.excluded_image_ids.remove(image_id) {
            false
        } else {
            self.excluded_image_ids.insert(image_id.to_string());
            true
        };
        if excluded
            && self
                .selected_image
                .as_ref()
                .is_some_and(|selected| selected.id == image_id)
        {
            self.selected_image = self.first_included_result().cloned();
        }
        Ok(excluded)
    }

    /// Includes `image_id` and makes it the selection.
    pub fn select(&mut self, image_id: &str) -> Result<&ImageCandidate, ReviewError> {
        self.ensure_mutable("select")?;
        let image = self
            .candidate(image_id)
            .cloned()
            .ok_or_else(|| ReviewError::validation("select", format!("unknown image `{image_id}`")))?;
        self.excluded_image_ids.remove(image_id);
        Ok(self.selected_image.insert(image))
    }

    fn first_included_result(&self) -> Option<&ImageCandidate> {
        self.search_results
            .iter()
            .find(|image| !self.is_excluded(&image.id))
    }

    /// Replaces search results with a fresh set, all excluded by default.
    pub(crate) fn apply_search_results(&mut self, results: Vec<ImageCandidate>) {
        self.excluded_image_ids = results.iter().map(|image| image.id.clone()).collect();
        self.search_results = results;
        if !self
            .selected_image
            .as_ref()
            .is_some_and(|selected| self.candidate(&selected.id).is_some())
        {
            self.selected_image = None;
        }
    }

    /// Prepends a synthesized candidate, replacing any earlier one, then
    /// includes and selects it.
    pub(crate) fn attach_ai_candidate(&mut self, candidate: ImageCandidate) {
        let stale: Vec<String> = self
            .search_results
            .iter()
            .filter(|image| image.is_ai())
            .map(|image| image.id.clone())
            .collect();
        self.search_results.retain(|image| !image.is_ai());
        for id in &stale {
            self.excluded_image_ids.remove(id);
        }
        self.excluded_image_ids.remove(&candidate.id);
        self.search_results.insert(0, candidate.clone());
        self.selected_image = Some(candidate);
        self.ai_status = AiStatus::Ready;
        self.ai_error = None;
    }
}

#[cfg(test)]
mod tests {
    use crate::review::ItemStatus;
    use crate::review::error::ReviewErrorKind;
    use crate::review::testing::{ai_candidate, item_with_results};

    #[test]
    fn search_results_start_excluded() {
        let item = item_with_results("p-1", 3);
        assert_eq!(item.excluded_image_ids.len(), 3);
        assert!(item.selected_image.is_none());
        assert!(item.selection_is_valid());
    }

    #[test]
    fn toggle_twice_restores_exclusions() {
        let mut item = item_with_results("p-1", 3);
        let before = item.excluded_image_ids.clone();
        assert!(!item.toggle_exclude("p-1-s1").expect("toggle"));
        assert!(item.toggle_exclude("p-1-s1").expect("toggle"));
        assert_eq!(item.excluded_image_ids, before);
    }

    #[test]
    fn excluding_selection_moves_to_first_included_result() {
        let mut item = item_with_results("p-1", 3);
        item.toggle_exclude("p-1-s2").expect("include s2");
        item.select("p-1-s0").expect("select s0");
        item.toggle_exclude("p-1-s0").expect("exclude s0");
        assert_eq!(
            item.selected_image.as_ref().map(|s| s.id.as_str()),
            Some("p-1-s2")
        );
        assert!(item.selection_is_valid());
    }

    #[test]
    fn excluding_last_included_selection_clears_it() {
        let mut item = item_with_results("p-1", 2);
        item.select("p-1-s1").expect("select");
        item.toggle_exclude("p-1-s1").expect("exclude");
        assert!(item.selected_image.is_none());
    }

    #[test]
    fn select_after_excluding_everything_includes_the_image() {
        let mut item = item_with_results("p-1", 3);
        for id in ["p-1-s0", "p-1-s1", "p-1-s2"] {
            if !item.is_excluded(id) {
                item.toggle_exclude(id).expect("exclude");
            }
        }
        assert_eq!(item.excluded_image_ids.len(), 3);
        item.select("p-1-s1").expect("select");
        assert_eq!(
            item.selected_image.as_ref().map(|s| s.id.as_str()),
            Some("p-1-s1")
        );
        assert!(!item.is_excluded("p-1-s1"));
        assert!(item.selection_is_valid());
    }

    #[test]
    fn existing_images_are_selectable() {
        let mut item = item_with_results("p-1", 1);
        item.select("p-1-e0").expect("select existing");
        assert!(item.selection_is_valid());
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut item = item_with_results("p-1", 1);
        let err = item.toggle_exclude("nope").expect_err("unknown");
        assert_eq!(err.kind(), ReviewErrorKind::Validation);
        assert!(item.select("nope").is_err());
    }

    #[test]
    fn terminal_items_reject_mutation() {
        let mut item = item_with_results("p-1", 2);
        item.status = ItemStatus::Approved;
        assert!(item.toggle_exclude("p-1-s0").is_err());
        assert!(item.select("p-1-s0").is_err());
    }

    #[test]
    fn ai_candidate_replaces_previous_one() {
        let mut item = item_with_results("p-1", 2);
        item.attach_ai_candidate(ai_candidate("ai-1"));
        item.attach_ai_candidate(ai_candidate("ai-2"));
        let ai: Vec<_> = item.search_results.iter().filter(|i| i.is_ai()).collect();
        assert_eq!(ai.len(), 1);
        assert_eq!(item.search_results[0].id, "ai-2");
        assert_eq!(
            item.selected_image.as_ref().map(|s| s.id.as_str()),
            Some("ai-2")
        );
        assert!(!item.is_excluded("ai-2"));
        assert!(item.selection_is_valid());
    }
}
