use crate::collab::{CatalogFilter, ImageRef};
use crate::models::StageReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Searching,
    Ready,
    Approved,
    Skipped,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Approved | ItemStatus::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Searching => "searching",
            ItemStatus::Ready => "ready",
            ItemStatus::Approved => "approved",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AiStatus {
    #[default]
    Idle,
    Processing,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Existing,
    Search { domain: Option<String> },
    Ai,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageCandidate {
    pub id: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub source: ImageSource,
    pub title: Option<String>,
}

impl ImageCandidate {
    pub fn is_ai(&self) -> bool {
        self.source == ImageSource::Ai
    }

    pub fn to_ref(&self) -> ImageRef {
        match &self.source {
            ImageSource::Existing => ImageRef::Existing {
                image_id: self.id.clone(),
            },
            ImageSource::Search { .. } => ImageRef::Candidate {
                url: self.url.clone(),
                source: "search",
            },
            ImageSource::Ai => ImageRef::Candidate {
                url: self.url.clone(),
                source: "ai",
            },
        }
    }
}

/// One catalog entry under review.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub store: Option<String>,
    pub existing_images: Vec<ImageCandidate>,
    pub hero_image_id: Option<String>,
    pub search_results: Vec<ImageCandidate>,
    pub excluded_image_ids: BTreeSet<String>,
    pub selected_image: Option<ImageCandidate>,
    pub status: ItemStatus,
    pub ai_status: AiStatus,
    pub error_message: Option<String>,
    pub ai_error: Option<String>,
    pub images_approved: bool,
    pub hero_approved: bool,
    pub committing: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ai_stages: Vec<StageReport>,
    /// Bumped whenever an enhancement run starts; results carrying an older
    /// ticket are stale.
    #[serde(skip)]
    pub(crate) ai_ticket: u64,
}

impl BatchItem {
    pub fn search_query(&self) -> String {
        let brand = self.brand.as_deref().unwrap_or_default();
        format!("{brand} {}", self.name)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub pending: usize,
    pub searching: usize,
    pub ready: usize,
    pub approved: usize,
    pub skipped: usize,
    pub error: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SearchReport {
    pub searched: usize,
    pub ready: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Everything one review pass knows. Rebuilt wholesale on every load.
#[derive(Debug)]
pub struct BatchSession {
    pub id: Uuid,
    pub filter: CatalogFilter,
    pub items: Vec<BatchItem>,
    pub current_index: usize,
    pub approved_count: usize,
    pub skipped_count: usize,
    pub loaded_at: DateTime<Utc>,
    pub search_running: bool,
    pub last_search: Option<SearchReport>,
}

pub type SharedSession = Arc<Mutex<BatchSession>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_collapses_whitespace() {
        let item = crate::review::testing::item("p-1", "  Cold   Brew Maker ", Some("Brewline"));
        assert_eq!(item.search_query(), "Brewline Cold Brew Maker");
        let unbranded = crate::review::testing::item("p-2", "Mug", None);
        assert_eq!(unbranded.search_query(), "Mug");
    }

    #[test]
    fn candidate_refs_follow_source() {
        let existing = crate::review::testing::existing("img-1");
        assert_eq!(
            existing.to_ref(),
            ImageRef::Existing {
                image_id: "img-1".into()
            }
        );
        let hit = crate::review::testing::search_hit("s-1");
        assert!(matches!(hit.to_ref(), ImageRef::Candidate { source: "search", .. }));
    }

    #[test]
    fn terminal_statuses() {
        assert!(ItemStatus::Approved.is_terminal());
        assert!(ItemStatus::Skipped.is_terminal());
        assert!(!ItemStatus::Error.is_terminal());
        assert_eq!(ItemStatus::Ready.as_str(), "ready");
    }
}
