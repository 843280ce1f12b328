use crate::collab::CatalogFilter;
use crate::review::{BatchItem, BatchSession, BatchSummary, KeyCommand, SearchReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadBatchRequest {
    #[serde(default)]
    pub filter: CatalogFilter,
    #[serde(default)]
    pub batch_size: Option<u32>,
    /// Start the search cycle in the background right after loading.
    #[serde(default)]
    pub auto_search: bool,
    /// Session being reloaded; it is discarded once the new one is registered.
    #[serde(default)]
    pub replaces: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LoadBatchResponse {
    pub empty: bool,
    pub session: SessionView,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub loaded_at: DateTime<Utc>,
    pub filter: CatalogFilter,
    pub summary: BatchSummary,
    pub current_index: usize,
    pub current_item_id: Option<String>,
    pub search_running: bool,
    pub last_search: Option<SearchReport>,
    pub items: Vec<BatchItem>,
}

impl From<&BatchSession> for SessionView {
    fn from(session: &BatchSession) -> Self {
        Self {
            id: session.id,
            loaded_at: session.loaded_at,
            filter: session.filter.clone(),
            summary: session.summary(),
            current_index: session.current_index,
            current_item_id: session.items.get(session.current_index).map(|i| i.id.clone()),
            search_running: session.search_running,
            last_search: session.last_search.clone(),
            items: session.items.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub image_id: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub excluded: bool,
    pub item: BatchItem,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub command: KeyCommand,
}

#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
