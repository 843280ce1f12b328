pub mod config;
pub mod demo;
pub mod image_search;
pub mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use demo::DemoBackend;
pub use image_search::HttpImageSearch;
pub use supabase::SupabaseClient;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for CollabError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Deserialize(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogFilter {
    #[serde(default = "CatalogFilter::default_missing_hero")]
    pub missing_hero: bool,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: u32,
}

impl CatalogFilter {
    fn default_missing_hero() -> bool {
        true
    }
}

impl Default for CatalogFilter {
    fn default() -> Self {
        Self {
            missing_hero: true,
            brand: None,
            store: None,
            search: None,
            page: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub images: Vec<CatalogImage>,
    #[serde(default)]
    pub images_approved: bool,
    #[serde(default)]
    pub hero_approved: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogImage {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub domain: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Queued,
    AlreadyQueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhancementJob {
    pub status: JobStatus,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// What a hero commit points at: an image the item already owns, or a new
/// candidate that must be associated in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    Existing { image_id: String },
    Candidate { url: String, source: &'static str },
}

#[async_trait]
pub trait CatalogQuery: Send + Sync {
    async fn list(
        &self,
        filter: &CatalogFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<CatalogItem>, CollabError>;
}

#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CollabError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Copies a remote image into durable storage and returns its canonical URL.
    /// Repeat uploads of the same source are harmless.
    async fn upload(&self, url: &str) -> Result<String, CollabError>;
}

#[async_trait]
pub trait EnhancementQueue: Send + Sync {
    async fn enqueue(&self, item_id: &str, url: &str) -> Result<EnqueueOutcome, CollabError>;
    async fn trigger_processing(&self, batch_size: u32) -> Result<(), CollabError>;
    async fn get_latest(&self, item_id: &str) -> Result<Option<EnhancementJob>, CollabError>;
}

#[async_trait]
pub trait HeroCommit: Send + Sync {
    /// Associates the image with the item and designates it hero as one write.
    async fn set_hero(&self, item_id: &str, image: &ImageRef) -> Result<(), CollabError>;
    async fn approve_existing(&self, item_id: &str) -> Result<(), CollabError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogQuery>,
    pub search: Arc<dyn ImageSearch>,
    pub assets: Arc<dyn AssetStore>,
    pub queue: Arc<dyn EnhancementQueue>,
    pub hero: Arc<dyn HeroCommit>,
}

impl Collaborators {
    pub fn from_env() -> Self {
        let demo = Arc::new(DemoBackend::seeded());
        let search: Arc<dyn ImageSearch> = match HttpImageSearch::from_env() {
            Some(client) => Arc::new(client),
            None => {
                info!(target = "hermes.collab", "IMAGE_SEARCH_URL unset; using demo image search");
                demo.clone()
            }
        };
        match SupabaseClient::from_env() {
            Some(client) => {
                let client = Arc::new(client);
                Self {
                    catalog: client.clone(),
                    search,
                    assets: client.clone(),
                    queue: client.clone(),
                    hero: client,
                }
            }
            None => {
                info!(target = "hermes.collab", "SUPABASE_URL unset; using demo catalog backend");
                Self {
                    search,
                    ..Self::demo(demo)
                }
            }
        }
    }

    pub fn demo(backend: Arc<DemoBackend>) -> Self {
        Self {
            catalog: backend.clone(),
            search: backend.clone(),
            assets: backend.clone(),
            queue: backend.clone(),
            hero: backend,
        }
    }
}
