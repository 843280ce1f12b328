//! Fixtures shared by the review tests.

use crate::collab::{CatalogFilter, CatalogImage, CatalogItem};
use crate::review::model::{
    AiStatus, BatchItem, BatchSession, ImageCandidate, ImageSource, ItemStatus, SharedSession,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

pub fn item(id: &str, name: &str, brand: Option<&str>) -> BatchItem {
    BatchItem {
        id: id.to_string(),
        name: name.to_string(),
        brand: brand.map(str::to_string),
        store: None,
        existing_images: Vec::new(),
        hero_image_id: None,
        search_results: Vec::new(),
        excluded_image_ids: BTreeSet::new(),
        selected_image: None,
        status: ItemStatus::Pending,
        ai_status: AiStatus::Idle,
        error_message: None,
        ai_error: None,
        images_approved: false,
        hero_approved: false,
        committing: false,
        ai_stages: Vec::new(),
        ai_ticket: 0,
    }
}

fn candidate(id: &str, source: ImageSource) -> ImageCandidate {
    ImageCandidate {
        id: id.to_string(),
        url: format!("https://img.example.com/{id}.jpg"),
        thumbnail_url: None,
        width: Some(800),
        height: Some(800),
        source,
        title: None,
    }
}

pub fn existing(id: &str) -> ImageCandidate {
    candidate(id, ImageSource::Existing)
}

pub fn search_hit(id: &str) -> ImageCandidate {
    candidate(
        id,
        ImageSource::Search {
            domain: Some("img.example.com".into()),
        },
    )
}

pub fn ai_candidate(id: &str) -> ImageCandidate {
    candidate(id, ImageSource::Ai)
}

/// A ready item with one existing image `{id}-e0` and `count` excluded
/// search results `{id}-s0..`.
pub fn item_with_results(id: &str, count: usize) -> BatchItem {
    let mut item = item(id, &format!("Product {id}"), Some("Brewline"));
    item.existing_images.push(existing(&format!("{id}-e0")));
    item.apply_search_results(
        (0..count)
            .map(|i| search_hit(&format!("{id}-s{i}")))
            .collect(),
    );
    item.status = ItemStatus::Ready;
    item
}

pub fn session_with(items: Vec<BatchItem>) -> BatchSession {
    BatchSession::new(CatalogFilter::default(), items)
}

/// `count` ready items named `p-0..`, each with three search results.
pub fn ready_session(count: usize) -> BatchSession {
    session_with(
        (0..count)
            .map(|i| item_with_results(&format!("p-{i}"), 3))
            .collect(),
    )
}

pub fn shared(session: BatchSession) -> SharedSession {
    Arc::new(Mutex::new(session))
}

pub fn catalog_item(id: &str) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: format!("Product {id}"),
        brand: Some("Brewline".into()),
        store: None,
        images: vec![CatalogImage {
            id: format!("{id}-e0"),
            url: format!("https://img.example.com/{id}-e0.jpg"),
            thumbnail_url: None,
            width: Some(800),
            height: Some(800),
            is_primary: false,
            position: 0,
        }],
        images_approved: false,
        hero_approved: false,
    }
}
