use crate::collab::{CatalogFilter, CatalogImage, CatalogItem, CatalogQuery};
use crate::review::error::ReviewError;
use crate::review::model::{AiStatus, BatchItem, BatchSession, ImageCandidate, ImageSource, ItemStatus};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, warn};

/// Fetches one page of catalog items and builds a fresh session around them.
///
/// An empty page is a successful load with no items; only a failed fetch is an
/// error.
pub async fn load(
    catalog: &dyn CatalogQuery,
    filter: CatalogFilter,
    batch_size: u32,
) -> Result<BatchSession, ReviewError> {
    let started = Instant::now();
    let rows = catalog
        .list(&filter, filter.page, batch_size)
        .await
        .map_err(|err| {
            warn!(target = "hermes.review", error = %err, "batch_load_failed");
            ReviewError::load_failed(err)
        })?;
    crate::metrics::stage_elapsed("load", started.elapsed().as_millis());

    let items: Vec<BatchItem> = rows.into_iter().map(batch_item).collect();
    let session = BatchSession::new(filter, items);
    info!(
        target = "hermes.review",
        session_id = %session.id,
        items = session.items.len(),
        "batch_loaded"
    );
    Ok(session)
}

fn batch_item(row: CatalogItem) -> BatchItem {
    let mut images = row.images;
    images.sort_by_key(|image| image.position);
    let hero_image_id = existing_hero(&images, row.hero_approved);
    let existing_images = images.into_iter().map(existing_candidate).collect();

    BatchItem {
        id: row.id,
        name: row.name,
        brand: row.brand,
        store: row.store,
        existing_images,
        hero_image_id,
        search_results: Vec::new(),
        excluded_image_ids: BTreeSet::new(),
        selected_image: None,
        status: ItemStatus::Pending,
        ai_status: AiStatus::Idle,
        error_message: None,
        ai_error: None,
        images_approved: row.images_approved,
        hero_approved: row.hero_approved,
        committing: false,
        ai_stages: Vec::new(),
        ai_ticket: 0,
    }
}

/// Primary flag wins; an approved hero without a flag falls back to the first image.
fn existing_hero(sorted: &[CatalogImage], hero_approved: bool) -> Option<String> {
    sorted
        .iter()
        .find(|image| image.is_primary)
        .or_else(|| sorted.first().filter(|_| hero_approved))
        .map(|image| image.id.clone())
}

fn existing_candidate(image: CatalogImage) -> ImageCandidate {
    ImageCandidate {
        id: image.id,
        url: image.url,
        thumbnail_url: image.thumbnail_url,
        width: image.width,
        height: image.height,
        source: ImageSource::Existing,
        title: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::DemoBackend;
    use crate::review::error::ReviewErrorKind;
    use crate::review::testing::catalog_item;

    fn image(id: &str, position: i32, is_primary: bool) -> CatalogImage {
        CatalogImage {
            id: id.into(),
            url: format!("https://img.example.com/{id}.jpg"),
            thumbnail_url: None,
            width: None,
            height: None,
            is_primary,
            position,
        }
    }

    #[tokio::test]
    async fn load_builds_pending_items_in_catalog_order() {
        let backend = DemoBackend::new(vec![catalog_item("a"), catalog_item("b")]);
        let session = load(&backend, CatalogFilter::default(), 25)
            .await
            .expect("load");
        let ids: Vec<_> = session.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(session.items.iter().all(|i| i.status == ItemStatus::Pending));
        assert_eq!(session.current_index, 0);
        assert_eq!(session.approved_count + session.skipped_count, 0);
        assert_eq!(session.items[0].existing_images[0].source, ImageSource::Existing);
    }

    #[tokio::test]
    async fn empty_and_failed_loads_are_distinct() {
        let empty = DemoBackend::new(Vec::new());
        let session = load(&empty, CatalogFilter::default(), 25)
            .await
            .expect("empty load is ok");
        assert!(session.items.is_empty());

        let failing = DemoBackend::new(vec![catalog_item("a")]).failing_list();
        let err = load(&failing, CatalogFilter::default(), 25)
            .await
            .expect_err("fetch fails");
        assert_eq!(err.kind(), ReviewErrorKind::LoadFailed);
        assert_eq!(err.stage(), "load");
    }

    #[tokio::test]
    async fn batch_size_limits_the_page() {
        let backend = DemoBackend::seeded().with_latency(Default::default());
        let session = load(&backend, CatalogFilter::default(), 2)
            .await
            .expect("load");
        assert_eq!(session.items.len(), 2);
    }

    #[test]
    fn images_are_ordered_by_position() {
        let mut row = catalog_item("a");
        row.images = vec![image("late", 3, false), image("early", 1, false)];
        let item = batch_item(row);
        let ids: Vec<_> = item.existing_images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
    }

    #[test]
    fn hero_prefers_primary_flag() {
        let images = vec![image("first", 0, false), image("flagged", 1, true)];
        assert_eq!(existing_hero(&images, false).as_deref(), Some("flagged"));
    }

    #[test]
    fn approved_hero_without_flag_uses_first_image() {
        let images = vec![image("first", 0, false), image("second", 1, false)];
        assert_eq!(existing_hero(&images, true).as_deref(), Some("first"));
        assert_eq!(existing_hero(&images, false), None);
    }
}
