use crate::collab::HeroCommit;
use crate::metrics;
use crate::review::error::ReviewError;
use crate::review::detached;
use crate::review::model::{BatchSession, ImageSource, ItemStatus, SharedSession};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub item_id: String,
    pub status: ItemStatus,
    pub hero_image_id: Option<String>,
    pub approved_count: usize,
    pub skipped_count: usize,
    pub current_index: usize,
}

impl ApprovalOutcome {
    fn capture(session: &BatchSession, index: usize) -> Self {
        let item = &session.items[index];
        Self {
            item_id: item.id.clone(),
            status: item.status,
            hero_image_id: item.hero_image_id.clone(),
            approved_count: session.approved_count,
            skipped_count: session.skipped_count,
            current_index: session.current_index,
        }
    }
}

/// Terminal decisions for batch items. Each decision lands at most once: every
/// entry point is guarded on the item still being decidable.
#[derive(Clone)]
pub struct ApprovalEngine {
    hero: Arc<dyn HeroCommit>,
}

impl ApprovalEngine {
    pub fn new(hero: Arc<dyn HeroCommit>) -> Self {
        Self { hero }
    }

    /// Commits the selected image as hero. The commit runs to completion even
    /// if the caller stops waiting, so the item never stays locked.
    pub async fn approve(
        &self,
        session: &SharedSession,
        index: usize,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let engine = self.clone();
        let session = session.clone();
        detached("approve", async move { engine.commit_selected(&session, index).await }).await
    }

    /// Approves the item's existing images as they are, without touching the hero.
    ///
    /// Also accepted for items whose search failed, as long as they already
    /// have something to show.
    pub async fn quick_approve(
        &self,
        session: &SharedSession,
        index: usize,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let engine = self.clone();
        let session = session.clone();
        detached("quick_approve", async move {
            engine.commit_existing(&session, index).await
        })
        .await
    }

    async fn commit_selected(
        &self,
        session: &SharedSession,
        index: usize,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let (item_id, selected) = {
            let mut guard = session.lock().await;
            let item = guard.item_mut(index)?;
            if item.status != ItemStatus::Ready {
                return Err(ReviewError::validation(
                    "approve",
                    format!("item `{}` is {}, not ready", item.id, item.status.as_str()),
                ));
            }
            item.ensure_mutable("approve")?;
            let selected = item
                .selected_image
                .clone()
                .ok_or_else(|| ReviewError::validation("approve", "select an image first"))?;
            item.committing = true;
            item.error_message = None;
            (item.id.clone(), selected)
        };

        let started = Instant::now();
        let result = self.hero.set_hero(&item_id, &selected.to_ref()).await;
        metrics::stage_elapsed("commit_hero", started.elapsed().as_millis());

        let mut guard = session.lock().await;
        let Some(index) = guard.index_of(&item_id) else {
            return Err(ReviewError::not_found("approve", "batch was reloaded"));
        };
        let item = &mut guard.items[index];
        item.committing = false;
        if let Err(err) = result {
            warn!(target = "hermes.approval", item_id = %item_id, error = %err, "hero_commit_failed");
            item.error_message = Some(format!("Hero commit failed: {err}"));
            return Err(ReviewError::commit_failure("approve", err));
        }

        item.hero_image_id = Some(selected.id.clone());
        item.hero_approved = true;
        if !item.existing_images.iter().any(|image| image.id == selected.id) {
            let mut associated = selected.clone();
            associated.source = ImageSource::Existing;
            item.existing_images.push(associated);
        }
        item.status = ItemStatus::Approved;
        guard.approved_count += 1;
        guard.advance_from(index);
        metrics::item_transition(ItemStatus::Approved);
        info!(target = "hermes.approval", item_id = %item_id, hero = %selected.id, "hero_approved");
        Ok(ApprovalOutcome::capture(&guard, index))
    }

    async fn commit_existing(
        &self,
        session: &SharedSession,
        index: usize,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let item_id = {
            let mut guard = session.lock().await;
            let item = guard.item_mut(index)?;
            item.ensure_mutable("quick_approve")?;
            if item.existing_images.is_empty() {
                return Err(ReviewError::validation(
                    "quick_approve",
                    format!("item `{}` has no existing images", item.id),
                ));
            }
            if !matches!(item.status, ItemStatus::Ready | ItemStatus::Error) {
                return Err(ReviewError::validation(
                    "quick_approve",
                    format!("item `{}` is {}", item.id, item.status.as_str()),
                ));
            }
            item.committing = true;
            item.id.clone()
        };

        let result = self.hero.approve_existing(&item_id).await;

        let mut guard = session.lock().await;
        let Some(index) = guard.index_of(&item_id) else {
            return Err(ReviewError::not_found("quick_approve", "batch was reloaded"));
        };
        let item = &mut guard.items[index];
        item.committing = false;
        if let Err(err) = result {
            warn!(target = "hermes.approval", item_id = %item_id, error = %err, "approve_existing_failed");
            item.error_message = Some(format!("Approval failed: {err}"));
            return Err(ReviewError::commit_failure("quick_approve", err));
        }
        item.images_approved = true;
        item.error_message = None;
        item.status = ItemStatus::Approved;
        guard.approved_count += 1;
        guard.advance_from(index);
        metrics::item_transition(ItemStatus::Approved);
        info!(target = "hermes.approval", item_id = %item_id, "existing_images_approved");
        Ok(ApprovalOutcome::capture(&guard, index))
    }

    pub async fn skip(
        &self,
        session: &SharedSession,
        index: usize,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let mut guard = session.lock().await;
        let item = guard.item_mut(index)?;
        if item.status != ItemStatus::Ready {
            return Err(ReviewError::validation(
                "skip",
                format!("item `{}` is {}, not ready", item.id, item.status.as_str()),
            ));
        }
        item.ensure_mutable("skip")?;
        item.status = ItemStatus::Skipped;
        guard.skipped_count += 1;
        guard.advance_from(index);
        metrics::item_transition(ItemStatus::Skipped);
        Ok(ApprovalOutcome::capture(&guard, index))
    }
}
