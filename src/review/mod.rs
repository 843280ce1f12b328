pub mod approval;
pub mod enhance;
pub mod error;
pub mod loader;
pub mod model;
pub mod navigation;
mod rate_limit;
pub mod selection;
pub mod session;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

use crate::collab::{CatalogFilter, Collaborators};
use crate::config::ReviewConfig;
use std::{future::Future, sync::Arc};
use tokio_util::sync::CancellationToken;

pub use approval::{ApprovalEngine, ApprovalOutcome};
pub use enhance::{AiPreview, HeroGenerator, PreviewTicket};
pub use error::{ReviewError, ReviewErrorKind};
pub use model::{
    AiStatus, BatchItem, BatchSession, BatchSummary, ItemStatus, SearchReport, SharedSession,
};
pub use navigation::{KeyCommand, KeyOutcome};
pub use throttle::SearchThrottler;

/// Entry point for every review operation. Cheap to clone; all parts are shared.
#[derive(Clone)]
pub struct Orchestrator {
    pub config: Arc<ReviewConfig>,
    collab: Collaborators,
    throttler: SearchThrottler,
    generator: HeroGenerator,
    approvals: ApprovalEngine,
}

impl Orchestrator {
    pub fn new(config: ReviewConfig, collab: Collaborators) -> Self {
        let throttler = SearchThrottler::new(collab.search.clone(), &config);
        let generator = HeroGenerator::new(collab.assets.clone(), collab.queue.clone(), &config);
        let approvals = ApprovalEngine::new(collab.hero.clone());
        Self {
            config: Arc::new(config),
            collab,
            throttler,
            generator,
            approvals,
        }
    }

    pub fn from_env() -> Self {
        Self::new(ReviewConfig::from_env(), Collaborators::from_env())
    }

    pub async fn load(
        &self,
        filter: CatalogFilter,
        batch_size: Option<u32>,
    ) -> Result<BatchSession, ReviewError> {
        let batch_size = self.config.clamp_batch_size(batch_size);
        loader::load(self.collab.catalog.as_ref(), filter, batch_size).await
    }

    pub async fn run_search(
        &self,
        session: &SharedSession,
        cancel: &CancellationToken,
    ) -> Result<SearchReport, ReviewError> {
        self.throttler.run(session, cancel).await
    }

    pub async fn toggle_exclude(
        &self,
        session: &SharedSession,
        item_id: &str,
        image_id: &str,
    ) -> Result<(bool, BatchItem), ReviewError> {
        let mut guard = session.lock().await;
        let item = guard.item_by_id_mut(item_id)?;
        let excluded = item.toggle_exclude(image_id)?;
        Ok((excluded, item.clone()))
    }

    pub async fn select(
        &self,
        session: &SharedSession,
        item_id: &str,
        image_id: &str,
    ) -> Result<BatchItem, ReviewError> {
        let mut guard = session.lock().await;
        let item = guard.item_by_id_mut(item_id)?;
        item.select(image_id)?;
        Ok(item.clone())
    }

    pub async fn begin_preview(
        &self,
        session: &SharedSession,
        item_id: &str,
    ) -> Result<PreviewTicket, ReviewError> {
        self.generator.begin(session, item_id).await
    }

    pub async fn run_preview(
        &self,
        session: &SharedSession,
        ticket: PreviewTicket,
        cancel: &CancellationToken,
    ) -> Result<AiPreview, ReviewError> {
        self.generator.run(session, ticket, cancel).await
    }

    pub async fn approve(
        &self,
        session: &SharedSession,
        item_id: &str,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let index = index_for(session, item_id).await?;
        self.approvals.approve(session, index).await
    }

    pub async fn quick_approve(
        &self,
        session: &SharedSession,
        item_id: &str,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let index = index_for(session, item_id).await?;
        self.approvals.quick_approve(session, index).await
    }

    pub async fn skip(
        &self,
        session: &SharedSession,
        item_id: &str,
    ) -> Result<ApprovalOutcome, ReviewError> {
        let index = index_for(session, item_id).await?;
        self.approvals.skip(session, index).await
    }

    pub async fn key(
        &self,
        session: &SharedSession,
        command: KeyCommand,
    ) -> Result<KeyOutcome, ReviewError> {
        navigation::dispatch_key(&self.approvals, session, command).await
    }
}

/// Runs `work` on its own task and waits for it. Flags the work sets on the
/// session are cleared when it finishes, even if the awaiting caller is dropped.
pub(crate) async fn detached<T, F>(stage: &'static str, work: F) -> Result<T, ReviewError>
where
    F: Future<Output = Result<T, ReviewError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|err| ReviewError::cancelled(stage, format!("task ended early: {err}")))?
}

async fn index_for(session: &SharedSession, item_id: &str) -> Result<usize, ReviewError> {
    session
        .lock()
        .await
        .index_of(item_id)
        .ok_or_else(|| ReviewError::not_found("item", format!("unknown item `{item_id}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::DemoBackend;
    use tokio::time::Duration;

    fn orchestrator(backend: Arc<DemoBackend>) -> Orchestrator {
        let config = ReviewConfig {
            search_rate_per_sec: 10.0,
            poll_interval: Duration::from_millis(100),
            ..ReviewConfig::default()
        };
        Orchestrator::new(config, Collaborators::demo(backend))
    }

    #[tokio::test(start_paused = true)]
    async fn full_review_pass_over_seeded_catalog() {
        let backend = Arc::new(DemoBackend::seeded());
        let orchestrator = orchestrator(backend.clone());
        let session = orchestrator
            .load(CatalogFilter::default(), Some(3))
            .await
            .expect("load");
        let session: SharedSession = Arc::new(tokio::sync::Mutex::new(session));

        let report = orchestrator
            .run_search(&session, &CancellationToken::new())
            .await
            .expect("search");
        assert_eq!(report.ready, 3);

        let first = session.lock().await.items[0].clone();
        let pick = first.search_results[1].id.clone();
        orchestrator.select(&session, &first.id, &pick).await.expect("select");
        let approved = orchestrator.approve(&session, &first.id).await.expect("approve");
        assert_eq!(approved.hero_image_id.as_deref(), Some(pick.as_str()));

        let second_id = session.lock().await.items[1].id.clone();
        let err = orchestrator
            .begin_preview(&session, &second_id)
            .await
            .expect_err("nothing selected yet");
        assert_eq!(err.kind(), ReviewErrorKind::Validation);

        let outcome = orchestrator.key(&session, KeyCommand::Cancel).await.expect("key");
        assert!(matches!(outcome, KeyOutcome::Skipped(_)));

        let guard = session.lock().await;
        let summary = guard.summary();
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.ready, 1);
        assert_eq!(guard.current_index, 2);
        drop(guard);

        let reload = orchestrator
            .load(CatalogFilter::default(), Some(10))
            .await
            .expect("reload");
        assert!(reload.items.iter().all(|item| item.id != first.id));
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let orchestrator = orchestrator(Arc::new(DemoBackend::new(Vec::new())));
        let session: SharedSession =
            Arc::new(tokio::sync::Mutex::new(testing::ready_session(1)));
        let err = orchestrator.skip(&session, "missing").await.expect_err("unknown");
        assert_eq!(err.kind(), ReviewErrorKind::NotFound);
    }
}
