use crate::collab::{ImageSearch, SearchHit};
use crate::config::ReviewConfig;
use crate::metrics;
use crate::review::detached;
use crate::review::error::{ReviewError, ReviewErrorKind};
use crate::review::model::{ImageCandidate, ImageSource, ItemStatus, SearchReport, SharedSession};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;

/// Runs image searches for pending items, one request at a time across every
/// session, spaced by a token bucket. Clones share the lane and the bucket.
#[derive(Clone)]
pub struct SearchThrottler {
    search: Arc<dyn ImageSearch>,
    limiter: Arc<RateLimiter>,
    lane: Arc<Mutex<()>>,
    max_results: usize,
}

impl SearchThrottler {
    pub fn new(search: Arc<dyn ImageSearch>, config: &ReviewConfig) -> Self {
        Self {
            search,
            limiter: Arc::new(RateLimiter::new(
                config.search_rate_per_sec,
                config.search_burst,
            )),
            lane: Arc::new(Mutex::new(())),
            max_results: config.search_max_results,
        }
    }

    /// Walks the session's pending items in order. Cancellation stops the cycle
    /// before the next request; a request already sent is allowed to finish.
    /// Dropping the returned future does not stop the cycle.
    pub async fn run(
        &self,
        session: &SharedSession,
        cancel: &CancellationToken,
    ) -> Result<SearchReport, ReviewError> {
        let throttler = self.clone();
        let session = session.clone();
        let cancel = cancel.clone();
        detached("search", async move { throttler.cycle(&session, &cancel).await }).await
    }

    async fn cycle(
        &self,
        session: &SharedSession,
        cancel: &CancellationToken,
    ) -> Result<SearchReport, ReviewError> {
        let (session_id, queue) = {
            let mut guard = session.lock().await;
            if guard.search_running {
                return Err(ReviewError::validation(
                    "search",
                    "a search cycle is already running for this batch",
                ));
            }
            guard.search_running = true;
            let queue: Vec<(String, String)> = guard
                .items
                .iter()
                .filter(|item| item.status == ItemStatus::Pending)
                .map(|item| (item.id.clone(), item.search_query()))
                .collect();
            (guard.id, queue)
        };
        info!(target = "hermes.search", session_id = %session_id, pending = queue.len(), "search_cycle_started");

        let mut report = SearchReport::default();
        for (item_id, query) in queue {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let lane = tokio::select! {
                _ = cancel.cancelled() => None,
                lane = self.lane.lock() => Some(lane),
            };
            let Some(_lane) = lane else {
                report.cancelled = true;
                break;
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                waited = self.limiter.acquire() => {
                    debug!(target = "hermes.search", waited_ms = waited.as_millis() as u64, "rate_limit_wait");
                }
            }

            let claimed = session.lock().await.update_item(&item_id, |item| {
                if item.status != ItemStatus::Pending {
                    return false;
                }
                item.status = ItemStatus::Searching;
                item.error_message = None;
                true
            });
            if claimed != Some(true) {
                continue;
            }

            report.searched += 1;
            let outcome = match self.search.search(&query, self.max_results).await {
                Ok(hits) if hits.is_empty() => {
                    Err(ReviewError::empty_result("search", "no images found"))
                }
                Ok(hits) => Ok(hits),
                Err(err) => Err(ReviewError::network("search", err)),
            };
            let mut guard = session.lock().await;
            let status = guard
                .update_item(&item_id, |item| {
                    match outcome {
                        Ok(hits) => {
                            let candidates = hits
                                .into_iter()
                                .take(self.max_results)
                                .enumerate()
                                .map(|(idx, hit)| search_candidate(&item.id, idx, hit))
                                .collect();
                            item.apply_search_results(candidates);
                            item.status = ItemStatus::Ready;
                            metrics::search_request("ok");
                        }
                        Err(err) => {
                            if err.kind() == ReviewErrorKind::EmptyResult {
                                metrics::search_request("empty");
                            } else {
                                warn!(target = "hermes.search", item_id = %item.id, error = %err, "search_failed");
                                metrics::search_request("error");
                            }
                            item.status = ItemStatus::Error;
                            item.error_message = Some(err.detail().to_string());
                        }
                    }
                    item.status
                })
                .unwrap_or(ItemStatus::Error);
            match status {
                ItemStatus::Ready => report.ready += 1,
                _ => report.failed += 1,
            }
            metrics::item_transition(status);
            guard.reposition();
        }

        let mut guard = session.lock().await;
        guard.search_running = false;
        guard.last_search = Some(report.clone());
        guard.reposition();
        info!(
            target = "hermes.search",
            session_id = %session_id,
            searched = report.searched,
            ready = report.ready,
            failed = report.failed,
            cancelled = report.cancelled,
            "search_cycle_finished"
        );
        Ok(report)
    }
}

fn search_candidate(item_id: &str, index: usize, hit: SearchHit) -> ImageCandidate {
    ImageCandidate {
        id: format!("{item_id}-s{index}"),
        url: hit.url,
        thumbnail_url: hit.thumbnail_url,
        width: hit.width,
        height: hit.height,
        source: ImageSource::Search { domain: hit.domain },
        title: hit.title,
    }
}
