use crate::collab::{AssetStore, EnhancementJob, EnhancementQueue, EnqueueOutcome, JobStatus};
use crate::config::ReviewConfig;
use crate::models::StageReport;
use crate::review::detached;
use crate::review::error::ReviewError;
use crate::review::model::{AiStatus, ImageCandidate, ImageSource, SharedSession};
use serde::Serialize;
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Four-stage hero synthesis: materialize, enqueue, trigger, poll.
#[derive(Clone)]
pub struct HeroGenerator {
    assets: Arc<dyn AssetStore>,
    queue: Arc<dyn EnhancementQueue>,
    poll_interval: Duration,
    poll_max_attempts: u32,
    trigger_batch_size: u32,
}

/// A claimed enhancement run for one item.
#[derive(Debug, Clone)]
pub struct PreviewTicket {
    pub item_id: String,
    ticket: u64,
    source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollOutcome {
    Pending,
    Completed(String),
    Failed(String),
}

impl PollOutcome {
    fn from_job(job: Option<EnhancementJob>) -> Self {
        let Some(job) = job else {
            return Self::Pending;
        };
        match job.status {
            JobStatus::Pending | JobStatus::Processing => Self::Pending,
            JobStatus::Completed => match job.result_url {
                Some(url) if !url.trim().is_empty() => Self::Completed(url),
                _ => Self::Failed("job completed without a result url".into()),
            },
            JobStatus::Failed => Self::Failed(
                job.error_message
                    .unwrap_or_else(|| "enhancement job failed".into()),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AiPreview {
    pub item_id: String,
    pub ai_status: AiStatus,
    pub candidate: Option<ImageCandidate>,
    pub stages: Vec<StageReport>,
}

#[derive(Debug)]
struct StageOutcome<T> {
    value: T,
    output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

impl HeroGenerator {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        queue: Arc<dyn EnhancementQueue>,
        config: &ReviewConfig,
    ) -> Self {
        Self {
            assets,
            queue,
            poll_interval: config.poll_interval,
            poll_max_attempts: config.poll_max_attempts,
            trigger_batch_size: config.trigger_batch_size,
        }
    }

    /// Marks the item as processing and hands out the ticket the run must
    /// present when it reports back. No collaborator is called here.
    pub async fn begin(
        &self,
        session: &SharedSession,
        item_id: &str,
    ) -> Result<PreviewTicket, ReviewError> {
        let mut guard = session.lock().await;
        let item = guard.item_by_id_mut(item_id)?;
        item.ensure_mutable("ai_preview")?;
        if item.ai_status == AiStatus::Processing {
            return Err(ReviewError::validation(
                "ai_preview",
                format!("item `{item_id}` already has a preview in progress"),
            ));
        }
        let selected = item
            .selected_image
            .as_ref()
            .ok_or_else(|| ReviewError::validation("ai_preview", "select an image first"))?;
        let source_url = selected.url.clone();

        item.ai_ticket += 1;
        item.ai_status = AiStatus::Processing;
        item.ai_error = None;
        item.ai_stages.clear();
        Ok(PreviewTicket {
            item_id: item.id.clone(),
            ticket: item.ai_ticket,
            source_url,
        })
    }

    /// Drives the stages for a claimed ticket and merges the result back into
    /// the item. `ai_status` always leaves `processing` unless a newer run owns
    /// the item. The run keeps going if the caller stops waiting; only `cancel`
    /// ends it early.
    pub async fn run(
        &self,
        session: &SharedSession,
        ticket: PreviewTicket,
        cancel: &CancellationToken,
    ) -> Result<AiPreview, ReviewError> {
        let generator = self.clone();
        let session = session.clone();
        let cancel = cancel.clone();
        detached("ai_preview", async move {
            generator.settle(&session, ticket, &cancel).await
        })
        .await
    }

    async fn settle(
        &self,
        session: &SharedSession,
        ticket: PreviewTicket,
        cancel: &CancellationToken,
    ) -> Result<AiPreview, ReviewError> {
        let mut stages = Vec::new();
        let result = self.run_stages(&ticket, &mut stages, cancel).await;

        let mut guard = session.lock().await;
        let Some(item) = guard.items.iter_mut().find(|item| item.id == ticket.item_id) else {
            return Err(ReviewError::not_found("ai_preview", "batch was reloaded"));
        };
        if item.ai_ticket != ticket.ticket {
            info!(
                target = "hermes.enhance",
                item_id = %ticket.item_id,
                ticket = ticket.ticket,
                current = item.ai_ticket,
                "stale_preview_discarded"
            );
            return Err(ReviewError::cancelled(
                "ai_preview",
                "superseded by a newer preview run",
            ));
        }

        item.ai_stages = stages.clone();
        match result {
            Ok(url) => {
                let candidate = ImageCandidate {
                    id: format!("ai-{}", Uuid::new_v4()),
                    url,
                    thumbnail_url: None,
                    width: None,
                    height: None,
                    source: ImageSource::Ai,
                    title: Some("AI hero".into()),
                };
                if item.status.is_terminal() {
                    item.ai_status = AiStatus::Ready;
                } else {
                    item.attach_ai_candidate(candidate.clone());
                }
                info!(target = "hermes.enhance", item_id = %item.id, candidate = %candidate.id, "preview_ready");
                Ok(AiPreview {
                    item_id: item.id.clone(),
                    ai_status: item.ai_status,
                    candidate: Some(candidate),
                    stages,
                })
            }
            Err(err) => {
                warn!(
                    target = "hermes.enhance",
                    item_id = %item.id,
                    stage = err.stage(),
                    error = %err.detail(),
                    "preview_failed"
                );
                item.ai_status = AiStatus::Error;
                item.ai_error = Some(err.detail().to_string());
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        ticket: &PreviewTicket,
        stages: &mut Vec<StageReport>,
        cancel: &CancellationToken,
    ) -> Result<String, ReviewError> {
        let canonical = self
            .capture_stage("materialize", stages, self.materialize(&ticket.source_url))
            .await?;
        self.capture_stage("enqueue", stages, self.enqueue(&ticket.item_id, &canonical))
            .await?;
        self.capture_stage("trigger", stages, self.trigger()).await?;
        self.capture_stage("poll", stages, self.poll_job(&ticket.item_id, cancel))
            .await
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, ReviewError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, ReviewError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }

    async fn materialize(&self, source_url: &str) -> Result<StageOutcome<String>, ReviewError> {
        let canonical = self
            .assets
            .upload(source_url)
            .await
            .map_err(|err| ReviewError::network("materialize", err))?;
        Ok(StageOutcome::new(
            canonical.clone(),
            json!({ "source_url": source_url, "canonical_url": canonical }),
        ))
    }

    async fn enqueue(&self, item_id: &str, url: &str) -> Result<StageOutcome<()>, ReviewError> {
        let outcome = self
            .queue
            .enqueue(item_id, url)
            .await
            .map_err(|err| ReviewError::network("enqueue", err))?;
        if outcome == EnqueueOutcome::AlreadyQueued {
            info!(target = "hermes.enhance", item_id = %item_id, "job_already_queued");
        }
        Ok(StageOutcome::new((), json!({ "outcome": outcome })))
    }

    async fn trigger(&self) -> Result<StageOutcome<()>, ReviewError> {
        let output = match self.queue.trigger_processing(self.trigger_batch_size).await {
            Ok(()) => json!({ "triggered": true, "batch_size": self.trigger_batch_size }),
            Err(err) => {
                warn!(target = "hermes.enhance", error = %err, "trigger_failed");
                json!({ "triggered": false, "error": err.to_string() })
            }
        };
        Ok(StageOutcome::new((), output))
    }

    /// Sleeps one interval before every attempt. Transient read errors use up
    /// an attempt; a failed job ends polling immediately.
    async fn poll_job(
        &self,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome<String>, ReviewError> {
        for attempt in 1..=self.poll_max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ReviewError::cancelled("poll", "cancelled"));
                }
                _ = sleep(self.poll_interval) => {}
            }
            let outcome = match self.queue.get_latest(item_id).await {
                Ok(job) => PollOutcome::from_job(job),
                Err(err) => {
                    warn!(target = "hermes.enhance", item_id = %item_id, attempt, error = %err, "poll_read_failed");
                    PollOutcome::Pending
                }
            };
            match outcome {
                PollOutcome::Pending => continue,
                PollOutcome::Completed(url) => {
                    return Ok(StageOutcome::new(
                        url.clone(),
                        json!({ "attempts": attempt, "result_url": url }),
                    ));
                }
                PollOutcome::Failed(reason) => {
                    return Err(ReviewError::enhancement_failed("poll", reason));
                }
            }
        }
        Err(ReviewError::timeout(
            "poll",
            format!("timed out after {} polls", self.poll_max_attempts),
        ))
    }
}
