use crate::review::approval::{ApprovalEngine, ApprovalOutcome};
use crate::review::error::ReviewError;
use crate::review::model::{BatchSession, ItemStatus, SharedSession};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCommand {
    Confirm,
    Cancel,
    Next,
    Previous,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum KeyOutcome {
    Approved(ApprovalOutcome),
    Skipped(ApprovalOutcome),
    Moved { current_index: usize },
    Ignored { reason: &'static str },
}

impl BatchSession {
    fn is_ready(&self, index: usize) -> bool {
        self.items
            .get(index)
            .is_some_and(|item| item.status == ItemStatus::Ready)
    }

    /// First ready index strictly after `from`, wrapping around.
    fn next_ready_after(&self, from: usize) -> Option<usize> {
        let len = self.items.len();
        (1..=len)
            .map(|step| (from + step) % len)
            .find(|&index| self.is_ready(index))
    }

    fn previous_ready_before(&self, from: usize) -> Option<usize> {
        let len = self.items.len();
        (1..=len)
            .map(|step| (from + len - step % len) % len)
            .find(|&index| self.is_ready(index))
    }

    /// Keeps `current_index` on a ready item whenever one exists.
    pub fn reposition(&mut self) {
        if self.items.is_empty() || self.is_ready(self.current_index) {
            return;
        }
        if let Some(index) = self.next_ready_after(self.current_index) {
            self.current_index = index;
        }
    }

    /// Called after `index` left the ready state through approve or skip.
    pub fn advance_from(&mut self, index: usize) {
        if index != self.current_index {
            self.reposition();
            return;
        }
        if let Some(next) = self.next_ready_after(index) {
            self.current_index = next;
        }
    }

    pub fn step(&mut self, forward: bool) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        let target = if forward {
            self.next_ready_after(self.current_index)
        } else {
            self.previous_ready_before(self.current_index)
        }?;
        self.current_index = target;
        Some(target)
    }
}

/// Routes a keyboard command for the current item. Commands that do not apply
/// to the current item are ignored, never errors.
pub async fn dispatch_key(
    engine: &ApprovalEngine,
    session: &SharedSession,
    command: KeyCommand,
) -> Result<KeyOutcome, ReviewError> {
    let confirm = match command {
        KeyCommand::Confirm => true,
        KeyCommand::Cancel => false,
        KeyCommand::Next | KeyCommand::Previous => {
            let moved = session.lock().await.step(command == KeyCommand::Next);
            return Ok(match moved {
                Some(current_index) => KeyOutcome::Moved { current_index },
                None => KeyOutcome::Ignored {
                    reason: "no ready items",
                },
            });
        }
    };

    let current = {
        let guard = session.lock().await;
        let index = guard.current_index;
        let Some(item) = guard.items.get(index) else {
            return Ok(KeyOutcome::Ignored { reason: "empty batch" });
        };
        if item.status != ItemStatus::Ready {
            return Ok(KeyOutcome::Ignored {
                reason: "current item is not ready",
            });
        }
        if confirm && item.selected_image.is_none() {
            return Ok(KeyOutcome::Ignored {
                reason: "no image selected",
            });
        }
        if item.committing {
            return Ok(KeyOutcome::Ignored {
                reason: "commit in flight",
            });
        }
        index
    };

    debug!(target = "hermes.review", index = current, ?command, "key_dispatch");
    if confirm {
        engine.approve(session, current).await.map(KeyOutcome::Approved)
    } else {
        engine.skip(session, current).await.map(KeyOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{Collaborators, DemoBackend};
    use crate::review::testing::{ready_session, shared};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[test]
    fn reposition_finds_next_ready_with_wrap() {
        let mut session = ready_session(4);
        session.items[0].status = ItemStatus::Approved;
        session.items[1].status = ItemStatus::Error;
        session.items[2].status = ItemStatus::Skipped;
        session.current_index = 2;
        session.reposition();
        assert_eq!(session.current_index, 3);
        session.items[3].status = ItemStatus::Approved;
        session.reposition();
        assert_eq!(session.current_index, 3, "unchanged when none remain");
    }

    #[test]
    fn reposition_keeps_ready_current() {
        let mut session = ready_session(3);
        session.current_index = 1;
        session.reposition();
        assert_eq!(session.current_index, 1);
    }

    #[test]
    fn advance_wraps_to_earlier_ready_item() {
        let mut session = ready_session(3);
        session.current_index = 2;
        session.items[2].status = ItemStatus::Skipped;
        session.advance_from(2);
        assert_eq!(session.current_index, 0);
    }

    #[test]
    fn step_moves_between_ready_items() {
        let mut session = ready_session(4);
        session.items[1].status = ItemStatus::Error;
        assert_eq!(session.step(true), Some(2));
        assert_eq!(session.step(false), Some(0));
        assert_eq!(session.step(false), Some(3));
    }

    fn engine(backend: &Arc<DemoBackend>) -> ApprovalEngine {
        ApprovalEngine::new(Collaborators::demo(backend.clone()).hero)
    }

    #[tokio::test]
    async fn confirm_without_selection_is_ignored() {
        let backend = Arc::new(DemoBackend::new(Vec::new()));
        let session = shared(ready_session(2));
        let outcome = dispatch_key(&engine(&backend), &session, KeyCommand::Confirm)
            .await
            .expect("dispatch");
        assert!(matches!(outcome, KeyOutcome::Ignored { .. }));
        assert_eq!(backend.counters().set_hero.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confirm_approves_current_and_advances() {
        let backend = Arc::new(DemoBackend::new(Vec::new()));
        let mut session = ready_session(3);
        session.items[0].select("p-0-s0").expect("select");
        let session = shared(session);
        let outcome = dispatch_key(&engine(&backend), &session, KeyCommand::Confirm)
            .await
            .expect("dispatch");
        let KeyOutcome::Approved(approved) = outcome else {
            panic!("expected approval, got {outcome:?}");
        };
        assert_eq!(approved.item_id, "p-0");
        let guard = session.lock().await;
        assert_eq!(guard.items[0].status, ItemStatus::Approved);
        assert_eq!(guard.current_index, 1);
    }

    #[tokio::test]
    async fn cancel_skips_current_ready_item() {
        let backend = Arc::new(DemoBackend::new(Vec::new()));
        let session = shared(ready_session(2));
        let outcome = dispatch_key(&engine(&backend), &session, KeyCommand::Cancel)
            .await
            .expect("dispatch");
        assert!(matches!(outcome, KeyOutcome::Skipped(_)));
        let guard = session.lock().await;
        assert_eq!(guard.skipped_count, 1);
        assert_eq!(guard.current_index, 1);
    }

    #[tokio::test]
    async fn cancel_on_non_ready_item_is_ignored() {
        let backend = Arc::new(DemoBackend::new(Vec::new()));
        let mut session = ready_session(1);
        session.items[0].status = ItemStatus::Error;
        let session = shared(session);
        let outcome = dispatch_key(&engine(&backend), &session, KeyCommand::Cancel)
            .await
            .expect("dispatch");
        assert!(matches!(outcome, KeyOutcome::Ignored { .. }));
        assert_eq!(session.lock().await.skipped_count, 0);
    }

    #[tokio::test]
    async fn keys_on_empty_batch_are_ignored() {
        let backend = Arc::new(DemoBackend::new(Vec::new()));
        let session = shared(crate::review::testing::session_with(Vec::new()));
        for command in [KeyCommand::Confirm, KeyCommand::Cancel, KeyCommand::Next] {
            let outcome = dispatch_key(&engine(&backend), &session, command)
                .await
                .expect("dispatch");
            assert!(matches!(outcome, KeyOutcome::Ignored { .. }));
        }
    }
}
