use crate::collab::CollabError;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct ReviewError {
    stage: &'static str,
    message: String,
    kind: ReviewErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewErrorKind {
    /// Rejected locally before any collaborator call.
    Validation,
    NotFound,
    Network,
    EmptyResult,
    Timeout,
    EnhancementFailed,
    CommitFailure,
    LoadFailed,
    Cancelled,
}

impl ReviewError {
    fn new(stage: &'static str, message: impl Into<String>, kind: ReviewErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn validation(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, ReviewErrorKind::Validation)
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, ReviewErrorKind::NotFound)
    }

    pub fn network(stage: &'static str, err: CollabError) -> Self {
        Self::new(stage, err.to_string(), ReviewErrorKind::Network)
    }

    pub fn empty_result(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, ReviewErrorKind::EmptyResult)
    }

    pub fn timeout(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, ReviewErrorKind::Timeout)
    }

    pub fn enhancement_failed(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, ReviewErrorKind::EnhancementFailed)
    }

    pub fn commit_failure(stage: &'static str, err: CollabError) -> Self {
        Self::new(stage, err.to_string(), ReviewErrorKind::CommitFailure)
    }

    pub fn load_failed(err: CollabError) -> Self {
        Self::new("load", err.to_string(), ReviewErrorKind::LoadFailed)
    }

    pub fn cancelled(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, ReviewErrorKind::Cancelled)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> ReviewErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}
