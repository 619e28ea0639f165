//! Submission payload and sink.
//!
//! The sink is an opaque remote call owned by the hosting application. The
//! session records at most one [`Submission`] and hands it to the sink once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::integrity::ViolationEvent;

/// Everything the sink receives for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Session identifier.
    pub session_id: String,
    /// Final answers keyed by question ID.
    pub answers: BTreeMap<String, String>,
    /// Language the candidate answered in, if one was selected.
    pub language: Option<String>,
    /// Violations recorded during the session, in order.
    pub violation_events: Vec<ViolationEvent>,
    /// Seconds spent between start and submission, capped at the duration.
    pub time_spent_seconds: u64,
    /// `true` when the clock forced the submission.
    pub forced: bool,
    /// `true` when the violation count reached the configured review
    /// threshold. Informational only.
    pub flagged_for_review: bool,
    /// Wall-clock submission time, milliseconds since UNIX epoch.
    pub submitted_at_ms: u64,
}

/// Result summary returned by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Identifier assigned by the sink.
    pub submission_id: String,
    /// Human-readable summary for the results page.
    pub summary: String,
}

/// Sink failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// The remote side rejected the submission.
    #[error("submission rejected: {reason}")]
    Rejected {
        /// Why it was rejected.
        reason: String,
    },

    /// The remote side could not be reached.
    #[error("submission sink unavailable: {reason}")]
    Unavailable {
        /// Transport error description.
        reason: String,
    },
}

impl SubmissionError {
    /// Creates a rejected error.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Accepts a finished session.
#[async_trait]
pub trait SubmissionSink: Send + Sync + fmt::Debug {
    /// Delivers the submission and returns the result summary.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError`] if delivery failed.
    async fn submit(&self, submission: Submission) -> Result<SubmissionReceipt, SubmissionError>;
}

/// Sink that keeps every submission in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    received: Mutex<Vec<Submission>>,
    fail_with: Mutex<Option<SubmissionError>>,
}

impl InMemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later delivery fail with `err`.
    pub fn fail_with(&self, err: SubmissionError) {
        *self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    /// Returns every accepted submission.
    #[must_use]
    pub fn received(&self) -> Vec<Submission> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SubmissionSink for InMemorySink {
    async fn submit(&self, submission: Submission) -> Result<SubmissionReceipt, SubmissionError> {
        if let Some(err) = self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }
        let summary = format!(
            "{} answer(s), {} violation(s), {}s{}",
            submission.answers.len(),
            submission.violation_events.len(),
            submission.time_spent_seconds,
            if submission.forced { ", auto-submitted" } else { "" },
        );
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(submission);
        Ok(SubmissionReceipt {
            submission_id: format!("S-{}", Uuid::new_v4()),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(forced: bool) -> Submission {
        Submission {
            session_id: "session-1".to_string(),
            answers: BTreeMap::from([("q1".to_string(), "answer".to_string())]),
            language: Some("rust".to_string()),
            violation_events: Vec::new(),
            time_spent_seconds: 42,
            forced,
            flagged_for_review: false,
            submitted_at_ms: 1,
        }
    }

    #[tokio::test]
    async fn in_memory_sink_records_and_summarises() {
        let sink = InMemorySink::new();
        let receipt = sink.submit(submission(true)).await.unwrap();

        assert!(receipt.submission_id.starts_with("S-"));
        assert_eq!(receipt.summary, "1 answer(s), 0 violation(s), 42s, auto-submitted");
        assert_eq!(sink.received().len(), 1);
    }

    #[tokio::test]
    async fn failing_sink_keeps_nothing() {
        let sink = InMemorySink::new();
        sink.fail_with(SubmissionError::unavailable("offline"));
        let err = sink.submit(submission(false)).await.unwrap_err();
        assert!(err.to_string().contains("offline"));
        assert!(sink.received().is_empty());
    }

    #[test]
    fn submission_serializes() {
        let json = serde_json::to_value(submission(false)).unwrap();
        assert_eq!(json["time_spent_seconds"], 42);
        assert_eq!(json["answers"]["q1"], "answer");
    }
}
