//! End-to-end tests for a dispatched session.
//!
//! Every test runs on a paused tokio clock, so exam deadlines and ticks are
//! driven by `tokio::time` rather than wall time.
//!
//! # Test Coverage
//!
//! - Clock expiry forces exactly one submission and lands on Review
//! - Commands arriving after the deadline but before the tick lose to it
//! - Manual submission delivers before the command returns
//! - Focus losses, capture stops and lockdown exits are counted
//! - Dropping every handle tears the session down
//! - Sink failures leave the session usable

use std::sync::Arc;
use std::time::Duration;

use proctor_core::host::sim::SimulatedHost;
use proctor_core::prelude::*;
use proctor_core::session::SessionEvent;
use proctor_core::submission::SubmissionError;

// ============================================================================
// Fixtures
// ============================================================================

fn config(duration_secs: u64) -> ProctorConfig {
    config_with_tick(duration_secs, 250)
}

fn config_with_tick(duration_secs: u64, tick_interval_ms: u64) -> ProctorConfig {
    ProctorConfig::from_toml(&format!(
        r#"
[session]
tick_interval_ms = {tick_interval_ms}

[assessment]
title = "Backend screen"
duration_secs = {duration_secs}
allowed_languages = ["rust", "go"]

[[assessment.questions]]
id = "q1"
title = "Two sum"
body = "Return the indices of two numbers that add up to target."

[[assessment.questions]]
id = "q2"
title = "LRU cache"
body = "Implement a fixed-capacity LRU cache."
difficulty = "hard"
"#
    ))
    .unwrap()
}

struct Fixture {
    host: SimulatedHost,
    sink: Arc<InMemorySink>,
    session: SessionHandle,
    task: tokio::task::JoinHandle<SessionReport>,
}

impl Fixture {
    fn spawn(duration_secs: u64) -> Self {
        Self::spawn_with(&config(duration_secs))
    }

    fn spawn_with(config: &ProctorConfig) -> Self {
        let host = SimulatedHost::new();
        let sink = Arc::new(InMemorySink::new());
        let (session, task) = spawn_session(
            config,
            HostCapabilities::from_host(host.clone()),
            sink.clone(),
        )
        .unwrap();
        Self {
            host,
            sink,
            session,
            task,
        }
    }

    async fn ready(&self) {
        self.session.advance().await.unwrap();
        self.session.advance().await.unwrap();
        self.session.set_consent(true).await.unwrap();
        self.session.request_capture().await.unwrap();
        self.session.request_lockdown().await.unwrap();
    }

    async fn started(duration_secs: u64) -> Self {
        let fixture = Self::spawn(duration_secs);
        fixture.ready().await;
        let snapshot = fixture.session.start_test().await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::InProgress);
        fixture
    }

    async fn finish(self) -> (SimulatedHost, Arc<InMemorySink>, SessionReport) {
        self.session.close().await;
        let report = self.task.await.unwrap();
        (self.host, self.sink, report)
    }
}

// ============================================================================
// Clock expiry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn expiry_forces_submission_and_review() {
    let fx = Fixture::started(1).await;

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Review);
    assert_eq!(snapshot.violation_count, 0);
    assert_eq!(snapshot.remaining_seconds, 0);
    assert!(snapshot.submitted);
    assert!(snapshot.forced);
    assert!(snapshot.receipt.is_some());
    assert_eq!(fx.sink.received().len(), 1);
    assert!(fx.sink.received()[0].forced);

    // Review is read-only once time is up.
    assert_eq!(fx.session.go_back().await, Err(SessionError::TimeExpired));

    fx.session.confirm().await.unwrap();
    let snapshot = fx.session.show_results().await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Results);

    let (host, sink, report) = fx.finish().await;
    assert_eq!(report.snapshot.phase, SessionPhase::Closed);
    assert_eq!(sink.received().len(), 1);
    assert_eq!(host.live_tracks(), 0);
    assert!(!host.lockdown_active());
}

#[tokio::test(start_paused = true)]
async fn expiry_while_on_review_stays_on_review() {
    let fx = Fixture::started(2).await;
    fx.session.review().await.unwrap();

    tokio::time::sleep(Duration::from_millis(2_300)).await;

    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Review);
    assert!(snapshot.forced);
    assert_eq!(fx.sink.received().len(), 1);
    fx.finish().await;
}

#[tokio::test(start_paused = true)]
async fn manual_submit_just_before_expiry_yields_one_submission() {
    let fx = Fixture::started(2).await;
    fx.session.save_answer("q1", "fn two_sum() {}").await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_900)).await;
    assert_eq!(fx.session.submit().await.unwrap(), SubmitOutcome::Recorded);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        fx.session.submit().await.unwrap(),
        SubmitOutcome::AlreadySubmitted
    );

    let (_, sink, report) = fx.finish().await;
    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert!(!received[0].forced);
    assert_eq!(received[0].answers.len(), 1);
    let submissions = report
        .events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Submitted { .. }))
        .count();
    assert_eq!(submissions, 1);
}

#[tokio::test(start_paused = true)]
async fn commands_between_deadline_and_tick_see_expiry() {
    // Ticks land at 3s; the 2s deadline passes well before the first one.
    let fx = Fixture::spawn_with(&config_with_tick(2, 3_000));
    fx.ready().await;
    fx.session.start_test().await.unwrap();
    fx.session.save_answer("q1", "fn two_sum() {}").await.unwrap();

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(fx.session.snapshot().phase, SessionPhase::InProgress);

    assert_eq!(
        fx.session.save_answer("q1", "late edit").await,
        Err(SessionError::TimeExpired)
    );
    assert_eq!(
        fx.session.submit().await.unwrap(),
        SubmitOutcome::AlreadySubmitted
    );

    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Review);
    assert!(snapshot.forced);

    let (_, sink, _) = fx.finish().await;
    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].forced);
    assert_eq!(
        received[0].answers.get("q1").map(String::as_str),
        Some("fn two_sum() {}")
    );
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test(start_paused = true)]
async fn submit_delivers_before_returning() {
    let fx = Fixture::started(600).await;
    fx.session.select_language("go").await.unwrap();
    fx.session.save_answer("q2", "type LRU struct{}").await.unwrap();
    fx.session.review().await.unwrap();
    fx.session.submit().await.unwrap();

    let snapshot = fx.session.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Confirmation);
    let receipt = snapshot.receipt.unwrap();
    assert!(receipt.submission_id.starts_with("S-"));
    assert_eq!(receipt.summary, "1 answer(s), 0 violation(s), 0s");

    fx.session.show_results().await.unwrap();
    let (host, sink, _) = fx.finish().await;
    assert_eq!(sink.received()[0].language.as_deref(), Some("go"));
    assert_eq!(host.active_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn sink_failure_keeps_session_on_confirmation() {
    let fx = Fixture::started(600).await;
    fx.sink
        .fail_with(SubmissionError::unavailable("grading service offline"));
    fx.session.submit().await.unwrap();

    assert_eq!(
        fx.session.show_results().await,
        Err(SessionError::ResultsPending)
    );
    assert_eq!(fx.session.snapshot().phase, SessionPhase::Confirmation);

    let (_, _, report) = fx.finish().await;
    assert!(report.submission.is_some());
    assert!(
        report
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::DeliveryFailed { .. }))
    );
}

// ============================================================================
// Setup gating
// ============================================================================

#[tokio::test(start_paused = true)]
async fn start_rejected_until_lockdown_held() {
    let fx = Fixture::spawn(600);
    fx.session.advance().await.unwrap();
    fx.session.advance().await.unwrap();
    fx.session.set_consent(true).await.unwrap();
    fx.session.request_capture().await.unwrap();

    let err = fx.session.start_test().await.unwrap_err();
    assert!(matches!(err, SessionError::NotReady { .. }));
    assert!(err.is_retryable());

    fx.host.set_lockdown_response(SimResponse::Unsupported);
    let err = fx.session.request_lockdown().await.unwrap_err();
    assert_eq!(err, SessionError::Setup(SetupError::LockdownUnsupported));
    assert_eq!(
        fx.session.snapshot().setup_error,
        Some(SetupError::LockdownUnsupported)
    );

    fx.host.set_lockdown_response(SimResponse::Grant);
    let snapshot = fx.session.request_lockdown().await.unwrap();
    assert!(snapshot.can_start_test);
    assert_eq!(snapshot.setup_error, None);
    fx.finish().await;
}

#[tokio::test(start_paused = true)]
async fn escape_before_start_downgrades_readiness() {
    let fx = Fixture::spawn(600);
    fx.ready().await;
    fx.host.press_escape();

    let snapshot = fx
        .session
        .wait_for(|s| !s.readiness.lockdown_active)
        .await
        .unwrap();
    assert!(!snapshot.can_start_test);
    assert_eq!(snapshot.setup_error, Some(SetupError::LockdownFailed));
    assert_eq!(snapshot.violation_count, 0);
    fx.finish().await;
}

// ============================================================================
// Integrity monitoring
// ============================================================================

#[tokio::test(start_paused = true)]
async fn every_focus_loss_is_counted() {
    let fx = Fixture::started(600).await;
    for _ in 0..5 {
        fx.host.blur_and_return();
    }
    let snapshot = fx.session.wait_for(|s| s.violation_count == 5).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::InProgress);

    let (_, _, report) = fx.finish().await;
    assert_eq!(report.violations.len(), 5);
    assert!(
        report
            .violations
            .iter()
            .all(|v| v.kind == ViolationKind::FocusLost)
    );
}

#[tokio::test(start_paused = true)]
async fn capture_stop_mid_test_is_recoverable() {
    let fx = Fixture::started(600).await;
    fx.host.revoke_capture();

    let snapshot = fx
        .session
        .wait_for(|s| s.setup_error == Some(SetupError::CaptureStopped))
        .await
        .unwrap();
    assert_eq!(snapshot.violation_count, 1);
    assert!(!snapshot.readiness.capture_active);

    let snapshot = fx.session.request_capture().await.unwrap();
    assert!(snapshot.readiness.capture_active);
    assert_eq!(snapshot.setup_error, None);
    assert_eq!(fx.host.acquisitions(), 2);
    fx.finish().await;
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_closes_session() {
    let fx = Fixture::started(600).await;
    let Fixture {
        host, session, task, ..
    } = fx;
    drop(session);

    let report = task.await.unwrap();
    assert_eq!(report.snapshot.phase, SessionPhase::Closed);
    assert!(report.submission.is_none());
    assert_eq!(host.live_tracks(), 0);
    assert!(!host.lockdown_active());
    assert_eq!(host.active_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn commands_after_close_report_dispatcher_gone() {
    let fx = Fixture::spawn(600);
    let session = fx.session.clone();
    let (_, _, report) = fx.finish().await;
    assert_eq!(report.snapshot.phase, SessionPhase::Closed);

    assert_eq!(session.advance().await, Err(SessionError::DispatcherGone));
    assert_eq!(session.close().await.phase, SessionPhase::Closed);
}
