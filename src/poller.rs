//! Long-running media job poller.
//!
//! [`poll_until_complete`] refreshes a pending [`Operation`] until the service
//! reports it done. The wait between status checks follows a [`PollPolicy`],
//! which bounds the total time and number of checks, and the whole loop can be
//! abandoned through a [`CancellationToken`].

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{GenMediaError, Result};
use crate::operation::{Operation, OperationSource};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_MAX_INTERVAL_SECS: u64 = 60;
const DEFAULT_DEADLINE_SECS: u64 = 600;
const DEFAULT_MULTIPLIER: f64 = 1.5;

/// How the wait between status checks grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Linear { step: Duration },
    Exponential { multiplier: f64 },
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Wait before the first status check.
    pub initial_interval: Duration,
    pub backoff: Backoff,
    /// Upper bound on the wait between checks.
    pub max_interval: Duration,
    /// Give up after this many status checks.
    pub max_attempts: Option<u32>,
    /// Give up once this much time would have passed before the next check.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            backoff: Backoff::Exponential {
                multiplier: DEFAULT_MULTIPLIER,
            },
            max_interval: Duration::from_secs(DEFAULT_MAX_INTERVAL_SECS),
            max_attempts: None,
            deadline: Some(Duration::from_secs(DEFAULT_DEADLINE_SECS)),
        }
    }
}

impl PollPolicy {
    /// Constant interval, no deadline, no attempt cap.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            backoff: Backoff::Fixed,
            max_interval: interval,
            max_attempts: None,
            deadline: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Reject policies whose waits could shrink to nothing.
    pub fn validate(&self) -> Result<()> {
        if self.initial_interval.is_zero() {
            return Err(GenMediaError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if let Backoff::Exponential { multiplier } = self.backoff
            && !(multiplier >= 1.0 && multiplier.is_finite())
        {
            return Err(GenMediaError::InvalidConfig(format!(
                "backoff multiplier must be a finite number >= 1.0, got {}",
                multiplier
            )));
        }
        Ok(())
    }

    /// Delay to use after `current`, kept between `initial_interval` and
    /// `max_interval`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = match self.backoff {
            Backoff::Fixed => current,
            Backoff::Linear { step } => current.saturating_add(step),
            Backoff::Exponential { multiplier } => {
                let next_ms = (current.as_millis() as f64 * multiplier) as u64;
                Duration::from_millis(next_ms)
            }
        };
        next.clamp(
            self.initial_interval,
            self.max_interval.max(self.initial_interval),
        )
    }
}

/// Emitted once per polling iteration, before the wait.
#[derive(Debug, Clone, PartialEq)]
pub struct PollProgress<'a> {
    pub operation: &'a str,
    /// 1-based number of the status check about to be made.
    pub attempt: u32,
    pub elapsed: Duration,
    pub next_delay: Duration,
}

/// Wait for `operation` to finish, refreshing it through `source`.
///
/// Returns the handle as soon as it reports done; a handle that is already
/// done is returned without any refresh. A refresh error ends the loop and is
/// returned unchanged. An invalid `policy` is rejected before anything else.
pub async fn poll_until_complete<S, F>(
    source: &S,
    mut operation: Operation<S::Response>,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<Operation<S::Response>>
where
    S: OperationSource + ?Sized,
    F: FnMut(&PollProgress<'_>),
{
    policy.validate()?;

    let start = Instant::now();
    let mut delay = policy.initial_interval;
    let mut attempts = 0u32;

    while !operation.done {
        if let Some(max_attempts) = policy.max_attempts
            && attempts >= max_attempts
        {
            return Err(GenMediaError::MaxAttemptsExceeded(max_attempts));
        }

        let elapsed = start.elapsed();
        if let Some(deadline) = policy.deadline
            && elapsed + delay > deadline
        {
            return Err(GenMediaError::Timeout { elapsed, attempts });
        }

        on_progress(&PollProgress {
            operation: &operation.name,
            attempt: attempts + 1,
            elapsed,
            next_delay: delay,
        });
        debug!(
            operation = %operation.name,
            attempt = attempts + 1,
            elapsed_secs = elapsed.as_secs(),
            delay_ms = delay.as_millis() as u64,
            "Job still running, waiting before next status check"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(GenMediaError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        let refreshed = tokio::select! {
            _ = cancel.cancelled() => return Err(GenMediaError::Cancelled),
            result = source.refresh(&operation) => result?,
        };
        operation = refreshed;
        attempts += 1;
        delay = policy.next_delay(delay);
    }

    if let Some(status) = &operation.error {
        return Err(GenMediaError::JobFailed {
            name: operation.name.clone(),
            code: status.code,
            message: status.message.clone(),
        });
    }
    if operation.response.is_none() {
        return Err(GenMediaError::InvalidResponse(format!(
            "operation {} completed without a response",
            operation.name
        )));
    }

    info!(
        operation = %operation.name,
        attempts,
        elapsed_secs = start.elapsed().as_secs(),
        "Job complete"
    );
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Completes (or fails) on the `flip_at`-th refresh.
    struct FlipSource {
        flip_at: u32,
        fail: bool,
        error_at: Option<u32>,
        calls: AtomicU32,
    }

    impl FlipSource {
        fn completing_after(flip_at: u32) -> Self {
            Self {
                flip_at,
                fail: false,
                error_at: None,
                calls: AtomicU32::new(0),
            }
        }

        fn never() -> Self {
            Self::completing_after(u32::MAX)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OperationSource for FlipSource {
        type Response = String;

        async fn refresh(&self, operation: &Operation<String>) -> Result<Operation<String>> {
            assert!(!operation.done, "refreshed a finished operation");
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.error_at == Some(n) {
                return Err(GenMediaError::ApiError {
                    status: 500,
                    message: "backend unavailable".to_string(),
                });
            }
            if n < self.flip_at {
                return Ok(Operation::pending(operation.name.clone()));
            }
            if self.fail {
                Ok(Operation::failed(
                    operation.name.clone(),
                    OperationStatus {
                        code: 3,
                        message: "prompt rejected".to_string(),
                    },
                ))
            } else {
                Ok(Operation::completed(operation.name.clone(), "video".to_string()))
            }
        }
    }

    fn ten_seconds() -> PollPolicy {
        PollPolicy::fixed(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_only_after_completion() {
        let source = FlipSource::completing_after(4);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let op = poll_until_complete(
            &source,
            Operation::pending("operations/a"),
            &ten_seconds(),
            &cancel,
            |_| {},
        )
        .await
        .unwrap();

        assert!(op.done);
        assert_eq!(op.response.as_deref(), Some("video"));
        assert_eq!(source.calls(), 4);
        assert!(started.elapsed() >= Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_complete_makes_no_refresh() {
        let source = FlipSource::completing_after(1);
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let mut events = 0;

        let op = poll_until_complete(
            &source,
            Operation::completed("operations/b", "ready".to_string()),
            &ten_seconds(),
            &cancel,
            |_| events += 1,
        )
        .await
        .unwrap();

        assert_eq!(op.response.as_deref(), Some("ready"));
        assert_eq!(source.calls(), 0);
        assert_eq!(events, 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_count_matches_flip() {
        for n in 1..=5 {
            let source = FlipSource::completing_after(n);
            let cancel = CancellationToken::new();
            poll_until_complete(
                &source,
                Operation::pending("operations/c"),
                &ten_seconds(),
                &cancel,
                |_| {},
            )
            .await
            .unwrap();
            assert_eq!(source.calls(), n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_emitted_each_iteration() {
        let source = FlipSource::completing_after(3);
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        poll_until_complete(
            &source,
            Operation::pending("operations/d"),
            &ten_seconds(),
            &cancel,
            |p| seen.push((p.operation.to_string(), p.attempt, p.elapsed.as_secs())),
        )
        .await
        .unwrap();

        assert_eq!(
            seen,
            vec![
                ("operations/d".to_string(), 1, 0),
                ("operations/d".to_string(), 2, 10),
                ("operations/d".to_string(), 3, 20),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_propagates() {
        let source = FlipSource {
            error_at: Some(2),
            ..FlipSource::completing_after(5)
        };
        let cancel = CancellationToken::new();

        let err = poll_until_complete(
            &source,
            Operation::pending("operations/e"),
            &ten_seconds(),
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenMediaError::ApiError { status: 500, .. }));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job() {
        let source = FlipSource {
            fail: true,
            ..FlipSource::completing_after(2)
        };
        let cancel = CancellationToken::new();

        let err = poll_until_complete(
            &source,
            Operation::pending("operations/f"),
            &ten_seconds(),
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        match err {
            GenMediaError::JobFailed { name, code, .. } => {
                assert_eq!(name, "operations/f");
                assert_eq!(code, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let source = FlipSource::never();
        let cancel = CancellationToken::new();
        let policy = ten_seconds().with_deadline(Duration::from_secs(35));

        let err = poll_until_complete(
            &source,
            Operation::pending("operations/g"),
            &policy,
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        match err {
            GenMediaError::Timeout { elapsed, attempts } => {
                assert_eq!(attempts, 3);
                assert_eq!(elapsed.as_secs(), 30);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts() {
        let source = FlipSource::never();
        let cancel = CancellationToken::new();
        let policy = ten_seconds().with_max_attempts(3);

        let err = poll_until_complete(
            &source,
            Operation::pending("operations/h"),
            &policy,
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenMediaError::MaxAttemptsExceeded(3)));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_check() {
        let source = FlipSource::never();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poll_until_complete(
            &source,
            Operation::pending("operations/i"),
            &ten_seconds(),
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenMediaError::Cancelled));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_waiting() {
        let source = FlipSource::never();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let err = poll_until_complete(
            &source,
            Operation::pending("operations/j"),
            &ten_seconds(),
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenMediaError::Cancelled));
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = ten_seconds();
        assert_eq!(
            policy.next_delay(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_exponential_sequence() {
        let policy = PollPolicy::default();
        let mut delay = policy.initial_interval;
        let expected = [10_000, 15_000, 22_500, 33_750, 50_625, 60_000, 60_000];

        for &expected_ms in &expected {
            assert_eq!(delay.as_millis() as u64, expected_ms);
            delay = policy.next_delay(delay);
        }
    }

    #[test]
    fn test_linear_clamps_at_max() {
        let policy = PollPolicy::fixed(Duration::from_secs(5))
            .with_backoff(Backoff::Linear {
                step: Duration::from_secs(5),
            })
            .with_max_interval(Duration::from_secs(12));
        assert_eq!(
            policy.next_delay(Duration::from_secs(5)),
            Duration::from_secs(10)
        );
        assert_eq!(
            policy.next_delay(Duration::from_secs(10)),
            Duration::from_secs(12)
        );
    }

    #[test]
    fn test_delay_never_drops_below_initial_interval() {
        let ten = Duration::from_secs(10);
        for multiplier in [0.0, 0.5, f64::NAN] {
            let policy = ten_seconds().with_backoff(Backoff::Exponential { multiplier });
            assert_eq!(policy.next_delay(ten), ten);
            assert!(matches!(
                policy.validate(),
                Err(GenMediaError::InvalidConfig(_))
            ));
        }
        assert_eq!(ten_seconds().next_delay(Duration::ZERO), ten);
    }

    #[test]
    fn test_validate() {
        assert!(PollPolicy::default().validate().is_ok());
        assert!(ten_seconds().validate().is_ok());
        assert!(
            ten_seconds()
                .with_backoff(Backoff::Exponential { multiplier: 1.0 })
                .validate()
                .is_ok()
        );
        assert!(matches!(
            PollPolicy::fixed(Duration::ZERO).validate(),
            Err(GenMediaError::InvalidConfig(_))
        ));
        assert!(matches!(
            ten_seconds()
                .with_backoff(Backoff::Exponential {
                    multiplier: f64::INFINITY
                })
                .validate(),
            Err(GenMediaError::InvalidConfig(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinking_policy_is_rejected_before_polling() {
        let source = FlipSource::never();
        let cancel = CancellationToken::new();
        let policy = ten_seconds()
            .with_backoff(Backoff::Exponential { multiplier: 0.0 })
            .with_max_attempts(10_000);
        let started = Instant::now();

        let err = poll_until_complete(
            &source,
            Operation::pending("operations/k"),
            &policy,
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GenMediaError::InvalidConfig(_)));
        assert_eq!(source.calls(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_default_policy_is_bounded() {
        let policy = PollPolicy::default();
        assert_eq!(policy.initial_interval, Duration::from_secs(10));
        assert_eq!(policy.deadline, Some(Duration::from_secs(600)));
        assert!(policy.max_attempts.is_none());
    }
}
