// ── Bounded retry engine ──
//
// Exponential backoff keyed on caller-supplied predicates, cancellable at
// every suspension point through the ambient `CancellationToken`.
// Cancellation during backoff wins over the last AWS error.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default budget for create paths.
const CREATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const CREATE_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const CREATE_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Budget for post-create visibility reads (DescribeUsers scans).
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const VISIBILITY_MAX_BACKOFF: Duration = Duration::from_secs(10);

type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry configuration: a timeout, backoff bounds, and the predicates that
/// decide which errors are worth another attempt.
pub struct RetryPolicy<E> {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    predicates: Vec<Predicate<E>>,
}

impl<E> RetryPolicy<E> {
    /// Policy with the given timeout and the create-path backoff bounds.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_backoff: CREATE_INITIAL_BACKOFF,
            max_backoff: CREATE_MAX_BACKOFF,
            predicates: Vec::new(),
        }
    }

    /// Default budget for create paths: 60 min, 1 s initial, 5 min cap.
    pub fn create_default() -> Self {
        Self::new(CREATE_TIMEOUT)
    }

    /// Budget for post-create visibility reads: 5 min, 1 s initial, 10 s cap.
    pub fn visibility_default() -> Self {
        Self::new(VISIBILITY_TIMEOUT).with_backoff(CREATE_INITIAL_BACKOFF, VISIBILITY_MAX_BACKOFF)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Add a retry predicate. An error is retried when ANY predicate matches.
    pub fn retry_if(mut self, pred: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Box::new(pred));
        self
    }

    fn should_retry(&self, err: &E) -> bool {
        self.predicates.iter().any(|p| p(err))
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("timeout", &self.timeout)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

/// Outcome of an exhausted or aborted retry loop.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The host cancelled the operation. No further calls were made.
    #[error("operation cancelled by the host")]
    Cancelled,

    /// The retry budget ran out; carries the last error observed.
    #[error("retry budget exhausted after {waited:?}")]
    TimedOut {
        waited: Duration,
        #[source]
        source: E,
    },

    /// The error matched no predicate and was returned on first failure.
    #[error(transparent)]
    Terminal(E),
}

impl<E> RetryError<E> {
    /// The underlying error, when one was observed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Cancelled => None,
            Self::TimedOut { source, .. } | Self::Terminal(source) => Some(source),
        }
    }
}

/// Drive `op` under `policy`, bounded by `cancel`.
///
/// A pre-cancelled token returns `Cancelled` without invoking `op` at all.
/// A non-matching error is returned immediately without sleeping.
pub async fn retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy<E>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut backoff = policy.initial_backoff;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        attempt += 1;
        let result = tokio::select! {
            () = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = op() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !policy.should_retry(&err) {
            return Err(RetryError::Terminal(err));
        }

        let now = Instant::now();
        if now + backoff >= deadline {
            return Err(RetryError::TimedOut {
                waited: now - started,
                source: err,
            });
        }

        debug!(attempt, ?backoff, error = %err, "retrying after backoff");
        tokio::select! {
            () = cancel.cancelled() => return Err(RetryError::Cancelled),
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}
