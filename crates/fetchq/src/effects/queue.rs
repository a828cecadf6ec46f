//! The fetch queue: a [`JobQueue`] specialised for conditional HTTP fetches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::core::{can_admit, should_retry, validate_job_config};
use crate::data::{ContentOptions, FetchEvent, FetchRequest, FetchResult, JobConfig, RequestOptions};
use crate::effects::conditional::ConditionalFetcher;
use crate::effects::http::HttpClient;
use crate::effects::scheduler::{Job, JobHandle, JobQueue, Occupancy};
use crate::error::{FetchError, Result};

/// Number of events buffered per subscriber before the slowest one lags.
pub const EVENT_CAPACITY: usize = 256;

/// Resolves with the final [`FetchResult`] or the last attempt's error.
pub type FetchHandle = JobHandle<FetchResult, FetchError>;

/// Bounded-concurrency, retrying queue of conditional fetches.
///
/// Dropping the queue abandons fetches that are still pending or waiting to
/// retry; their handles resolve with [`FetchError::Abandoned`].
///
/// # Examples
///
/// ```no_run
/// use fetchq::{ConditionalFetcher, ContentOptions, FetchQueue, JobConfig, ReqwestClient, RequestOptions};
///
/// # async fn run() -> fetchq::Result<()> {
/// let fetcher = ConditionalFetcher::new(ReqwestClient::new()?);
/// let queue = FetchQueue::new(fetcher, JobConfig::default().max_concurrents(4).max_attempts(3))?;
///
/// let result = queue
///     .enqueue(
///         "https://example.com/feed.xml",
///         RequestOptions::default(),
///         ContentOptions::default().validator("\"abc123\""),
///         JobConfig::default(),
///     )?
///     .await?;
///
/// if result.is_unchanged() {
///     println!("feed unchanged");
/// }
/// # Ok(())
/// # }
/// ```
pub struct FetchQueue<C: HttpClient> {
    fetcher: Arc<ConditionalFetcher<C>>,
    defaults: JobConfig,
    jobs: JobQueue<FetchResult, FetchError>,
    events: broadcast::Sender<FetchEvent>,
}

impl<C: HttpClient + 'static> FetchQueue<C> {
    /// Create a queue with queue-level job defaults.
    ///
    /// Invalid defaults are rejected here and no queue is built.
    pub fn new(fetcher: ConditionalFetcher<C>, defaults: JobConfig) -> Result<Self> {
        validate_job_config(&defaults)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            fetcher: Arc::new(fetcher),
            defaults,
            jobs: JobQueue::new(),
            events,
        })
    }

    pub fn defaults(&self) -> &JobConfig { &self.defaults }

    pub fn fetcher(&self) -> &ConditionalFetcher<C> { &self.fetcher }

    /// Subscribe to lifecycle events.
    ///
    /// Delivery is best-effort: events are delivered asynchronously, only to
    /// receivers that exist when they are published, and a receiver that
    /// falls more than [`EVENT_CAPACITY`] events behind skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> { self.events.subscribe() }

    pub fn occupancy(&self) -> Occupancy { self.jobs.occupancy() }

    pub fn running(&self) -> usize { self.jobs.running() }

    pub fn pending(&self) -> usize { self.jobs.pending() }

    /// Queue a fetch of `url`.
    ///
    /// `job_options` are shallow-merged over the queue defaults and the result
    /// is validated before any job exists. Outside a Tokio runtime this fails
    /// with [`FetchError::NoRuntime`].
    pub fn enqueue(
        &self,
        url: impl Into<String>,
        fetch_options: RequestOptions,
        content_options: ContentOptions,
        job_options: JobConfig,
    ) -> Result<FetchHandle> {
        self.enqueue_request(FetchRequest {
            url: url.into(),
            fetch_options,
            content_options,
            job_options,
        })
    }

    pub fn enqueue_request(&self, request: FetchRequest) -> Result<FetchHandle> {
        let config = self.defaults.merge(&request.job_options);
        validate_job_config(&config)?;

        let request = Arc::new(request);
        let attempts = Arc::new(AtomicU32::new(0));

        let start = {
            let fetcher = Arc::clone(&self.fetcher);
            let events = self.events.clone();
            let request = Arc::clone(&request);
            let attempts = Arc::clone(&attempts);

            move || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(url = %request.url, attempt, "fetch attempt");
                publish(&events, FetchEvent::Attempt { attempt, request: Arc::clone(&request) });

                let fetcher = Arc::clone(&fetcher);
                let events = events.clone();
                let request = Arc::clone(&request);
                async move {
                    let result = fetcher
                        .fetch_once(&request.url, &request.fetch_options, &request.content_options)
                        .await?;
                    publish(&events, FetchEvent::Success {
                        attempt,
                        request: Arc::clone(&request),
                        result: result.clone(),
                    });
                    Ok(result)
                }
            }
        };

        let admit = move |occupancy: &Occupancy| can_admit(occupancy.running, config.max_concurrents);

        let retry = {
            let events = self.events.clone();
            let request = Arc::clone(&request);

            move |error: &FetchError| {
                let attempt = attempts.load(Ordering::SeqCst);
                publish(&events, FetchEvent::Error {
                    attempt,
                    request: Arc::clone(&request),
                    error: error.clone(),
                });

                let retry = should_retry(attempt, config.max_attempts);
                if retry {
                    debug!(url = %request.url, attempt, %error, "fetch failed, retrying");
                } else {
                    warn!(url = %request.url, attempt, %error, "fetch failed");
                }
                retry
            }
        };

        Ok(self.jobs.enqueue(Job::new(start).start_filter(admit).retry_filter(retry))?)
    }
}

fn publish(events: &broadcast::Sender<FetchEvent>, event: FetchEvent) {
    // no subscribers is fine
    let _ = events.send(event);
}
