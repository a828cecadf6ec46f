//! Generic admit/retry job queue.
//!
//! Jobs wait in a FIFO pending list until their admission filter accepts the
//! current occupancy, run as Tokio tasks, and on failure consult their retry
//! filter to go back to the end of the pending list or settle with the error.
//! Every admission decision is taken under the queue lock, so a filter always
//! sees the true running count. Hooks themselves run outside the lock.
//!
//! A rejected job is parked under the running count it was rejected at and is
//! only reconsidered once the running count drops below it, so admission cost
//! does not grow with the length of the backlog.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The job settled without an outcome: its queue was dropped while it was
/// pending or waiting to retry, or its attempt panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job abandoned before it settled")]
pub struct Abandoned;

/// `enqueue` was called outside a Tokio runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job queue used outside a Tokio runtime")]
pub struct NoRuntime;

/// Queue occupancy as seen by an admission filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    pub running: usize,
    pub pending: usize,
}

type StartFn<T, E> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, E>> + Send>;
type StartFilter = Box<dyn Fn(&Occupancy) -> bool + Send>;
type RetryFilter<E> = Box<dyn FnMut(&E) -> bool + Send>;

/// A unit of work with its three scheduling hooks.
///
/// By default a job is always admitted and never retried.
pub struct Job<T, E> {
    start: StartFn<T, E>,
    start_filter: StartFilter,
    retry_filter: RetryFilter<E>,
}

impl<T, E> Job<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// `start` is invoked once per attempt, retries included.
    pub fn new<F, Fut>(mut start: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            start: Box::new(move || start().boxed()),
            start_filter: Box::new(|_: &Occupancy| true),
            retry_filter: Box::new(|_: &E| false),
        }
    }

    /// Admission predicate, evaluated when the job enters the pending list
    /// and again whenever the running count drops below the count it was
    /// last rejected at.
    ///
    /// The filter must be monotonic in `running`: once it rejects at some
    /// running count it must reject at every higher one.
    #[must_use]
    pub fn start_filter(mut self, filter: impl Fn(&Occupancy) -> bool + Send + 'static) -> Self {
        self.start_filter = Box::new(filter);
        self
    }

    /// Retry predicate, evaluated once per failed attempt.
    #[must_use]
    pub fn retry_filter(mut self, filter: impl FnMut(&E) -> bool + Send + 'static) -> Self {
        self.retry_filter = Box::new(filter);
        self
    }
}

impl<T, E> fmt::Debug for Job<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}

/// Resolves with the job's final outcome.
pub struct JobHandle<T, E> {
    done: oneshot::Receiver<Result<T, E>>,
}

impl<T, E: From<Abandoned>> Future for JobHandle<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.done)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or_else(|_| Err(Abandoned.into())))
    }
}

impl<T, E> fmt::Debug for JobHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle").finish_non_exhaustive()
    }
}

struct Entry<T, E> {
    id: u64,
    job: Job<T, E>,
    done: oneshot::Sender<Result<T, E>>,
}

struct State<T, E> {
    /// Pending entries keyed by arrival sequence; a requeue is a new arrival.
    pending: BTreeMap<u64, Entry<T, E>>,
    /// Arrival sequences of rejected entries, keyed by the running count
    /// they were rejected at.
    parked: BTreeMap<usize, BTreeSet<u64>>,
    running: usize,
    next_id: u64,
    next_seq: u64,
    closed: bool,
}

impl<T, E> State<T, E> {
    fn occupancy(&self) -> Occupancy {
        Occupancy {
            running: self.running,
            pending: self.pending.len(),
        }
    }

    fn push(&mut self, entry: Entry<T, E>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq, entry);
        seq
    }

    /// Earliest parked entry that was rejected at a higher running count
    /// than the current one.
    fn next_candidate(&self) -> Option<(usize, u64)> {
        self.parked
            .range(self.running + 1..)
            .filter_map(|(&rejected_at, seqs)| seqs.first().map(|&seq| (rejected_at, seq)))
            .min_by_key(|&(_, seq)| seq)
    }

    fn unpark(&mut self, rejected_at: usize, seq: u64) {
        if let Some(seqs) = self.parked.get_mut(&rejected_at) {
            seqs.remove(&seq);
            if seqs.is_empty() {
                self.parked.remove(&rejected_at);
            }
        }
    }

    /// Admit every eligible parked entry in arrival order, then try `fresh`.
    fn admit(&mut self, fresh: Option<u64>) -> Vec<Entry<T, E>> {
        let mut admitted = Vec::new();
        while let Some((rejected_at, seq)) = self.next_candidate() {
            self.unpark(rejected_at, seq);
            self.try_start(seq, &mut admitted);
        }
        if let Some(seq) = fresh {
            self.try_start(seq, &mut admitted);
        }
        admitted
    }

    fn try_start(&mut self, seq: u64, admitted: &mut Vec<Entry<T, E>>) {
        let occupancy = self.occupancy();
        let accepted = match self.pending.get(&seq) {
            Some(entry) => (entry.job.start_filter)(&occupancy),
            None => return,
        };

        if accepted {
            if let Some(entry) = self.pending.remove(&seq) {
                self.running += 1;
                admitted.push(entry);
            }
        } else {
            self.parked.entry(self.running).or_default().insert(seq);
        }
    }
}

struct Inner<T, E> {
    state: Mutex<State<T, E>>,
}

/// FIFO job queue with per-job admission and retry filters.
///
/// Must be used from within a Tokio runtime: admitted attempts are spawned
/// as tasks. A current-thread runtime gives the cooperative, single-threaded
/// interleaving; the multi-threaded runtime works as well.
///
/// Dropping the queue abandons every pending job. Attempts already running
/// finish and settle, but are not retried.
pub struct JobQueue<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Default for JobQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self { Self::new() }
}

impl<T, E> JobQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    pending: BTreeMap::new(),
                    parked: BTreeMap::new(),
                    running: 0,
                    next_id: 0,
                    next_seq: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Append `job` to the pending list and start it if it is admissible.
    pub fn enqueue(&self, job: Job<T, E>) -> Result<JobHandle<T, E>, NoRuntime> {
        let runtime = Handle::try_current().map_err(|_| NoRuntime)?;
        let (done, handle) = oneshot::channel();

        let admitted = {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;
            let seq = state.push(Entry { id, job, done });
            state.admit(Some(seq))
        };
        Inner::launch_all(&self.inner, &runtime, admitted);

        Ok(JobHandle { done: handle })
    }

    pub fn occupancy(&self) -> Occupancy { self.inner.lock().occupancy() }

    pub fn running(&self) -> usize { self.occupancy().running }

    pub fn pending(&self) -> usize { self.occupancy().pending }
}

impl<T, E> Drop for JobQueue<T, E> {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state.parked.clear();
            std::mem::take(&mut state.pending)
        };
        if !abandoned.is_empty() {
            debug!(jobs = abandoned.len(), "queue dropped, pending jobs abandoned");
        }
    }
}

impl<T, E> Inner<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Free one running slot, optionally requeue `retry`, and start whatever
    /// became admissible.
    fn release(this: &Arc<Self>, runtime: &Handle, retry: Option<Entry<T, E>>) {
        let admitted = {
            let mut state = this.lock();
            state.running -= 1;
            let fresh = match retry {
                Some(entry) if !state.closed => Some(state.push(entry)),
                Some(entry) => {
                    debug!(job = entry.id, "queue dropped, retry abandoned");
                    None
                }
                None => None,
            };
            state.admit(fresh)
        };
        Self::launch_all(this, runtime, admitted);
    }

    fn launch_all(this: &Arc<Self>, runtime: &Handle, admitted: Vec<Entry<T, E>>) {
        for entry in admitted {
            Self::launch(this, runtime, entry);
        }
    }

    fn launch(this: &Arc<Self>, runtime: &Handle, mut entry: Entry<T, E>) {
        debug!(job = entry.id, "job admitted");
        let attempt = AssertUnwindSafe((entry.job.start)()).catch_unwind();
        let inner = Arc::clone(this);
        let handle = runtime.clone();

        runtime.spawn(async move {
            match attempt.await {
                Ok(outcome) => Self::settle(&inner, &handle, entry, outcome),
                Err(_) => {
                    warn!(job = entry.id, "job attempt panicked");
                    drop(entry);
                    Self::release(&inner, &handle, None);
                }
            }
        });
    }

    fn settle(this: &Arc<Self>, runtime: &Handle, mut entry: Entry<T, E>, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => {
                Self::release(this, runtime, None);
                let _ = entry.done.send(Ok(value));
            }
            Err(error) => {
                if (entry.job.retry_filter)(&error) {
                    debug!(job = entry.id, "job requeued");
                    Self::release(this, runtime, Some(entry));
                } else {
                    Self::release(this, runtime, None);
                    let _ = entry.done.send(Err(error));
                }
            }
        }
    }
}
