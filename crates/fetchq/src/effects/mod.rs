//! I/O layer: the HTTP transport seam, single-attempt fetching and the
//! admit/retry queues that drive it.

pub mod conditional;
pub mod http;
pub mod queue;
pub mod scheduler;

pub use conditional::ConditionalFetcher;
pub use http::{BoxStream, HttpClient, HttpRequest, HttpResponse};
pub use queue::{EVENT_CAPACITY, FetchHandle, FetchQueue};
pub use scheduler::{Abandoned, Job, JobHandle, JobQueue, NoRuntime, Occupancy};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
