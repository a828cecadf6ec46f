//! Bounded-concurrency, retrying HTTP content fetcher.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable request options, job configuration, results and events
//! - [`core`] - Pure transformations: validation, admission/retry policy, transport selection, decoding
//! - [`effects`] - I/O operations with trait abstraction
//!
//! # Key Features
//!
//! - **Admission Control**: a job starts only while fewer than `max_concurrents` jobs run
//! - **Retry Until Exhausted**: failed attempts are requeued until `max_attempts` is reached
//! - **Conditional Fetch**: a known entity tag is sent as `If-None-Match` and compared client-side
//! - **Bounded Attempts**: per-attempt deadlines cancel only the attempt they belong to
//! - **Observable**: every attempt, success and failure is published as a [`FetchEvent`]

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use crate::core::{
    TransportSelector, can_admit, decode_body, is_json_content_type, should_retry, url_scheme,
    validate_job_config,
};
pub use crate::data::{
    Content, ContentFormat, ContentOptions, Decoder, FetchEvent, FetchRequest, FetchResult,
    Headers, JobConfig, RequestOptions, Transport,
};
pub use crate::effects::{
    Abandoned, BoxStream, ConditionalFetcher, EVENT_CAPACITY, FetchHandle, FetchQueue, HttpClient,
    HttpRequest, HttpResponse, Job, JobHandle, JobQueue, NoRuntime, Occupancy,
};

#[cfg(feature = "reqwest")]
pub use crate::effects::ReqwestClient;

pub use crate::error::{FetchError, Result};
