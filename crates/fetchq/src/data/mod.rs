//! Immutable data types for queued fetch operations.
//!
//! This module contains the request options, job configuration, results and
//! lifecycle events that flow between the queue and its callers. A request is
//! frozen behind an `Arc` once it is enqueued and never mutated afterwards.

pub mod event;
pub mod options;
pub mod response;

pub use event::FetchEvent;
pub use options::{
    ContentFormat, ContentOptions, Decoder, FetchRequest, JobConfig, RequestOptions, Transport,
};
pub use response::{Content, FetchResult, Headers};
