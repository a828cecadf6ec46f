use std::sync::Arc;

use super::options::FetchRequest;
use super::response::FetchResult;
use crate::error::FetchError;

/// Lifecycle notification published by the fetch queue.
///
/// Every variant carries the attempt number (starting at 1) and the request
/// as it was enqueued. `Error` is published once per failed attempt,
/// including attempts that are about to be retried.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    Attempt {
        attempt: u32,
        request: Arc<FetchRequest>,
    },
    Success {
        attempt: u32,
        request: Arc<FetchRequest>,
        result: FetchResult,
    },
    Error {
        attempt: u32,
        request: Arc<FetchRequest>,
        error: FetchError,
    },
}

impl FetchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FetchEvent::Attempt { .. } => "fetch:attempt",
            FetchEvent::Success { .. } => "fetch:success",
            FetchEvent::Error { .. } => "fetch:error",
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            FetchEvent::Attempt { attempt, .. }
            | FetchEvent::Success { attempt, .. }
            | FetchEvent::Error { attempt, .. } => *attempt,
        }
    }

    pub fn request(&self) -> &FetchRequest {
        match self {
            FetchEvent::Attempt { request, .. }
            | FetchEvent::Success { request, .. }
            | FetchEvent::Error { request, .. } => request,
        }
    }

    pub fn url(&self) -> &str { &self.request().url }
}
