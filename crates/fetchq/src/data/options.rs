use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::response::{Content, Headers};
use crate::error::Result;

/// Transport configuration used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Default TLS verification.
    #[default]
    Standard,

    /// TLS that accepts self-signed and otherwise untrusted certificates.
    RelaxedTls,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Standard => write!(f, "standard"),
            Transport::RelaxedTls => write!(f, "relaxed-tls"),
        }
    }
}

/// Transport-level request options.
///
/// # Examples
///
/// ```
/// use fetchq::RequestOptions;
///
/// let options = RequestOptions::default()
///     .header("Accept", "application/json")
///     .header("User-Agent", "MyApp/1.0");
/// assert_eq!(options.method, "GET");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// HTTP method. Default: `GET`
    pub method: String,

    /// Custom HTTP headers sent with every attempt, in order.
    pub headers: Vec<(String, String)>,

    /// Explicit transport. When `None` the transport selector decides from
    /// the URL scheme.
    pub transport: Option<Transport>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: Vec::new(),
            transport: None,
        }
    }
}

impl RequestOptions {
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Add a single custom HTTP header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }
}

/// How a response body is turned into [`Content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Text, or parsed JSON when the response declares a JSON content type.
    #[default]
    Text,

    /// Raw bytes, base64 encoded.
    Base64,
}

/// Custom body decoder, replacing the default one when set.
pub type Decoder = Arc<dyn Fn(ContentFormat, &Headers, Bytes) -> Result<Content> + Send + Sync>;

/// Options controlling how a single attempt treats the response.
#[derive(Clone, Default)]
pub struct ContentOptions {
    /// Previously seen entity tag. Sent as `If-None-Match` and compared with
    /// the response `ETag`.
    pub validator: Option<String>,

    /// Deadline for one attempt, covering both the request and the body read.
    pub timeout: Option<Duration>,

    pub format: ContentFormat,

    pub decoder: Option<Decoder>,
}

impl fmt::Debug for ContentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentOptions")
            .field("validator", &self.validator)
            .field("timeout", &self.timeout)
            .field("format", &self.format)
            .field("decoder", &self.decoder.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl ContentOptions {
    #[must_use]
    pub fn validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn format(mut self, format: ContentFormat) -> Self {
        self.format = format;
        self
    }

    /// Replace the default body decoder.
    ///
    /// A decoder that panics fails the attempt with
    /// [`FetchError::Decode`](crate::FetchError::Decode), which publishes
    /// `fetch:error` and goes through the retry filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use fetchq::{Content, ContentOptions};
    ///
    /// let options = ContentOptions::default().decoder(|_format, _headers, body| {
    ///     Ok(Content::Text(format!("{} bytes", body.len())))
    /// });
    /// assert!(options.decoder.is_some());
    /// ```
    #[must_use]
    pub fn decoder<F>(mut self, decoder: F) -> Self
    where
        F: Fn(ContentFormat, &Headers, Bytes) -> Result<Content> + Send + Sync + 'static,
    {
        self.decoder = Some(Arc::new(decoder));
        self
    }
}

/// Scheduling limits for a job.
///
/// Queue-level defaults are shallow-merged with the options given at enqueue
/// time; enqueue-time values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    /// Ceiling on simultaneously running jobs, checked against the whole queue.
    #[serde(alias = "maxConcurrents", skip_serializing_if = "Option::is_none")]
    pub max_concurrents: Option<usize>,

    /// Ceiling on attempts per request. When absent a failure is terminal.
    #[serde(alias = "maxAttempts", skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl JobConfig {
    #[must_use]
    pub fn max_concurrents(mut self, max_concurrents: usize) -> Self {
        self.max_concurrents = Some(max_concurrents);
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Overlay `overrides` on top of `self`; keys set in `overrides` win.
    pub fn merge(&self, overrides: &JobConfig) -> JobConfig {
        JobConfig {
            max_concurrents: overrides.max_concurrents.or(self.max_concurrents),
            max_attempts: overrides.max_attempts.or(self.max_attempts),
        }
    }
}

/// A fetch request as it was handed to the queue.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub fetch_options: RequestOptions,
    pub content_options: ContentOptions,
    /// Call-site job options, before merging with the queue defaults.
    pub job_options: JobConfig,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetch_options: RequestOptions::default(),
            content_options: ContentOptions::default(),
            job_options: JobConfig::default(),
        }
    }

    #[must_use]
    pub fn fetch_options(mut self, fetch_options: RequestOptions) -> Self {
        self.fetch_options = fetch_options;
        self
    }

    #[must_use]
    pub fn content_options(mut self, content_options: ContentOptions) -> Self {
        self.content_options = content_options;
        self
    }

    #[must_use]
    pub fn job_options(mut self, job_options: JobConfig) -> Self {
        self.job_options = job_options;
        self
    }
}
