//! Single-attempt conditional fetch.
//!
//! One call to [`ConditionalFetcher::fetch_once`] performs exactly one bounded
//! HTTP exchange. A known entity tag is both sent as `If-None-Match` and
//! compared against the response `ETag`, so servers that ignore the
//! conditional header still short-circuit on the client side.

use std::panic::AssertUnwindSafe;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::debug;

use crate::core::{TransportSelector, decode_body};
use crate::data::{Content, ContentFormat, ContentOptions, Decoder, FetchResult, Headers, RequestOptions};
use crate::effects::http::{BoxStream, HttpClient, HttpRequest, HttpResponse};
use crate::error::{FetchError, Result};

const IF_NONE_MATCH: &str = "If-None-Match";
const NOT_MODIFIED: u16 = 304;

/// Performs bounded, validator-aware fetch attempts through an [`HttpClient`].
pub struct ConditionalFetcher<C: HttpClient> {
    client: C,
    selector: TransportSelector,
}

impl<C: HttpClient> ConditionalFetcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            selector: TransportSelector::default(),
        }
    }

    #[must_use]
    pub fn with_selector(mut self, selector: TransportSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn client(&self) -> &C { &self.client }

    pub fn selector(&self) -> &TransportSelector { &self.selector }

    /// Resolve the outgoing request: transport, caller headers and the
    /// conditional header.
    pub fn build_request(
        &self,
        url: &str,
        options: &RequestOptions,
        content: &ContentOptions,
    ) -> Result<HttpRequest> {
        let transport = self.selector.select(url, options.transport)?;

        let mut headers = options.headers.clone();
        if let Some(validator) = &content.validator {
            headers.retain(|(key, _)| !key.eq_ignore_ascii_case(IF_NONE_MATCH));
            headers.push((IF_NONE_MATCH.to_string(), validator.clone()));
        }

        Ok(HttpRequest {
            method: options.method.clone(),
            url: url.to_string(),
            headers,
            transport,
            bypass_cache: true,
        })
    }

    /// Run one attempt.
    ///
    /// With a timeout the deadline covers sending the request and reading the
    /// body. The timer belongs to this call's future and is dropped with it
    /// on every exit path; a fired deadline cancels only this attempt.
    pub async fn fetch_once(
        &self,
        url: &str,
        options: &RequestOptions,
        content: &ContentOptions,
    ) -> Result<FetchResult> {
        let request = self.build_request(url, options, content)?;
        let exchange = self.exchange(request, content);

        match content.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                debug!(url, timeout = ?limit, "attempt deadline fired");
                FetchError::Timeout(limit)
            })?,
            None => exchange.await,
        }
    }

    async fn exchange(&self, request: HttpRequest, content: &ContentOptions) -> Result<FetchResult> {
        let url = request.url.clone();
        let HttpResponse { status, headers, body } =
            self.client.send(request).await.map_err(Into::<FetchError>::into)?;
        let validator = headers.get("etag").map(str::to_owned);

        if let Some(expected) = content.validator.as_deref()
            && (status == NOT_MODIFIED || validator.as_deref() == Some(expected))
        {
            // abort the transfer without reading the body
            drop(body);
            debug!(url = %url, status, validator = expected, "content unchanged");
            return Ok(FetchResult {
                validator: validator.or_else(|| Some(expected.to_string())),
                content: None,
                headers: Some(headers),
            });
        }

        if !(200..300).contains(&status) {
            return Err(FetchError::Http { status });
        }

        let bytes = collect_body(body).await?;
        debug!(url = %url, status, bytes = bytes.len(), "content received");

        let decoded = match &content.decoder {
            Some(decoder) => run_decoder(decoder, content.format, &headers, bytes)?,
            None => decode_body(content.format, &headers, bytes)?,
        };

        Ok(FetchResult {
            validator,
            content: Some(decoded),
            headers: Some(headers),
        })
    }
}

async fn collect_body<E: Into<FetchError>>(
    mut body: BoxStream<'static, std::result::Result<Bytes, E>>,
) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk.map_err(Into::<FetchError>::into)?);
    }
    Ok(buffer.freeze())
}

/// A panicking decoder fails the attempt like any other decode error.
fn run_decoder(decoder: &Decoder, format: ContentFormat, headers: &Headers, body: Bytes) -> Result<Content> {
    std::panic::catch_unwind(AssertUnwindSafe(|| decoder(format, headers, body)))
        .unwrap_or_else(|_| Err(FetchError::Decode("custom decoder panicked".to_string())))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use super::*;
    use crate::data::{Content, ContentFormat, Headers, Transport};

    /// Drop guard counting sends that were abandoned before completing.
    struct InFlight {
        cancelled: Arc<AtomicUsize>,
        finished: bool,
    }

    impl Drop for InFlight {
        fn drop(&mut self) {
            if !self.finished {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Scripted client returning one canned response.
    struct ScriptedClient {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static [u8],
        delay: Duration,
        body_read: Arc<AtomicBool>,
        cancelled: Arc<AtomicUsize>,
        requests: std::sync::Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedClient {
        fn new(status: u16, headers: Vec<(&'static str, &'static str)>, body: &'static [u8]) -> Self {
            Self {
                status,
                headers,
                body,
                delay: Duration::ZERO,
                body_read: Arc::new(AtomicBool::new(false)),
                cancelled: Arc::new(AtomicUsize::new(0)),
                requests: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn last_request(&self) -> HttpRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl HttpClient for ScriptedClient {
        type Error = FetchError;

        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse<Self::Error>, Self::Error> {
            self.requests.lock().unwrap().push(request);
            let mut guard = InFlight { cancelled: Arc::clone(&self.cancelled), finished: false };
            tokio::time::sleep(self.delay).await;
            guard.finished = true;

            let body_read = Arc::clone(&self.body_read);
            let bytes = Bytes::from_static(self.body);
            let body = futures_util::stream::once(async move {
                body_read.store(true, Ordering::SeqCst);
                Ok::<_, FetchError>(bytes)
            });

            Ok(HttpResponse {
                status: self.status,
                headers: self.headers.iter().copied().collect::<Headers>(),
                body: Box::pin(body),
            })
        }
    }

    #[tokio::test]
    async fn test_validator_sent_as_if_none_match() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(200, vec![], b"body"));
        let options = RequestOptions::default().header("if-none-match", "stale");
        let content = ContentOptions::default().validator("\"v2\"");

        fetcher.fetch_once("http://origin/a", &options, &content).await.unwrap();

        let request = fetcher.client().last_request();
        assert_eq!(request.headers, vec![("If-None-Match".to_string(), "\"v2\"".to_string())]);
        assert!(request.bypass_cache);
        assert_eq!(request.method, "GET");
    }

    #[tokio::test]
    async fn test_no_conditional_header_without_validator() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(200, vec![], b"body"));
        let options = RequestOptions::default().header("Accept", "text/plain");

        fetcher.fetch_once("http://origin/a", &options, &ContentOptions::default()).await.unwrap();

        let request = fetcher.client().last_request();
        assert_eq!(request.headers, vec![("Accept".to_string(), "text/plain".to_string())]);
    }

    #[tokio::test]
    async fn test_matching_etag_short_circuits() {
        let client = ScriptedClient::new(200, vec![("ETag", "\"v1\"")], b"unchanged body");
        let body_read = Arc::clone(&client.body_read);
        let fetcher = ConditionalFetcher::new(client);
        let content = ContentOptions::default().validator("\"v1\"");

        let result = fetcher
            .fetch_once("http://origin/a", &RequestOptions::default(), &content)
            .await
            .unwrap();

        assert!(result.is_unchanged());
        assert_eq!(result.validator.as_deref(), Some("\"v1\""));
        assert!(!body_read.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_not_modified_short_circuits() {
        let client = ScriptedClient::new(304, vec![], b"");
        let body_read = Arc::clone(&client.body_read);
        let fetcher = ConditionalFetcher::new(client);
        let content = ContentOptions::default().validator("\"v1\"");

        let result = fetcher
            .fetch_once("http://origin/a", &RequestOptions::default(), &content)
            .await
            .unwrap();

        assert_eq!(result.content, None);
        assert_eq!(result.validator.as_deref(), Some("\"v1\""));
        assert!(!body_read.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_not_modified_without_validator_is_error() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(304, vec![], b""));
        let err = fetcher
            .fetch_once("http://origin/a", &RequestOptions::default(), &ContentOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Http { status: 304 });
    }

    #[tokio::test]
    async fn test_changed_etag_reads_content() {
        let client = ScriptedClient::new(200, vec![("ETag", "\"v2\"")], b"new body");
        let body_read = Arc::clone(&client.body_read);
        let fetcher = ConditionalFetcher::new(client);
        let content = ContentOptions::default().validator("\"v1\"");

        let result = fetcher
            .fetch_once("http://origin/a", &RequestOptions::default(), &content)
            .await
            .unwrap();

        assert_eq!(result.validator.as_deref(), Some("\"v2\""));
        assert_eq!(result.content, Some(Content::Text("new body".to_string())));
        assert_eq!(result.headers.unwrap().get("etag"), Some("\"v2\""));
        assert!(body_read.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_base64_fixture_round_trip() {
        const FIXTURE: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(
            200,
            vec![("Content-Type", "image/png")],
            FIXTURE,
        ));
        let content = ContentOptions::default().format(ContentFormat::Base64);

        let result = fetcher
            .fetch_once("http://origin/logo.png", &RequestOptions::default(), &content)
            .await
            .unwrap();

        let Some(Content::Base64(encoded)) = result.content else {
            panic!("expected base64 content");
        };
        assert_eq!(STANDARD.decode(encoded).unwrap(), FIXTURE);
    }

    #[tokio::test]
    async fn test_json_content_type_parsed() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(
            200,
            vec![("Content-Type", "application/json")],
            br#"{"ok":true}"#,
        ));

        let result = fetcher
            .fetch_once("http://origin/api", &RequestOptions::default(), &ContentOptions::default())
            .await
            .unwrap();

        assert_eq!(result.content, Some(Content::Json(serde_json::json!({ "ok": true }))));
    }

    #[tokio::test]
    async fn test_custom_decoder_overrides_default() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(
            200,
            vec![("Content-Type", "application/json")],
            b"not json at all",
        ));
        let content = ContentOptions::default()
            .decoder(|_, _, body| Ok(Content::Text(format!("{} bytes", body.len()))));

        let result = fetcher
            .fetch_once("http://origin/api", &RequestOptions::default(), &content)
            .await
            .unwrap();

        assert_eq!(result.content, Some(Content::Text("15 bytes".to_string())));
    }

    #[tokio::test]
    async fn test_panicking_decoder_is_decode_error() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(200, vec![], b"payload"));
        let content = ContentOptions::default().decoder(|_, _, _| panic!("decoder bug"));

        let err = fetcher
            .fetch_once("http://origin/a", &RequestOptions::default(), &content)
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Decode("custom decoder panicked".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(503, vec![], b"busy"));
        let err = fetcher
            .fetch_once("http://origin/a", &RequestOptions::default(), &ContentOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Http { status: 503 });
    }

    #[tokio::test]
    async fn test_invalid_url_never_sent() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(200, vec![], b""));
        let err = fetcher
            .fetch_once("origin/a", &RequestOptions::default(), &ContentOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        assert!(fetcher.client().requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_selector_applied_to_https() {
        let fetcher = ConditionalFetcher::new(ScriptedClient::new(200, vec![], b""))
            .with_selector(TransportSelector::new().relaxed_https(true));

        fetcher
            .fetch_once("https://self-signed/a", &RequestOptions::default(), &ContentOptions::default())
            .await
            .unwrap();
        assert_eq!(fetcher.client().last_request().transport, Transport::RelaxedTls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_slow_response() {
        let client = ScriptedClient::new(200, vec![], b"late").delayed(Duration::from_millis(500));
        let cancelled = Arc::clone(&client.cancelled);
        let fetcher = ConditionalFetcher::new(client);
        let content = ContentOptions::default().timeout(Duration::from_millis(100));

        let err = fetcher
            .fetch_once("http://origin/slow", &RequestOptions::default(), &content)
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Timeout(Duration::from_millis(100)));
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_disarmed_after_fast_response() {
        let client = ScriptedClient::new(200, vec![], b"fast").delayed(Duration::from_millis(10));
        let cancelled = Arc::clone(&client.cancelled);
        let fetcher = ConditionalFetcher::new(client);
        let content = ContentOptions::default().timeout(Duration::from_millis(100));

        let result = fetcher
            .fetch_once("http://origin/fast", &RequestOptions::default(), &content)
            .await
            .unwrap();
        assert_eq!(result.content, Some(Content::Text("fast".to_string())));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }
}
