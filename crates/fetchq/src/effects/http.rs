use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::data::{Headers, Transport};
use crate::error::FetchError;

/// A boxed stream type for HTTP response bodies.
///
/// Dropping the stream before it is exhausted aborts the body transfer.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// One outgoing request, fully resolved by the conditional fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub transport: Transport,
    /// Always `true` for queued fetches: clients with a local cache layer
    /// must go to the network.
    pub bypass_cache: bool,
}

/// Response head plus a lazily consumed body.
pub struct HttpResponse<E> {
    pub status: u16,
    pub headers: Headers,
    pub body: BoxStream<'static, Result<Bytes, E>>,
}

impl<E> fmt::Debug for HttpResponse<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"{ ... }")
            .finish()
    }
}

/// Asynchronous HTTP client abstraction.
///
/// This trait provides the minimal transport contract the queue needs.
/// Cancellation is expressed by dropping: dropping the `send` future aborts
/// the request, dropping the response body aborts the transfer.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync {
    /// Error type for HTTP operations.
    type Error: std::error::Error + Into<FetchError> + Send + 'static;

    /// Issue `request` and return as soon as the response head is available.
    ///
    /// Non-2xx statuses are returned as responses, not errors; the caller
    /// interprets them.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use futures_util::StreamExt;

    use super::*;

    /// Production HTTP client implementation using reqwest.
    ///
    /// Holds one client per [`Transport`]. Both are built up front and shared
    /// read-only by every request; reqwest keeps no response cache, so
    /// `bypass_cache` needs no handling here.
    pub struct ReqwestClient {
        standard: reqwest::Client,
        relaxed_tls: reqwest::Client,
    }

    impl ReqwestClient {
        /// Create a new ReqwestClient with default configuration.
        pub fn new() -> crate::Result<Self> {
            let standard = reqwest::Client::builder().build().map_err(network_error)?;
            let relaxed_tls = reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(network_error)?;
            Ok(Self::from_clients(standard, relaxed_tls))
        }

        /// Wrap preconfigured clients, e.g. with proxies or custom roots.
        pub fn from_clients(standard: reqwest::Client, relaxed_tls: reqwest::Client) -> Self {
            Self { standard, relaxed_tls }
        }

        fn client_for(&self, transport: Transport) -> &reqwest::Client {
            match transport {
                Transport::Standard => &self.standard,
                Transport::RelaxedTls => &self.relaxed_tls,
            }
        }
    }

    fn network_error(e: reqwest::Error) -> FetchError { FetchError::Network(e.to_string()) }

    impl HttpClient for ReqwestClient {
        type Error = FetchError;

        async fn send(
            &self,
            request: HttpRequest,
        ) -> Result<HttpResponse<Self::Error>, Self::Error> {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let mut builder = self.client_for(request.transport).request(method, &request.url);

            for (key, value) in &request.headers {
                builder = builder.header(key, value);
            }

            let response = builder.send().await.map_err(network_error)?;
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
                })
                .collect();
            let status = response.status().as_u16();
            let body = response.bytes_stream().map(|chunk| chunk.map_err(network_error));

            Ok(HttpResponse { status, headers, body: Box::pin(body) })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_client_per_transport() {
            let client = ReqwestClient::new().unwrap();
            assert!(std::ptr::eq(client.client_for(Transport::Standard), &client.standard));
            assert!(std::ptr::eq(client.client_for(Transport::RelaxedTls), &client.relaxed_tls));
        }

        #[tokio::test]
        async fn test_invalid_method_is_network_error() {
            let client = ReqwestClient::new().unwrap();
            let request = HttpRequest {
                method: "BAD METHOD".to_string(),
                url: "http://127.0.0.1:9/".to_string(),
                headers: Vec::new(),
                transport: Transport::Standard,
                bypass_cache: true,
            };
            let err = client.send(request).await.unwrap_err();
            assert!(matches!(err, FetchError::Network(_)));
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
