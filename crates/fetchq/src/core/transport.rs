use crate::data::Transport;
use crate::error::{FetchError, Result};

/// Extract the scheme of an absolute URL, lowercased.
///
/// A scheme is a letter followed by letters, digits, `+`, `-` or `.`, and is
/// terminated by `:`.
pub fn url_scheme(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Chooses the transport for a request from its URL scheme.
///
/// The selector is plain configuration: it is constructed by the caller and
/// handed to the fetcher, and the transports it names are built once by the
/// HTTP client and shared by every request.
///
/// # Examples
///
/// ```
/// use fetchq::{Transport, TransportSelector};
///
/// let selector = TransportSelector::new().relaxed_https(true);
/// assert_eq!(selector.select("https://self-signed.local/", None).unwrap(), Transport::RelaxedTls);
/// assert_eq!(selector.select("http://plain.local/", None).unwrap(), Transport::Standard);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportSelector {
    https: Transport,
}

impl TransportSelector {
    pub fn new() -> Self { Self::default() }

    /// Accept untrusted certificates for `https` URLs.
    #[must_use]
    pub fn relaxed_https(mut self, relaxed: bool) -> Self {
        self.https = if relaxed { Transport::RelaxedTls } else { Transport::Standard };
        self
    }

    /// Pick the transport for `url`. An `explicit` transport always wins.
    pub fn select(&self, url: &str, explicit: Option<Transport>) -> Result<Transport> {
        let scheme = url_scheme(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        if let Some(transport) = explicit {
            return Ok(transport);
        }

        Ok(match scheme.as_str() {
            "https" => self.https,
            _ => Transport::Standard,
        })
    }
}
