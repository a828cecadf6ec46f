use serde::Serialize;

/// Ordered response header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self { Self(Vec::new()) }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared ASCII case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Base64(String),
    Json(serde_json::Value),
}

impl Content {
    /// The body as a string, for text and base64 content.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Content::Text(s) | Content::Base64(s) => Some(s),
            Content::Json(_) => None,
        }
    }
}

/// Outcome of a successful attempt.
///
/// `content` is `None` exactly when the server reported the same entity tag
/// the caller already holds, and the body was never read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub validator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Headers>,
}

impl FetchResult {
    pub fn is_unchanged(&self) -> bool { self.content.is_none() }
}
