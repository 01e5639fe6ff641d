//! Upstream URL composition.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// A URL-encoded query string, kept exactly as received.
///
/// Parameter order and percent-encoding are preserved byte for byte so the
/// upstream sees the same query the client sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryString(String);

impl QueryString {
    /// Wrap an already-encoded query (without the leading `?`).
    pub fn from_raw(raw: Option<&str>) -> Self {
        Self(raw.unwrap_or_default().to_string())
    }

    /// Encode key/value pairs in the given order.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k.as_ref(), v.as_ref());
        }
        Self(serializer.finish())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decoded key/value pairs, in order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        form_urlencoded::parse(self.0.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

impl std::fmt::Display for QueryString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the absolute upstream URL.
///
/// `base_url` and `relative_path` are concatenated as-is; the caller is
/// responsible for the path form. `?query` is appended only when non-empty.
pub fn compose(base_url: &str, relative_path: &str, query: &QueryString) -> String {
    let mut url = String::with_capacity(base_url.len() + relative_path.len() + query.0.len() + 1);
    url.push_str(base_url);
    url.push_str(relative_path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(query.as_str());
    }
    url
}
