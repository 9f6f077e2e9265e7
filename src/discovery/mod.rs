//! Feed and section discovery.

pub mod engine;
pub mod feed;
pub mod sections;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use url::Url;

pub use engine::{DiscoveryEngine, DiscoveryOptions, DiscoveryReport};

/// Query parameters stripped during URL normalization. Tracking params
/// would otherwise make the same article look like distinct candidates.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
];

/// Normalize a URL for dedup: drop the fragment and tracking query
/// parameters, keep everything else as-is. Unparseable input is
/// returned unchanged so it still dedupes against itself.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        // Rebuild through the serializer so values containing `&`, `=`,
        // or other reserved characters stay percent-encoded.
        url.query_pairs_mut().clear().extend_pairs(&kept);
    }

    url.to_string()
}

/// Cooperative cancellation shared across discovery workers. Checked
/// between fetches; an in-flight request is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_fragment() {
        assert_eq!(
            normalize_url("https://bugle.example.com/story#comments"),
            "https://bugle.example.com/story"
        );
    }

    #[test]
    fn test_normalize_strips_tracking_params_keeps_others() {
        assert_eq!(
            normalize_url("https://bugle.example.com/story?utm_source=feed&page=2&fbclid=abc"),
            "https://bugle.example.com/story?page=2"
        );
    }

    #[test]
    fn test_normalize_drops_query_when_only_tracking() {
        assert_eq!(
            normalize_url("https://bugle.example.com/story?utm_campaign=x"),
            "https://bugle.example.com/story"
        );
    }

    #[test]
    fn test_normalize_preserves_encoded_query_values() {
        // `%26` decodes to `&`; a naive string rebuild would split the
        // value into two parameters.
        assert_eq!(
            normalize_url("https://bugle.example.com/search?q=a%26b&utm_source=feed"),
            "https://bugle.example.com/search?q=a%26b"
        );
    }

    #[test]
    fn test_normalize_unparseable_passthrough() {
        assert_eq!(normalize_url("not a url"), "not a url");
    }

    #[test]
    fn test_cancel_flag_shared_across_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
