//! Feed parsing: entry links out of RSS/Atom bodies.

use feed_rs::parser;
use tracing::debug;

/// Extract entry links from a feed body. A body that fails to parse as
/// a feed yields no links; the caller treats that as an empty result,
/// not a source failure.
pub fn extract_entry_links(body: &str, feed_url: &str) -> Vec<String> {
    let feed = match parser::parse(body.as_bytes()) {
        Ok(feed) => feed,
        Err(err) => {
            debug!(feed_url, error = %err, "feed did not parse");
            return Vec::new();
        }
    };

    feed.entries
        .into_iter()
        .filter_map(|entry| entry.links.into_iter().next().map(|link| link.href))
        .collect()
}

/// Common feed paths probed relative to a homepage when a source has no
/// explicit feed URL registered.
pub const WELL_KNOWN_FEED_PATHS: &[&str] = &["/feed", "/rss", "/rss.xml", "/atom.xml", "/feed.xml"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rss_entry_links() {
        let body = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel>
                <title>Bugle</title>
                <item><title>One</title><link>https://bugle.example.com/story-one</link></item>
                <item><title>Two</title><link>https://bugle.example.com/story-two</link></item>
            </channel></rss>"#;
        assert_eq!(
            extract_entry_links(body, "https://bugle.example.com/rss"),
            vec![
                "https://bugle.example.com/story-one",
                "https://bugle.example.com/story-two",
            ]
        );
    }

    #[test]
    fn test_atom_entry_links() {
        let body = r#"<?xml version="1.0"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
                <title>Bugle</title>
                <id>urn:bugle</id>
                <updated>2025-01-01T00:00:00Z</updated>
                <entry>
                    <title>One</title>
                    <id>urn:one</id>
                    <updated>2025-01-01T00:00:00Z</updated>
                    <link href="https://bugle.example.com/story-one"/>
                </entry>
            </feed>"#;
        assert_eq!(
            extract_entry_links(body, "https://bugle.example.com/atom.xml"),
            vec!["https://bugle.example.com/story-one"]
        );
    }

    #[test]
    fn test_unparseable_body_yields_nothing() {
        assert!(extract_entry_links("<html>not a feed</html>", "https://x.example/feed").is_empty());
        assert!(extract_entry_links("", "https://x.example/feed").is_empty());
    }
}
