//! Seam for the link-metadata collaborator.
//!
//! Fetching and HTML scraping live outside this crate; implementors plug in
//! through [`MetadataFetcher`]. Calls are bounded by a timeout and every
//! failure degrades to "no metadata".

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::RecvTimeoutError;
use url::Url;

use crate::error::CommandError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon_url: Option<String>,
    pub og_image_url: Option<String>,
}

impl LinkMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.favicon_url.is_none()
            && self.og_image_url.is_none()
    }

    /// Trims every field and drops the ones left blank.
    pub fn normalized(self) -> Self {
        fn clean(field: Option<String>) -> Option<String> {
            field
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        }
        Self {
            title: clean(self.title),
            description: clean(self.description),
            favicon_url: clean(self.favicon_url),
            og_image_url: clean(self.og_image_url),
        }
    }
}

pub trait MetadataFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<LinkMetadata>;
}

/// Always reports an empty result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFetcher;

impl MetadataFetcher for NoopFetcher {
    fn fetch(&self, _url: &Url) -> Result<LinkMetadata> {
        Ok(LinkMetadata::default())
    }
}

/// Returns the same metadata for every URL.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher(pub LinkMetadata);

impl MetadataFetcher for StaticFetcher {
    fn fetch(&self, _url: &Url) -> Result<LinkMetadata> {
        Ok(self.0.clone())
    }
}

pub fn parse_link_url(raw: &str) -> Result<Url, CommandError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CommandError::EmptyUrl);
    }
    let url = Url::parse(trimmed)
        .map_err(|err| CommandError::InvalidUrl(format!("{trimmed} ({err})")))?;
    if !url.has_host() {
        return Err(CommandError::InvalidUrl(format!("{trimmed} (missing host)")));
    }
    Ok(url)
}

/// Runs `fetcher` on a worker thread and waits at most `timeout`. `None`
/// means the fetch failed, panicked or timed out; a late result is dropped.
pub fn fetch_with_timeout(
    fetcher: Arc<dyn MetadataFetcher>,
    url: &Url,
    timeout: Duration,
) -> Option<LinkMetadata> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let target = url.clone();
    let spawned = thread::Builder::new()
        .name("metadata-fetch".into())
        .spawn(move || {
            let _ = tx.send(fetcher.fetch(&target));
        });
    if let Err(err) = spawned {
        tracing::warn!(%url, error = %err, "could not start metadata worker");
        return None;
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(metadata)) => Some(metadata.normalized()),
        Ok(Err(err)) => {
            let message = format!("{err:#}");
            tracing::warn!(%url, error = %message, "metadata fetch failed");
            None
        }
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(%url, timeout_ms = timeout.as_millis() as u64, "metadata fetch timed out");
            None
        }
        Err(RecvTimeoutError::Disconnected) => {
            tracing::warn!(%url, "metadata worker exited without a result");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use assert_matches::assert_matches;

    struct FailingFetcher;

    impl MetadataFetcher for FailingFetcher {
        fn fetch(&self, _url: &Url) -> Result<LinkMetadata> {
            bail!("HTTP 503")
        }
    }

    struct SlowFetcher(Duration);

    impl MetadataFetcher for SlowFetcher {
        fn fetch(&self, _url: &Url) -> Result<LinkMetadata> {
            thread::sleep(self.0);
            Ok(LinkMetadata {
                title: Some("too late".into()),
                ..LinkMetadata::default()
            })
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com/page").expect("static url")
    }

    #[test]
    fn url_validation() {
        assert_matches!(parse_link_url("  "), Err(CommandError::EmptyUrl));
        assert_matches!(parse_link_url("example.com"), Err(CommandError::InvalidUrl(_)));
        assert_matches!(parse_link_url("http://"), Err(CommandError::InvalidUrl(_)));
        assert_matches!(parse_link_url("mailto:someone"), Err(CommandError::InvalidUrl(_)));
        let parsed = parse_link_url(" https://example.com/a?b=c ").expect("valid url");
        assert_eq!(parsed.as_str(), "https://example.com/a?b=c");
    }

    #[test]
    fn successful_fetch_is_normalized() {
        let fetcher = Arc::new(StaticFetcher(LinkMetadata {
            title: Some("  Example  ".into()),
            description: Some("   ".into()),
            favicon_url: Some("https://example.com/favicon.ico".into()),
            og_image_url: None,
        }));
        let metadata =
            fetch_with_timeout(fetcher, &url(), Duration::from_secs(1)).expect("metadata");
        assert_eq!(metadata.title.as_deref(), Some("Example"));
        assert!(metadata.description.is_none());
        assert!(metadata.favicon_url.is_some());
    }

    #[test]
    fn failures_and_timeouts_degrade_to_none() {
        assert!(fetch_with_timeout(Arc::new(FailingFetcher), &url(), Duration::from_secs(1)).is_none());
        let slow = Arc::new(SlowFetcher(Duration::from_millis(500)));
        assert!(fetch_with_timeout(slow, &url(), Duration::from_millis(20)).is_none());
    }

    #[test]
    fn noop_fetcher_yields_empty_metadata() {
        let metadata = fetch_with_timeout(Arc::new(NoopFetcher), &url(), Duration::from_secs(1))
            .expect("noop succeeds");
        assert!(metadata.is_empty());
    }
}
