use std::path::PathBuf;

use devhub_util::expand_user;
use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::commands::ReadmeSource;
use crate::error::UiError;
use crate::models::{UpdateInfo, VersionFact};

const USER_AGENT: &str = "devhub";

/// Where the home screen gets its [`UpdateInfo`] from.
pub trait UpdateFetcher: Send + Sync {
    fn fetch_update_info(&self) -> BoxFuture<'_, Result<UpdateInfo, UiError>>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RemoteComponent {
    version: String,
    version_code: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteFeed {
    channel: String,
    tracked: RemoteComponent,
    app: RemoteComponent,
}

impl RemoteComponent {
    fn into_fact(self) -> VersionFact {
        VersionFact::new(self.version_code, self.version.trim())
    }
}

/// Parses the update feed JSON. The channel counts as valid when it
/// advertises an application build at all.
pub fn parse_feed(raw: &str) -> Result<UpdateInfo, UiError> {
    parse_channel_feed(raw, None)
}

/// Like [`parse_feed`], but a feed that names a channel other than
/// `expected` is also an invalid channel. Feeds without a `channel` field
/// match any channel.
pub fn parse_channel_feed(raw: &str, expected: Option<&str>) -> Result<UpdateInfo, UiError> {
    let feed: RemoteFeed = serde_json::from_str(raw.trim())
        .map_err(|err| UiError::FetchFailure(format!("invalid update feed: {err}")))?;
    let declared = feed.channel.trim();
    let channel_matches = match expected {
        Some(expected) if !declared.is_empty() => declared.eq_ignore_ascii_case(expected.trim()),
        _ => true,
    };
    if !channel_matches {
        warn!(
            "update feed is for channel {declared}, expected {}",
            expected.unwrap_or_default()
        );
    }
    let channel_is_valid = feed.app.version_code > 0 && channel_matches;
    Ok(UpdateInfo {
        tracked: feed.tracked.into_fact(),
        app: feed.app.into_fact(),
        channel_is_valid,
    })
}

fn is_remote_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn local_path(source: &str) -> PathBuf {
    match source.strip_prefix("file://") {
        Some(rest) => PathBuf::from(rest),
        None => expand_user(source),
    }
}

/// Reads `source` as text: an `http(s)://` URL, a `file://` URL, or a path.
async fn read_source(source: &str) -> Result<String, UiError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(UiError::FetchFailure("source is empty".into()));
    }
    if is_remote_url(source) {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UiError::FetchFailure(format!("failed to build http client: {e}")))?;
        let resp = client
            .get(source)
            .send()
            .await
            .map_err(|e| UiError::FetchFailure(format!("download of {source} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(UiError::FetchFailure(format!(
                "download of {source} failed with status {}",
                resp.status()
            )));
        }
        return resp
            .text()
            .await
            .map_err(|e| UiError::FetchFailure(format!("read of {source} failed: {e}")));
    }
    let path = local_path(source);
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| UiError::FetchFailure(format!("failed to read {}: {e}", path.display())))
}

/// Fetches the update feed from a URL or a local file.
#[derive(Clone, Debug)]
pub struct FeedFetcher {
    source: String,
    channel: Option<String>,
}

impl FeedFetcher {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            channel: None,
        }
    }

    /// Only accept feeds published for `channel`.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl UpdateFetcher for FeedFetcher {
    fn fetch_update_info(&self) -> BoxFuture<'_, Result<UpdateInfo, UiError>> {
        Box::pin(async move {
            let raw = read_source(&self.source).await?;
            parse_channel_feed(&raw, self.channel.as_deref())
        })
    }
}

/// A readme served from a URL or file.
#[derive(Clone, Debug)]
pub struct RemoteReadme {
    source: String,
}

impl RemoteReadme {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ReadmeSource for RemoteReadme {
    fn readme(&self) -> BoxFuture<'_, Result<String, UiError>> {
        Box::pin(read_source(&self.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{
        "tracked": {"version": "25.2", "versionCode": 25200, "link": "https://example.test/t.zip", "note": "https://example.test/t.md"},
        "app": {"version": "8.0.4-c3d4", "versionCode": 304, "link": "https://example.test/a.apk", "note": ""}
    }"#;

    #[test]
    fn parses_both_components() {
        let info = parse_feed(FEED).expect("feed should parse");
        assert_eq!(info.tracked, VersionFact::new(25200, "25.2"));
        assert_eq!(info.app, VersionFact::new(304, "8.0.4-c3d4"));
        assert!(info.channel_is_valid);
    }

    #[test]
    fn missing_app_marks_channel_invalid() {
        let info = parse_feed(r#"{"tracked": {"version": "25.2", "versionCode": 25200}}"#)
            .expect("feed should parse");
        assert!(!info.channel_is_valid);
        assert_eq!(info.app.code, 0);
    }

    #[test]
    fn garbage_is_a_fetch_failure() {
        let err = parse_feed("<html>").expect_err("must fail");
        assert!(matches!(err, UiError::FetchFailure(_)));
    }

    #[test]
    fn declared_channel_must_match_the_expected_one() {
        let beta = r#"{"channel": "beta", "app": {"version": "8.1", "versionCode": 310}}"#;
        assert!(!parse_channel_feed(beta, Some("stable")).expect("parse").channel_is_valid);
        assert!(parse_channel_feed(beta, Some("Beta")).expect("parse").channel_is_valid);
        assert!(parse_feed(beta).expect("parse").channel_is_valid);
        assert!(parse_channel_feed(FEED, Some("stable")).expect("parse").channel_is_valid);
    }

    #[tokio::test]
    async fn fetcher_checks_its_channel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("beta.json");
        std::fs::write(
            &path,
            r#"{"channel": "beta", "app": {"version": "8.1", "versionCode": 310}}"#,
        )
        .expect("seed");

        let stable = FeedFetcher::new(path.to_string_lossy().to_string()).with_channel("stable");
        let info = stable.fetch_update_info().await.expect("fetch");
        assert!(!info.channel_is_valid);
        assert_eq!(info.app.code, 310);
    }

    #[tokio::test]
    async fn fetches_from_local_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("feed.json");
        std::fs::write(&path, FEED).expect("seed");

        let fetcher = FeedFetcher::new(path.to_string_lossy().to_string());
        let info = fetcher.fetch_update_info().await.expect("fetch");
        assert_eq!(info.tracked.code, 25200);

        let via_url = FeedFetcher::new(format!("file://{}", path.display()));
        assert!(via_url.fetch_update_info().await.is_ok());
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = FeedFetcher::new(dir.path().join("nope.json").to_string_lossy().to_string());
        let err = fetcher.fetch_update_info().await.expect_err("must fail");
        assert!(matches!(err, UiError::FetchFailure(_)));
    }

    #[tokio::test]
    async fn readme_reads_local_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("README.md");
        std::fs::write(&path, "# Changelog\n- fixes").expect("seed");
        let readme = RemoteReadme::new(path.to_string_lossy().to_string());
        assert_eq!(readme.readme().await.expect("read"), "# Changelog\n- fixes");
    }
}
