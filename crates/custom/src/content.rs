//! Content resolution
//!
//! Descriptors, ZIM files and icons may be local paths or `http(s)` URLs.
//! Remote references are downloaded next to the descriptor before anything
//! measures or embeds them.

use kiwix_core::error::{Error, ErrorCode, Result};
use kiwix_core::file_scanner::file_size;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Whether `reference` names a remote resource
pub fn is_remote(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:")
}

/// Library-safe file name: lowercase, runs of characters outside
/// `[a-z0-9_.]` collapsed into one `_`
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Last path segment of a URL or path, ignoring query and fragment
pub fn name_of(reference: &str) -> String {
    let without_query = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim_end_matches('/');
    without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query)
        .to_string()
}

/// A reference resolved to a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalContent {
    pub path: PathBuf,
    pub size: u64,
}

fn unavailable(reference: &str, err: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::new(
        ErrorCode::ContentUnavailable,
        format!("Unable to fetch {}: {}", reference, err),
    )
    .with_source(err)
}

/// HTTP access to remote descriptors and content
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: Client,
    show_progress: bool,
}

impl ContentFetcher {
    /// Create a fetcher; `timeout` bounds connection setup only
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("kiwix-android-tools/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| unavailable("HTTP client", e))?;
        Ok(Self {
            client,
            show_progress: true,
        })
    }

    /// Disable the transfer progress bar
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// GET `url` and return the body as text
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| unavailable(url, e))?;
        response.text().await.map_err(|e| unavailable(url, e))
    }

    /// Size announced by a HEAD request, if the server gives one
    ///
    /// Any failure means no size; the download decides availability.
    #[instrument(skip(self))]
    pub async fn remote_size(&self, url: &str) -> Option<u64> {
        let response = match self.client.head(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "HEAD failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "no size from HEAD");
            return None;
        }
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// Download `url` into `dir`, named after the final URL after redirects
    #[instrument(skip(self, dir))]
    pub async fn download(&self, url: &str, dir: &Path, expected: Option<u64>) -> Result<PathBuf> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| unavailable(url, e))?;

        let name = name_of(response.url().as_str());
        if name.is_empty() {
            return Err(Error::new(
                ErrorCode::ContentUnavailable,
                format!("Cannot derive a file name from {}", response.url()),
            ));
        }
        tokio::fs::create_dir_all(dir).await?;
        let target = dir.join(&name);

        let bar = self.show_progress.then(|| {
            kiwix_cli::progress::transfer(expected.or(response.content_length()), &name)
        });
        let mut file = tokio::fs::File::create(&target).await?;
        while let Some(chunk) = response.chunk().await.map_err(|e| unavailable(url, e))? {
            file.write_all(&chunk).await?;
            if let Some(bar) = &bar {
                bar.inc(chunk.len() as u64);
            }
        }
        file.flush().await?;
        if let Some(bar) = &bar {
            kiwix_cli::progress::finish_success(bar, &name);
        }

        info!(path = %target.display(), "downloaded");
        Ok(target)
    }

    /// Resolve `reference` to a local file and its size
    ///
    /// Relative local paths are taken from `base_dir`; remote ones are
    /// downloaded into it. A remote file whose size differs from the one the
    /// server announced is rejected.
    pub async fn resolve(&self, reference: &str, base_dir: &Path) -> Result<LocalContent> {
        if is_remote(reference) {
            let expected = self.remote_size(reference).await;
            let path = self.download(reference, base_dir, expected).await?;
            let size = file_size(&path)?;
            if let Some(expected) = expected {
                if expected != size {
                    return Err(Error::new(
                        ErrorCode::ContentUnavailable,
                        format!(
                            "Downloaded {} bytes from {}, expected {}",
                            size, reference, expected
                        ),
                    ));
                }
            }
            return Ok(LocalContent { path, size });
        }

        let path = std::path::absolute(base_dir.join(reference))?;
        if !path.is_file() {
            return Err(Error::new(
                ErrorCode::ContentUnavailable,
                format!("Content file not found: {}", path.display()),
            ));
        }
        let size = file_size(&path)?;
        Ok(LocalContent { path, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fetcher() -> ContentFetcher {
        ContentFetcher::new(Duration::from_secs(5)).unwrap().quiet()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Wikipedia FR (2016).zim"), "wikipedia_fr_2016_.zim");
        assert_eq!(sanitize_name("a_ b"), "a__b");
        assert_eq!(sanitize_name("ok.zim"), "ok.zim");
    }

    #[test]
    fn test_name_of() {
        assert_eq!(name_of("http://host/dir/file.zim?x=1"), "file.zim");
        assert_eq!(name_of("/tmp/a/b.png"), "b.png");
        assert_eq!(name_of("plain.zim"), "plain.zim");
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://download.kiwix.org/x.zim"));
        assert!(is_remote("HTTP://host/x"));
        assert!(!is_remote("ftp://host/x"));
        assert!(!is_remote("content/http.zim"));
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(name in "\\PC{0,40}") {
            let once = sanitize_name(&name);
            prop_assert_eq!(sanitize_name(&once), once.clone());
            prop_assert!(once
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.'));
        }
    }

    #[tokio::test]
    async fn test_local_size_matches_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demo.zim"), vec![0u8; 1234]).unwrap();

        let local = fetcher().resolve("demo.zim", dir.path()).await.unwrap();
        assert_eq!(local.size, 1234);
        assert!(local.path.is_absolute());

        let err = fetcher().resolve("absent.zim", dir.path()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContentUnavailable);
    }

    #[tokio::test]
    async fn test_remote_content_is_downloaded_next_to_descriptor() {
        let mut server = mockito::Server::new_async().await;
        let head = server
            .mock("HEAD", "/files/demo.zim")
            .with_status(405)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/files/demo.zim")
            .with_body("hello")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/files/demo.zim", server.url());
        let local = fetcher().resolve(&url, dir.path()).await.unwrap();

        head.assert_async().await;
        get.assert_async().await;
        assert_eq!(local.path, dir.path().join("demo.zim"));
        assert_eq!(local.size, 5);
        assert_eq!(std::fs::read_to_string(&local.path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_download_without_head_route() {
        let mut server = mockito::Server::new_async().await;
        let get = server
            .mock("GET", "/files/wiki.zim")
            .with_body("content")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/files/wiki.zim", server.url());
        assert_eq!(fetcher().remote_size(&url).await, None);
        let local = fetcher().resolve(&url, dir.path()).await.unwrap();

        get.assert_async().await;
        assert_eq!(local.size, 7);
    }

    #[tokio::test]
    async fn test_unreachable_head_gives_no_size() {
        assert_eq!(fetcher().remote_size("http://127.0.0.1:1/demo.zim").await, None);
    }

    #[tokio::test]
    async fn test_missing_remote_content_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/gone.zim")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/gone.zim")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher()
            .resolve(&format!("{}/gone.zim", server.url()), dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContentUnavailable);
    }

    #[tokio::test]
    async fn test_fetch_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/app.json")
            .with_body(r#"{"app_name": "Demo"}"#)
            .create_async()
            .await;
        let body = fetcher()
            .fetch_text(&format!("{}/app.json", server.url()))
            .await
            .unwrap();
        assert!(body.contains("Demo"));
    }
}
