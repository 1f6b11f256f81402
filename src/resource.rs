//! Fragment fetching abstraction.
//!
//! This module provides a trait-based abstraction for retrieving external
//! HTML fragments. The cache layer stays agnostic about how fragments are
//! retrieved, enabling:
//!
//! - Mocking for tests
//! - Offline modes backed by the filesystem
//! - Custom transports in embedding applications
//!
//! # Example
//!
//! ```rust,ignore
//! use html_import::resource::{HttpFetcher, ResourceFetcher};
//!
//! let fetcher = HttpFetcher::new();
//! let fragment = fetcher.fetch("https://example.com/frag.html")?;
//! println!("Got {} bytes", fragment.text.len());
//! ```

use crate::error::FetchError;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default User-Agent string used by HTTP fetchers
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; html-import/0.1)";

/// Default Accept-Language header value
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Redirect chains longer than this are treated as transport failures.
const MAX_REDIRECTS: usize = 10;

/// Result of fetching an external fragment.
#[derive(Debug, Clone)]
pub struct FetchedFragment {
    /// Decoded text of the fragment.
    pub text: String,
    /// Content-Type header value, if available (e.g., "text/html").
    pub content_type: Option<String>,
}

impl FetchedFragment {
    /// Create a new FetchedFragment.
    pub fn new(text: String, content_type: Option<String>) -> Self {
        Self { text, content_type }
    }

    /// Check if this fragment was served as HTML based on content-type.
    pub fn is_html(&self) -> bool {
        self
            .content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false)
    }
}

/// Trait for retrieving external fragments.
///
/// This abstraction allows different fetch implementations:
/// - [`HttpFetcher`]: Default HTTP implementation with timeouts
/// - Custom implementations for mocking, offline mode, etc.
///
/// URLs can be:
/// - `http://` or `https://` - fetch over network
/// - `file://` - read from filesystem
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; retrievals run on blocking worker
/// threads while waiters suspend on a shared future.
pub trait ResourceFetcher: Send + Sync {
    /// Fetch a fragment from the given URL.
    ///
    /// Non-success HTTP statuses are reported as [`FetchError::Status`];
    /// transport-level problems as [`FetchError::Transport`].
    fn fetch(&self, url: &str) -> Result<FetchedFragment, FetchError>;
}

// Allow Arc<dyn ResourceFetcher> to be used as ResourceFetcher
impl<T: ResourceFetcher + ?Sized> ResourceFetcher for Arc<T> {
    fn fetch(&self, url: &str) -> Result<FetchedFragment, FetchError> {
        (**self).fetch(url)
    }
}

/// Default HTTP fragment fetcher.
///
/// Fetches fragments over HTTP/HTTPS with configurable timeouts and user
/// agent. Also handles `file://` URLs for offline embedding.
///
/// # Example
///
/// ```rust,ignore
/// use html_import::resource::HttpFetcher;
/// use std::time::Duration;
///
/// let fetcher = HttpFetcher::new()
///     .with_timeout(Duration::from_secs(60))
///     .with_user_agent("MyApp/1.0");
/// ```
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
    user_agent: String,
    accept_language: String,
    max_size: usize,
}

impl HttpFetcher {
    /// Create a new HttpFetcher with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the Accept-Language header.
    pub fn with_accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = accept_language.into();
        self
    }

    /// Set the maximum response size in bytes.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    fn transport_error(url: &str, reason: impl ToString) -> FetchError {
        FetchError::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Fetch from an HTTP/HTTPS URL.
    fn fetch_http(&self, url: &str) -> Result<FetchedFragment, FetchError> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .build();
        let agent: ureq::Agent = config.into();

        let mut current = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            let mut response = agent
                .get(&current)
                .header("User-Agent", &self.user_agent)
                .header("Accept-Language", &self.accept_language)
                .call()
                .map_err(|e| Self::transport_error(&current, e))?;

            let status = response.status();
            if (300..400).contains(&status.as_u16()) {
                let location = response.headers().get("location").and_then(|h| h.to_str().ok());
                if let Some(loc) = location {
                    let next = Url::parse(&current)
                        .ok()
                        .and_then(|base| base.join(loc).ok())
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| loc.to_string());
                    current = next;
                    continue;
                }
            }

            if !status.is_success() {
                return Err(FetchError::Status {
                    url: current,
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or("").to_string(),
                });
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string());

            let bytes = response
                .body_mut()
                .with_config()
                .limit(self.max_size as u64)
                .read_to_vec()
                .map_err(|e| Self::transport_error(&current, e))?;

            let text = String::from_utf8_lossy(&bytes).into_owned();
            return Ok(FetchedFragment::new(text, content_type));
        }

        Err(Self::transport_error(url, "too many redirects"))
    }

    /// Fetch from a file:// URL.
    fn fetch_file(&self, url: &str) -> Result<FetchedFragment, FetchError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let text =
            std::fs::read_to_string(path).map_err(|e| Self::transport_error(url, e))?;
        Ok(FetchedFragment::new(text, Some("text/html".to_string())))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            max_size: 10 * 1024 * 1024, // 10MB default limit
        }
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedFragment, FetchError> {
        if url.starts_with("file://") {
            self.fetch_file(url)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url)
        } else {
            Err(Self::transport_error(url, "unsupported URL scheme"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(
        body: &'static str,
        status_line: &'static str,
    ) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            if let Some(stream) = listener.incoming().next() {
                let mut stream = stream.unwrap();
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let headers = format!(
                    "{}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
                    status_line,
                    body.len()
                );
                let _ = stream.write_all(headers.as_bytes());
                let _ = stream.write_all(body.as_bytes());
            }
        });
        (format!("http://{}/", addr), handle)
    }

    #[test]
    fn fetches_body_and_content_type() {
        let (url, handle) = serve_once("<p>hi</p>", "HTTP/1.1 200 OK");
        let fetcher = HttpFetcher::new().with_timeout(Duration::from_secs(5));
        let fragment = fetcher.fetch(&url).expect("fetch");
        handle.join().unwrap();

        assert_eq!(fragment.text, "<p>hi</p>");
        assert!(fragment.is_html());
    }

    #[test]
    fn non_success_status_is_classified_as_fetch_failure() {
        let (url, handle) = serve_once("gone", "HTTP/1.1 404 Not Found");
        let fetcher = HttpFetcher::new().with_timeout(Duration::from_secs(5));
        let err = fetcher.fetch(&url).expect_err("expected status error");
        handle.join().unwrap();

        match err {
            FetchError::Status { status, .. } => assert_eq!(status, 404),
            other => panic!("expected Status error, got {other:?}"),
        }
    }

    #[test]
    fn follows_redirects() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind redirect server");
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut conn_count = 0;
            for stream in listener.incoming() {
                let mut stream = stream.unwrap();
                conn_count += 1;
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);

                if conn_count == 1 {
                    let resp = format!(
                        "HTTP/1.1 302 Found\r\nLocation: http://{}/next\r\nContent-Length: 0\r\n\r\n",
                        addr
                    );
                    let _ = stream.write_all(resp.as_bytes());
                } else {
                    let body = b"<p>ok</p>";
                    let headers = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
                        body.len()
                    );
                    let _ = stream.write_all(headers.as_bytes());
                    let _ = stream.write_all(body);
                    break;
                }
            }
        });

        let fetcher = HttpFetcher::new().with_timeout(Duration::from_secs(5));
        let url = format!("http://{}/", addr);
        let fragment = fetcher.fetch(&url).expect("fetch redirect");
        handle.join().unwrap();

        assert_eq!(fragment.text, "<p>ok</p>");
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let fetcher = HttpFetcher::new();
        let err = fetcher.fetch("gopher://example.com/frag").expect_err("scheme");
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[test]
    fn builder_overrides_defaults() {
        let fetcher = HttpFetcher::new()
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("Test/1.0")
            .with_max_size(1024);

        assert_eq!(fetcher.timeout, Duration::from_secs(60));
        assert_eq!(fetcher.user_agent, "Test/1.0");
        assert_eq!(fetcher.max_size, 1024);
    }

    #[test]
    fn defaults_are_sane() {
        let fetcher = HttpFetcher::new();
        assert_eq!(fetcher.timeout, Duration::from_secs(30));
        assert!(fetcher.user_agent.contains("html-import"));
        assert_eq!(fetcher.accept_language, DEFAULT_ACCEPT_LANGUAGE);
    }
}
