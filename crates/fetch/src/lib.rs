use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use weekpack_core::config::FetcherConfig;
use weekpack_core::PackError;

/// Outcome of one conditional GET against an origin page.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Origin answered 304; no body was transferred.
    NotModified,
    /// Origin answered 2xx with a body and, possibly, fresh validators.
    Fetched {
        body: String,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

/// Conditional HTTP fetcher shared by all rebuilds.
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, PackError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| PackError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    /// Issue one GET with `If-None-Match`/`If-Modified-Since` built from the
    /// supplied validators. Network failures and HTTP >= 400 come back as
    /// typed errors; 304 and 2xx are outcomes.
    pub async fn fetch_page(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
        timeout: Duration,
    ) -> Result<FetchOutcome, PackError> {
        let parsed = Url::parse(url).map_err(|e| PackError::InvalidUrl(e.to_string()))?;

        let mut request = self.client.get(parsed).timeout(timeout);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        debug!(url, conditional = etag.is_some() || last_modified.is_some(), "fetching page");
        let response = request
            .send()
            .await
            .map_err(|e| PackError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if status.as_u16() >= 400 {
            return Err(PackError::Http(status.as_u16()));
        }

        let etag = header_value(response.headers(), &ETAG);
        let last_modified = header_value(response.headers(), &LAST_MODIFIED);
        let body = response
            .text()
            .await
            .map_err(|e| PackError::Network(e.to_string()))?;

        Ok(FetchOutcome::Fetched {
            body,
            etag,
            last_modified,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fetcher() -> Fetcher {
        Fetcher::new(&FetcherConfig::default()).unwrap()
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn plain_fetch_returns_body_and_validators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body>hi</body></html>")
                    .insert_header("ETag", "\"v1\"")
                    .insert_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
            )
            .mount(&server)
            .await;

        let outcome = fetcher()
            .fetch_page(&format!("{}/a", server.uri()), None, None, timeout())
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Fetched {
                body,
                etag,
                last_modified,
            } => {
                assert_eq!(body, "<html><body>hi</body></html>");
                assert_eq!(etag.as_deref(), Some("\"v1\""));
                assert_eq!(
                    last_modified.as_deref(),
                    Some("Wed, 21 Oct 2015 07:28:00 GMT")
                );
            }
            other => panic!("expected Fetched, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn conditional_headers_reach_the_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .and(header("If-None-Match", "\"v1\""))
            .and(header_regex(
                "If-Modified-Since",
                "^Wed, 21 Oct 2015 07:28:00 GMT$",
            ))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let outcome = fetcher()
            .fetch_page(
                &format!("{}/a", server.uri()),
                Some("\"v1\""),
                Some("Wed, 21 Oct 2015 07:28:00 GMT"),
                timeout(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::NotModified));
    }

    #[tokio::test]
    async fn status_errors_carry_the_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_page(&format!("{}/gone", server.uri()), None, None, timeout())
            .await
            .unwrap_err();

        assert!(matches!(err, PackError::Http(500)));
        assert_eq!(err.to_string(), "HTTP 500");
    }

    #[tokio::test]
    async fn connection_failures_are_network_errors() {
        // Nothing listens on port 1.
        let err = fetcher()
            .fetch_page("http://127.0.0.1:1/a", None, None, timeout())
            .await
            .unwrap_err();

        assert!(matches!(err, PackError::Network(_)));
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected_before_any_io() {
        let err = fetcher()
            .fetch_page("not a url", None, None, timeout())
            .await
            .unwrap_err();

        assert!(matches!(err, PackError::InvalidUrl(_)));
    }
}
