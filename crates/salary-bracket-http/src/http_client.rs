//! Async HTTP client wrapping reqwest.
//!
//! Handles redirects and timeouts. Form POSTs retry on 5xx and transport
//! errors and back off on 429; [`HttpClient::get_once`] is sent exactly once
//! and leaves every failure to the caller.

use anyhow::Result;
use reqwest::Method;
use std::time::Duration;

/// Retries after the first attempt for [`HttpClient::post_form`].
const MAX_RETRIES: u32 = 2;

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client for the listing adapter.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with a standard Chrome user-agent.
    pub fn new(timeout_ms: u64) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let timeout = Duration::from_millis(timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }

    /// GET with extra headers, sent exactly once.
    pub async fn get_once(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        self.send(Method::GET, url, None, extra_headers, 0).await
    }

    /// POST url-encoded form data, retrying on 5xx and backing off on 429.
    /// Repeated field names are sent as given.
    pub async fn post_form(
        &self,
        url: &str,
        form_fields: &[(String, String)],
        extra_headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        self.send(Method::POST, url, Some(form_fields), extra_headers, MAX_RETRIES)
            .await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        form_fields: Option<&[(String, String)]>,
        extra_headers: &[(String, String)],
        max_retries: u32,
    ) -> Result<HttpResponse> {
        let mut retries = 0u32;

        loop {
            let mut builder = self.client.request(method.clone(), url).timeout(self.timeout);
            for (name, value) in extra_headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(fields) = form_fields {
                builder = builder.form(fields);
            }

            match builder.send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    // Retry on 5xx
                    if status >= 500 && retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tracing::warn!(url, status, retries, "server error, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tracing::warn!(url, retry_after, "rate limited, backing off");
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    let body = r.text().await?;
                    return Ok(HttpResponse { status, body });
                }
                Err(e) => {
                    if retries < max_retries {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tracing::warn!(url, retries, "request failed, retrying: {e}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}
