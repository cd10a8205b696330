//! Job-board listing adapter.
//!
//! Implements both engine capabilities over HTTP:
//!
//! - [`TokenSource`]: `GET {host}` with the session cookie; the page carries
//!   the `csrf-token` meta tag.
//! - [`PageSource`]: form POST to the search endpoint. The response is a
//!   script that injects an escaped HTML fragment into `jobs_container`;
//!   listing links are the `href` values inside that fragment and a
//!   "load more" link marks further pages.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use salary_bracket::{
    AuthContext, BracketError, BracketResult, Credentials, FilterRange, ItemKey, Page,
    PageSource, TokenSource,
};

use crate::config::HttpConfig;
use crate::http_client::HttpClient;

/// Marker present in the response whenever another page exists.
const MORE_PAGES_MARKER: &str = "#load-more-preferred-jobs-link";

fn fragment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"jobs_container\.(?:html|append)\("([\s\S]+?)"\);"#)
            .expect("fragment regex is valid")
    })
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href=\\"(.+?)\\""#).expect("href regex is valid"))
}

/// Decode one search response into listing keys and the more-pages flag.
///
/// A response without the `jobs_container` fragment is a parse error; a
/// fragment without links is an empty page.
pub fn decode_listing_page(body: &str, offset: u32, base: &Url) -> BracketResult<Page> {
    let fragment = fragment_regex()
        .captures(body)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| BracketError::parse(offset, "jobs_container fragment not found"))?
        .as_str();

    let items = href_regex()
        .captures_iter(fragment)
        .filter_map(|caps| caps.get(1))
        .map(|href| {
            base.join(href.as_str())
                .map(|url| ItemKey::new(url.to_string()))
                .map_err(|e| {
                    BracketError::parse(offset, format!("bad listing link '{}': {e}", href.as_str()))
                })
        })
        .collect::<BracketResult<Vec<_>>>()?;

    Ok(Page::new(items, body.contains(MORE_PAGES_MARKER)))
}

/// Build the search form for one page.
pub fn search_form(config: &HttpConfig, filter: FilterRange, offset: u32) -> Vec<(String, String)> {
    let mut fields = vec![
        ("utf8".to_string(), "✓".to_string()),
        ("offset".to_string(), offset.to_string()),
        ("webpro[min_salary]".to_string(), filter.min().to_string()),
        ("webpro[max_salary]".to_string(), filter.max().to_string()),
        (
            "webpro[remote_jobs]".to_string(),
            u8::from(config.remote_jobs).to_string(),
        ),
    ];
    fields.extend(
        config
            .tenant_ids
            .iter()
            .map(|id| ("webpro[tenant_ids][]".to_string(), id.clone())),
    );
    fields
}

/// HTTP-backed listing source.
#[derive(Clone)]
pub struct ListingSource {
    http: HttpClient,
    config: HttpConfig,
    base: Url,
    search_url: Url,
}

impl ListingSource {
    pub fn new(config: HttpConfig) -> BracketResult<Self> {
        let base = Url::parse(&config.host)
            .map_err(|e| BracketError::Config(format!("invalid host '{}': {e}", config.host)))?;
        let search_url = base.join(&config.search_path).map_err(|e| {
            BracketError::Config(format!("invalid search path '{}': {e}", config.search_path))
        })?;
        Ok(Self {
            http: HttpClient::new(config.timeout_ms),
            config,
            base,
            search_url,
        })
    }
}

#[async_trait]
impl TokenSource for ListingSource {
    async fn fetch_token_page(&self, credentials: &Credentials) -> BracketResult<String> {
        let headers = [("Cookie".to_string(), credentials.session_cookie.clone())];
        let resp = self
            .http
            .get_once(self.base.as_str(), &headers)
            .await
            .map_err(|e| BracketError::Auth(format!("token page unreachable: {e:#}")))?;

        if !resp.is_success() {
            return Err(BracketError::Auth(format!(
                "token page returned HTTP {}",
                resp.status
            )));
        }
        Ok(resp.body)
    }
}

#[async_trait]
impl PageSource for ListingSource {
    async fn fetch_page(
        &self,
        auth: &AuthContext,
        filter: FilterRange,
        offset: u32,
    ) -> BracketResult<Page> {
        let headers = [
            ("Cookie".to_string(), auth.credentials.session_cookie.clone()),
            ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
            ("X-CSRF-Token".to_string(), auth.csrf_token.clone()),
        ];
        let form = search_form(&self.config, filter, offset);

        let resp = self
            .http
            .post_form(self.search_url.as_str(), &form, &headers)
            .await
            .map_err(|e| BracketError::Transport(format!("search request failed: {e:#}")))?;

        if !resp.is_success() {
            return Err(BracketError::Transport(format!(
                "search returned HTTP {} at offset {offset}",
                resp.status
            )));
        }

        decode_listing_page(&resp.body, offset, &self.base)
    }
}
