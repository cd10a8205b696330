//! Session provider: lazily fetched, process-lifetime auth context.

use scraper::{Html, Selector};
use tokio::sync::OnceCell;

use crate::source::TokenSource;
use crate::types::{AuthContext, BracketError, BracketResult, Credentials};

/// Authenticated session whose anti-forgery token is fetched at most once.
///
/// The first successful [`Session::auth_context`] call caches the context for
/// the lifetime of the value; failed fetches are not cached.
pub struct Session<T> {
    source: T,
    credentials: Credentials,
    context: OnceCell<AuthContext>,
}

impl<T: TokenSource> Session<T> {
    pub fn new(source: T, credentials: Credentials) -> Self {
        Self {
            source,
            credentials,
            context: OnceCell::new(),
        }
    }

    /// Return the cached auth context, fetching the token on first use.
    pub async fn auth_context(&self) -> BracketResult<&AuthContext> {
        self.context
            .get_or_try_init(|| async {
                tracing::debug!("fetching anti-forgery token");
                let html = self.source.fetch_token_page(&self.credentials).await?;
                let csrf_token = extract_csrf_token(&html)?;
                tracing::info!("session token acquired");
                Ok::<_, BracketError>(AuthContext {
                    credentials: self.credentials.clone(),
                    csrf_token,
                })
            })
            .await
    }

    /// Whether the token has already been fetched.
    pub fn is_established(&self) -> bool {
        self.context.initialized()
    }

    pub fn source(&self) -> &T {
        &self.source
    }
}

/// Locate `<meta name="csrf-token" content="...">` in a page.
pub fn extract_csrf_token(html: &str) -> BracketResult<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"[name="csrf-token"]"#)
        .map_err(|e| BracketError::Auth(format!("invalid token selector: {e}")))?;

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BracketError::Auth("csrf-token not found in session page".to_string()))
}
