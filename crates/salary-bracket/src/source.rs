//! Capabilities the engine needs from the outside world.
//!
//! The core never speaks HTTP or reads markup itself. A listing backend
//! implements these two traits; tests implement them with scripted pages.

use async_trait::async_trait;

use crate::types::{AuthContext, BracketResult, Credentials, FilterRange, Page};

/// Fetches the page that carries the session's anti-forgery token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return the raw HTML of the token-bearing page for these credentials.
    async fn fetch_token_page(&self, credentials: &Credentials) -> BracketResult<String>;
}

/// Returns one decoded page of listings for a filter and offset.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page at `offset`. Undecodable pages fail with
    /// [`crate::BracketError::Parse`].
    async fn fetch_page(
        &self,
        auth: &AuthContext,
        filter: FilterRange,
        offset: u32,
    ) -> BracketResult<Page>;
}
