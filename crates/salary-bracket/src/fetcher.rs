//! Paginated fetcher: walks every result page for one filter window.

use crate::session::Session;
use crate::source::{PageSource, TokenSource};
use crate::types::{BracketError, BracketResult, FilterRange, ItemKey};

/// Default number of listings per result page.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Sequential page walker over a [`PageSource`], authenticated by a [`Session`].
pub struct PaginatedFetcher<S, T> {
    source: S,
    session: Session<T>,
    page_size: u32,
}

impl<S: PageSource, T: TokenSource> PaginatedFetcher<S, T> {
    pub fn new(source: S, session: Session<T>) -> Self {
        Self {
            source,
            session,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the page size; zero is rejected.
    pub fn with_page_size(mut self, page_size: u32) -> BracketResult<Self> {
        if page_size == 0 {
            return Err(BracketError::Config("page size must be positive".to_string()));
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Collect every item key matching `filter`, in source order.
    ///
    /// Pages are requested one at a time; the first failing page aborts the
    /// walk and its error is returned as-is. Duplicates are kept.
    pub async fn fetch_all(&self, filter: FilterRange) -> BracketResult<Vec<ItemKey>> {
        let auth = self.session.auth_context().await?;
        let mut items = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = self.source.fetch_page(auth, filter, offset).await?;
            tracing::debug!(
                min = filter.min(),
                max = filter.max(),
                offset,
                count = page.items.len(),
                has_more = page.has_more,
                "fetched page"
            );
            items.extend(page.items);

            if !page.has_more {
                return Ok(items);
            }
            offset = offset.checked_add(self.page_size).ok_or_else(|| {
                BracketError::parse(offset, "page offset overflow; source never reported the last page")
            })?;
        }
    }
}
