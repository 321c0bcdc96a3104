//! Pagination over the execution service's result-fetch call.
//!
//! A cursor translates opaque continuation tokens into successive page
//! fetches. It never buffers the full result set itself; memory use is
//! bounded by the service's native page size, except when the caller
//! explicitly asks to drain every page.

use tracing::debug;

use crate::error::Result;
use crate::service::{ExecutionService, RawPage};

/// A resumable position into one execution's result set.
pub struct PageCursor<'a> {
    service: &'a dyn ExecutionService,
    execution_id: &'a str,
    page_size: u32,
}

impl<'a> PageCursor<'a> {
    /// Creates a cursor over the given execution. A `page_size` of zero
    /// requests the service's default page size.
    pub fn new(service: &'a dyn ExecutionService, execution_id: &'a str, page_size: u32) -> Self {
        Self {
            service,
            execution_id,
            page_size,
        }
    }

    /// Fetches the page at `token`; an absent token means the first
    /// page. The returned page's token is absent iff it is the final
    /// page.
    pub async fn next_page(&self, token: Option<&str>) -> Result<RawPage> {
        debug!(
            execution_id = self.execution_id,
            token = token.unwrap_or("<first>"),
            page_size = self.page_size,
            "fetching results page"
        );
        self.service
            .get_results_page(self.execution_id, token, self.page_size)
            .await
    }

    /// Fetches every page from `token` onward, concatenating rows into
    /// one synthetic final page. Used when the caller did not opt into
    /// pagination.
    pub async fn drain(&self, token: Option<&str>) -> Result<RawPage> {
        let mut merged = self.next_page(token).await?;
        let mut pages = 1u32;

        while let Some(next) = merged.next_token.take() {
            let page = self.next_page(Some(&next)).await?;
            merged.rows.extend(page.rows);
            merged.next_token = page.next_token;
            if merged.columns.is_empty() {
                merged.columns = page.columns;
            }
            pages += 1;
        }

        debug!(
            execution_id = self.execution_id,
            pages,
            rows = merged.rows.len(),
            "drained result set"
        );
        Ok(merged)
    }
}
