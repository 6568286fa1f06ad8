//! Offset-paginated record source
//!
//! [`PageSource::produce`] turns a [`PageFetcher`] into a lazy stream of raw
//! JSON records. Records are not decoded here: a malformed element is still
//! one record at one offset, and the transformer reports it as invalid.
//! Pages are requested at increasing offsets until one comes back empty or
//! short. Page boundaries depend only on the start offset and the
//! page size, which is what lets a checkpointed offset resume exactly.

use crate::config::SourceConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One record as delivered by the GHO API
///
/// Numeric fields stay as raw JSON so the transformer can tell "absent" from
/// "present" and accept numeric strings. Decoded from a page element by
/// [`crate::transform::transform_value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRecord {
    pub indicator_code: Option<String>,
    /// Country ISO code
    pub spatial_dim: Option<String>,
    /// Continent / WHO region name
    pub parent_location: Option<String>,
    /// Year
    pub time_dim: Option<Value>,
    /// Sex dimension (`SEX_MLE`, `SEX_FMLE`, `SEX_BTSX`)
    pub dim1: Option<String>,
    pub numeric_value: Option<Value>,
    pub low: Option<Value>,
    pub high: Option<Value>,
    /// Last-modified timestamp
    #[serde(alias = "DateModified")]
    pub date: Option<String>,
}

/// Fetches a single page of raw records
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch up to `limit` records starting at `offset`, one JSON value each
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Value>, FetchError>;
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset: u64,
    exhausted: bool,
    first: bool,
}

/// Paginated, restartable record source
pub struct PageSource<F> {
    fetcher: F,
    page_size: u64,
    page_delay: Duration,
}

impl<F: PageFetcher> PageSource<F> {
    pub fn new(fetcher: F, config: &SourceConfig) -> Self {
        Self::with_paging(fetcher, config.page_size, config.page_delay)
    }

    pub fn with_paging(fetcher: F, page_size: u64, page_delay: Duration) -> Self {
        Self {
            fetcher,
            page_size: page_size.max(1),
            page_delay,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch one page at `offset`
    pub async fn fetch(&self, offset: u64) -> Result<Vec<Value>, FetchError> {
        self.fetcher.fetch_page(offset, self.page_size).await
    }

    /// Stream every record from `start_offset` to the end of the source
    ///
    /// Stops after an empty page, or right after yielding a short page. The
    /// first failed request ends the stream with its [`FetchError`].
    pub fn produce(
        &self,
        start_offset: u64,
    ) -> impl Stream<Item = Result<Value, FetchError>> + Send + '_ {
        let start = Cursor {
            offset: start_offset,
            exhausted: false,
            first: true,
        };

        stream::try_unfold(start, move |cursor| async move {
            if cursor.exhausted {
                return Ok::<_, FetchError>(None);
            }

            if !cursor.first && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let page = self.fetch(cursor.offset).await?;
            let fetched = page.len() as u64;

            if fetched == 0 {
                debug!(offset = cursor.offset, "Empty page, source exhausted");
                return Ok(None);
            }

            let exhausted = fetched < self.page_size;
            debug!(offset = cursor.offset, fetched, exhausted, "Fetched page");

            let next = Cursor {
                offset: cursor.offset + fetched,
                exhausted,
                first: false,
            };
            Ok(Some((page, next)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, FetchError>)))
        .try_flatten()
    }
}
