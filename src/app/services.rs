use thiserror::Error;

use crate::adapters::charger_http::{ChargerApi, FetchError};
use crate::domain::charger_payload::InfoPage;
use crate::domain::clock::CaptureTimestamp;
use crate::domain::models::{Snapshot, SnapshotError, StatusRecord};
use crate::domain::pagination::page_count;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to fetch info page {page_no}: {source}")]
    FetchPage {
        page_no: u32,
        #[source]
        source: FetchError,
    },
    #[error("fetched records do not form a valid snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Walks every page of the charger-info collection into one snapshot.
pub struct SnapshotBuilder<'a, A> {
    api: &'a A,
    page_size: u32,
}

impl<'a, A> SnapshotBuilder<'a, A>
where
    A: ChargerApi,
{
    pub fn new(api: &'a A, page_size: u32) -> Self {
        Self { api, page_size }
    }

    /// Page 1 is fetched first to learn the total; its records are reused rather than
    /// refetched. Any page failure aborts the build. Paging stops early at the first
    /// empty page, since the advertised total comes from the remote side.
    pub fn build(&self, captured_at: CaptureTimestamp) -> Result<Snapshot, BuildError> {
        let first = self.fetch(1)?;
        let total_count = first.total_count;
        let pages = page_count(total_count, self.page_size);

        tracing::info!(
            total_count,
            page_count = pages,
            page_size = self.page_size,
            "charger info collection sized"
        );

        let mut records = first.records;
        for page_no in 2..=pages {
            let page = self.fetch(page_no)?;
            if page.records.is_empty() {
                tracing::warn!(
                    page_no,
                    page_count = pages,
                    fetched = records.len(),
                    "info page came back empty; ending pagination early"
                );
                break;
            }
            if page.total_count != total_count {
                tracing::warn!(
                    page_no,
                    expected_total = total_count,
                    reported_total = page.total_count,
                    "total count changed during pagination"
                );
            }
            tracing::debug!(page_no, records = page.records.len(), "info page fetched");
            records.extend(page.records);
        }

        let snapshot = Snapshot::new(captured_at, records)?;
        if snapshot.len() as u64 != total_count {
            tracing::warn!(
                total_count,
                fetched = snapshot.len(),
                "fetched record count differs from advertised total"
            );
        }

        Ok(snapshot)
    }

    fn fetch(&self, page_no: u32) -> Result<InfoPage, BuildError> {
        self.api
            .fetch_info_page(page_no, self.page_size)
            .map_err(|source| BuildError::FetchPage { page_no, source })
    }
}

/// Reads the live status feed in a single bounded request.
pub struct StatusFetcher<'a, A> {
    api: &'a A,
    page_size: u32,
}

impl<'a, A> StatusFetcher<'a, A>
where
    A: ChargerApi,
{
    pub fn new(api: &'a A, page_size: u32) -> Self {
        Self { api, page_size }
    }

    /// Records past `page_size` are not requested. A reported total above what came
    /// back is logged, not compensated for.
    pub fn fetch(&self) -> Result<Vec<StatusRecord>, FetchError> {
        let page = self.api.fetch_status_page(1, self.page_size)?;

        if page.total_count > page.records.len() as u64 {
            tracing::warn!(
                total_count = page.total_count,
                received = page.records.len(),
                page_size = self.page_size,
                "status feed exceeds one page; remaining updates are not reconciled"
            );
        }

        tracing::debug!(records = page.records.len(), "status feed fetched");
        Ok(page.records)
    }
}
