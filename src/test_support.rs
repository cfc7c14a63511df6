use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use chrono::DateTime;

use crate::adapters::charger_http::{ChargerApi, FetchError};
use crate::domain::charger_payload::{InfoPage, Page, StatusPage};
use crate::domain::clock::CaptureTimestamp;
use crate::domain::models::{StationRecord, StatusRecord};

pub fn at(rfc3339: &str) -> CaptureTimestamp {
    CaptureTimestamp(DateTime::parse_from_rfc3339(rfc3339).expect("test timestamp should parse"))
}

pub fn station(station_id: &str, charger_id: &str) -> StationRecord {
    StationRecord {
        station_id: station_id.to_string(),
        charger_id: charger_id.to_string(),
        charger_type: "04".to_string(),
        business_id: "ME".to_string(),
        status: "1".to_string(),
        status_updated_at: "20260220000000".to_string(),
        output_kw: "50".to_string(),
        parking_free: "Y".to_string(),
        limit_yn: "N".to_string(),
        ..StationRecord::default()
    }
}

pub fn status(station_id: &str, charger_id: &str, code: &str, updated_at: &str) -> StatusRecord {
    StatusRecord {
        business_id: "ME".to_string(),
        station_id: station_id.to_string(),
        charger_id: charger_id.to_string(),
        status: code.to_string(),
        status_updated_at: updated_at.to_string(),
        ..StatusRecord::default()
    }
}

/// `count` distinct chargers on one station, charger ids `00`, `01`, ...
pub fn stations(station_id: &str, count: usize) -> Vec<StationRecord> {
    (0..count)
        .map(|index| station(station_id, &format!("{index:02}")))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Info { page_no: u32, page_size: u32 },
    Status { page_no: u32, page_size: u32 },
}

/// In-memory `ChargerApi`. The info collection is paged on demand; status
/// responses are queued and consumed one per call.
#[derive(Debug, Default)]
pub struct FakeChargerApi {
    info: Vec<StationRecord>,
    info_total: Option<u64>,
    failing_info_page: Option<u32>,
    status_responses: Mutex<VecDeque<Result<StatusPage, String>>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl FakeChargerApi {
    pub fn with_info(info: Vec<StationRecord>) -> Self {
        Self {
            info,
            ..Self::default()
        }
    }

    /// Advertise a total that differs from the number of stored rows.
    pub fn reporting_total(mut self, total: u64) -> Self {
        self.info_total = Some(total);
        self
    }

    pub fn failing_on_info_page(mut self, page_no: u32) -> Self {
        self.failing_info_page = Some(page_no);
        self
    }

    pub fn push_status(&self, records: Vec<StatusRecord>) {
        let total_count = records.len() as u64;
        self.push_status_page(Page {
            records,
            total_count,
        });
    }

    pub fn push_status_page(&self, page: StatusPage) {
        self.status_responses
            .lock()
            .expect("status queue lock")
            .push_back(Ok(page));
    }

    pub fn push_status_failure(&self, message: &str) {
        self.status_responses
            .lock()
            .expect("status queue lock")
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().expect("call log lock").clone()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().expect("call log lock").push(call);
    }
}

impl ChargerApi for FakeChargerApi {
    fn fetch_info_page(&self, page_no: u32, page_size: u32) -> Result<InfoPage, FetchError> {
        self.record(ApiCall::Info { page_no, page_size });

        if self.failing_info_page == Some(page_no) {
            return Err(FetchError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("page {page_no} timed out"),
            )));
        }

        let size = page_size as usize;
        let start = (page_no as usize - 1) * size;
        let records = self.info.iter().skip(start).take(size).cloned().collect();

        Ok(Page {
            records,
            total_count: self.info_total.unwrap_or(self.info.len() as u64),
        })
    }

    fn fetch_status_page(&self, page_no: u32, page_size: u32) -> Result<StatusPage, FetchError> {
        self.record(ApiCall::Status { page_no, page_size });

        let next = self
            .status_responses
            .lock()
            .expect("status queue lock")
            .pop_front();

        match next {
            Some(Ok(mut page)) => {
                page.records.truncate(page_size as usize);
                Ok(page)
            }
            Some(Err(message)) => Err(FetchError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                message,
            ))),
            None => Ok(Page {
                records: Vec::new(),
                total_count: 0,
            }),
        }
    }
}
