use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::adapters::charger_http::{ChargerApi, FetchError};
use crate::domain::charger_payload::{
    InfoPage, Page, StatusPage, parse_info_page, parse_status_page,
};

const INFO_ENDPOINT: &str = "replay:getChargerInfo";
const STATUS_ENDPOINT: &str = "replay:getChargerStatus";

/// Recorded exchanges with the charger API. `info[n - 1]` answers info page `n`;
/// `status` is served in order, one exchange per request.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Recording {
    info: Vec<Exchange>,
    status: Vec<Exchange>,
    #[serde(default = "loop_by_default")]
    loop_status: bool,
}

/// One response as the service would have sent it, or a connection that never
/// produced one.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Exchange {
    #[serde(default = "http_ok")]
    http_status: u16,
    body: Option<Value>,
    raw_body: Option<String>,
    fault: Option<Fault>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Fault {
    Timeout,
    Refused,
    Reset,
}

fn loop_by_default() -> bool {
    true
}

fn http_ok() -> u16 {
    200
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read recording {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("recording {path} is not a valid exchange list: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("recording {path} has no {collection} exchanges")]
    Empty {
        path: PathBuf,
        collection: &'static str,
    },
}

#[derive(Debug)]
pub struct ReplayChargerApi {
    recording: Recording,
    next_status: Mutex<usize>,
}

impl ReplayChargerApi {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let recording: Recording =
            serde_json::from_str(&content).map_err(|source| ReplayError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        for (collection, exchanges) in [("info", &recording.info), ("status", &recording.status)] {
            if exchanges.is_empty() {
                return Err(ReplayError::Empty {
                    path: path.to_path_buf(),
                    collection,
                });
            }
        }

        Ok(Self {
            recording,
            next_status: Mutex::new(0),
        })
    }

    fn info_exchange(&self, page_no: u32) -> Result<&Exchange, FetchError> {
        usize::try_from(page_no)
            .ok()
            .and_then(|page| page.checked_sub(1))
            .and_then(|index| self.recording.info.get(index))
            .ok_or(FetchError::Status {
                endpoint: INFO_ENDPOINT.to_string(),
                status: 404,
            })
    }

    fn status_exchange(&self) -> Result<&Exchange, FetchError> {
        let mut next = self
            .next_status
            .lock()
            .map_err(|_| FetchError::Io(io::Error::other("replay cursor lock poisoned")))?;

        if *next >= self.recording.status.len() {
            if !self.recording.loop_status {
                return Err(FetchError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "status recording exhausted",
                )));
            }
            *next = 0;
        }

        let exchange = self.recording.status.get(*next).ok_or_else(|| {
            FetchError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "status recording exhausted",
            ))
        })?;
        *next += 1;
        Ok(exchange)
    }
}

impl Exchange {
    /// Mirrors the live client: faults and non-2xx statuses fail before the body is
    /// looked at, raw bodies are decoded as JSON.
    fn respond(&self, endpoint: &str) -> Result<Value, FetchError> {
        if let Some(fault) = self.fault {
            return Err(FetchError::Io(fault.into_io_error(endpoint)));
        }
        if !(200..300).contains(&self.http_status) {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: self.http_status,
            });
        }

        match (&self.body, &self.raw_body) {
            (Some(body), None) => Ok(body.clone()),
            (None, Some(raw)) => serde_json::from_str(raw).map_err(FetchError::from),
            _ => Err(FetchError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("recorded {endpoint} response needs exactly one of body or raw_body"),
            ))),
        }
    }
}

impl Fault {
    fn into_io_error(self, endpoint: &str) -> io::Error {
        let kind = match self {
            Self::Timeout => io::ErrorKind::TimedOut,
            Self::Refused => io::ErrorKind::ConnectionRefused,
            Self::Reset => io::ErrorKind::ConnectionReset,
        };
        io::Error::new(kind, format!("recorded {self:?} on {endpoint}"))
    }
}

/// The remote service never returns more than `numOfRows` records.
fn bounded<T>(mut page: Page<T>, page_size: u32) -> Page<T> {
    let limit = usize::try_from(page_size).unwrap_or(usize::MAX);
    page.records.truncate(limit);
    page
}

impl ChargerApi for ReplayChargerApi {
    fn fetch_info_page(&self, page_no: u32, page_size: u32) -> Result<InfoPage, FetchError> {
        let payload = self.info_exchange(page_no)?.respond(INFO_ENDPOINT)?;
        Ok(bounded(parse_info_page(&payload)?, page_size))
    }

    fn fetch_status_page(&self, _page_no: u32, page_size: u32) -> Result<StatusPage, FetchError> {
        let payload = self.status_exchange()?.respond(STATUS_ENDPOINT)?;
        Ok(bounded(parse_status_page(&payload)?, page_size))
    }
}
