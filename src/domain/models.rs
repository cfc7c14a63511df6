use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::domain::clock::CaptureTimestamp;

/// Column order of a persisted snapshot. The header row uses these names verbatim.
pub const STATION_COLUMNS: [&str; 22] = [
    "statnm",
    "statid",
    "chgerid",
    "chgertype",
    "addr",
    "usetime",
    "busiid",
    "bnm",
    "businm",
    "busicall",
    "stat",
    "statupddt",
    "lasttsdt",
    "lasttedt",
    "nowtsdt",
    "output",
    "method",
    "zcode",
    "parkingfree",
    "note",
    "limityn",
    "limitdetail",
];

pub const STATUS_COLUMNS: [&str; 8] = [
    "busiid", "statid", "chgerid", "stat", "statupddt", "lasttsdt", "lasttedt", "nowtsdt",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChargerKey {
    pub station_id: String,
    pub charger_id: String,
}

impl ChargerKey {
    pub fn new(station_id: impl Into<String>, charger_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            charger_id: charger_id.into(),
        }
    }
}

impl fmt::Display for ChargerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.station_id, self.charger_id)
    }
}

/// One row of the full charger-info snapshot. Every field is text; an omitted
/// source field is stored as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationRecord {
    pub station_name: String,
    pub station_id: String,
    pub charger_id: String,
    pub charger_type: String,
    pub address: String,
    pub use_time: String,
    pub business_id: String,
    pub business_name: String,
    pub operator_name: String,
    pub operator_call: String,
    pub status: String,
    pub status_updated_at: String,
    pub last_session_start: String,
    pub last_session_end: String,
    pub current_session_start: String,
    pub output_kw: String,
    pub method: String,
    pub zcode: String,
    pub parking_free: String,
    pub note: String,
    pub limit_yn: String,
    pub limit_detail: String,
}

impl StationRecord {
    pub fn key(&self) -> ChargerKey {
        ChargerKey::new(&self.station_id, &self.charger_id)
    }

    /// Field values in `STATION_COLUMNS` order.
    pub fn values(&self) -> [&str; 22] {
        [
            &self.station_name,
            &self.station_id,
            &self.charger_id,
            &self.charger_type,
            &self.address,
            &self.use_time,
            &self.business_id,
            &self.business_name,
            &self.operator_name,
            &self.operator_call,
            &self.status,
            &self.status_updated_at,
            &self.last_session_start,
            &self.last_session_end,
            &self.current_session_start,
            &self.output_kw,
            &self.method,
            &self.zcode,
            &self.parking_free,
            &self.note,
            &self.limit_yn,
            &self.limit_detail,
        ]
    }

    pub(crate) fn set_column(&mut self, column: &str, value: String) {
        let slot = match column {
            "statnm" => &mut self.station_name,
            "statid" => &mut self.station_id,
            "chgerid" => &mut self.charger_id,
            "chgertype" => &mut self.charger_type,
            "addr" => &mut self.address,
            "usetime" => &mut self.use_time,
            "busiid" => &mut self.business_id,
            "bnm" => &mut self.business_name,
            "businm" => &mut self.operator_name,
            "busicall" => &mut self.operator_call,
            "stat" => &mut self.status,
            "statupddt" => &mut self.status_updated_at,
            "lasttsdt" => &mut self.last_session_start,
            "lasttedt" => &mut self.last_session_end,
            "nowtsdt" => &mut self.current_session_start,
            "output" => &mut self.output_kw,
            "method" => &mut self.method,
            "zcode" => &mut self.zcode,
            "parkingfree" => &mut self.parking_free,
            "note" => &mut self.note,
            "limityn" => &mut self.limit_yn,
            "limitdetail" => &mut self.limit_detail,
            _ => return,
        };
        *slot = value;
    }

    /// Overwrites the five live-status fields. Nothing else on the row changes.
    pub fn apply_status(&mut self, update: &StatusRecord) {
        self.status.clone_from(&update.status);
        self.status_updated_at.clone_from(&update.status_updated_at);
        self.last_session_start.clone_from(&update.last_session_start);
        self.last_session_end.clone_from(&update.last_session_end);
        self.current_session_start
            .clone_from(&update.current_session_start);
    }
}

/// One row of the live status feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    pub business_id: String,
    pub station_id: String,
    pub charger_id: String,
    pub status: String,
    pub status_updated_at: String,
    pub last_session_start: String,
    pub last_session_end: String,
    pub current_session_start: String,
}

impl StatusRecord {
    pub fn key(&self) -> ChargerKey {
        ChargerKey::new(&self.station_id, &self.charger_id)
    }

    pub(crate) fn set_column(&mut self, column: &str, value: String) {
        let slot = match column {
            "busiid" => &mut self.business_id,
            "statid" => &mut self.station_id,
            "chgerid" => &mut self.charger_id,
            "stat" => &mut self.status,
            "statupddt" => &mut self.status_updated_at,
            "lasttsdt" => &mut self.last_session_start,
            "lasttedt" => &mut self.last_session_end,
            "nowtsdt" => &mut self.current_session_start,
            _ => return,
        };
        *slot = value;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("charger {key} appears at rows {first} and {second}")]
    DuplicateKey {
        key: ChargerKey,
        first: usize,
        second: usize,
    },
}

/// Ordered charger rows at one capture time. Row keys are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    captured_at: CaptureTimestamp,
    records: Vec<StationRecord>,
    index: HashMap<ChargerKey, usize>,
}

impl Snapshot {
    pub fn new(
        captured_at: CaptureTimestamp,
        records: Vec<StationRecord>,
    ) -> Result<Self, SnapshotError> {
        let mut index = HashMap::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            if let Some(first) = index.insert(record.key(), row) {
                return Err(SnapshotError::DuplicateKey {
                    key: record.key(),
                    first,
                    second: row,
                });
            }
        }

        Ok(Self {
            captured_at,
            records,
            index,
        })
    }

    pub fn captured_at(&self) -> CaptureTimestamp {
        self.captured_at
    }

    pub fn records(&self) -> &[StationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn row_of(&self, key: &ChargerKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Copy of this snapshot stamped with a new capture time, ready to be mutated
    /// through `records_mut` without touching `self`.
    pub(crate) fn next_version(&self, captured_at: CaptureTimestamp) -> Self {
        Self {
            captured_at,
            records: self.records.clone(),
            index: self.index.clone(),
        }
    }

    /// Row-level access that cannot change keys, so the index stays valid.
    pub(crate) fn apply_status_at(&mut self, row: usize, update: &StatusRecord) {
        if let Some(record) = self.records.get_mut(row) {
            record.apply_status(update);
        }
    }
}
