use std::fmt;

use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Artifacts are named in Korea Standard Time regardless of the host zone.
pub const KST_OFFSET_SECONDS: i32 = 9 * 3600;

const FILE_STEM_FORMAT: &str = "%y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CaptureTimestamp(pub DateTime<FixedOffset>);

impl CaptureTimestamp {
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        Self(instant.with_timezone(&kst()))
    }

    /// `yyMMdd-HHmmss` in KST, the artifact name without extension.
    pub fn file_stem(&self) -> String {
        self.0
            .with_timezone(&kst())
            .format(FILE_STEM_FORMAT)
            .to_string()
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

pub trait Clock {
    fn now(&self) -> CaptureTimestamp;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> CaptureTimestamp {
        CaptureTimestamp::from_utc(Utc::now())
    }
}

fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix())
}
