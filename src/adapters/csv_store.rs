use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::models::{STATION_COLUMNS, Snapshot};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const ARTIFACT_EXTENSION: &str = "csv";
const PARTIAL_SUFFIX: &str = "partial";

pub trait SnapshotStore: Send + 'static {
    /// Writes `snapshot` under a name derived from its capture time and returns the path.
    fn persist(&self, snapshot: &Snapshot) -> Result<PathBuf, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("artifact {0} already exists")]
    AlreadyExists(PathBuf),
    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode artifact {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CsvSnapshotStore {
    output_dir: PathBuf,
}

impl CsvSnapshotStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn artifact_path(&self, snapshot: &Snapshot) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{ARTIFACT_EXTENSION}",
            snapshot.captured_at().file_stem()
        ))
    }
}

impl SnapshotStore for CsvSnapshotStore {
    fn persist(&self, snapshot: &Snapshot) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| StoreError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })?;

        let path = self.artifact_path(snapshot);
        let partial = path.with_extension(format!("{ARTIFACT_EXTENSION}.{PARTIAL_SUFFIX}"));
        if let Err(error) = write_csv(&partial, snapshot) {
            let _ = fs::remove_file(&partial);
            return Err(error);
        }

        // hard_link refuses an existing target, unlike rename.
        let published = fs::hard_link(&partial, &path);
        let _ = fs::remove_file(&partial);
        match published {
            Ok(()) => Ok(path),
            Err(source) if source.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(path))
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

fn write_csv(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let io_error = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_error = |source: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(io_error)?;
    file.write_all(UTF8_BOM).map_err(io_error)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(STATION_COLUMNS).map_err(csv_error)?;
    for record in snapshot.records() {
        writer.write_record(record.values()).map_err(csv_error)?;
    }

    let file = writer
        .into_inner()
        .map_err(|error| io_error(io::Error::other(error.to_string())))?;
    file.sync_all().map_err(io_error)
}
