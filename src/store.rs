use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;

use crate::types::FrameRecord;

pub const DEFAULT_OUTPUT_PATH: &str = "data/outputs/interview_tracker_with_yolo_emotions.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create output directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write session to {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize session to {}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read session from {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse session file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Append-only log of the frames recorded in one session.
#[derive(Debug)]
pub struct SessionStore {
    output_path: PathBuf,
    records: Vec<FrameRecord>,
}

impl SessionStore {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            records: Vec::new(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn append(&mut self, record: FrameRecord) -> &FrameRecord {
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    /// Writes every record as one pretty-printed JSON array, replacing any
    /// previous file at the output path.
    pub fn flush(&self) -> Result<PathBuf, StoreError> {
        let path = self.output_path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = File::create(&path).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
        self.records
            .serialize(&mut serializer)
            .map_err(|source| StoreError::Serialize {
                path: path.clone(),
                source,
            })?;
        writer.flush().map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }

    /// Reads a flushed session back.
    pub fn load(path: &Path) -> Result<Vec<FrameRecord>, StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyFrameResult, Emotion, FaceFrameResult};

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("interview-tracker-store-{}", std::process::id()))
            .join(name)
    }

    fn record(timestamp: f64) -> FrameRecord {
        FrameRecord::new(
            timestamp,
            &FaceFrameResult::default(),
            &BodyFrameResult::default(),
            Emotion::Unknown,
            Vec::new(),
        )
    }

    #[test]
    fn empty_session_flushes_to_empty_array() {
        let path = scratch_path("empty/session.json");
        let store = SessionStore::new(&path);

        assert_eq!(store.flush().unwrap(), path);
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");
        assert!(SessionStore::load(&path).unwrap().is_empty());
    }

    #[test]
    fn flush_round_trips_records_in_order() {
        let path = scratch_path("three/session.json");
        let mut store = SessionStore::new(&path);
        for ts in [0.0, 0.5, 1.25] {
            store.append(record(ts));
        }

        store.flush().unwrap();
        let loaded = SessionStore::load(&path).unwrap();
        assert_eq!(loaded, store.records());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    {"));
    }

    #[test]
    fn second_flush_overwrites() {
        let path = scratch_path("twice/session.json");
        let mut store = SessionStore::new(&path);
        store.append(record(0.0));
        store.flush().unwrap();
        store.append(record(0.1));
        store.flush().unwrap();

        assert_eq!(SessionStore::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn flush_error_names_the_path() {
        let blocker = scratch_path("blocker");
        fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        fs::write(&blocker, "file, not a directory").unwrap();

        let store = SessionStore::new(blocker.join("session.json"));
        let err = store.flush().unwrap_err();
        assert!(err.to_string().contains("blocker"));
    }

    #[test]
    fn load_reports_parse_errors() {
        let path = scratch_path("garbage.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SessionStore::load(&path),
            Err(StoreError::Parse { .. })
        ));
    }
}
