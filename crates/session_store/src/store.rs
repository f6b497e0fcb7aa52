use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use agent_protocol::{preview_for_task, SessionSummary, SnapshotRecord, NEW_SESSION_PREVIEW};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::SessionStoreError;
use crate::paths::session_file_name;
use crate::schema::{JsonLine, SessionHeader};

/// One session file loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    path: PathBuf,
    header: SessionHeader,
    records: Vec<SnapshotRecord>,
}

impl SessionStore {
    /// Creates and writes an empty session under `root`, creating the
    /// directory when needed.
    pub fn create_new(root: &Path) -> Result<Self, SessionStoreError> {
        fs::create_dir_all(root)
            .map_err(|source| SessionStoreError::io("creating session root", root, source))?;

        let created_at = now_rfc3339()?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let path = root.join(session_file_name(&created_at, &session_id));

        let store = Self {
            path,
            header: SessionHeader::v1(session_id, created_at),
            records: Vec::new(),
        };
        store.persist()?;
        tracing::debug!(session_id = %store.header.session_id, "created session file");
        Ok(store)
    }

    pub fn open(path: &Path) -> Result<Self, SessionStoreError> {
        let path = path.to_path_buf();
        let read_file = File::open(&path)
            .map_err(|source| SessionStoreError::io("opening session file", &path, source))?;
        let reader = BufReader::new(read_file);

        let mut header: Option<SessionHeader> = None;
        let mut records = Vec::new();

        for (line_index, line_result) in reader.lines().enumerate() {
            let line_number = line_index + 1;
            let line = line_result
                .map_err(|source| SessionStoreError::io_line(&path, line_number, source))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = parse_json_line(&path, line_number, &line)?;

            match (parsed, header.is_some()) {
                (JsonLine::Session(parsed_header), false) => {
                    validate_header_line(&path, line_number, &parsed_header)?;
                    header = Some(parsed_header);
                }
                (JsonLine::Session(_), true) => {
                    return Err(SessionStoreError::DuplicateHeader {
                        path,
                        line: line_number,
                    });
                }
                (JsonLine::Record(_), false) => {
                    return Err(SessionStoreError::InvalidHeaderRecord {
                        path,
                        line: line_number,
                    });
                }
                (JsonLine::Record(record), true) => records.push(record),
            }
        }

        let header = header.ok_or_else(|| SessionStoreError::MissingHeader { path: path.clone() })?;

        Ok(Self {
            path,
            header,
            records,
        })
    }

    /// Appends records and rewrites the file. The first task fixes the
    /// preview unless the session was already named.
    pub fn append_records(&mut self, records: &[SnapshotRecord]) -> Result<(), SessionStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        self.records.extend_from_slice(records);
        if self.header.preview == NEW_SESSION_PREVIEW {
            if let Some(task) = self.first_task() {
                self.header.preview = preview_for_task(task);
            }
        }
        self.header.updated_at = now_rfc3339()?;
        self.persist()
    }

    /// Renames the session without changing its recency.
    pub fn set_preview(&mut self, preview: &str) -> Result<(), SessionStoreError> {
        self.header.preview = preview.to_string();
        self.persist()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &SessionHeader {
        &self.header
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.header.session_id
    }

    #[must_use]
    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        self.header.summary()
    }

    /// Highest persisted step number, used to continue numbering across runs.
    #[must_use]
    pub fn last_step_number(&self) -> Option<u32> {
        self.records
            .iter()
            .filter_map(|record| match record {
                SnapshotRecord::Step(step) => Some(step.step_number),
                SnapshotRecord::Task { .. } => None,
            })
            .max()
    }

    fn first_task(&self) -> Option<&str> {
        self.records.iter().find_map(|record| match record {
            SnapshotRecord::Task { task } => Some(task.as_str()),
            SnapshotRecord::Step(_) => None,
        })
    }

    /// Writes the whole file to a sibling temp file, then renames it over the
    /// original so readers never observe a partial session.
    fn persist(&self) -> Result<(), SessionStoreError> {
        let temp_path = self.path.with_extension("jsonl.tmp");
        let file = File::create(&temp_path).map_err(|source| {
            SessionStoreError::io("creating temporary session file", &temp_path, source)
        })?;
        let mut writer = BufWriter::new(file);

        write_line(&mut writer, &self.path, &JsonLine::Session(self.header.clone()))?;
        for record in &self.records {
            write_line(&mut writer, &self.path, &JsonLine::Record(record.clone()))?;
        }

        writer
            .flush()
            .map_err(|source| SessionStoreError::io("flushing session file", &temp_path, source))?;
        drop(writer);

        fs::rename(&temp_path, &self.path)
            .map_err(|source| SessionStoreError::io("replacing session file", &self.path, source))
    }
}

fn write_line(
    writer: &mut impl Write,
    path: &Path,
    line: &JsonLine,
) -> Result<(), SessionStoreError> {
    serde_json::to_writer(&mut *writer, line)
        .map_err(|source| SessionStoreError::json_serialize(path, source))?;
    writer
        .write_all(b"\n")
        .map_err(|source| SessionStoreError::io("writing session file", path, source))
}

pub(crate) fn parse_json_line(
    path: &Path,
    line_number: usize,
    line: &str,
) -> Result<JsonLine, SessionStoreError> {
    serde_json::from_str::<JsonLine>(line)
        .map_err(|source| SessionStoreError::json_line(path, line_number, source))
}

pub(crate) fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &SessionHeader,
) -> Result<(), SessionStoreError> {
    if header.version != 1 {
        return Err(SessionStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)?;
    validate_rfc3339(path, line_number, "updated_at", &header.updated_at)
}

pub(crate) fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SessionStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(SessionStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}

fn now_rfc3339() -> Result<String, SessionStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(SessionStoreError::ClockFormat)
}
