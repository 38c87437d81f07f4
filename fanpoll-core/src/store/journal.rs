//! Append-only store journal
//!
//! Every committed document write is appended as one line:
//!
//! ```text
//! data/
//! └── store.fplog     # "<crc32_hex>:<json StoreEvent>" per line
//! ```
//!
//! On open the journal is replayed in order, which rebuilds the in-memory
//! collections exactly as they were, pending lifecycle transitions included.

use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use crate::store::Document;
use anyhow::{Context, Result};
use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const JOURNAL_FILE: &str = "store.fplog";

/// One committed document write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreEvent {
    /// Full post-image of an inserted or updated record
    Put { kind: EntityKind, id: EntityId, document: Document },
    Remove { kind: EntityKind, id: EntityId },
}

/// Calculate CRC32 checksum for data
#[inline]
fn calculate_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Format: "<crc32_hex>:<json_data>"
fn format_line(json: &str) -> String {
    format!("{:08x}:{}", calculate_crc32(json.as_bytes()), json)
}

/// Validate the checksum prefix and return the JSON payload
fn parse_line(line: &str) -> Result<&str, String> {
    if line.len() <= 9 || line.as_bytes()[8] != b':' {
        return Err("missing CRC32 prefix".to_string());
    }
    let (crc_hex, rest) = line.split_at(8);
    let json = &rest[1..];
    let expected =
        u32::from_str_radix(crc_hex, 16).map_err(|_| format!("invalid CRC32 hex: {}", crc_hex))?;
    let actual = calculate_crc32(json.as_bytes());
    if expected != actual {
        return Err(format!("CRC32 mismatch: expected {:08x}, got {:08x}", expected, actual));
    }
    Ok(json)
}

struct Replay {
    events: Vec<StoreEvent>,
    /// Length of the prefix made of good lines
    good_len: u64,
    file_len: u64,
    /// The good prefix ends with a newline (or is empty)
    terminated: bool,
}

/// Durable, append-only log of [`StoreEvent`]s
pub struct Journal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    fsync_on_append: bool,
}

impl Journal {
    /// Open (or create) the journal in `data_dir` and return the events
    /// recorded so far.
    ///
    /// A line that fails its checksum is dropped with a warning when it is
    /// the last one (a torn write) and the file is cut back to the last
    /// good line, so the next append starts on a fresh line. Anywhere else
    /// it is treated as corruption and opening fails.
    pub fn open(data_dir: impl AsRef<Path>, fsync_on_append: bool) -> Result<(Self, Vec<StoreEvent>)> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        let path = data_dir.join(JOURNAL_FILE);

        let replayed = if path.exists() { Some(Self::replay(&path)?) } else { None };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;

        let events = match replayed {
            Some(replay) => {
                Self::repair_tail(&file, &path, &replay)?;
                replay.events
            }
            None => Vec::new(),
        };

        log::info!("Journal {} opened, {} event(s) to replay", path.display(), events.len());

        Ok((Self { path, writer: Mutex::new(BufWriter::new(file)), fsync_on_append }, events))
    }

    fn replay(path: &Path) -> Result<Replay> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
        let last = lines
            .iter()
            .rposition(|line| !String::from_utf8_lossy(line).trim().is_empty())
            .unwrap_or(0);

        let mut events = Vec::with_capacity(lines.len());
        let mut offset = 0;
        let mut good_len = 0;
        for (n, raw) in lines.iter().enumerate() {
            // byte just past this line's newline (or the end of the file)
            let next = (offset + raw.len() + 1).min(bytes.len());
            offset = next;

            let line = String::from_utf8_lossy(raw);
            if line.trim().is_empty() {
                good_len = next;
                continue;
            }
            let parsed = parse_line(&line).and_then(|json| {
                serde_json::from_str::<StoreEvent>(json).map_err(|e| e.to_string())
            });
            match parsed {
                Ok(event) => {
                    events.push(event);
                    good_len = next;
                }
                Err(reason) if n == last => {
                    log::warn!("Dropping torn journal tail at line {}: {}", n + 1, reason);
                    break;
                }
                Err(reason) => {
                    anyhow::bail!("Journal {} corrupted at line {}: {}", path.display(), n + 1, reason)
                }
            }
        }

        let terminated = good_len == 0 || bytes[good_len - 1] == b'\n';
        Ok(Replay { events, good_len: good_len as u64, file_len: bytes.len() as u64, terminated })
    }

    /// Cut a torn tail off and make sure the next append starts a new line
    fn repair_tail(file: &File, path: &Path, replay: &Replay) -> Result<()> {
        if replay.good_len < replay.file_len {
            file.set_len(replay.good_len)
                .with_context(|| format!("Failed to truncate torn tail of {}", path.display()))?;
            log::warn!(
                "Journal {} truncated from {} to {} bytes",
                path.display(),
                replay.file_len,
                replay.good_len
            );
        }
        if !replay.terminated {
            let mut file = file;
            file.write_all(b"\n")?;
        }
        if replay.good_len < replay.file_len || !replay.terminated {
            file.sync_data()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event; flushed (and optionally fsynced) before returning
    pub fn append(&self, event: &StoreEvent) -> EngineResult<()> {
        let json = serde_json::to_string(event)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| EngineError::Internal("Journal writer lock poisoned".into()))?;
        writeln!(writer, "{}", format_line(&json))?;
        writer.flush()?;
        if self.fsync_on_append {
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut writer =
            self.writer.lock().map_err(|_| anyhow::anyhow!("Journal writer lock poisoned"))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}
