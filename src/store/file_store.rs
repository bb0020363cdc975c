//! Single-file change log
//!
//! File format:
//! ```text
//! [HEADER: 16 bytes]
//!   - magic: 8 bytes ("CLMTRIE\0")
//!   - version: 4 bytes (u32 LE)
//!   - reserved: 4 bytes
//!
//! [FRAMES: variable]
//!   - changes, truncate, checkpoint and rollback frames, in write order
//! ```
//!
//! The ordered index is rebuilt by scanning frames on open. A final frame
//! whose header is intact but whose body is short or fails its checksum was
//! torn by a crash and is cut off. Any other damage is corruption.

use super::frame::{
    self, Frame, FrameKind, Truncation, CHECKSUM_LEN, FRAME_HEADER_LEN,
};
use super::index::Index;
use super::{ChangeRepo, Checkpoint};
use crate::error::{StorageContext, StorageError};
use crate::model::{Change, Height};
use crate::{StorageResult, MAGIC, VERSION};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HEADER_SIZE: u64 = 16;

/// Location of one record payload in the file
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// Open file handle plus the append position
struct LogFile {
    file: File,
    end: u64,
}

/// A change log backed by a single append-only file
pub struct LogStore {
    path: PathBuf,
    /// `None` once closed
    file: Mutex<Option<LogFile>>,
    index: RwLock<Index<IndexEntry>>,
}

fn io_err(source: std::io::Error) -> StorageError {
    StorageError::io(StorageContext::default(), source)
}

impl LogStore {
    /// Create a new, empty change log
    pub fn create(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(io_err)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        tracing::info!(path = %path.display(), "created change log");

        Ok(LogStore {
            path,
            file: Mutex::new(Some(LogFile {
                file,
                end: HEADER_SIZE,
            })),
            index: RwLock::new(Index::new()),
        })
    }

    /// Open an existing change log, rebuilding its index
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| StorageError::InvalidFile("Truncated header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(StorageError::InvalidFile("Invalid magic bytes".into()));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&header[8..12]);
        let version = u32::from_le_bytes(version);
        if version != VERSION {
            return Err(StorageError::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let file_len = file.metadata().map_err(io_err)?.len();
        let (index, end) = scan_frames(&mut file, file_len)?;

        if end < file_len {
            tracing::warn!(
                path = %path.display(),
                offset = end,
                discarded = file_len - end,
                "discarding torn change-log tail"
            );
            file.set_len(end).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }

        tracing::info!(
            path = %path.display(),
            records = index.len(),
            checkpoint = ?index.checkpoint.map(|c| c.height),
            "opened change log"
        );

        Ok(LogStore {
            path,
            file: Mutex::new(Some(LogFile { file, end })),
            index: RwLock::new(index),
        })
    }

    /// Open or create a change log
    pub fn open_or_create(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Append one frame with a single write, returns its offset
    fn write_frame(log: &mut LogFile, frame: &Frame) -> StorageResult<u64> {
        let offset = log.end;
        let bytes = frame.encode();

        let written = log
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| log.file.write_all(&bytes));
        if let Err(e) = written {
            // cut off whatever part of the frame made it to disk
            let _ = log.file.set_len(offset);
            return Err(io_err(e));
        }

        log.end = offset + bytes.len() as u64;
        Ok(offset)
    }

    fn read_payload(
        log: &mut LogFile,
        entry: IndexEntry,
        ctx: StorageContext,
    ) -> StorageResult<Change> {
        let mut data = vec![0u8; entry.size as usize];
        log.file
            .seek(SeekFrom::Start(entry.offset))
            .and_then(|_| log.file.read_exact(&mut data))
            .map_err(|e| StorageError::io(ctx.clone(), e))?;
        frame::decode_change(&data, ctx)
    }

    /// Number of records currently in the log
    pub fn record_count(&self) -> usize {
        self.index.read().len()
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChangeRepo for LogStore {
    fn append(&self, changes: &[Change]) -> StorageResult<()> {
        let mut guard = self.file.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;
        if changes.is_empty() {
            return Ok(());
        }

        let (body, slots) = frame::encode_changes(changes)?;
        let frame = Frame::new(FrameKind::Changes, body);
        let offset = Self::write_frame(log, &frame)?;

        let body_start = offset + FRAME_HEADER_LEN as u64;
        let mut index = self.index.write();
        for slot in slots {
            let entry = IndexEntry {
                offset: body_start + slot.offset as u64,
                size: slot.size,
            };
            index.push(&slot.name, slot.height, entry);
        }
        Ok(())
    }

    fn load(&self, name: &[u8]) -> StorageResult<Vec<Change>> {
        let entries: Vec<(Height, IndexEntry)> = self
            .index
            .read()
            .name_records(name)
            .map(|((_, height, _), entry)| (*height, *entry))
            .collect();

        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.file.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;
        let mut changes = Vec::with_capacity(entries.len());
        for (height, entry) in entries {
            changes.push(Self::read_payload(log, entry, StorageContext::at(name, height))?);
        }
        Ok(changes)
    }

    fn truncate_above(&self, name: &[u8], height: Height) -> StorageResult<()> {
        if !self.index.read().has_records_above(name, height) {
            return Ok(());
        }

        let frame = Frame::truncation(name, height)?;
        let mut guard = self.file.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;
        Self::write_frame(log, &frame)?;

        let removed = self.index.write().truncate(name, height);
        tracing::debug!(name = %name.escape_ascii(), height, removed, "truncated change log");
        Ok(())
    }

    fn iterate_children(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(Vec<Change>) -> bool,
    ) -> StorageResult<()> {
        let names = self.index.read().names_with_prefix(prefix);
        for name in names {
            let changes = self.load(&name)?;
            if !visit(changes) {
                break;
            }
        }
        Ok(())
    }

    fn iterate_all(&self, visit: &mut dyn FnMut(&[u8]) -> bool) -> StorageResult<()> {
        let names = self.index.read().names_with_prefix(b"");
        for name in names {
            if !visit(&name) {
                break;
            }
        }
        Ok(())
    }

    fn names_with_prefix(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.index.read().names_with_prefix(prefix))
    }

    fn names_above(&self, height: Height) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.index.read().names_above(height))
    }

    fn checkpoint(&self, checkpoint: Checkpoint) -> StorageResult<()> {
        let frame = Frame::checkpoint(&checkpoint)?;
        let mut guard = self.file.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;
        Self::write_frame(log, &frame)?;
        self.index.write().checkpoint = Some(checkpoint);
        Ok(())
    }

    fn last_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        Ok(self.index.read().checkpoint)
    }

    fn rollback(&self, checkpoint: Checkpoint) -> StorageResult<Vec<Vec<u8>>> {
        let frame = Frame::rollback(&checkpoint)?;
        let mut guard = self.file.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;
        Self::write_frame(log, &frame)?;

        let names = self.index.write().rollback(checkpoint);
        tracing::debug!(height = checkpoint.height, names = names.len(), "rolled back change log");
        Ok(names)
    }

    fn flush(&self) -> StorageResult<()> {
        let mut guard = self.file.lock();
        let log = guard.as_mut().ok_or(StorageError::Closed)?;
        log.file.sync_data().map_err(io_err)
    }

    fn close(&self) -> StorageResult<()> {
        let mut guard = self.file.lock();
        if let Some(log) = guard.take() {
            log.file.sync_all().map_err(io_err)?;
            tracing::info!(path = %self.path.display(), "closed change log");
        }
        Ok(())
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.close();
    }
}

/// Rebuild the index from the frames after the header
///
/// Returns the index and the end of the last intact frame.
fn scan_frames(file: &mut File, file_len: u64) -> StorageResult<(Index<IndexEntry>, u64)> {
    let mut index = Index::new();
    file.seek(SeekFrom::Start(HEADER_SIZE)).map_err(io_err)?;
    let mut reader = BufReader::new(file);

    let overhead = (FRAME_HEADER_LEN + CHECKSUM_LEN) as u64;
    let mut offset = HEADER_SIZE;
    let corrupt = |offset: u64, reason: &str| StorageError::Corruption {
        offset,
        reason: reason.to_string(),
    };

    while offset < file_len {
        let remaining = file_len - offset;
        if remaining < FRAME_HEADER_LEN as u64 {
            break;
        }

        let mut head = [0u8; FRAME_HEADER_LEN];
        reader.read_exact(&mut head).map_err(io_err)?;
        let body_len = u32::from_le_bytes([head[1], head[2], head[3], head[4]]);
        let check = u32::from_le_bytes([head[5], head[6], head[7], head[8]]);
        // the length is only trusted once its own check passes
        if check != Frame::head_check(head[0], body_len) {
            return Err(corrupt(offset, "Frame header checksum mismatch"));
        }
        let kind = FrameKind::from_byte(head[0]).ok_or_else(|| corrupt(offset, "Unknown frame kind"))?;

        let frame_len = overhead + body_len as u64;
        if frame_len > remaining {
            break;
        }

        let mut body = vec![0u8; body_len as usize];
        reader.read_exact(&mut body).map_err(io_err)?;
        let mut checksum = [0u8; CHECKSUM_LEN];
        reader.read_exact(&mut checksum).map_err(io_err)?;

        if Frame::checksum(head[0], &body).as_bytes() != &checksum {
            if offset + frame_len == file_len {
                break;
            }
            return Err(corrupt(offset, "Frame checksum mismatch"));
        }

        match kind {
            FrameKind::Changes => {
                let body_start = offset + FRAME_HEADER_LEN as u64;
                for slot in frame::parse_changes(&body, offset)? {
                    let entry = IndexEntry {
                        offset: body_start + slot.offset as u64,
                        size: slot.size,
                    };
                    index.push(&slot.name, slot.height, entry);
                }
            }
            FrameKind::Truncate => {
                let t: Truncation = bincode::deserialize(&body)
                    .map_err(|e| StorageError::decode(StorageContext::default(), e))?;
                index.truncate(&t.name, t.height);
            }
            FrameKind::Checkpoint => {
                let c: Checkpoint = bincode::deserialize(&body)
                    .map_err(|e| StorageError::decode(StorageContext::default(), e))?;
                index.checkpoint = Some(c);
            }
            FrameKind::Rollback => {
                let c: Checkpoint = bincode::deserialize(&body)
                    .map_err(|e| StorageError::decode(StorageContext::default(), e))?;
                index.rollback(c);
            }
        }

        offset += frame_len;
    }

    Ok((index, offset))
}
