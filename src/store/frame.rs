//! Log frames - the unit of atomic writes to the change log
//!
//! ```text
//! kind: u8 | body_len: u32 LE | head_check: u32 LE | body | blake3(kind || body): 32 bytes
//! ```
//!
//! `head_check` is the first four bytes of `blake3(kind || body_len)`, so a
//! damaged length is told apart from a frame cut short by a crash.
//!
//! A changes body is `count: u32` followed by `count` records:
//!
//! ```text
//! name_len: u16 | name | height: u32 | payload_len: u32 | zstd(bincode(Change))
//! ```
//!
//! Keys are kept outside the compressed payload so the index can be rebuilt
//! on open without decoding any record.

use super::Checkpoint;
use crate::error::{StorageContext, StorageError};
use crate::model::{Change, Hash, Height};
use crate::StorageResult;
use serde::{Deserialize, Serialize};

pub(crate) const FRAME_HEADER_LEN: usize = 9;
pub(crate) const CHECKSUM_LEN: usize = 32;

/// Type tag of a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// A batch of change records
    Changes,
    /// Removal of one name's records above a height
    Truncate,
    /// Commit marker
    Checkpoint,
    /// Removal of every record above a height, plus the checkpoint there
    Rollback,
}

impl FrameKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            FrameKind::Changes => 0,
            FrameKind::Truncate => 1,
            FrameKind::Checkpoint => 2,
            FrameKind::Rollback => 3,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(FrameKind::Changes),
            1 => Some(FrameKind::Truncate),
            2 => Some(FrameKind::Checkpoint),
            3 => Some(FrameKind::Rollback),
            _ => None,
        }
    }
}

/// Body of a truncate frame
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Truncation {
    pub name: Vec<u8>,
    pub height: Height,
}

/// Where one record's payload sits inside a changes body
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordSlot {
    pub name: Vec<u8>,
    pub height: Height,
    pub offset: usize,
    pub size: u32,
}

#[derive(Clone, Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, body: Vec<u8>) -> Self {
        Frame { kind, body }
    }

    pub fn checkpoint(checkpoint: &Checkpoint) -> StorageResult<Self> {
        let body = bincode::serialize(checkpoint)
            .map_err(|e| StorageError::decode(StorageContext::default(), e))?;
        Ok(Frame::new(FrameKind::Checkpoint, body))
    }

    /// Body is the checkpoint the log rolls back to
    pub fn rollback(checkpoint: &Checkpoint) -> StorageResult<Self> {
        let body = bincode::serialize(checkpoint)
            .map_err(|e| StorageError::decode(StorageContext::at_height(checkpoint.height), e))?;
        Ok(Frame::new(FrameKind::Rollback, body))
    }

    pub fn truncation(name: &[u8], height: Height) -> StorageResult<Self> {
        let body = bincode::serialize(&Truncation {
            name: name.to_vec(),
            height,
        })
        .map_err(|e| StorageError::decode(StorageContext::at(name, height), e))?;
        Ok(Frame::new(FrameKind::Truncate, body))
    }

    pub fn checksum(kind: u8, body: &[u8]) -> Hash {
        Hash::digest_many(&[&[kind], body])
    }

    pub fn head_check(kind: u8, body_len: u32) -> u32 {
        let digest = Hash::digest_many(&[&[kind], &body_len.to_le_bytes()]);
        let mut check = [0u8; 4];
        check.copy_from_slice(&digest.as_bytes()[..4]);
        u32::from_le_bytes(check)
    }

    /// Serialized frame, ready for a single write
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        let kind = self.kind.as_byte();
        let body_len = self.body.len() as u32;
        out.push(kind);
        out.extend_from_slice(&body_len.to_le_bytes());
        out.extend_from_slice(&Frame::head_check(kind, body_len).to_le_bytes());
        out.extend_from_slice(&self.body);
        out.extend_from_slice(Frame::checksum(kind, &self.body).as_bytes());
        out
    }

    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.body.len() + CHECKSUM_LEN
    }
}

/// Build a changes body, returning the payload slots in input order
pub(crate) fn encode_changes(changes: &[Change]) -> StorageResult<(Vec<u8>, Vec<RecordSlot>)> {
    let mut body = Vec::new();
    body.extend_from_slice(&(changes.len() as u32).to_le_bytes());

    let mut slots = Vec::with_capacity(changes.len());
    for change in changes {
        let payload = encode_change(change)?;
        body.extend_from_slice(&(change.name.len() as u16).to_le_bytes());
        body.extend_from_slice(&change.name);
        body.extend_from_slice(&change.height.to_le_bytes());
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        slots.push(RecordSlot {
            name: change.name.clone(),
            height: change.height,
            offset: body.len(),
            size: payload.len() as u32,
        });
        body.extend_from_slice(&payload);
    }
    Ok((body, slots))
}

/// Recover the payload slots of a changes body without decoding payloads
pub(crate) fn parse_changes(body: &[u8], frame_offset: u64) -> StorageResult<Vec<RecordSlot>> {
    let corrupt = |reason: &str| StorageError::Corruption {
        offset: frame_offset,
        reason: reason.to_string(),
    };

    let mut cursor = Cursor { body, pos: 0 };
    let count = cursor.u32().ok_or_else(|| corrupt("missing record count"))?;

    let mut slots = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_len = cursor.u16().ok_or_else(|| corrupt("missing name length"))?;
        let name = cursor
            .take(name_len as usize)
            .ok_or_else(|| corrupt("truncated name"))?
            .to_vec();
        let height = cursor.u32().ok_or_else(|| corrupt("missing height"))?;
        let size = cursor.u32().ok_or_else(|| corrupt("missing payload length"))?;
        let offset = cursor.pos;
        cursor
            .take(size as usize)
            .ok_or_else(|| corrupt("truncated payload"))?;
        slots.push(RecordSlot {
            name,
            height,
            offset,
            size,
        });
    }

    if cursor.pos != body.len() {
        return Err(corrupt("trailing bytes after records"));
    }
    Ok(slots)
}

pub(crate) fn encode_change(change: &Change) -> StorageResult<Vec<u8>> {
    let ctx = || StorageContext::at(&change.name, change.height);
    let data = bincode::serialize(change).map_err(|e| StorageError::decode(ctx(), e))?;
    zstd::encode_all(data.as_slice(), 3).map_err(|e| StorageError::io(ctx(), e))
}

pub(crate) fn decode_change(payload: &[u8], ctx: StorageContext) -> StorageResult<Change> {
    let data = zstd::decode_all(payload).map_err(|e| StorageError::io(ctx.clone(), e))?;
    bincode::deserialize(&data).map_err(|e| StorageError::decode(ctx, e))
}

struct Cursor<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.body.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(bytes)
    }

    fn u16(&mut self) -> Option<u16> {
        Some(u16::from_le_bytes(self.take(2)?.try_into().ok()?))
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }
}
