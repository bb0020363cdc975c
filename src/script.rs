//! Claim script prefixes
//!
//! A claim-bearing output script starts with one of three claim opcodes
//! followed by data pushes and drop opcodes, then an ordinary pay-to script:
//!
//! ```text
//! OP_CLAIMNAME    <name> <value>      OP_2DROP OP_DROP  <pay-to script>
//! OP_SUPPORTCLAIM <name> <claim_id>   OP_2DROP OP_DROP  <pay-to script>
//! OP_UPDATECLAIM  <name> <claim_id> <value> OP_2DROP OP_2DROP <pay-to script>
//! ```
//!
//! Only the prefix is interpreted here; the pay-to part belongs to the script
//! interpreter.

use crate::model::{ClaimId, MAX_NAME_LEN};
use thiserror::Error;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_DROP: u8 = 0x75;
pub const OP_CLAIMNAME: u8 = 0xb5;
pub const OP_SUPPORTCLAIM: u8 = 0xb6;
pub const OP_UPDATECLAIM: u8 = 0xb7;

const CLAIM_DROPS: &[u8] = &[OP_2DROP, OP_DROP];
const UPDATE_DROPS: &[u8] = &[OP_2DROP, OP_2DROP];

/// Claim script decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The script carries no claim; callers skip it
    #[error("Not a claim script")]
    NotClaimScript,

    #[error("Truncated data push at offset {0}")]
    TruncatedPush(usize),

    #[error("Expected a data push at offset {0}")]
    ExpectedPush(usize),

    #[error("Missing drop opcodes after the claim prefix")]
    MissingDrops,

    #[error("Claim id must be 20 bytes, got {0}")]
    InvalidClaimId(usize),

    #[error("Claim name of {0} bytes exceeds the maximum length")]
    NameTooLong(usize),
}

/// Which claim operation an output script carries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOpcode {
    ClaimName,
    SupportClaim,
    UpdateClaim,
}

impl ClaimOpcode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            OP_CLAIMNAME => Some(ClaimOpcode::ClaimName),
            OP_SUPPORTCLAIM => Some(ClaimOpcode::SupportClaim),
            OP_UPDATECLAIM => Some(ClaimOpcode::UpdateClaim),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ClaimOpcode::ClaimName => OP_CLAIMNAME,
            ClaimOpcode::SupportClaim => OP_SUPPORTCLAIM,
            ClaimOpcode::UpdateClaim => OP_UPDATECLAIM,
        }
    }
}

/// The decoded claim prefix of an output script
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimScript {
    pub opcode: ClaimOpcode,
    pub name: Vec<u8>,
    /// Target claim for supports and updates
    pub claim_id: Option<ClaimId>,
    pub value: Vec<u8>,
}

impl ClaimScript {
    pub fn claim_name(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        ClaimScript {
            opcode: ClaimOpcode::ClaimName,
            name: name.into(),
            claim_id: None,
            value: value.into(),
        }
    }

    pub fn support(name: impl Into<Vec<u8>>, claim_id: ClaimId) -> Self {
        ClaimScript {
            opcode: ClaimOpcode::SupportClaim,
            name: name.into(),
            claim_id: Some(claim_id),
            value: Vec::new(),
        }
    }

    pub fn update(name: impl Into<Vec<u8>>, claim_id: ClaimId, value: impl Into<Vec<u8>>) -> Self {
        ClaimScript {
            opcode: ClaimOpcode::UpdateClaim,
            name: name.into(),
            claim_id: Some(claim_id),
            value: value.into(),
        }
    }

    /// Decode the claim prefix of `script`
    pub fn decode(script: &[u8]) -> Result<Self, ScriptError> {
        let opcode = script
            .first()
            .and_then(|b| ClaimOpcode::from_byte(*b))
            .ok_or(ScriptError::NotClaimScript)?;

        let mut pos = 1;
        let name = read_push(script, &mut pos)?;
        if name.len() > MAX_NAME_LEN {
            return Err(ScriptError::NameTooLong(name.len()));
        }

        let (claim_id, value, drops) = match opcode {
            ClaimOpcode::ClaimName => {
                let value = read_push(script, &mut pos)?;
                (None, value, CLAIM_DROPS)
            }
            ClaimOpcode::SupportClaim => {
                let id = read_claim_id(script, &mut pos)?;
                (Some(id), Vec::new(), CLAIM_DROPS)
            }
            ClaimOpcode::UpdateClaim => {
                let id = read_claim_id(script, &mut pos)?;
                let value = read_push(script, &mut pos)?;
                (Some(id), value, UPDATE_DROPS)
            }
        };

        if script.get(pos..pos + drops.len()) != Some(drops) {
            return Err(ScriptError::MissingDrops);
        }

        Ok(ClaimScript {
            opcode,
            name,
            claim_id,
            value,
        })
    }

    /// Encode the claim prefix followed by `pay_to`
    pub fn encode(&self, pay_to: &[u8]) -> Vec<u8> {
        let mut out = vec![self.opcode.as_byte()];
        write_push(&mut out, &self.name);
        match self.opcode {
            ClaimOpcode::ClaimName => {
                write_push(&mut out, &self.value);
                out.extend_from_slice(CLAIM_DROPS);
            }
            ClaimOpcode::SupportClaim => {
                write_push(&mut out, self.claim_id.unwrap_or_default().as_bytes());
                out.extend_from_slice(CLAIM_DROPS);
            }
            ClaimOpcode::UpdateClaim => {
                write_push(&mut out, self.claim_id.unwrap_or_default().as_bytes());
                write_push(&mut out, &self.value);
                out.extend_from_slice(UPDATE_DROPS);
            }
        }
        out.extend_from_slice(pay_to);
        out
    }
}

fn read_claim_id(script: &[u8], pos: &mut usize) -> Result<ClaimId, ScriptError> {
    let bytes = read_push(script, pos)?;
    ClaimId::from_slice(&bytes).ok_or(ScriptError::InvalidClaimId(bytes.len()))
}

fn read_push(script: &[u8], pos: &mut usize) -> Result<Vec<u8>, ScriptError> {
    let start = *pos;
    let op = *script.get(start).ok_or(ScriptError::ExpectedPush(start))?;

    let (len, header) = match op {
        OP_0 => (0, 1),
        1..=0x4b => (op as usize, 1),
        OP_PUSHDATA1 => (read_len(script, start + 1, 1)?, 2),
        OP_PUSHDATA2 => (read_len(script, start + 1, 2)?, 3),
        OP_PUSHDATA4 => (read_len(script, start + 1, 4)?, 5),
        _ => return Err(ScriptError::ExpectedPush(start)),
    };

    let data_start = start + header;
    let data = script
        .get(data_start..data_start + len)
        .ok_or(ScriptError::TruncatedPush(start))?;
    *pos = data_start + len;
    Ok(data.to_vec())
}

fn read_len(script: &[u8], at: usize, width: usize) -> Result<usize, ScriptError> {
    let bytes = script
        .get(at..at + width)
        .ok_or(ScriptError::TruncatedPush(at - 1))?;
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf) as usize)
}

fn write_push(out: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => out.push(OP_0),
        len @ 1..=0x4b => out.push(len as u8),
        len @ 0x4c..=0xff => {
            out.push(OP_PUSHDATA1);
            out.push(len as u8);
        }
        len @ 0x100..=0xffff => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(len as u16).to_le_bytes());
        }
        len => {
            out.push(OP_PUSHDATA4);
            out.extend_from_slice(&(len as u32).to_le_bytes());
        }
    }
    out.extend_from_slice(data);
}
