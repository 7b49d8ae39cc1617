//! Fixed, versioned, little-endian wire types for collective exchanges.
//!
//! Every message is a [`WireHdr`] followed by a [`WireCount`] and that many
//! fixed-size records. Receivers never assume alignment of the incoming
//! buffer; records are read with `pod_read_unaligned`.

use crate::cdr_error::CdrError;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds.
pub mod kind {
    pub const MATRIX_ENTRIES: u16 = 1;
    pub const VECTOR_ENTRIES: u16 = 2;
    pub const GHOST_REQUEST: u16 = 3;
    pub const GHOST_VALUES: u16 = 4;
    pub const SCALARS: u16 = 5;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }

    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }

    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }

    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// One off-process matrix contribution `(row, col, value)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireEntry {
    pub row_le: u64,
    pub col_le: u64,
    pub value_bits_le: u64,
}

impl WireEntry {
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Self {
            row_le: (row as u64).to_le(),
            col_le: (col as u64).to_le(),
            value_bits_le: value.to_bits().to_le(),
        }
    }

    pub fn decode(&self) -> (usize, usize, f64) {
        (
            u64::from_le(self.row_le) as usize,
            u64::from_le(self.col_le) as usize,
            f64::from_bits(u64::from_le(self.value_bits_le)),
        )
    }
}

/// An `(index, value)` pair: vector contributions and ghost values.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireValue {
    pub index_le: u64,
    pub value_bits_le: u64,
}

impl WireValue {
    pub fn new(index: usize, value: f64) -> Self {
        Self {
            index_le: (index as u64).to_le(),
            value_bits_le: value.to_bits().to_le(),
        }
    }

    pub fn index(&self) -> usize {
        u64::from_le(self.index_le) as usize
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(u64::from_le(self.value_bits_le))
    }
}

/// A bare global index (ghost requests).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireIndex {
    pub index_le: u64,
}

impl WireIndex {
    pub fn new(index: usize) -> Self {
        Self {
            index_le: (index as u64).to_le(),
        }
    }

    pub fn get(&self) -> usize {
        u64::from_le(self.index_le) as usize
    }
}

/// A scalar for reductions and status agreement.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireScalar {
    pub bits_le: u64,
}

impl WireScalar {
    pub fn new(value: f64) -> Self {
        Self {
            bits_le: value.to_bits().to_le(),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WireEntry>(), 24);
const_assert_eq!(size_of::<WireValue>(), 16);
const_assert_eq!(size_of::<WireIndex>(), 8);
const_assert_eq!(size_of::<WireScalar>(), 8);

const PREFIX: usize = size_of::<WireHdr>() + size_of::<WireCount>();

/// Frame `records` as a message of the given kind.
pub fn encode<T: Pod>(kind: u16, records: &[T]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PREFIX + records.len() * size_of::<T>());
    buf.extend_from_slice(bytemuck::bytes_of(&WireHdr::new(kind)));
    buf.extend_from_slice(bytemuck::bytes_of(&WireCount::new(records.len())));
    buf.extend_from_slice(bytemuck::cast_slice(records));
    buf
}

/// Decode a message produced by [`encode`], checking version, kind and length.
///
/// An empty buffer decodes to no records.
pub fn decode<T: Pod>(kind: u16, bytes: &[u8]) -> Result<Vec<T>, CdrError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < PREFIX {
        return Err(CdrError::Wire(format!(
            "message of {} bytes is shorter than its header",
            bytes.len()
        )));
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..size_of::<WireHdr>()]);
    if hdr.version() != WIRE_VERSION {
        return Err(CdrError::Wire(format!(
            "wire version {} (expected {WIRE_VERSION})",
            hdr.version()
        )));
    }
    if hdr.kind() != kind {
        return Err(CdrError::Wire(format!(
            "message kind {} (expected {kind})",
            hdr.kind()
        )));
    }
    let count: WireCount = bytemuck::pod_read_unaligned(&bytes[size_of::<WireHdr>()..PREFIX]);
    let body = &bytes[PREFIX..];
    let expected = count.get() * size_of::<T>();
    if body.len() != expected {
        return Err(CdrError::Wire(format!(
            "expected {expected} payload bytes, got {}",
            body.len()
        )));
    }
    Ok(body
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_survive_framing() {
        let msg = encode(kind::MATRIX_ENTRIES, &[WireEntry::new(3, 7, -0.25)]);
        let out: Vec<WireEntry> = decode(kind::MATRIX_ENTRIES, &msg).unwrap();
        assert_eq!(out[0].decode(), (3, 7, -0.25));
    }

    #[test]
    fn unaligned_buffer_is_fine() {
        let msg = encode(kind::GHOST_VALUES, &[WireValue::new(1, 2.5)]);
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&msg);
        let out: Vec<WireValue> = decode(kind::GHOST_VALUES, &shifted[1..]).unwrap();
        assert_eq!((out[0].index(), out[0].value()), (1, 2.5));
    }

    #[test]
    fn kind_and_length_are_checked() {
        let msg = encode(kind::GHOST_REQUEST, &[WireIndex::new(4)]);
        assert!(decode::<WireIndex>(kind::SCALARS, &msg).is_err());
        assert!(decode::<WireIndex>(kind::GHOST_REQUEST, &msg[..msg.len() - 1]).is_err());
        assert!(decode::<WireIndex>(kind::GHOST_REQUEST, &[]).unwrap().is_empty());
    }
}
