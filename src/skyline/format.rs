//! Persisted factorisation binary format (spec section 6).
//!
//! A flat little-endian layout: a 4-byte magic, a version, a byte-order
//! marker, the DOF count and block count, the permutation, row scales,
//! factored diagonal, the skyline profile (`top`), the pivot arena, an
//! explicit panel-size table, then the upper/lower arenas, followed by a
//! CRC32 of everything before it. Grounded in the "store/reload trained
//! state" shape common to the teacher's own serde-derived model types,
//! adapted to a flat binary layout since the payload is bulk numeric
//! arrays rather than a document.

use std::io::{self, Read, Write};

use crc32fast::Hasher;

use crate::error::{SolverError, SolverResult};
use crate::skyline::blocks::{PanelRange, SkylineStorage};
use crate::skyline::reorder::Permutation;

const MAGIC: [u8; 4] = *b"SKLU";
const VERSION: u16 = 1;
const BYTE_ORDER_LITTLE: u8 = 0;

/// A self-contained factorisation ready to serialize. `scale` and `diag`
/// carry length `block_count * 4` (the padded DOF space) in memory, the
/// same convention `factor::factor` and `triangular::solve` use, but only
/// the first `n` real entries are persisted; padding is reconstructed as
/// `1.0` on read.
pub struct PersistedFactor {
    pub perm: Permutation,
    pub scale: Vec<f64>,
    pub diag: Vec<f64>,
    pub storage: SkylineStorage,
}

pub fn write<W: Write>(out: &mut W, factor: &PersistedFactor) -> SolverResult<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    put_u16(&mut buf, VERSION);
    buf.push(BYTE_ORDER_LITTLE);

    let n = factor.perm.perm.len();
    let block_count = factor.storage.block_count;
    put_u64(&mut buf, n as u64);
    put_u64(&mut buf, block_count as u64);

    for &p in &factor.perm.perm {
        put_u32(&mut buf, p as u32);
    }
    for &s in factor.scale[..n].iter() {
        put_f64(&mut buf, s);
    }
    for &d in factor.diag[..n].iter() {
        put_f64(&mut buf, d);
    }
    for &t in &factor.storage.top {
        put_u32(&mut buf, t as u32);
    }

    for &v in &factor.storage.pivot {
        put_f64(&mut buf, v);
    }
    for panel in &factor.storage.upper_panels {
        put_u32(&mut buf, panel.count as u32);
    }
    for &v in &factor.storage.upper {
        put_f64(&mut buf, v);
    }
    for &v in &factor.storage.lower {
        put_f64(&mut buf, v);
    }

    let mut hasher = Hasher::new();
    hasher.update(&buf);
    let crc = hasher.finalize();

    out.write_all(&buf).map_err(io_err)?;
    out.write_all(&crc.to_le_bytes()).map_err(io_err)?;
    Ok(())
}

pub fn read<R: Read>(input: &mut R) -> SolverResult<PersistedFactor> {
    let mut payload = Vec::new();
    input.read_to_end(&mut payload).map_err(io_err)?;
    if payload.len() < 4 {
        return Err(SolverError::CorruptStream("stream too short".into()));
    }
    let (body, crc_bytes) = payload.split_at(payload.len() - 4);
    let expected = u32::from_le_bytes(crc_bytes.try_into().unwrap());

    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != expected {
        return Err(SolverError::CorruptStream("checksum mismatch".into()));
    }

    let mut cursor = body;
    let magic = take(&mut cursor, 4)?;
    if magic != MAGIC {
        return Err(SolverError::CorruptStream("bad magic".into()));
    }
    let version = get_u16(&mut cursor)?;
    if version != VERSION {
        return Err(SolverError::CorruptStream(format!("unsupported version {version}")));
    }
    let byte_order = get_u8(&mut cursor)?;
    if byte_order != BYTE_ORDER_LITTLE {
        return Err(SolverError::CorruptStream(format!("unsupported byte order {byte_order}")));
    }

    let n = get_u64(&mut cursor)? as usize;
    let block_count = get_u64(&mut cursor)? as usize;

    let mut perm = Vec::with_capacity(n);
    for _ in 0..n {
        perm.push(get_u32(&mut cursor)? as usize);
    }
    let perm = Permutation::from_perm_checked(perm)?;

    let padded_n = block_count * 4;
    let mut scale = Vec::with_capacity(padded_n);
    for _ in 0..n {
        scale.push(get_f64(&mut cursor)?);
    }
    scale.resize(padded_n, 1.0);
    let mut diag = Vec::with_capacity(padded_n);
    for _ in 0..n {
        diag.push(get_f64(&mut cursor)?);
    }
    diag.resize(padded_n, 1.0);
    let mut top = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        top.push(get_u32(&mut cursor)? as usize);
    }

    let mut pivot = Vec::with_capacity(block_count * 16);
    for _ in 0..block_count * 16 {
        pivot.push(get_f64(&mut cursor)?);
    }

    let mut upper_sizes = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        upper_sizes.push(get_u32(&mut cursor)? as usize);
    }
    let (upper_panels, lower_panels) = rebuild_panels(&top, &upper_sizes);

    let upper_len: usize = upper_sizes.iter().map(|&c| c * 16).sum();
    let mut upper = Vec::with_capacity(upper_len);
    for _ in 0..upper_len {
        upper.push(get_f64(&mut cursor)?);
    }
    let lower_len = upper_len;
    let mut lower = Vec::with_capacity(lower_len);
    for _ in 0..lower_len {
        lower.push(get_f64(&mut cursor)?);
    }

    let storage = SkylineStorage {
        block_count,
        top,
        pivot,
        upper,
        upper_panels,
        lower,
        lower_panels,
    };

    Ok(PersistedFactor {
        perm,
        scale,
        diag,
        storage,
    })
}

/// Builds both panel tables from the persisted `upperSizes` field (the
/// authoritative source for panel extents on read, rather than
/// re-deriving `k - top[k]`; the lower arena shares the same sizes since
/// the profile is symmetric).
fn rebuild_panels(top: &[usize], upper_sizes: &[usize]) -> (Vec<PanelRange>, Vec<PanelRange>) {
    let mut upper_panels = Vec::with_capacity(top.len());
    let mut lower_panels = Vec::with_capacity(top.len());
    let mut upper_off = 0usize;
    let mut lower_off = 0usize;
    for &count in upper_sizes {
        upper_panels.push(PanelRange { start: upper_off, count });
        lower_panels.push(PanelRange { start: lower_off, count });
        upper_off += count * 16;
        lower_off += count * 16;
    }
    (upper_panels, lower_panels)
}

fn io_err(e: io::Error) -> SolverError {
    SolverError::CorruptStream(e.to_string())
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn take<'a>(cursor: &mut &'a [u8], len: usize) -> SolverResult<&'a [u8]> {
    if cursor.len() < len {
        return Err(SolverError::CorruptStream("unexpected end of stream".into()));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

fn get_u8(cursor: &mut &[u8]) -> SolverResult<u8> {
    Ok(take(cursor, 1)?[0])
}
fn get_u16(cursor: &mut &[u8]) -> SolverResult<u16> {
    Ok(u16::from_le_bytes(take(cursor, 2)?.try_into().unwrap()))
}
fn get_u32(cursor: &mut &[u8]) -> SolverResult<u32> {
    Ok(u32::from_le_bytes(take(cursor, 4)?.try_into().unwrap()))
}
fn get_u64(cursor: &mut &[u8]) -> SolverResult<u64> {
    Ok(u64::from_le_bytes(take(cursor, 8)?.try_into().unwrap()))
}
fn get_f64(cursor: &mut &[u8]) -> SolverResult<f64> {
    Ok(f64::from_le_bytes(take(cursor, 8)?.try_into().unwrap()))
}
