// src/tdigest/wire.rs
//
// Canonical TDigest binary codec ("TDKV" format), used for per-key persistence.
//
// Layout (little-endian):
//
//   header (80 bytes):
//     0..4   : magic = b"TDKV"
//     4      : version
//     5      : scale_code (u8)
//     6..8   : reserved (zero)
//     8..16  : compression        (f64)
//    16..24  : min                (f64)
//    24..32  : max                (f64)
//    32..40  : merged_weight      (f64)
//    40..48  : unmerged_weight    (f64)
//    48..56  : total_compressions (u64)
//    56..64  : centroid_count     (u64)
//    64..72  : unmerged_count     (u64)
//    72..80  : reserved (zero)
//
//   payload:
//     centroid_count × { mean(f64), weight(f64) }
//     unmerged_count × { value(f64), weight(f64) }
//
// Encoding compresses the live digest first, so a freshly persisted blob never
// carries buffered samples; decoding still accepts them.

use thiserror::Error;

use crate::tdigest::centroids::{is_sorted_by_mean, total_weight, Centroid};
use crate::tdigest::scale::ScaleFamily;
use crate::tdigest::{TDigest, EMPTY_MAX, EMPTY_MIN, MAX_COMPRESSION};
use crate::{TdError, TdResult};

const MAGIC: &[u8; 4] = b"TDKV";
const VERSION_V1: u8 = 1;
const HEADER_LEN: usize = 80;
const PAIR_LEN: usize = 16;
const WEIGHT_TOL: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid TDKV magic header")]
    InvalidMagic,
    #[error("unsupported TDKV version: {0}")]
    UnsupportedVersion(u8),
    #[error("invalid TDKV scale code: {0}")]
    InvalidScale(u8),
    #[error("invalid TDKV header: {0}")]
    InvalidHeader(&'static str),
    #[error("invalid TDKV payload: {0}")]
    InvalidPayload(&'static str),
}

impl From<WireError> for TdError {
    fn from(err: WireError) -> Self {
        TdError::corrupt(err.to_string())
    }
}

pub type WireResult<T> = Result<T, WireError>;

/* ============================
 * Small helpers
 * ============================ */

#[inline]
fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
fn read_u64(bytes: &[u8], offset: &mut usize) -> WireResult<u64> {
    let end = *offset + 8;
    let Some(slice) = bytes.get(*offset..end) else {
        return Err(WireError::InvalidHeader("truncated u64"));
    };
    let mut arr = [0u8; 8];
    arr.copy_from_slice(slice);
    *offset = end;
    Ok(u64::from_le_bytes(arr))
}

#[inline]
fn read_f64(bytes: &[u8], offset: &mut usize) -> WireResult<f64> {
    Ok(f64::from_bits(read_u64(bytes, offset)?))
}

#[inline]
fn read_pair(bytes: &[u8], offset: &mut usize) -> WireResult<(f64, f64)> {
    let a = read_f64(bytes, offset).map_err(|_| WireError::InvalidPayload("truncated pair"))?;
    let b = read_f64(bytes, offset).map_err(|_| WireError::InvalidPayload("truncated pair"))?;
    Ok((a, b))
}

#[inline]
fn weights_agree(header: f64, payload: f64) -> bool {
    (header - payload).abs() <= WEIGHT_TOL * header.abs().max(1.0)
}

/* ============================
 * Encode
 * ============================ */

/// Serialize the full digest state. Forces a compression pass first.
pub fn encode_digest(td: &mut TDigest) -> Vec<u8> {
    td.compress();

    let cents = td.centroids();
    let samples = td.unmerged();
    let mut buf = Vec::with_capacity(HEADER_LEN + PAIR_LEN * (cents.len() + samples.len()));

    // magic + version + scale + reserved
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);
    buf.push(td.scale().code());
    buf.extend_from_slice(&[0u8; 2]);

    write_f64(&mut buf, td.compression());
    write_f64(&mut buf, td.min());
    write_f64(&mut buf, td.max());
    write_f64(&mut buf, td.merged_weight());
    write_f64(&mut buf, td.unmerged_weight());
    write_u64(&mut buf, td.total_compressions());
    write_u64(&mut buf, cents.len() as u64);
    write_u64(&mut buf, samples.len() as u64);
    buf.extend_from_slice(&[0u8; 8]);

    debug_assert_eq!(buf.len(), HEADER_LEN);

    for c in cents {
        write_f64(&mut buf, c.mean());
        write_f64(&mut buf, c.weight());
    }
    for &(v, w) in samples {
        write_f64(&mut buf, v);
        write_f64(&mut buf, w);
    }
    buf
}

/* ============================
 * Decode
 * ============================ */

/// Rebuild a digest from [`encode_digest`] output, validating every field.
pub fn decode_digest(bytes: &[u8]) -> TdResult<TDigest> {
    Ok(decode_inner(bytes)?)
}

fn decode_inner(bytes: &[u8]) -> WireResult<TDigest> {
    if bytes.len() < HEADER_LEN {
        return Err(WireError::InvalidHeader("buffer too small"));
    }
    if &bytes[0..4] != MAGIC {
        return Err(WireError::InvalidMagic);
    }
    let version = bytes[4];
    if version != VERSION_V1 {
        return Err(WireError::UnsupportedVersion(version));
    }
    let scale = ScaleFamily::from_code(bytes[5]).ok_or(WireError::InvalidScale(bytes[5]))?;

    let mut offset = 8;
    let compression = read_f64(bytes, &mut offset)?;
    let min = read_f64(bytes, &mut offset)?;
    let max = read_f64(bytes, &mut offset)?;
    let merged_weight = read_f64(bytes, &mut offset)?;
    let unmerged_weight = read_f64(bytes, &mut offset)?;
    let total_compressions = read_u64(bytes, &mut offset)?;
    let centroid_count = read_u64(bytes, &mut offset)? as usize;
    let unmerged_count = read_u64(bytes, &mut offset)? as usize;
    offset += 8;
    debug_assert_eq!(offset, HEADER_LEN);

    if !compression.is_finite() || compression <= 0.0 {
        return Err(WireError::InvalidHeader("compression must be positive"));
    }
    if compression > MAX_COMPRESSION {
        return Err(WireError::InvalidHeader("compression above ceiling"));
    }
    for w in [merged_weight, unmerged_weight] {
        if !w.is_finite() || w < 0.0 {
            return Err(WireError::InvalidHeader("invalid weight total"));
        }
    }
    if !(merged_weight + unmerged_weight).is_finite() {
        return Err(WireError::InvalidHeader("total weight overflows"));
    }

    let expected_payload = centroid_count
        .checked_add(unmerged_count)
        .and_then(|n| n.checked_mul(PAIR_LEN))
        .ok_or(WireError::InvalidPayload("overflow computing payload size"))?;
    if bytes.len() - HEADER_LEN != expected_payload {
        return Err(WireError::InvalidPayload(
            "payload length does not match node counts",
        ));
    }

    let mut centroids = Vec::with_capacity(centroid_count);
    for _ in 0..centroid_count {
        let (mean, weight) = read_pair(bytes, &mut offset)?;
        if !mean.is_finite() {
            return Err(WireError::InvalidPayload("non-finite centroid mean"));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(WireError::InvalidPayload("invalid centroid weight"));
        }
        centroids.push(Centroid::new(mean, weight));
    }
    if !is_sorted_by_mean(&centroids) {
        return Err(WireError::InvalidPayload("centroid means not monotonic"));
    }

    let mut unmerged = Vec::with_capacity(unmerged_count);
    for _ in 0..unmerged_count {
        let (value, weight) = read_pair(bytes, &mut offset)?;
        if !value.is_finite() {
            return Err(WireError::InvalidPayload("non-finite sample value"));
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(WireError::InvalidPayload("invalid sample weight"));
        }
        unmerged.push((value, weight));
    }

    if !weights_agree(merged_weight, total_weight(&centroids)) {
        return Err(WireError::InvalidPayload(
            "merged weight disagrees with centroids",
        ));
    }
    let sample_w: f64 = unmerged.iter().map(|&(_, w)| w).sum();
    if !weights_agree(unmerged_weight, sample_w) {
        return Err(WireError::InvalidPayload(
            "unmerged weight disagrees with samples",
        ));
    }

    if centroids.is_empty() && unmerged.is_empty() {
        if min != EMPTY_MIN || max != EMPTY_MAX {
            return Err(WireError::InvalidHeader("empty digest without sentinels"));
        }
    } else {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(WireError::InvalidHeader("invalid min/max"));
        }
        if centroids.iter().any(|c| c.mean() < min || c.mean() > max) {
            return Err(WireError::InvalidPayload("centroid mean outside min/max"));
        }
        if unmerged.iter().any(|&(v, _)| v < min || v > max) {
            return Err(WireError::InvalidPayload("sample outside min/max"));
        }
    }

    Ok(TDigest::from_parts(
        compression,
        scale,
        centroids,
        unmerged,
        min,
        max,
        merged_weight,
        unmerged_weight,
        total_compressions,
    ))
}

impl TDigest {
    /// Serialize via [`encode_digest`]; compresses first.
    pub fn to_bytes(&mut self) -> Vec<u8> {
        encode_digest(self)
    }

    /// Deserialize via [`decode_digest`].
    pub fn from_bytes(bytes: &[u8]) -> TdResult<TDigest> {
        decode_digest(bytes)
    }
}
