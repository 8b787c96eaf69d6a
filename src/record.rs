// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Write-ahead log - Record codec
//
// Defines the WAL record struct and its binary on-disk encoding. Records are
// opaque to their payload: the WAL never interprets `payload` beyond hashing
// it into the CRC. Wire format (all integers little-endian):
//
//   [4 bytes: frame length (u32)]     -- length of the body that follows
//   body := field*
//   field := [1 byte: tag][varint: len][len bytes: value]
//     tag 1: seq        -- 8 raw bytes, u64 LE
//     tag 2: payload     -- `len` raw bytes
//     tag 3: crc          -- 4 raw bytes, u32 LE
//     tag 4: is_checkpoint -- 1 raw byte, 0x01; emitted only when true
//
// Fields are written in tag order 1, 2, 3, 4 (4 omitted when false). Decoding
// does not require a fixed order, but the reference encoder always produces
// this order, and that ordering is part of the on-disk compatibility
// contract.

use crc32fast::Hasher as Crc32Hasher;

use crate::error::{WalError, WalResult};

const TAG_SEQ: u8 = 1;
const TAG_PAYLOAD: u8 = 2;
const TAG_CRC: u8 = 3;
const TAG_CHECKPOINT: u8 = 4;

/// A single record in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Monotonically increasing sequence number assigned by the writer.
    pub seq: u64,
    /// Opaque payload bytes. Never interpreted by the WAL.
    pub payload: Vec<u8>,
    /// Whether this record is a checkpoint marker.
    pub is_checkpoint: bool,
    /// CRC32 (IEEE) over `payload ++ low_byte(seq)`.
    pub crc: u32,
}

impl Record {
    /// Build a new ordinary (non-checkpoint) record, computing its CRC.
    pub fn new(seq: u64, payload: Vec<u8>) -> Self {
        let crc = compute_crc32(&payload, seq);
        Self {
            seq,
            payload,
            is_checkpoint: false,
            crc,
        }
    }

    /// Build a new checkpoint record, computing its CRC.
    pub fn new_checkpoint(seq: u64, payload: Vec<u8>) -> Self {
        let crc = compute_crc32(&payload, seq);
        Self {
            seq,
            payload,
            is_checkpoint: true,
            crc,
        }
    }

    /// Recompute the CRC from `payload`/`seq` and compare against the stored
    /// value.
    pub fn verify_crc(&self) -> bool {
        compute_crc32(&self.payload, self.seq) == self.crc
    }

    /// Serialize this record into its complete framed form: the 4-byte
    /// length prefix followed by the field-tagged body.
    ///
    /// Encoding is total over well-formed `Record` values; it cannot fail.
    pub fn encode_frame(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8 + self.payload.len() + 16);

        body.push(TAG_SEQ);
        push_varint(&mut body, 8);
        body.extend_from_slice(&self.seq.to_le_bytes());

        body.push(TAG_PAYLOAD);
        push_varint(&mut body, self.payload.len() as u64);
        body.extend_from_slice(&self.payload);

        body.push(TAG_CRC);
        push_varint(&mut body, 4);
        body.extend_from_slice(&self.crc.to_le_bytes());

        if self.is_checkpoint {
            body.push(TAG_CHECKPOINT);
            push_varint(&mut body, 1);
            body.push(0x01);
        }

        body
    }

    /// Decode a record body (the bytes immediately following the 4-byte
    /// frame length prefix). `segment_name` and `offset` are used only to
    /// produce a useful `CorruptedFrame` error.
    pub fn decode_body(body: &[u8], segment_name: &str, offset: u64) -> WalResult<Self> {
        let corrupt = |reason: &str| WalError::CorruptedFrame {
            offset,
            segment: segment_name.to_string(),
            reason: reason.to_string(),
        };

        let mut seq: Option<u64> = None;
        let mut payload: Option<Vec<u8>> = None;
        let mut crc: Option<u32> = None;
        let mut is_checkpoint = false;

        let mut pos = 0usize;
        while pos < body.len() {
            let tag = body[pos];
            pos += 1;
            let (len, varint_size) =
                read_varint(&body[pos..]).ok_or_else(|| corrupt("truncated field length"))?;
            pos += varint_size;
            let len = len as usize;
            if pos + len > body.len() {
                return Err(corrupt("field value runs past end of body"));
            }
            let value = &body[pos..pos + len];

            match tag {
                TAG_SEQ => {
                    if len != 8 {
                        return Err(corrupt("seq field has wrong width"));
                    }
                    seq = Some(u64::from_le_bytes(value.try_into().unwrap()));
                }
                TAG_PAYLOAD => {
                    payload = Some(value.to_vec());
                }
                TAG_CRC => {
                    if len != 4 {
                        return Err(corrupt("crc field has wrong width"));
                    }
                    crc = Some(u32::from_le_bytes(value.try_into().unwrap()));
                }
                TAG_CHECKPOINT => {
                    is_checkpoint = len == 1 && value[0] != 0;
                }
                _ => {
                    // Unknown tag: ignore for forward compatibility.
                }
            }

            pos += len;
        }

        let seq = seq.ok_or_else(|| corrupt("missing seq field"))?;
        let payload = payload.unwrap_or_default();
        let crc = crc.ok_or_else(|| corrupt("missing crc field"))?;

        Ok(Self {
            seq,
            payload,
            is_checkpoint,
            crc,
        })
    }
}

/// Compute a CRC32 (IEEE) checksum over `payload` concatenated with the low
/// byte of `seq`.
pub fn compute_crc32(payload: &[u8], seq: u64) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(payload);
    hasher.update(&[(seq & 0xFF) as u8]);
    hasher.finalize()
}

fn push_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Returns `(value, bytes_consumed)`, or `None` if `data` ends before a
/// terminating byte is found.
fn read_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    None
}
