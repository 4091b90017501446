//! Binary cache format for [`Modifier`](crate::Modifier) values.
//!
//! A cached modifier is a 32-byte fixed header followed by a bincode payload
//! holding the modifier's interchange entries (macros first, then rules).
//! Decoding re-parses every entry, so a cache can never produce a modifier
//! the text form could not.
//!
//! ## Wire Format
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"RMOD"
//! 4       2     Format version (u16, little-endian)
//! 6       2     Engine version (u16, little-endian)
//! 8       4     Flags (u32, reserved)
//! 12      4     Payload length in bytes (u32, little-endian)
//! 16      16    BLAKE3 hash of the payload (truncated to 16 bytes)
//! 32..    var   Bincode-encoded payload
//! ```
//!
//! The format version must match exactly; the engine version is
//! informational.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::RuleEntry;
use crate::types::{BuildError, Value};
use crate::Modifier;

const MAGIC: &[u8; 4] = b"RMOD";
const FORMAT_VERSION: u16 = 1;
const ENGINE_VERSION: u16 = 1;
const HEADER_SIZE: usize = 32;

/// Errors that can occur when serializing a [`Modifier`](crate::Modifier).
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to encode modifier: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("I/O error during serialization: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when deserializing a [`Modifier`](crate::Modifier).
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("not a remodel binary: invalid magic bytes")]
    BadMagic,

    #[error("incompatible format version: blob is v{blob}, engine supports v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("integrity check failed: BLAKE3 checksum mismatch")]
    ChecksumMismatch,

    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("I/O error during deserialization: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedModifier {
    metadata: CacheMetadata,
    entries: Vec<SerializedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMetadata {
    entry_count: usize,
    source_digest: Option<[u8; 32]>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializedEntry {
    expr: String,
    name: Option<String>,
    label: Option<String>,
    description: Option<String>,
    origin: Option<String>,
    /// Seconds and nanoseconds since the Unix epoch.
    created: Option<(i64, u32)>,
    meta: Vec<(String, SerializedValue)>,
}

// Externally tagged: bincode cannot decode `Value`'s untagged JSON form.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum SerializedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

fn serialize_value(value: &Value) -> SerializedValue {
    match value {
        Value::Int(v) => SerializedValue::Int(*v),
        Value::Float(v) => SerializedValue::Float(*v),
        Value::Bool(v) => SerializedValue::Bool(*v),
        Value::String(v) => SerializedValue::Str(v.clone()),
    }
}

fn deserialize_value(value: SerializedValue) -> Value {
    match value {
        SerializedValue::Int(v) => Value::Int(v),
        SerializedValue::Float(v) => Value::Float(v),
        SerializedValue::Bool(v) => Value::Bool(v),
        SerializedValue::Str(v) => Value::String(v),
    }
}

fn serialize_entry(entry: RuleEntry) -> SerializedEntry {
    SerializedEntry {
        expr: entry.expr,
        name: entry.name,
        label: entry.label,
        description: entry.description,
        origin: entry.origin,
        created: entry
            .created
            .map(|t| (t.timestamp(), t.timestamp_subsec_nanos())),
        meta: entry
            .meta
            .iter()
            .map(|(k, v)| (k.clone(), serialize_value(v)))
            .collect(),
    }
}

fn deserialize_entry(entry: SerializedEntry) -> Result<RuleEntry, DeserializeError> {
    let created = match entry.created {
        Some((secs, nanos)) => Some(DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
            DeserializeError::Validation(format!("invalid timestamp {secs}.{nanos:09}"))
        })?),
        None => None,
    };
    Ok(RuleEntry {
        expr: entry.expr,
        name: entry.name,
        label: entry.label,
        description: entry.description,
        created,
        origin: entry.origin,
        meta: entry
            .meta
            .into_iter()
            .map(|(k, v)| (k, deserialize_value(v)))
            .collect::<BTreeMap<_, _>>(),
    })
}

struct Header {
    format_version: u16,
    payload_len: u32,
    digest: [u8; 16],
}

fn write_header(buf: &mut Vec<u8>, payload: &[u8]) {
    let hash = blake3::hash(payload);

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&ENGINE_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags (reserved)
    #[allow(clippy::cast_possible_truncation)] // rule sets never approach 4 GiB
    let payload_len = payload.len() as u32;
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(&hash.as_bytes()[..16]);
}

#[allow(clippy::cast_possible_truncation)] // HEADER_SIZE is 32
fn read_header(bytes: &[u8]) -> Result<Header, DeserializeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DeserializeError::LengthMismatch {
            expected: HEADER_SIZE as u32,
            actual: bytes.len(),
        });
    }
    if &bytes[0..4] != MAGIC {
        return Err(DeserializeError::BadMagic);
    }

    let mut digest = [0u8; 16];
    digest.copy_from_slice(&bytes[16..32]);
    Ok(Header {
        format_version: u16::from_le_bytes([bytes[4], bytes[5]]),
        payload_len: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        digest,
    })
}

fn read_payload(bytes: &[u8]) -> Result<SerializedModifier, DeserializeError> {
    let header = read_header(bytes)?;
    if header.format_version != FORMAT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: header.format_version,
            supported: FORMAT_VERSION,
        });
    }

    let payload_end = HEADER_SIZE + header.payload_len as usize;
    if bytes.len() != payload_end {
        return Err(DeserializeError::LengthMismatch {
            expected: header.payload_len,
            actual: bytes.len() - HEADER_SIZE,
        });
    }
    let payload = &bytes[HEADER_SIZE..payload_end];
    if blake3::hash(payload).as_bytes()[..16] != header.digest {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (serialized, _): (SerializedModifier, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    if serialized.metadata.entry_count != serialized.entries.len() {
        return Err(DeserializeError::Validation(format!(
            "metadata declares {} entries, payload has {}",
            serialized.metadata.entry_count,
            serialized.entries.len()
        )));
    }
    Ok(serialized)
}

pub(crate) fn encode(
    modifier: &Modifier,
    source_text: Option<&str>,
) -> Result<Vec<u8>, SerializeError> {
    let entries: Vec<_> = modifier
        .to_entries()
        .into_iter()
        .map(serialize_entry)
        .collect();
    let serialized = SerializedModifier {
        metadata: CacheMetadata {
            entry_count: entries.len(),
            source_digest: source_text.map(|s| *blake3::hash(s.as_bytes()).as_bytes()),
        },
        entries,
    };
    let payload = bincode::serde::encode_to_vec(&serialized, bincode::config::standard())?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_header(&mut buf, &payload);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Modifier, DeserializeError> {
    let serialized = read_payload(bytes)?;
    let entries = serialized
        .entries
        .into_iter()
        .map(deserialize_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let modifier = Modifier::from_entries(entries)?;
    if let Some(warning) = modifier.warnings().first() {
        return Err(DeserializeError::Validation(warning.to_string()));
    }
    Ok(modifier)
}

/// Whether `bytes` was written from exactly `source_text`. A cache written
/// without source text never matches.
pub(crate) fn matches_source(bytes: &[u8], source_text: &str) -> Result<bool, DeserializeError> {
    let serialized = read_payload(bytes)?;
    Ok(serialized.metadata.source_digest
        == Some(*blake3::hash(source_text.as_bytes()).as_bytes()))
}
