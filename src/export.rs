//! Export buffer decoder — header, item sequence, footer.
//!
//! # Layout
//!
//! An export buffer is `header(8) + item×N + footer(20)`, all little-endian.
//! Each item is an 8-byte record id followed by a fixed-size record body of
//! `record_size` bytes (currently 65): timestamp 8B, session 2B, dt 4B,
//! mac 6B, rssi 1B signed, format version 1B, sensor type 2B, payload
//! length 1B, then a fixed 40-byte payload slot of which only the first
//! `payload_len` bytes are meaningful.
//!
//! # Integrity policy
//!
//! The footer carries a CRC-32/ISO-HDLC over the raw item region and a
//! declared item count.  Neither is fatal on mismatch: the gate's flash is
//! the authority for record content, and a corrupted footer must not hide
//! records that already parsed cleanly.  Both checks are surfaced to the
//! caller through [`Integrity`] and logged at `warn`.  Structural problems
//! (bad magic, bad version, bad lengths) ARE fatal — a buffer that fails
//! them cannot be trusted at all.
//!
//! # Versioning
//!
//! Decoding dispatches on the header version.  Adding support for a future
//! format version means adding one arm to [`parse_export`]; callers never
//! change.  Unknown versions fail with [`ExportError::UnsupportedVersion`].

use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher;
use serde::{Serialize, Serializer};
use std::io::{self, Cursor, Read};
use thiserror::Error;

/// Header magic, ASCII "GDB2" read as a little-endian u32.
pub const HEADER_MAGIC: u32 = 0x3242_4447;
/// Footer magic, ASCII "END2" read as a little-endian u32.
pub const FOOTER_MAGIC: u32 = 0x3244_4E45;
/// The only export format version this build decodes.
pub const SUPPORTED_VERSION: u16 = 2;
/// Smallest record body the v2 layout can describe.
pub const MIN_RECORD_SIZE: u16 = 20;
/// Fixed payload slot size inside every record body.
pub const MAX_PAYLOAD_LEN: usize = 40;

pub const HEADER_SIZE: usize = 8;
pub const FOOTER_SIZE: usize = 20;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("export too small: {0} bytes")]
    TooSmall(usize),
    #[error("bad header magic: 0x{0:08x}")]
    BadHeaderMagic(u32),
    #[error("unsupported export version: {0}")]
    UnsupportedVersion(u16),
    #[error("unexpected record size: {0}")]
    BadRecordSize(u16),
    #[error("bad footer magic: 0x{0:08x}")]
    BadFooterMagic(u32),
    #[error("item region length {region} is not a multiple of item size {item}")]
    MalformedLength { region: usize, item: usize },
    #[error("payload length {0} exceeds the 40-byte slot")]
    PayloadOutOfBounds(u8),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Decoded structures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportHeader {
    pub version:     u16,
    /// Byte length of the record body that follows each 8-byte id.
    pub record_size: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportFooter {
    /// Item count as declared by the gate.  May disagree with the
    /// byte-derived count; see [`Integrity::count_ok`].
    pub count:   u32,
    /// CRC-32/ISO-HDLC over the raw item region, as stored by the gate.
    pub crc32:   u32,
    /// Record id of the final item.
    pub last_id: u64,
}

/// One telemetry record as stored on the gate.
///
/// `payload` holds exactly `payload_len` bytes; the unused tail of the
/// fixed 40-byte wire slot is skipped during decoding, never reinterpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub record_id:      u64,
    pub timestamp_ms:   u64,
    pub session_id:     u16,
    pub dt_ms:          u32,
    #[serde(serialize_with = "ser_mac")]
    pub mac:            [u8; 6],
    pub rssi:           i8,
    pub format_version: u8,
    pub sensor_type_id: u16,
    pub payload_len:    u8,
    pub payload:        Vec<u8>,
}

impl Record {
    /// Colon-separated lowercase hex, e.g. `aa:bb:cc:dd:ee:ff`.
    pub fn mac_str(&self) -> String {
        mac_to_str(&self.mac)
    }
}

/// Render a raw MAC as colon-separated lowercase hex.
pub fn mac_to_str(mac: &[u8; 6]) -> String {
    let mut s = String::with_capacity(17);
    for (i, b) in mac.iter().enumerate() {
        if i > 0 {
            s.push(':');
        }
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn ser_mac<S: Serializer>(mac: &[u8; 6], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&mac_to_str(mac))
}

/// Outcome of the tolerant footer checks.
///
/// Both flags being `true` means the buffer arrived exactly as the gate
/// wrote it.  Either being `false` is a transport-corruption signal that
/// callers should log or alert on — the records themselves are still
/// returned in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Integrity {
    /// Recomputed CRC over the item region equals the footer value.
    pub crc_ok:         bool,
    /// CRC this decoder computed (for diagnostics on mismatch).
    pub computed_crc32: u32,
    /// Footer count equals the byte-derived item count.
    pub count_ok:       bool,
}

/// A fully decoded export buffer.
#[derive(Debug, Clone, Serialize)]
pub struct Export {
    pub header:    ExportHeader,
    /// Records in wire order (ascending id by construction on the gate;
    /// the decoder does not re-sort or enforce monotonicity).
    pub records:   Vec<Record>,
    pub footer:    ExportFooter,
    pub integrity: Integrity,
}

impl Export {
    /// Byte-derived item count — the authoritative one.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_intact(&self) -> bool {
        self.integrity.crc_ok && self.integrity.count_ok
    }
}

// ── Decoder ──────────────────────────────────────────────────────────────────

/// Decode a raw export buffer.
///
/// Structural failures return an [`ExportError`]; CRC and count mismatches
/// do not — see [`Integrity`].
pub fn parse_export(buf: &[u8]) -> Result<Export, ExportError> {
    if buf.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(ExportError::TooSmall(buf.len()));
    }

    let mut cur = Cursor::new(buf);
    let magic = cur.read_u32::<LittleEndian>()?;
    if magic != HEADER_MAGIC {
        return Err(ExportError::BadHeaderMagic(magic));
    }
    let version = cur.read_u16::<LittleEndian>()?;
    let record_size = cur.read_u16::<LittleEndian>()?;

    match version {
        SUPPORTED_VERSION => parse_v2(buf, ExportHeader { version, record_size }),
        v => Err(ExportError::UnsupportedVersion(v)),
    }
}

fn parse_v2(buf: &[u8], header: ExportHeader) -> Result<Export, ExportError> {
    if header.record_size < MIN_RECORD_SIZE {
        return Err(ExportError::BadRecordSize(header.record_size));
    }

    let footer_off = buf.len() - FOOTER_SIZE;
    let mut cur = Cursor::new(&buf[footer_off..]);
    let footer_magic = cur.read_u32::<LittleEndian>()?;
    if footer_magic != FOOTER_MAGIC {
        return Err(ExportError::BadFooterMagic(footer_magic));
    }
    let footer = ExportFooter {
        count:   cur.read_u32::<LittleEndian>()?,
        crc32:   cur.read_u32::<LittleEndian>()?,
        last_id: cur.read_u64::<LittleEndian>()?,
    };

    let item_region = &buf[HEADER_SIZE..footer_off];
    let item_size = 8 + header.record_size as usize;
    if item_region.len() % item_size != 0 {
        return Err(ExportError::MalformedLength {
            region: item_region.len(),
            item:   item_size,
        });
    }
    let n = item_region.len() / item_size;

    // CRC covers the concatenated item bytes (id + record body), same as
    // computed on the gate.
    let mut hasher = Hasher::new();
    hasher.update(item_region);
    let computed_crc32 = hasher.finalize();
    let crc_ok = computed_crc32 == footer.crc32;
    if !crc_ok {
        log::warn!(
            "export CRC32 mismatch: computed=0x{computed_crc32:08x} footer=0x{:08x}",
            footer.crc32
        );
    }

    // The byte stream is the authority on count; the footer value is only
    // reported, not trusted.
    let count_ok = footer.count as usize == n;
    if !count_ok {
        log::warn!("export count mismatch: footer={} actual={n}", footer.count);
    }

    let mut records = Vec::with_capacity(n);
    let mut cur = Cursor::new(item_region);
    for _ in 0..n {
        records.push(read_record(&mut cur, header.record_size)?);
    }

    Ok(Export {
        header,
        records,
        footer,
        integrity: Integrity { crc_ok, computed_crc32, count_ok },
    })
}

fn read_record(cur: &mut Cursor<&[u8]>, record_size: u16) -> Result<Record, ExportError> {
    let start = cur.position();
    let record_id = cur.read_u64::<LittleEndian>()?;

    let timestamp_ms = cur.read_u64::<LittleEndian>()?;
    let session_id = cur.read_u16::<LittleEndian>()?;
    let dt_ms = cur.read_u32::<LittleEndian>()?;
    let mut mac = [0u8; 6];
    cur.read_exact(&mut mac)?;
    let rssi = cur.read_i8()?;
    let format_version = cur.read_u8()?;
    let sensor_type_id = cur.read_u16::<LittleEndian>()?;
    let payload_len = cur.read_u8()?;
    if payload_len as usize > MAX_PAYLOAD_LEN {
        return Err(ExportError::PayloadOutOfBounds(payload_len));
    }

    let mut slot = [0u8; MAX_PAYLOAD_LEN];
    cur.read_exact(&mut slot)?;
    let payload = slot[..payload_len as usize].to_vec();

    // Record bodies longer than the fields this decoder knows about are
    // permitted (record_size is gate-declared); skip the remainder.
    cur.set_position(start + 8 + record_size as u64);

    Ok(Record {
        record_id,
        timestamp_ms,
        session_id,
        dt_ms,
        mac,
        rssi,
        format_version,
        sensor_type_id,
        payload_len,
        payload,
    })
}
