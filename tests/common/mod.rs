//! Shared helpers for building synthetic export buffers.
//!
//! The library deliberately ships no encoder (the gate firmware owns the
//! write side), so the tests carry their own.

use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use gatelink::export::{Record, FOOTER_MAGIC, HEADER_MAGIC, MAX_PAYLOAD_LEN, SUPPORTED_VERSION};

/// Record body size of the current gate firmware build.
pub const RECORD_SIZE: u16 = 65;

pub fn sample_record(record_id: u64) -> Record {
    Record {
        record_id,
        timestamp_ms: 1_700_000_000_000 + record_id * 30_000,
        session_id: 3,
        dt_ms: 30_000,
        mac: [0xaa, 0xbb, 0xcc, 0x00, 0x11, 0x22],
        rssi: -67,
        format_version: 1,
        sensor_type_id: 4,
        payload_len: 4,
        payload: vec![0x10, 0x27, 0xfe, 0x01],
    }
}

pub fn encode_record(buf: &mut Vec<u8>, rec: &Record, record_size: u16) {
    buf.write_u64::<LittleEndian>(rec.record_id).unwrap();

    let body_start = buf.len();
    buf.write_u64::<LittleEndian>(rec.timestamp_ms).unwrap();
    buf.write_u16::<LittleEndian>(rec.session_id).unwrap();
    buf.write_u32::<LittleEndian>(rec.dt_ms).unwrap();
    buf.extend_from_slice(&rec.mac);
    buf.write_i8(rec.rssi).unwrap();
    buf.write_u8(rec.format_version).unwrap();
    buf.write_u16::<LittleEndian>(rec.sensor_type_id).unwrap();
    buf.write_u8(rec.payload_len).unwrap();

    let mut slot = [0u8; MAX_PAYLOAD_LEN];
    slot[..rec.payload.len()].copy_from_slice(&rec.payload);
    buf.extend_from_slice(&slot);

    // Pad out oversized record bodies declared by a newer firmware.
    while buf.len() - body_start < record_size as usize {
        buf.push(0);
    }
}

pub fn encode_export(records: &[Record], record_size: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(HEADER_MAGIC).unwrap();
    buf.write_u16::<LittleEndian>(SUPPORTED_VERSION).unwrap();
    buf.write_u16::<LittleEndian>(record_size).unwrap();

    let items_start = buf.len();
    for rec in records {
        encode_record(&mut buf, rec, record_size);
    }
    let mut hasher = Hasher::new();
    hasher.update(&buf[items_start..]);
    let crc = hasher.finalize();

    buf.write_u32::<LittleEndian>(FOOTER_MAGIC).unwrap();
    buf.write_u32::<LittleEndian>(records.len() as u32).unwrap();
    buf.write_u32::<LittleEndian>(crc).unwrap();
    buf.write_u64::<LittleEndian>(records.last().map(|r| r.record_id).unwrap_or(0))
        .unwrap();
    buf
}
