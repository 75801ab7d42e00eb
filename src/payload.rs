//! Schema-driven payload decoding.
//!
//! Each record carries an opaque sensor payload; the gate serves a per
//! sensor-type schema (`/api/schema?type=N`) describing it as an ordered
//! list of `{key, type, scale}` fields.  The schema endpoint has emitted
//! both numeric type codes and string mnemonics across firmware revisions,
//! so deserialization accepts either; tags this build does not recognise
//! decode to "skip this field" rather than failing the whole payload.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// ── Field types ──────────────────────────────────────────────────────────────

/// Wire type of one schema field.  Numeric codes match the gate firmware's
/// field-type constants and are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl FieldType {
    /// Byte width of the encoded value.
    pub fn width(self) -> usize {
        match self {
            FieldType::I8 | FieldType::U8 => 1,
            FieldType::I16 | FieldType::U16 => 2,
            FieldType::I32 | FieldType::U32 => 4,
        }
    }

    /// Resolve the gate's numeric type code.  Unknown codes yield `None`.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(FieldType::I8),
            1 => Some(FieldType::U8),
            2 => Some(FieldType::I16),
            3 => Some(FieldType::U16),
            4 => Some(FieldType::I32),
            5 => Some(FieldType::U32),
            _ => None,
        }
    }

    /// Resolve a string mnemonic.  Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "i8" => Some(FieldType::I8),
            "u8" => Some(FieldType::U8),
            "i16" => Some(FieldType::I16),
            "u16" => Some(FieldType::U16),
            "i32" => Some(FieldType::I32),
            "u32" => Some(FieldType::U32),
            _ => None,
        }
    }
}

/// Accept `"u16"`, `3`, a missing tag, or an unrecognised tag — the last
/// two decode to `None` (field skipped), matching the dashboard's tolerant
/// behaviour.
fn de_field_type<'de, D: Deserializer<'de>>(d: D) -> Result<Option<FieldType>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tag {
        Code(u64),
        Name(String),
    }

    Ok(match Option::<Tag>::deserialize(d)? {
        Some(Tag::Code(c)) => FieldType::from_code(c),
        Some(Tag::Name(n)) => FieldType::from_name(&n),
        None => None,
    })
}

// ── Schema ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaField {
    pub key: String,
    #[serde(rename = "type", default, deserialize_with = "de_field_type")]
    pub ty: Option<FieldType>,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// Ordered field layout for one sensor type.  Immutable reference data,
/// fetched once per `sensor_type_id` and shared across records.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorSchema {
    pub fields: Vec<SchemaField>,
}

// ── Decoder ──────────────────────────────────────────────────────────────────

/// Decode a record payload against its sensor schema.
///
/// Walks the schema in order over `payload` (exactly `payload_len` bytes of
/// the record).  Tolerances, all deliberate:
/// - offset reached the end → stop; remaining fields are simply absent;
/// - unrecognised type tag → field skipped, offset unchanged;
/// - too few bytes left for this field's width → field skipped, offset
///   unchanged (a narrower later field may still decode);
/// - `scale` of exactly 0 means "no scaling requested", never "force to
///   zero"; a scale of exactly 1 is not applied either.
pub fn decode_payload(payload: &[u8], schema: &SensorSchema) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();
    let mut off = 0usize;

    for field in &schema.fields {
        if off >= payload.len() {
            break;
        }
        let Some(ty) = field.ty else { continue };
        if off + ty.width() > payload.len() {
            continue;
        }

        let raw = match ty {
            FieldType::I8 => payload[off] as i8 as f64,
            FieldType::U8 => payload[off] as f64,
            FieldType::I16 => LittleEndian::read_i16(&payload[off..]) as f64,
            FieldType::U16 => LittleEndian::read_u16(&payload[off..]) as f64,
            FieldType::I32 => LittleEndian::read_i32(&payload[off..]) as f64,
            FieldType::U32 => LittleEndian::read_u32(&payload[off..]) as f64,
        };
        off += ty.width();

        let value = match field.scale {
            Some(s) if s != 0.0 && s != 1.0 => raw * s,
            _ => raw,
        };
        values.insert(field.key.clone(), value);
    }

    values
}
