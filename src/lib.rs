//! Client-side toolkit for the gate telemetry export format.
//!
//! The "gate" is an embedded logger that serves its append-only record
//! history as binary export buffers keyed by a monotonically increasing
//! 64-bit record id, with no timestamp index.  This crate covers the
//! client half of that protocol:
//!
//! - [`export`] — decode an export buffer (header, items, footer) with a
//!   tolerant CRC32/count integrity check;
//! - [`payload`] — decode a sensor payload into named, scaled fields
//!   using the per-sensor schema the gate serves as JSON;
//! - [`range`] — map a calendar date onto a record-id window using the
//!   gate's fixed sampling cadence;
//! - [`sampler`] — probe a few id windows to discover which dates have
//!   retained data, for day-based browsing.
//!
//! Transport is a caller concern throughout: the library consumes byte
//! buffers and JSON values and never opens a connection itself.  The one
//! component that needs data on demand, the [`sampler::DateSampler`],
//! takes an injected [`sampler::RangeFetch`] implementation.

pub mod export;
pub mod payload;
pub mod range;
pub mod sampler;

pub use export::{parse_export, Export, ExportError, Integrity, Record};
pub use payload::{decode_payload, FieldType, SensorSchema};
pub use range::{resolve_day_range, resolve_day_range_local, DayRange, GateMeta, RangeError};
pub use sampler::{DateSampler, FetchError, FetchOutcome, RangeFetch};
