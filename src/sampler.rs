//! Date discovery by sparse probing.
//!
//! Populating a date picker needs "which calendar days have retained
//! data?", and downloading full history to answer it defeats the point of
//! ranged queries.  The sampler instead probes up to three small id
//! windows — newest, midpoint, oldest — decodes them, and reconstructs the
//! calendar dates they fall on from the sampling cadence.
//!
//! # Transport
//!
//! The gate's range endpoint is injected through [`RangeFetch`], keeping
//! the sampler testable without a network.  HTTP 416 ("requested range is
//! outside retained history") is a typed, expected outcome
//! ([`FetchOutcome::OutOfRange`]), not a failure.
//!
//! # Failure policy
//!
//! Probes are independent and tolerant: a failed, malformed, out-of-range
//! or empty probe is skipped (logged at `debug`).  All probes failing
//! yields an empty date list, never an error.

use crate::export::parse_export;
use crate::range::GateMeta;
use chrono::{DateTime, NaiveDate, TimeZone};
use std::collections::BTreeSet;
use thiserror::Error;

/// Ids probed on each side of a probe point.
pub const PROBE_HALF_WINDOW: u64 = 25;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

/// Result of one range request against the gate.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Raw export buffer bytes.
    Data(Vec<u8>),
    /// The requested id range is outside retained history (HTTP 416).
    OutOfRange,
}

/// Read-only range query against the gate's export endpoint.
///
/// `since_id..until_id` is half-open.  Implementations own retries,
/// timeouts and cancellation; the sampler issues each request exactly once.
pub trait RangeFetch {
    fn fetch_range(&self, since_id: u64, until_id: u64) -> Result<FetchOutcome, FetchError>;
}

/// Discovers which calendar dates have retained data.
pub struct DateSampler<'a, F: RangeFetch> {
    fetch: &'a F,
    meta:  GateMeta,
}

impl<'a, F: RangeFetch> DateSampler<'a, F> {
    pub fn new(fetch: &'a F, meta: GateMeta) -> Self {
        Self { fetch, meta }
    }

    /// Probe the retention window and return the distinct local dates seen,
    /// sorted newest-first.
    ///
    /// Dates are reconstructed from each item's rank within its probe
    /// window and the cadence, not from the record's transmitted timestamp;
    /// this tolerates cadence jitter at the cost of drift near retention
    /// edges.
    pub fn discover<Tz: TimeZone>(&self, tz: &Tz, now_ms: i64) -> Vec<NaiveDate> {
        if self.meta.interval_ms == 0 {
            log::warn!("date discovery disabled: sampling cadence unknown");
            return Vec::new();
        }

        let mut dates = BTreeSet::new();
        for probe in self.probe_ids() {
            let since = probe
                .saturating_sub(PROBE_HALF_WINDOW)
                .max(self.meta.oldest_id);
            let until = probe
                .saturating_add(PROBE_HALF_WINDOW)
                .min(self.meta.head_id);
            if since >= until {
                continue;
            }

            let buf = match self.fetch.fetch_range(since, until) {
                Ok(FetchOutcome::Data(buf)) => buf,
                Ok(FetchOutcome::OutOfRange) => {
                    log::debug!("probe {probe}: range [{since}, {until}) not retained");
                    continue;
                }
                Err(e) => {
                    log::debug!("probe {probe}: fetch failed: {e}");
                    continue;
                }
            };
            let export = match parse_export(&buf) {
                Ok(export) => export,
                Err(e) => {
                    log::debug!("probe {probe}: undecodable export: {e}");
                    continue;
                }
            };

            // Anchor the window's newest item on the cadence grid relative
            // to head, then step one interval per rank going backwards.
            let behind_head = self.meta.head_id.saturating_sub(until);
            let anchor_ms = now_ms - (behind_head * self.meta.interval_ms) as i64;
            for (rank, _) in export.records.iter().rev().enumerate() {
                let ts = anchor_ms - (rank as u64 * self.meta.interval_ms) as i64;
                if let Some(date) = local_date_of(ts, tz) {
                    dates.insert(date);
                }
            }
        }

        dates.into_iter().rev().collect()
    }

    /// Newest, midpoint, oldest — zero ids and duplicates dropped.
    fn probe_ids(&self) -> Vec<u64> {
        let head = self.meta.head_id;
        let oldest = self.meta.oldest_id;
        let mid = oldest + head.saturating_sub(oldest) / 2;

        let mut ids = Vec::with_capacity(3);
        for id in [head, mid, oldest] {
            if id > 0 && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

fn local_date_of<Tz: TimeZone>(ts_ms: i64, tz: &Tz) -> Option<NaiveDate> {
    let dt: DateTime<Tz> = tz.timestamp_millis_opt(ts_ms).earliest()?;
    Some(dt.date_naive())
}
