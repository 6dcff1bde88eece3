//! # Timemap
//!
//! Maps score measures to playback timestamps.
//!
//! The converter reports every *visit* to a measure as a [`RawTimemapEntry`], in playback
//! order. Repeats and jumps make the same measure index appear several times:
//!
//! ```text
//! measure:    0     1     0     2
//! timestamp:  0   500   900  1400
//! ```
//!
//! Two views are kept over that sequence:
//! - [`TimemapIndex`] - one canonical [`MeasureRecord`] per measure index, built from the
//!   first visit. Used for O(1) lookup of a measure's start and duration.
//! - [`Timeline`] - the raw sequence itself, searched by elapsed time so that the second
//!   visit of measure 0 above is found at 950ms instead of measure 1.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PlayerError;

/// Timestamps closer than this (in milliseconds) compare as equal.
pub const DEFAULT_EPSILON_MS: f64 = 0.001;

/// One visit to a measure, as reported by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTimemapEntry {
    /// Measure index in the document (0-based).
    pub measure: usize,
    /// Start of this visit in milliseconds from the start of playback.
    pub timestamp: f64,
}

impl RawTimemapEntry {
    pub fn new(measure: usize, timestamp: f64) -> Self {
        Self { measure, timestamp }
    }
}

/// Canonical start and duration of a measure, taken from its first visit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureRecord {
    pub measure_index: usize,
    pub start: f64,
    pub duration: f64,
}

/// Per-measure lookup built once from the raw timemap.
#[derive(Debug, Clone, PartialEq)]
pub struct TimemapIndex {
    records: BTreeMap<usize, MeasureRecord>,
}

impl TimemapIndex {
    /// Build the index from an ordered raw timemap.
    ///
    /// Only the first visit of a measure defines its record. The duration is the delta to the
    /// raw entry that follows that visit, or 0 for the final raw entry.
    ///
    /// # Errors
    /// Returns [`PlayerError::EmptyTimemap`] if `raw` is empty.
    pub fn build(raw: &[RawTimemapEntry]) -> Result<Self, PlayerError> {
        if raw.is_empty() {
            return Err(PlayerError::EmptyTimemap);
        }

        let mut records = BTreeMap::new();
        for (i, entry) in raw.iter().enumerate() {
            records.entry(entry.measure).or_insert_with(|| {
                let duration = raw
                    .get(i + 1)
                    .map_or(0.0, |next| (next.timestamp - entry.timestamp).max(0.0));
                MeasureRecord {
                    measure_index: entry.measure,
                    start: entry.timestamp,
                    duration,
                }
            });
        }

        Ok(Self { records })
    }

    pub fn get(&self, measure_index: usize) -> Option<&MeasureRecord> {
        self.records.get(&measure_index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Compare two timestamps, treating values within `epsilon` as equal.
pub fn compare_timestamps(a: f64, b: f64, epsilon: f64) -> Ordering {
    if (a - b).abs() < epsilon {
        Ordering::Equal
    } else {
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    }
}

/// Binary search the raw timemap for `timestamp`.
///
/// Returns `Ok(i)` for the first entry the search lands on that matches within `epsilon`,
/// otherwise `Err(insertion_point)`.
pub fn binary_search(
    raw: &[RawTimemapEntry],
    timestamp: f64,
    epsilon: f64,
) -> Result<usize, usize> {
    let mut low = 0;
    let mut high = raw.len();
    while low < high {
        let mid = low + (high - low) / 2;
        match compare_timestamps(timestamp, raw[mid].timestamp, epsilon) {
            Ordering::Greater => low = mid + 1,
            Ordering::Less => high = mid,
            Ordering::Equal => return Ok(mid),
        }
    }
    Err(low)
}

/// Index of the last raw entry at or before `timestamp`.
///
/// `None` means the timestamp precedes the first entry.
pub fn floor_index(raw: &[RawTimemapEntry], timestamp: f64, epsilon: f64) -> Option<usize> {
    match binary_search(raw, timestamp, epsilon) {
        Ok(i) => Some(i),
        Err(0) => None,
        Err(insertion) => Some(insertion - 1),
    }
}

/// Where an elapsed time falls on the raw timemap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Index into the raw sequence.
    pub entry: usize,
    pub measure: usize,
    /// Time since the start of this visit.
    pub offset: f64,
}

/// The raw timemap together with its per-measure index.
#[derive(Debug, Clone)]
pub struct Timeline {
    raw: Vec<RawTimemapEntry>,
    index: TimemapIndex,
    epsilon: f64,
}

impl Timeline {
    pub fn new(raw: Vec<RawTimemapEntry>, epsilon: f64) -> Result<Self, PlayerError> {
        let index = TimemapIndex::build(&raw)?;
        Ok(Self {
            raw,
            index,
            epsilon,
        })
    }

    pub fn raw(&self) -> &[RawTimemapEntry] {
        &self.raw
    }

    pub fn index(&self) -> &TimemapIndex {
        &self.index
    }

    pub fn measure(&self, measure_index: usize) -> Option<&MeasureRecord> {
        self.index.get(measure_index)
    }

    /// Resolve an elapsed playback time to a visit on the raw timemap.
    ///
    /// Negative times clamp to 0 and times before the first entry resolve to it.
    pub fn locate(&self, elapsed: f64) -> Location {
        let elapsed = elapsed.max(0.0);
        let last = self.raw.len().saturating_sub(1);
        let entry = floor_index(&self.raw, elapsed, self.epsilon)
            .unwrap_or(0)
            .min(last);
        let visit = self.raw[entry];
        Location {
            entry,
            measure: visit.measure,
            offset: (elapsed - visit.timestamp).max(0.0),
        }
    }
}
