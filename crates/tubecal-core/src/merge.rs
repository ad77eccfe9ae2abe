//! Fuse single-strip measurements into one composite dataset.
//!
//! Each measurement only carries information around its own strip, so every
//! detector outside the measurement's isolation interval is set to 1 before
//! the datasets are multiplied together. The isolation interval of a strip is
//! bounded by midpoints towards its sorted neighbours and is half-open,
//! `[low, high)`.

use crate::strip::{EdgePair, StripMeasurement};
use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Isolation interval assigned to one measurement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsolationBounds {
    pub low: f64,
    pub high: f64,
}

impl IsolationBounds {
    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        x >= self.low && x < self.high
    }
}

/// Composite dataset and the edge list every tube must reproduce.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergedMeasurement {
    /// Per-detector counts, bank order.
    pub counts: Vec<f64>,
    /// Sorted, non-overlapping boundary values.
    pub known_edges: Vec<f64>,
    /// Edge pairs in merge order, with the interval each one was isolated to.
    pub strips: Vec<(EdgePair, IsolationBounds)>,
}

/// Errors raised while merging.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("no measurements to merge")]
    Empty,
    #[error("measurement {id} has {got} detectors, bank has {expected}")]
    DetectorCountMismatch {
        id: String,
        expected: usize,
        got: usize,
    },
}

/// Isolation intervals for edge pairs that are already sorted with
/// [`EdgePair::cmp_by_edges`].
///
/// The boundary between neighbours `i` and `i + 1` uses the running maximum
/// right edge `r` of strips `0..=i`. Overlapping strips (`left[i+1] <= r`) are
/// split in the middle of the overlap region, disjoint strips in the middle of
/// the gap.
pub fn isolation_bounds(sorted: &[EdgePair]) -> Vec<IsolationBounds> {
    let mut splits = Vec::with_capacity(sorted.len().saturating_sub(1));
    let mut max_right = f64::NEG_INFINITY;
    for pair in sorted.windows(2) {
        let (cur, next) = (pair[0], pair[1]);
        max_right = max_right.max(cur.right);
        let split = if next.left <= max_right {
            EdgePair::new(next.left, max_right.min(next.right)).midpoint()
        } else {
            EdgePair::new(max_right, next.left).midpoint()
        };
        splits.push(split);
    }

    (0..sorted.len())
        .map(|i| IsolationBounds {
            low: if i == 0 {
                f64::NEG_INFINITY
            } else {
                splits[i - 1]
            },
            high: splits.get(i).copied().unwrap_or(f64::INFINITY),
        })
        .collect()
}

/// Coalesce overlapping or touching pairs and flatten them into one sorted
/// list of boundaries.
pub fn merge_known_edges(pairs: &[EdgePair]) -> Vec<f64> {
    let mut sorted = pairs.to_vec();
    sorted.sort_by(EdgePair::cmp_by_edges);

    let mut spans: Vec<EdgePair> = Vec::with_capacity(sorted.len());
    for pair in sorted {
        match spans.last_mut() {
            Some(span) if pair.left <= span.right => {
                span.right = span.right.max(pair.right);
            }
            _ => spans.push(pair),
        }
    }

    spans.iter().flat_map(|s| [s.left, s.right]).collect()
}

/// Merge measurements into one dataset.
///
/// `coordinates` holds the real-space coordinate of every detector along the
/// tube axis (see [`crate::DetectorBank::axial_coordinates`]).
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(strips = measurements.len()))
)]
pub fn merge_measurements(
    measurements: &[(&StripMeasurement, EdgePair)],
    coordinates: &[f64],
) -> Result<MergedMeasurement, MergeError> {
    if measurements.is_empty() {
        return Err(MergeError::Empty);
    }
    for (m, _) in measurements {
        if m.counts.len() != coordinates.len() {
            return Err(MergeError::DetectorCountMismatch {
                id: m.id.clone(),
                expected: coordinates.len(),
                got: m.counts.len(),
            });
        }
    }

    let mut order: Vec<usize> = (0..measurements.len()).collect();
    order.sort_by(|&a, &b| measurements[a].1.cmp_by_edges(&measurements[b].1));
    let sorted_pairs: Vec<EdgePair> = order.iter().map(|&i| measurements[i].1).collect();
    let bounds = isolation_bounds(&sorted_pairs);

    let mut counts = vec![1.0; coordinates.len()];
    for (&i, b) in order.iter().zip(&bounds) {
        let (m, pair) = measurements[i];
        debug!(
            "merging {} edges=({:.5}, {:.5}) isolated to [{:.5}, {:.5})",
            m.id, pair.left, pair.right, b.low, b.high
        );
        for ((acc, &c), &x) in counts.iter_mut().zip(&m.counts).zip(coordinates) {
            if b.contains(x) {
                *acc *= c;
            }
        }
    }

    Ok(MergedMeasurement {
        counts,
        known_edges: merge_known_edges(&sorted_pairs),
        strips: sorted_pairs.into_iter().zip(bounds).collect(),
    })
}
