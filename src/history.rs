//! Append-only valuation history with tiered retention.
//!
//! The series grows by one point per refresh cycle and is periodically
//! downsampled: recent points are kept verbatim, older ones collapse into
//! coarser time buckets, ancient ones are dropped. Compaction is
//! deterministic and idempotent for a fixed `now`.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Compaction runs after this many appends rather than on every append.
pub const COMPACT_EVERY: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub total: f64,
    pub liquidity: f64,
    pub crypto: f64,
    pub investments: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Day,
    Month,
    Year,
    All,
}

impl Window {
    fn duration(&self) -> Option<Duration> {
        match self {
            Window::Day => Some(Duration::hours(24)),
            Window::Month => Some(Duration::days(30)),
            Window::Year => Some(Duration::days(365)),
            Window::All => None,
        }
    }
}

impl FromStr for Window {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "24h" => Ok(Window::Day),
            "30d" => Ok(Window::Month),
            "1y" => Ok(Window::Year),
            "all" => Ok(Window::All),
            _ => Err(anyhow::anyhow!("Invalid window: {} (use 24h|30d|1y|all)", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodChange {
    pub delta: f64,
    pub percent: f64,
}

/// Per-point retention decision. Buckets are keyed by tier so an hour bucket
/// and a day bucket covering the same wall-clock span never collide.
fn bucket_for(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Option<Option<(u8, i64)>> {
    let age = now - timestamp;
    if age >= Duration::days(365) {
        None
    } else if age >= Duration::days(30) {
        Some(Some((2, timestamp.timestamp().div_euclid(86400))))
    } else if age >= Duration::days(7) {
        Some(Some((1, timestamp.timestamp().div_euclid(3600))))
    } else {
        Some(None)
    }
}

/// Downsamples a series under the retention tiers, keeping the earliest point
/// observed in each bucket. Output is sorted ascending by timestamp.
pub fn compact_series(mut points: Vec<HistoryPoint>, now: DateTime<Utc>) -> Vec<HistoryPoint> {
    points.sort_by_key(|p| p.timestamp);

    let mut kept = Vec::with_capacity(points.len());
    let mut current_bucket: Option<(u8, i64)> = None;
    for point in points {
        match bucket_for(point.timestamp, now) {
            None => {}
            Some(None) => kept.push(point),
            Some(bucket @ Some(_)) => {
                if bucket != current_bucket {
                    current_bucket = bucket;
                    kept.push(point);
                }
            }
        }
    }
    kept
}

// Persistence round-trips the raw point series, not this wrapper.
#[derive(Debug, Clone, Default)]
pub struct History {
    points: Vec<HistoryPoint>,
    appends_since_compact: u32,
}

impl History {
    pub fn new(points: Vec<HistoryPoint>) -> Self {
        History {
            points,
            appends_since_compact: 0,
        }
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Appends one point and compacts every `COMPACT_EVERY` appends, trading
    /// slightly delayed bounding of storage for less compute per cycle.
    pub fn append(&mut self, point: HistoryPoint, now: DateTime<Utc>) {
        self.points.push(point);
        self.appends_since_compact += 1;
        if self.appends_since_compact >= COMPACT_EVERY {
            self.compact(now);
        }
    }

    pub fn compact(&mut self, now: DateTime<Utc>) {
        self.points = compact_series(std::mem::take(&mut self.points), now);
        self.appends_since_compact = 0;
    }

    /// The contiguous suffix of points inside the window.
    pub fn window(&self, window: Window, now: DateTime<Utc>) -> &[HistoryPoint] {
        match window.duration() {
            None => &self.points,
            Some(duration) => {
                let cutoff = now - duration;
                let start = self.points.partition_point(|p| p.timestamp < cutoff);
                &self.points[start..]
            }
        }
    }
}

pub fn period_change(points: &[HistoryPoint]) -> PeriodChange {
    let [first, .., last] = points else {
        return PeriodChange {
            delta: 0.0,
            percent: 0.0,
        };
    };
    let delta = last.total - first.total;
    let percent = if first.total != 0.0 {
        delta / first.total * 100.0
    } else {
        0.0
    };
    PeriodChange { delta, percent }
}
