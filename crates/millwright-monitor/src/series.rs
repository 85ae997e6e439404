//! Ring-buffered attribute time series (spec §4.C, Data Recording).
//!
//! Every monitored attribute write appends `(virtual_time, owner_uid,
//! attribute_name, value)`. The buffer keeps the latest `N` entries per key
//! (`N` configurable; negative means unbounded), matching
//! `base.py::Base.append_data`'s three-way `monitor` policy.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

/// How many samples to retain per key.
///
/// * `monitor < 0` — unbounded.
/// * `monitor == 0` — recording disabled (nothing retained).
/// * `monitor > 0` — keep the latest `monitor` samples.
#[derive(Debug, Clone, Copy)]
pub struct RingSize(pub i64);

impl RingSize {
    pub const UNBOUNDED: RingSize = RingSize(-1);
    pub const OFF: RingSize = RingSize(0);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: Duration,
    pub value: f64,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct SeriesKey {
    pub owner_uid: String,
    pub attribute: String,
}

impl SeriesKey {
    pub fn new(owner_uid: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            owner_uid: owner_uid.into(),
            attribute: attribute.into(),
        }
    }
}

/// The factory-wide time series store. One instance is shared (via `Arc`)
/// across every monitored object.
pub struct TimeSeries {
    ring_size: RingSize,
    data: Mutex<HashMap<SeriesKey, VecDeque<Sample>>>,
}

impl TimeSeries {
    pub fn new(ring_size: RingSize) -> Self {
        Self {
            ring_size,
            data: Mutex::new(HashMap::new()),
        }
    }

    pub fn append(&self, key: SeriesKey, at: Duration, value: f64) {
        if self.ring_size.0 == 0 {
            return;
        }

        let mut data = self.data.lock();
        let series = data.entry(key).or_default();

        if self.ring_size.0 < 0 {
            series.push_back(Sample { at, value });
        } else {
            let cap = self.ring_size.0 as usize;
            series.push_back(Sample { at, value });
            while series.len() > cap {
                series.pop_front();
            }
        }
    }

    /// Latest sample for every key, analogous to `Base.data_last`.
    pub fn latest_all(&self) -> HashMap<SeriesKey, Sample> {
        self.data
            .lock()
            .iter()
            .filter_map(|(k, v)| v.back().map(|s| (k.clone(), *s)))
            .collect()
    }

    pub fn latest(&self, key: &SeriesKey) -> Option<Sample> {
        self.data.lock().get(key).and_then(|v| v.back().copied())
    }

    pub fn history(&self, key: &SeriesKey) -> Vec<Sample> {
        self.data
            .lock()
            .get(key)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_ring_keeps_only_the_latest_n() {
        let series = TimeSeries::new(RingSize(2));
        let key = SeriesKey::new("machine-1", "temperature");
        for i in 0..5 {
            series.append(key.clone(), Duration::from_secs(i), i as f64);
        }
        let history = series.history(&key);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, 3.0);
        assert_eq!(history[1].value, 4.0);
    }

    #[test]
    fn unbounded_ring_keeps_everything() {
        let series = TimeSeries::new(RingSize::UNBOUNDED);
        let key = SeriesKey::new("machine-1", "temperature");
        for i in 0..100 {
            series.append(key.clone(), Duration::from_secs(i), i as f64);
        }
        assert_eq!(series.history(&key).len(), 100);
    }

    #[test]
    fn off_ring_records_nothing() {
        let series = TimeSeries::new(RingSize::OFF);
        let key = SeriesKey::new("machine-1", "temperature");
        series.append(key.clone(), Duration::ZERO, 1.0);
        assert!(series.history(&key).is_empty());
    }
}
