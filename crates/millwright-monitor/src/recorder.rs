//! [`AttributeRecorder`] implementation backed by [`crate::series::TimeSeries`].

use std::sync::Arc;

use millwright_engine::clock::Clock;
use millwright_model::AttributeRecorder;

use crate::series::{SeriesKey, TimeSeries};

pub struct MonitorRecorder {
    clock: Arc<Clock>,
    series: Arc<TimeSeries>,
}

impl MonitorRecorder {
    pub fn new(clock: Arc<Clock>, series: Arc<TimeSeries>) -> Arc<Self> {
        Arc::new(Self { clock, series })
    }
}

impl AttributeRecorder for MonitorRecorder {
    fn record(&self, owner_uid: &str, key: &str, value: f64) {
        self.series
            .append(SeriesKey::new(owner_uid, key), self.clock.now(), value);
    }
}
