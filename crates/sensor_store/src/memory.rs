//! In-memory sensor store
//!
//! One sorted vector per channel. Inserts keep order (stable for equal
//! timestamps) so readings come back in non-decreasing time.

use std::collections::{BTreeMap, HashMap};

use contracts::{Bracket, ChannelId, SensorReading, SensorStore, SimError, Timestamp};
use metrics::{counter, histogram};
use tracing::debug;

/// Per-channel summary for `info`-style listings
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub channel: ChannelId,
    pub readings: usize,
    pub first_us: Timestamp,
    pub last_us: Timestamp,
}

/// Sensor store backed by memory
#[derive(Debug, Default, Clone)]
pub struct InMemorySensorStore {
    series: HashMap<ChannelId, Vec<SensorReading>>,
    min_quality: Option<f32>,
}

impl InMemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_readings(readings: impl IntoIterator<Item = SensorReading>) -> Self {
        let mut store = Self::new();
        store.extend(readings);
        store
    }

    /// Ignore readings below `min_quality` in every query.
    pub fn with_min_quality(mut self, min_quality: Option<f32>) -> Self {
        self.min_quality = min_quality;
        self
    }

    pub fn insert(&mut self, reading: SensorReading) {
        let series = self.series.entry(reading.channel_id.clone()).or_default();
        // Insert after every reading with the same or earlier timestamp.
        let pos = series.partition_point(|r| r.timestamp_us <= reading.timestamp_us);
        series.insert(pos, reading);
    }

    pub fn extend(&mut self, readings: impl IntoIterator<Item = SensorReading>) {
        for reading in readings {
            self.insert(reading);
        }
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self.series.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn summary(&self) -> Vec<StoreSummary> {
        let ordered: BTreeMap<_, _> = self.series.iter().collect();
        ordered
            .into_iter()
            .filter_map(|(channel, series)| {
                Some(StoreSummary {
                    channel: channel.clone(),
                    readings: series.len(),
                    first_us: series.first()?.timestamp_us,
                    last_us: series.last()?.timestamp_us,
                })
            })
            .collect()
    }

    fn accepts(&self, reading: &SensorReading) -> bool {
        self.min_quality.is_none_or(|q| reading.quality >= q)
    }

    fn window(&self, channel: &str, start: Timestamp, end: Timestamp) -> &[SensorReading] {
        let Some(series) = self.series.get(channel) else {
            return &[];
        };
        let lo = series.partition_point(|r| r.timestamp_us < start);
        let hi = series.partition_point(|r| r.timestamp_us <= end);
        if lo >= hi {
            &[]
        } else {
            &series[lo..hi]
        }
    }

    fn range_sync(&self, channels: &[ChannelId], start: Timestamp, end: Timestamp) -> Vec<SensorReading> {
        let mut out: Vec<SensorReading> = channels
            .iter()
            .flat_map(|c| self.window(c, start, end).iter())
            .filter(|r| self.accepts(r))
            .cloned()
            .collect();
        // Stable: equal (time, channel) keep insertion order.
        out.sort_by(|a, b| {
            a.timestamp_us
                .cmp(&b.timestamp_us)
                .then_with(|| a.channel_id.cmp(&b.channel_id))
        });
        out
    }

    fn bracket_sync(&self, channel: &ChannelId, at: Timestamp, lookback: Timestamp, lookahead: Timestamp) -> Bracket {
        let window = self.window(channel, at.saturating_sub(lookback), at.saturating_add(lookahead));
        let split = window.partition_point(|r| r.timestamp_us <= at);
        let prev = window[..split].iter().rev().find(|r| self.accepts(r)).cloned();
        let next = match &prev {
            Some(p) if p.timestamp_us == at => Some(p.clone()),
            _ => window[split..].iter().find(|r| self.accepts(r)).cloned(),
        };
        Bracket { prev, next }
    }
}

impl SensorStore for InMemorySensorStore {
    async fn range(
        &self,
        channels: &[ChannelId],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<SensorReading>, SimError> {
        if start > end {
            return Err(SimError::invalid_argument(
                "range",
                format!("start {start} is after end {end}"),
            ));
        }
        let out = self.range_sync(channels, start, end);
        counter!("replay_sim_store_queries_total", "kind" => "range").increment(1);
        histogram!("replay_sim_store_readings_returned").record(out.len() as f64);
        debug!(channels = channels.len(), start, end, returned = out.len(), "store range query");
        Ok(out)
    }

    async fn bounds(&self) -> Result<Option<(Timestamp, Timestamp)>, SimError> {
        let first = self
            .series
            .values()
            .filter_map(|s| s.first().map(|r| r.timestamp_us))
            .min();
        let last = self
            .series
            .values()
            .filter_map(|s| s.last().map(|r| r.timestamp_us))
            .max();
        Ok(first.zip(last))
    }

    async fn bracket(
        &self,
        channel: &ChannelId,
        at: Timestamp,
        lookback: Timestamp,
        lookahead: Timestamp,
    ) -> Result<Bracket, SimError> {
        counter!("replay_sim_store_queries_total", "kind" => "bracket").increment(1);
        Ok(self.bracket_sync(channel, at, lookback, lookahead))
    }
}
