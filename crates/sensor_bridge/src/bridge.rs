//! Sensor Data Bridge
//!
//! `refresh` is the only bulk write: it resolves every referenced channel at
//! the target time into a fresh snapshot and swaps it in. Reads during a
//! batch go through a [`BridgeView`] holding that snapshot, so they never
//! take a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use contracts::{
    bracket_from_sorted, BridgeCacheSnapshot, CachedSlot, ChannelId, InterpolatedReading,
    PipelineConfig, SensorReading, SensorStore, SimError, Timestamp,
};
use parking_lot::RwLock;
use tracing::{debug, instrument, trace};

use crate::cache::CacheSnapshot;
use crate::Interpolator;

/// Bridge counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub last_refresh_us: u64,
    pub cached_channels: usize,
    pub unavailable_channels: usize,
    pub refreshed_at: Option<Timestamp>,
}

impl BridgeStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            1.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    last_refresh_us: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            last_refresh_us: AtomicU64::new(0),
        }
    }
}

pub struct SensorDataBridge<S> {
    store: Arc<S>,
    interpolator: Interpolator,
    channels: Vec<ChannelId>,
    tolerance_us: Timestamp,
    cache: RwLock<Arc<CacheSnapshot>>,
    counters: Arc<Counters>,
}

impl<S: SensorStore> SensorDataBridge<S> {
    pub fn new(
        store: Arc<S>,
        interpolator: Interpolator,
        channels: Vec<ChannelId>,
        tolerance_us: Timestamp,
    ) -> Self {
        Self {
            store,
            interpolator,
            channels,
            tolerance_us,
            cache: RwLock::new(Arc::new(CacheSnapshot::default())),
            counters: Arc::new(Counters::new()),
        }
    }

    /// Bridge over every channel the pipeline references.
    pub fn from_config(store: Arc<S>, config: &PipelineConfig) -> Self {
        let mut interpolator = Interpolator::new(&config.interpolation);
        for binding in &config.channels {
            if let Some(gap) = binding.max_gap_us {
                interpolator = interpolator.with_channel_gap(binding.id.clone(), gap);
            }
        }
        Self::new(
            store,
            interpolator,
            config.referenced_channels(),
            config.interpolation.tolerance_us,
        )
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolve every channel at `at` with one batch query and swap the cache.
    #[instrument(name = "bridge_refresh", skip(self), fields(channels = self.channels.len()))]
    pub async fn refresh(&self, at: Timestamp) -> Result<BridgeStats, SimError> {
        let started = Instant::now();
        let (lookback, lookahead) = self.interpolator.window();
        let readings = self
            .store
            .range(
                &self.channels,
                at.saturating_sub(lookback),
                at.saturating_add(lookahead),
            )
            .await?;

        let mut per_channel: HashMap<&str, Vec<SensorReading>> = HashMap::new();
        for reading in readings {
            if let Some(channel) = self.channels.iter().find(|c| **c == reading.channel_id) {
                per_channel.entry(channel.as_str()).or_default().push(reading);
            }
        }

        let mut slots = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let window = per_channel.get(channel.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let bracket = bracket_from_sorted(window, at);
            let reading = match self.interpolator.resolve(channel, at, &bracket) {
                Ok(reading) => Some(reading),
                Err(SimError::DataUnavailable { .. }) => {
                    trace!(channel = %channel, at, "no data at refresh");
                    None
                }
                Err(e) => return Err(e),
            };
            slots.push(CachedSlot {
                channel: channel.clone(),
                resolved_at: at,
                reading,
            });
        }

        let snapshot = Arc::new(CacheSnapshot::build(Some(at), slots));
        *self.cache.write() = snapshot;

        let elapsed = started.elapsed().as_micros() as u64;
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        self.counters.last_refresh_us.store(elapsed, Ordering::Relaxed);
        metrics::histogram!("replay_sim_bridge_refresh_us").record(elapsed as f64);

        let stats = self.stats();
        debug!(
            at,
            cached = stats.cached_channels,
            unavailable = stats.unavailable_channels,
            "bridge refreshed"
        );
        Ok(stats)
    }

    /// Read-only view over the current snapshot, handed to one batch.
    pub fn view(self: &Arc<Self>) -> BridgeView<S> {
        BridgeView {
            snapshot: self.cache.read().clone(),
            bridge: Arc::clone(self),
        }
    }

    /// Reading of `channel` at `at`, from cache when within tolerance.
    pub async fn get(&self, channel: &ChannelId, at: Timestamp) -> Result<InterpolatedReading, SimError> {
        let snapshot = self.cache.read().clone();
        self.get_from(&snapshot, channel, at).await
    }

    async fn get_from(
        &self,
        snapshot: &CacheSnapshot,
        channel: &ChannelId,
        at: Timestamp,
    ) -> Result<InterpolatedReading, SimError> {
        if let Some(slot) = snapshot.get(channel) {
            if (slot.resolved_at - at).abs() <= self.tolerance_us {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("replay_sim_bridge_reads_total", "result" => "hit").increment(1);
                return slot
                    .reading
                    .clone()
                    .ok_or_else(|| SimError::data_unavailable(channel.as_str(), at));
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("replay_sim_bridge_reads_total", "result" => "miss").increment(1);
        self.interpolator.lookup(self.store.as_ref(), channel, at).await
    }

    pub fn stats(&self) -> BridgeStats {
        let snapshot = self.cache.read().clone();
        BridgeStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            last_refresh_us: self.counters.last_refresh_us.load(Ordering::Relaxed),
            cached_channels: snapshot.available(),
            unavailable_channels: snapshot.len() - snapshot.available(),
            refreshed_at: snapshot.refreshed_at(),
        }
    }

    /// Copy of the current cache for a checkpoint.
    pub fn snapshot(&self) -> BridgeCacheSnapshot {
        self.cache.read().export()
    }

    /// Replace the cache with a checkpointed one.
    pub fn restore(&self, snapshot: &BridgeCacheSnapshot) {
        *self.cache.write() = Arc::new(CacheSnapshot::import(snapshot));
    }
}

/// Lock-free reads over one refreshed snapshot.
pub struct BridgeView<S> {
    snapshot: Arc<CacheSnapshot>,
    bridge: Arc<SensorDataBridge<S>>,
}

impl<S> Clone for BridgeView<S> {
    fn clone(&self) -> Self {
        Self {
            snapshot: Arc::clone(&self.snapshot),
            bridge: Arc::clone(&self.bridge),
        }
    }
}

impl<S: SensorStore> BridgeView<S> {
    pub async fn get(&self, channel: &ChannelId, at: Timestamp) -> Result<InterpolatedReading, SimError> {
        self.bridge.get_from(&self.snapshot, channel, at).await
    }

    pub fn refreshed_at(&self) -> Option<Timestamp> {
        self.snapshot.refreshed_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{InterpolationMethod, InterpolationSettings, SensorPayload};
    use sensor_store::InMemorySensorStore;

    fn bridge_over(readings: Vec<SensorReading>, channels: &[&str]) -> Arc<SensorDataBridge<InMemorySensorStore>> {
        let store = Arc::new(InMemorySensorStore::from_readings(readings));
        Arc::new(SensorDataBridge::new(
            store,
            Interpolator::new(&InterpolationSettings::default()),
            channels.iter().map(|c| ChannelId::from(*c)).collect(),
            16_667,
        ))
    }

    fn scalar(channel: &str, ts: Timestamp, v: f64) -> SensorReading {
        SensorReading::new(channel, ts, SensorPayload::Scalar(v))
    }

    #[tokio::test]
    async fn test_refresh_then_hit_within_tolerance() {
        let bridge = bridge_over(
            vec![scalar("speed", 0, 0.0), scalar("speed", 100_000, 10.0)],
            &["speed"],
        );
        bridge.refresh(50_000).await.unwrap();

        let out = bridge.get(&"speed".into(), 60_000).await.unwrap();
        assert_eq!(out.method, InterpolationMethod::Linear);
        assert!((out.reading.payload.as_scalar().unwrap() - 5.0).abs() < 1e-9);

        let stats = bridge.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.cached_channels, 1);
    }

    #[tokio::test]
    async fn test_miss_outside_tolerance_queries_store() {
        let bridge = bridge_over(
            vec![scalar("speed", 0, 0.0), scalar("speed", 100_000, 10.0)],
            &["speed"],
        );
        bridge.refresh(0).await.unwrap();

        let out = bridge.get(&"speed".into(), 80_000).await.unwrap();
        assert!((out.reading.payload.as_scalar().unwrap() - 8.0).abs() < 1e-9);
        assert_eq!(bridge.stats().misses, 1);
        // Misses do not rewrite the cache.
        assert_eq!(bridge.stats().refreshed_at, Some(0));
    }

    #[tokio::test]
    async fn test_unavailable_slot_reports_error_on_hit() {
        let bridge = bridge_over(vec![scalar("speed", 0, 0.0)], &["speed", "lidar"]);
        let stats = bridge.refresh(0).await.unwrap();
        assert_eq!(stats.unavailable_channels, 1);

        let err = bridge.get(&"lidar".into(), 0).await.unwrap_err();
        assert!(matches!(err, SimError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_view_survives_later_refresh() {
        let bridge = bridge_over(
            vec![scalar("speed", 0, 1.0), scalar("speed", 1_000_000, 2.0)],
            &["speed"],
        );
        bridge.refresh(0).await.unwrap();
        let view = bridge.view();
        bridge.refresh(1_000_000).await.unwrap();

        assert_eq!(view.refreshed_at(), Some(0));
        let out = view.get(&"speed".into(), 0).await.unwrap();
        assert_eq!(out.reading.payload.as_scalar(), Some(1.0));
    }

    #[tokio::test]
    async fn test_snapshot_restore_round_trip() {
        let bridge = bridge_over(
            vec![scalar("speed", 0, 1.0), scalar("speed", 40_000, 3.0), scalar("gps", 10_000, 7.0)],
            &["gps", "speed"],
        );
        bridge.refresh(20_000).await.unwrap();
        let before = bridge.snapshot();

        bridge.refresh(40_000).await.unwrap();
        assert_ne!(bridge.snapshot(), before);

        bridge.restore(&before);
        assert_eq!(bridge.snapshot(), before);
    }

    #[tokio::test]
    async fn test_stale_beyond_end() {
        let bridge = bridge_over(vec![scalar("speed", 0, 1.0), scalar("speed", 30_000, 4.0)], &["speed"]);
        bridge.refresh(90_000).await.unwrap();
        let out = bridge.get(&"speed".into(), 90_000).await.unwrap();
        assert_eq!(out.method, InterpolationMethod::LastKnownGood);
        assert!(out.stale);
        assert_eq!(out.reading.payload.as_scalar(), Some(4.0));
    }
}
