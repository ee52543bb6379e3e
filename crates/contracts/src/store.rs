//! SensorStore trait - read contract with the time-series store

use crate::{ChannelId, SensorReading, SimError, Timestamp};

/// Readings on either side of a target time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bracket {
    /// Latest reading at or before the target
    pub prev: Option<SensorReading>,
    /// Earliest reading at or after the target
    pub next: Option<SensorReading>,
}

/// Read-only access to recorded sensor data.
#[trait_variant::make(SensorStore: Send)]
pub trait LocalSensorStore: Sync {
    /// Readings of `channels` with `start <= timestamp <= end`, ordered by
    /// timestamp then channel.
    async fn range(
        &self,
        channels: &[ChannelId],
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<SensorReading>, SimError>;

    /// Earliest and latest timestamp across all channels, `None` when empty.
    async fn bounds(&self) -> Result<Option<(Timestamp, Timestamp)>, SimError>;

    /// Bracketing readings for one channel, searched within
    /// `[at - lookback, at + lookahead]`.
    // Written as `impl Future` + `async move` because `trait_variant` does
    // not support default bodies on `async fn`.
    fn bracket(
        &self,
        channel: &ChannelId,
        at: Timestamp,
        lookback: Timestamp,
        lookahead: Timestamp,
    ) -> impl std::future::Future<Output = Result<Bracket, SimError>> {
        async move {
            let window = self
                .range(
                    std::slice::from_ref(channel),
                    at.saturating_sub(lookback),
                    at.saturating_add(lookahead),
                )
                .await?;
            Ok(bracket_from_sorted(&window, at))
        }
    }
}

/// Picks the bracket around `at` from readings sorted by time.
pub fn bracket_from_sorted(readings: &[SensorReading], at: Timestamp) -> Bracket {
    let split = readings.partition_point(|r| r.timestamp_us <= at);
    let prev = split.checked_sub(1).map(|i| readings[i].clone());
    let next = match &prev {
        Some(p) if p.timestamp_us == at => Some(p.clone()),
        _ => readings.get(split).cloned(),
    };
    Bracket { prev, next }
}
