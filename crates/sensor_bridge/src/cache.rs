//! Immutable cache snapshot: an arena of channel slots plus a channel index.
//!
//! A snapshot is never mutated once built; refresh builds a new one and the
//! bridge swaps the pointer.

use std::collections::HashMap;

use contracts::{BridgeCacheSnapshot, CachedSlot, ChannelId, Timestamp};
use slab::Slab;

#[derive(Debug, Default)]
pub(crate) struct CacheSnapshot {
    refreshed_at: Option<Timestamp>,
    slots: Slab<CachedSlot>,
    index: HashMap<ChannelId, usize>,
    /// Slab keys in channel order, for stable export
    order: Vec<usize>,
}

impl CacheSnapshot {
    /// Build from slots; later duplicates of a channel replace earlier ones.
    pub(crate) fn build(refreshed_at: Option<Timestamp>, slots: impl IntoIterator<Item = CachedSlot>) -> Self {
        let mut snapshot = Self {
            refreshed_at,
            ..Self::default()
        };
        for slot in slots {
            let channel = slot.channel.clone();
            if let Some(old) = snapshot.index.get(&channel).copied() {
                snapshot.slots[old] = slot;
                continue;
            }
            let key = snapshot.slots.insert(slot);
            snapshot.index.insert(channel, key);
            snapshot.order.push(key);
        }
        snapshot
    }

    pub(crate) fn refreshed_at(&self) -> Option<Timestamp> {
        self.refreshed_at
    }

    pub(crate) fn get(&self, channel: &str) -> Option<&CachedSlot> {
        self.index.get(channel).and_then(|&key| self.slots.get(key))
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn available(&self) -> usize {
        self.slots.iter().filter(|(_, s)| s.reading.is_some()).count()
    }

    pub(crate) fn export(&self) -> BridgeCacheSnapshot {
        BridgeCacheSnapshot {
            refreshed_at: self.refreshed_at,
            slots: self
                .order
                .iter()
                .filter_map(|&key| self.slots.get(key).cloned())
                .collect(),
        }
    }

    pub(crate) fn import(snapshot: &BridgeCacheSnapshot) -> Self {
        Self::build(snapshot.refreshed_at, snapshot.slots.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{InterpolatedReading, SensorPayload, SensorReading};

    fn slot(channel: &str, at: Timestamp, value: Option<f64>) -> CachedSlot {
        CachedSlot {
            channel: channel.into(),
            resolved_at: at,
            reading: value.map(|v| {
                InterpolatedReading::exact(SensorReading::new(channel, at, SensorPayload::Scalar(v)))
            }),
        }
    }

    #[test]
    fn test_lookup_by_channel() {
        let cache = CacheSnapshot::build(Some(10), vec![slot("a", 10, Some(1.0)), slot("b", 10, None)]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.available(), 1);
        assert!(cache.get("a").unwrap().reading.is_some());
        assert!(cache.get("b").unwrap().reading.is_none());
        assert!(cache.get("c").is_none());
    }

    #[test]
    fn test_duplicate_channel_replaces_slot() {
        let cache = CacheSnapshot::build(None, vec![slot("a", 1, Some(1.0)), slot("a", 2, Some(2.0))]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().resolved_at, 2);
    }

    #[test]
    fn test_export_import_identical() {
        let cache = CacheSnapshot::build(Some(5), vec![slot("b", 5, Some(2.0)), slot("a", 5, None)]);
        let exported = cache.export();
        let again = CacheSnapshot::import(&exported).export();
        assert_eq!(exported, again);
        assert_eq!(exported.slots[0].channel, "b");
    }
}
