//! Name-keyed mate cache.
//!
//! A [`PairCache`] holds the one read seen so far for each read name, scoped
//! either to a single partition (phase 1) or a single shard (phase 2). A name
//! is present at most once: removal is atomic with pair formation, so a pair
//! is formed exactly once per fragment. Caches are exclusively owned by the
//! worker or reconciler operating on them and are never shared across threads.

use crate::record::{ReadPair, ReadRecord};
use ahash::AHashMap;
use bstr::BString;

/// Mapping from read name to the single cached mate-less read for that name.
#[derive(Debug, Default)]
pub struct PairCache {
    entries: AHashMap<BString, ReadRecord>,
}

impl PairCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached reads still waiting for a mate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no reads are waiting for a mate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns the cached mate for `name`, if one is waiting.
    pub fn remove_mate(&mut self, name: &BString) -> Option<ReadRecord> {
        self.entries.remove(name)
    }

    /// Caches a read until its mate arrives.
    pub fn insert(&mut self, record: ReadRecord) {
        self.entries.insert(record.name.clone(), record);
    }

    /// Pairs `record` with its cached mate, or caches it.
    ///
    /// Returns the completed pair on the second sighting of a name, ordered
    /// first-of-pair then second-of-pair.
    pub fn offer(&mut self, record: ReadRecord) -> Option<ReadPair> {
        match self.remove_mate(&record.name) {
            Some(mate) => Some(ReadPair::from_mates(record, mate)),
            None => {
                self.insert(record);
                None
            }
        }
    }

    /// Drains all reads whose mate never arrived.
    pub fn drain(&mut self) -> impl Iterator<Item = ReadRecord> + '_ {
        self.entries.drain().map(|(_, record)| record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordBuilder;

    #[test]
    fn test_offer_pairs_on_second_sighting() {
        let mut cache = PairCache::new();

        let r1 = RecordBuilder::new("q1").paired(true).at(0, 100).mate_at(0, 200).build();
        let r2 = RecordBuilder::new("q1").paired(false).at(0, 200).mate_at(0, 100).build();

        assert!(cache.offer(r1).is_none());
        assert_eq!(cache.len(), 1);

        let pair = cache.offer(r2).expect("second sighting should complete the pair");
        assert!(cache.is_empty());
        assert!(pair.first.flags.is_first_of_pair());
        assert!(pair.second.flags.is_last_of_pair());
        assert_eq!(pair.first.name, pair.second.name);
    }

    #[test]
    fn test_offer_orders_by_mate_flags() {
        let mut cache = PairCache::new();

        // Second-of-pair arrives first
        let r2 = RecordBuilder::new("q1").paired(false).at(0, 200).build();
        let r1 = RecordBuilder::new("q1").paired(true).at(0, 100).build();

        cache.offer(r2);
        let pair = cache.offer(r1).unwrap();
        assert!(pair.first.flags.is_first_of_pair());
        assert_eq!(pair.first.pos, Some(100));
        assert_eq!(pair.second.pos, Some(200));
    }

    #[test]
    fn test_distinct_names_do_not_pair() {
        let mut cache = PairCache::new();
        assert!(cache.offer(RecordBuilder::new("a").paired(true).at(0, 1).build()).is_none());
        assert!(cache.offer(RecordBuilder::new("b").paired(true).at(0, 2).build()).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_drain_yields_leftovers() {
        let mut cache = PairCache::new();
        cache.insert(RecordBuilder::new("a").paired(true).at(0, 1).build());
        cache.insert(RecordBuilder::new("b").paired(true).at(0, 2).build());

        let mut names: Vec<_> = cache.drain().map(|r| r.name).collect();
        names.sort();
        assert_eq!(names, vec![BString::from("a"), BString::from("b")]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_mate_missing_name() {
        let mut cache = PairCache::new();
        assert!(cache.remove_mate(&BString::from("missing")).is_none());
    }
}
