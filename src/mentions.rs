//! Accumulates (NGO, content) mention pairs for one scraping run.

use crate::models::{MentionRecord, NgoId};
use std::collections::BTreeSet;

/// De-duplicated set of [`MentionRecord`]s, iterated in (ngo_id, content id) order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionSet {
    records: BTreeSet<MentionRecord>,
}

impl MentionSet {
    /// Record that `content_id` mentions each NGO in `ngo_ids`.
    ///
    /// Returns how many pairs were new.
    pub fn record<I>(&mut self, content_id: &str, ngo_ids: I) -> usize
    where
        I: IntoIterator<Item = NgoId>,
    {
        ngo_ids
            .into_iter()
            .filter(|&ngo_id| {
                self.records.insert(MentionRecord {
                    ngo_id,
                    external_content_id: content_id.to_string(),
                })
            })
            .count()
    }

    pub fn merge(&mut self, other: MentionSet) {
        self.records.extend(other.records);
    }

    /// Distinct NGOs that appear in at least one mention.
    pub fn ngo_ids(&self) -> BTreeSet<NgoId> {
        self.records.iter().map(|m| m.ngo_id).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MentionRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_suppressed() {
        let mut mentions = MentionSet::default();
        assert_eq!(mentions.record("post1", [4, 1]), 2);
        assert_eq!(mentions.record("post1", [1]), 0);
        assert_eq!(mentions.record("post2", [1]), 1);
        assert_eq!(mentions.len(), 3);
    }

    #[test]
    fn test_ngo_ids_are_distinct() {
        let mut mentions = MentionSet::default();
        mentions.record("a", [3, 5]);
        mentions.record("b", [5]);
        assert_eq!(mentions.ngo_ids().into_iter().collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn test_merge_and_order() {
        let mut left = MentionSet::default();
        left.record("b", [2]);
        let mut right = MentionSet::default();
        right.record("a", [2]);
        right.record("b", [2]);
        left.merge(right);
        let ids: Vec<&str> = left.iter().map(|m| m.external_content_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
