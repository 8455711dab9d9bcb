use std::path::Path;

use crate::core::record::ImageRecord;

/// A set of perceptually similar images.
///
/// Membership is set-like on path. While part of a result set a group always
/// has at least two members; the consumer drops a group once deletions shrink
/// it below that. Member order is only meaningful for display.
#[derive(Debug, Clone, Default)]
pub struct ImageGroup {
    members: Vec<ImageRecord>,
}

impl ImageGroup {
    pub fn members(&self) -> &[ImageRecord] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.members.iter()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.members.iter().any(|m| m.path() == path)
    }

    /// Remove the member with the given path, e.g. after the consumer has
    /// deleted the underlying file. Returns whether a member was removed.
    pub fn remove(&mut self, path: &Path) -> bool {
        match self.members.iter().position(|m| m.path() == path) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
impl ImageGroup {
    pub(crate) fn from_members(members: Vec<ImageRecord>) -> Self {
        Self { members }
    }
}

/// Online single-linkage clustering of image records by Hamming-distance
/// threshold.
///
/// Each inserted record is compared against every member of every group and
/// every unattached candidate, not just a group representative: precision
/// over speed. Everything within threshold of the new record is linked
/// through it, so all matched groups and candidates collapse into one group
/// at insert time. The resulting partition is exactly the set of connected
/// components of the threshold graph and therefore independent of insertion
/// order.
///
/// Each insert is O(n) hash comparisons against the n records seen so far,
/// O(n²) for a whole scan. Fine for photo-library sizes; no index structure
/// is kept.
pub struct GroupingEngine {
    threshold: u32,
    groups: Vec<ImageGroup>,
    candidates: Vec<ImageRecord>,
}

impl GroupingEngine {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            groups: Vec::new(),
            candidates: Vec::new(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Number of groups formed so far.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of records not yet similar to anything.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    fn contains(&self, path: &Path) -> bool {
        self.groups.iter().any(|g| g.contains(path))
            || self.candidates.iter().any(|c| c.path() == path)
    }

    /// Add a record to the working set, linking and merging groups as needed.
    /// A record whose path is already present is ignored.
    pub fn insert(&mut self, record: ImageRecord) {
        if self.contains(record.path()) {
            return;
        }

        let matched_groups: Vec<usize> = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, group)| {
                group
                    .members
                    .iter()
                    .any(|m| m.hash().distance(record.hash()) <= self.threshold)
            })
            .map(|(index, _)| index)
            .collect();

        let matched_candidates: Vec<usize> = self
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.hash().distance(record.hash()) <= self.threshold)
            .map(|(index, _)| index)
            .collect();

        if matched_groups.is_empty() && matched_candidates.is_empty() {
            self.candidates.push(record);
            return;
        }

        // Matched candidates leave the unattached pool. Descending order so
        // swap_remove never disturbs an index still to be removed: anything
        // swapped in from the back sits above the largest matched index.
        let mut joined = Vec::with_capacity(matched_candidates.len() + 1);
        for &index in matched_candidates.iter().rev() {
            joined.push(self.candidates.swap_remove(index));
        }
        joined.push(record);

        match matched_groups.split_first() {
            Some((&first, rest)) => {
                // The new record links every matched group transitively;
                // merge them all into the first.
                let mut merged = std::mem::take(&mut self.groups[first]);
                for &index in rest.iter().rev() {
                    merged.members.append(&mut self.groups.swap_remove(index).members);
                }
                merged.members.append(&mut joined);
                self.groups[first] = merged;
            }
            None => {
                // Only candidates matched: they form a new group with the
                // record that connected them.
                self.groups.push(ImageGroup { members: joined });
            }
        }
    }

    /// Consume the engine and return the final partition. Unattached
    /// candidates are discarded: an image similar only to itself is not a
    /// duplicate. Members sort by path and groups by their first member, so
    /// the output is stable regardless of arrival order.
    pub fn finalize(mut self) -> Vec<ImageGroup> {
        for group in &mut self.groups {
            debug_assert!(group.len() >= 2);
            group.members.sort_by(|a, b| a.path().cmp(b.path()));
        }
        self.groups
            .sort_by(|a, b| a.members[0].path().cmp(b.members[0].path()));
        self.groups
    }
}
