use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::grouping::ImageGroup;
use crate::core::record::ImageRecord;

/// Per-attribute standing of a member within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeState {
    Best,
    Worst,
    Neutral,
}

/// Display metadata for one group member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberReview {
    pub path: PathBuf,
    /// Path suffix beyond the group's shared directory prefix.
    pub display_path: String,
    pub resolution: AttributeState,
    pub file_size: AttributeState,
    pub quality: AttributeState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReview {
    pub members: Vec<MemberReview>,
}

/// Compute BEST/WORST/NEUTRAL markings and compact display paths for a
/// group's members. Pure function of the group; the engine stores none of it.
pub fn review_group(group: &ImageGroup) -> GroupReview {
    let members = group.members();
    let resolution = dominance_states(members, compare_resolution);
    let file_size = extremum_states(members);
    let quality = dominance_states(members, compare_quality);
    let prefix = common_directory(members);

    let members = members
        .iter()
        .enumerate()
        .map(|(i, record)| MemberReview {
            path: record.path().to_path_buf(),
            display_path: display_path(record.path(), prefix.as_deref()),
            resolution: resolution[i],
            file_size: file_size[i],
            quality: quality[i],
        })
        .collect();
    GroupReview { members }
}

fn compare_resolution(a: &ImageRecord, b: &ImageRecord) -> Option<Ordering> {
    let (aw, ah) = a.dimensions();
    let (bw, bh) = b.dimensions();
    if aw == bw && ah == bh {
        Some(Ordering::Equal)
    } else if aw >= bw && ah >= bh {
        Some(Ordering::Greater)
    } else if aw <= bw && ah <= bh {
        Some(Ordering::Less)
    } else {
        None
    }
}

fn compare_quality(a: &ImageRecord, b: &ImageRecord) -> Option<Ordering> {
    match (a.quality(), b.quality()) {
        (Some(qa), Some(qb)) => qa.compare(qb),
        _ => None,
    }
}

/// Dominance-style marking under a partial order: BEST members compare ≥
/// against every other member, WORST compare ≤. A member that ties every
/// other member is neither, so it stays NEUTRAL; the tie relation need not
/// be transitive, so this is decided per member rather than once up front.
fn dominance_states(
    members: &[ImageRecord],
    compare: impl Fn(&ImageRecord, &ImageRecord) -> Option<Ordering>,
) -> Vec<AttributeState> {
    members
        .iter()
        .map(|member| {
            let mut dominates_all = true;
            let mut dominated_by_all = true;
            for other in members {
                if std::ptr::eq(member, other) {
                    continue;
                }
                match compare(member, other) {
                    Some(Ordering::Greater) => dominated_by_all = false,
                    Some(Ordering::Less) => dominates_all = false,
                    Some(Ordering::Equal) => {}
                    None => {
                        dominates_all = false;
                        dominated_by_all = false;
                    }
                }
            }
            if dominates_all && dominated_by_all {
                AttributeState::Neutral
            } else if dominates_all {
                AttributeState::Best
            } else if dominated_by_all {
                AttributeState::Worst
            } else {
                AttributeState::Neutral
            }
        })
        .collect()
}

/// File-size marking: strict minimum is BEST, strict maximum is WORST, ties
/// share the state; nothing is marked when all sizes are equal.
fn extremum_states(members: &[ImageRecord]) -> Vec<AttributeState> {
    let sizes: Vec<u64> = members.iter().map(|m| m.file_size()).collect();
    let min = sizes.iter().copied().min().unwrap_or(0);
    let max = sizes.iter().copied().max().unwrap_or(0);
    if min == max {
        return vec![AttributeState::Neutral; members.len()];
    }
    sizes
        .iter()
        .map(|&size| {
            if size == min {
                AttributeState::Best
            } else if size == max {
                AttributeState::Worst
            } else {
                AttributeState::Neutral
            }
        })
        .collect()
}

/// Longest directory prefix shared by every member path.
fn common_directory(members: &[ImageRecord]) -> Option<PathBuf> {
    let mut iter = members.iter();
    let mut prefix = iter.next()?.path().parent()?.to_path_buf();
    for member in iter {
        let parent = member.path().parent().unwrap_or(Path::new(""));
        while !parent.starts_with(&prefix) {
            prefix = prefix.parent()?.to_path_buf();
        }
    }
    Some(prefix)
}

fn display_path(path: &Path, prefix: Option<&Path>) -> String {
    prefix
        .and_then(|p| path.strip_prefix(p).ok())
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
