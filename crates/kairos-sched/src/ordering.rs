//! Insertion comparators.

use kairos_types::EventKey;

/// How an insertion scan decides that a new event goes before an existing
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingPolicy {
    /// `(ts, uid)` compared lexicographically.
    #[default]
    Lexicographic,
    /// Compare uids first, then a single timestamp comparison whose
    /// strictness depends on the uid branch. Equivalent to
    /// [`OrderingPolicy::Lexicographic`] because live uids are unique.
    TwoBranch,
}

impl OrderingPolicy {
    /// Returns true if `new` must be placed before `existing`.
    #[inline]
    pub fn sorts_before(self, new: &EventKey, existing: &EventKey) -> bool {
        match self {
            OrderingPolicy::Lexicographic => new.precedes(existing),
            OrderingPolicy::TwoBranch => {
                if new.uid < existing.uid {
                    new.ts <= existing.ts
                } else {
                    new.ts < existing.ts
                }
            }
        }
    }
}
