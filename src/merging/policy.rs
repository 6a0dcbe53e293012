//! Policy capabilities for the horizontal class merger.
//!
//! Candidate selection is expressed as an ordered battery of policies, each a
//! pure predicate. Single-class policies veto one class; multi-class policies
//! split a proposed group into finer groups. Policy order is part of the
//! contract: later policies may rely on earlier ones having filtered out
//! ineligible cases.

use crate::{
    merging::group::MergeGroup,
    metadata::{ClassDefinition, SymbolInterner},
};

/// A pure predicate over one class.
pub trait SingleClassPolicy: Send + Sync {
    /// Policy name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Returns `false` to remove the class from merging entirely.
    fn can_merge(&self, class: &ClassDefinition, interner: &SymbolInterner) -> bool;
}

/// A pure partitioner over a proposed merge group.
pub trait MultiClassPolicy: Send + Sync {
    /// Policy name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Splits a group into finer groups; returning the group unchanged keeps
    /// it whole.
    fn partition(&self, group: MergeGroup, interner: &SymbolInterner) -> Vec<MergeGroup>;
}

/// Runs the single-class battery over one class.
pub fn passes_single_policies(
    policies: &[Box<dyn SingleClassPolicy>],
    class: &ClassDefinition,
    interner: &SymbolInterner,
) -> bool {
    policies
        .iter()
        .all(|policy| policy.can_merge(class, interner))
}

/// Runs the multi-class battery over an initial grouping.
pub fn run_multi_policies(
    policies: &[Box<dyn MultiClassPolicy>],
    groups: Vec<MergeGroup>,
    interner: &SymbolInterner,
) -> Vec<MergeGroup> {
    let mut current = groups;
    for policy in policies {
        current = current
            .into_iter()
            .flat_map(|group| policy.partition(group, interner))
            .filter(|group| !group.is_trivial())
            .collect();
    }
    current
}
