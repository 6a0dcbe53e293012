//! The merging policy battery.
//!
//! Ordered filters deciding which classes may fuse. Each policy holds exactly
//! the analysis result it consults; all of them are pure and shared without
//! locks across the grouping phase.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    merging::{
        group::MergeGroup,
        policy::{MultiClassPolicy, SingleClassPolicy},
    },
    metadata::{ClassDefinition, SymbolInterner, Type},
    shaking::{KeepOracle, RuntimeTypeCheckInfo},
};

/// Only concrete, non-interface, non-enum, non-synthetic-metadata classes
/// enter merging at all.
pub struct OnlyConcreteClasses;

impl SingleClassPolicy for OnlyConcreteClasses {
    fn name(&self) -> &'static str {
        "OnlyConcreteClasses"
    }

    fn can_merge(&self, class: &ClassDefinition, _interner: &SymbolInterner) -> bool {
        !class.is_interface()
            && !class.is_abstract()
            && !class.is_enum()
            && class.kotlin_metadata.is_none()
    }
}

/// Pinned classes keep their identity and cannot be consumed by a merge.
pub struct NotPinned {
    oracle: Arc<KeepOracle>,
}

impl NotPinned {
    /// Creates the policy over the active oracle.
    #[must_use]
    pub fn new(oracle: Arc<KeepOracle>) -> Self {
        Self { oracle }
    }
}

impl SingleClassPolicy for NotPinned {
    fn name(&self) -> &'static str {
        "NotPinned"
    }

    fn can_merge(&self, class: &ClassDefinition, interner: &SymbolInterner) -> bool {
        self.oracle.can_merge_class(class.ty, interner)
    }
}

/// Classes carrying inner-class attribute entries are not merged.
pub struct NoInnerClasses;

impl SingleClassPolicy for NoInnerClasses {
    fn name(&self) -> &'static str {
        "NoInnerClasses"
    }

    fn can_merge(&self, class: &ClassDefinition, _interner: &SymbolInterner) -> bool {
        class.inner_classes.is_empty()
    }
}

/// Classes already folded into a subtype by the vertical merger are gone from
/// the program; their types must not be fused again.
pub struct NotVerticallyMergedIntoSubtype {
    merged: FxHashSet<Type>,
}

impl NotVerticallyMergedIntoSubtype {
    /// Creates the policy over the vertical merger's source set.
    #[must_use]
    pub fn new(merged: FxHashSet<Type>) -> Self {
        Self { merged }
    }
}

impl SingleClassPolicy for NotVerticallyMergedIntoSubtype {
    fn name(&self) -> &'static str {
        "NotVerticallyMergedIntoSubtype"
    }

    fn can_merge(&self, class: &ClassDefinition, _interner: &SymbolInterner) -> bool {
        !self.merged.contains(&class.ty)
    }
}

/// Classes whose identity live code observes through `instanceof`,
/// `checkcast`, or class literals are not merged.
pub struct NoDirectRuntimeTypeChecks {
    info: RuntimeTypeCheckInfo,
}

impl NoDirectRuntimeTypeChecks {
    /// Creates the policy over the tree shaker's type-check record.
    #[must_use]
    pub fn new(info: RuntimeTypeCheckInfo) -> Self {
        Self { info }
    }
}

impl SingleClassPolicy for NoDirectRuntimeTypeChecks {
    fn name(&self) -> &'static str {
        "NoDirectRuntimeTypeChecks"
    }

    fn can_merge(&self, class: &ClassDefinition, _interner: &SymbolInterner) -> bool {
        !self.info.is_runtime_check_type(class.ty)
    }
}

/// Classes with class initializers are not merged; fusing them would change
/// initialization timing.
pub struct NoClassInitializer;

impl SingleClassPolicy for NoClassInitializer {
    fn name(&self) -> &'static str {
        "NoClassInitializer"
    }

    fn can_merge(&self, class: &ClassDefinition, interner: &SymbolInterner) -> bool {
        !class.has_class_initializer(interner)
    }
}

/// Splits groups so every member shares the same main-dex partition
/// membership as its merge target.
pub struct SameMainDexPartition {
    main_dex: FxHashSet<Type>,
}

impl SameMainDexPartition {
    /// Creates the policy over the main-dex class set.
    #[must_use]
    pub fn new(main_dex: FxHashSet<Type>) -> Self {
        Self { main_dex }
    }
}

impl MultiClassPolicy for SameMainDexPartition {
    fn name(&self) -> &'static str {
        "SameMainDexPartition"
    }

    fn partition(&self, group: MergeGroup, interner: &SymbolInterner) -> Vec<MergeGroup> {
        let mut by_membership: FxHashMap<bool, Vec<Type>> = FxHashMap::default();
        for &member in group.members() {
            by_membership
                .entry(self.main_dex.contains(&member))
                .or_default()
                .push(member);
        }
        let mut split: Vec<MergeGroup> = by_membership
            .into_values()
            .map(|members| MergeGroup::new(members, interner))
            .collect();
        split.sort_by(|a, b| interner.compare_types(a.target(), b.target()));
        split
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{ClassAccessFlags, InnerClassAttribute},
        shaking::KeepRules,
        testutil::TestProgramBuilder,
    };

    #[test]
    fn test_not_pinned_policy() {
        let mut rules = KeepRules::new();
        rules.pin_class("LA;");
        let oracle = Arc::new(KeepOracle::new(Arc::new(rules)));
        let policy = NotPinned::new(oracle);

        let mut builder = TestProgramBuilder::new();
        let a = builder.simple_class("LA;");
        let b = builder.simple_class("LB;");
        let (app, interner) = builder.build();

        assert!(!policy.can_merge(app.program_definition_for(a).unwrap(), &interner));
        assert!(policy.can_merge(app.program_definition_for(b).unwrap(), &interner));
    }

    #[test]
    fn test_no_inner_classes_policy() {
        let mut builder = TestProgramBuilder::new();
        let outer = builder.simple_class("LOuter;");
        let inner = builder.simple_class("LOuter$Inner;");
        builder
            .class_mut(outer)
            .unwrap()
            .inner_classes
            .push(InnerClassAttribute {
                inner,
                outer: Some(outer),
                simple_name: Some("Inner".to_string()),
            });
        let (app, interner) = builder.build();

        let policy = NoInnerClasses;
        assert!(!policy.can_merge(app.program_definition_for(outer).unwrap(), &interner));
        assert!(policy.can_merge(app.program_definition_for(inner).unwrap(), &interner));
    }

    #[test]
    fn test_runtime_type_check_policy() {
        let mut builder = TestProgramBuilder::new();
        builder.simple_class("LChecked;");
        builder.simple_class("LFree;");
        let (app, interner) = builder.build();
        let checked = interner.type_of("LChecked;");

        let mut info = RuntimeTypeCheckInfo::default();
        info.record(checked);
        let policy = NoDirectRuntimeTypeChecks::new(info);

        assert!(!policy.can_merge(app.program_definition_for(checked).unwrap(), &interner));
        assert!(policy.can_merge(
            app.program_definition_for(interner.type_of("LFree;")).unwrap(),
            &interner
        ));
    }

    #[test]
    fn test_main_dex_partitioning() {
        let mut builder = TestProgramBuilder::new();
        let a = builder.simple_class("LA;");
        let b = builder.simple_class("LB;");
        let c = builder.simple_class("LC;");
        let (_, interner) = builder.build();

        let mut main_dex = FxHashSet::default();
        main_dex.insert(b);
        let policy = SameMainDexPartition::new(main_dex);

        let group = MergeGroup::new(vec![a, b, c], &interner);
        let split = policy.partition(group, &interner);

        // {A, C} stays mergeable, {B} degenerates and is dropped later.
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].members(), &[a, c]);
        assert_eq!(split[1].members(), &[b]);
    }

    #[test]
    fn test_only_concrete_classes() {
        let mut builder = TestProgramBuilder::new();
        let plain = builder.simple_class("LPlain;");
        let abstract_ty = builder.simple_class("LAbstract;");
        builder.class_mut(abstract_ty).unwrap().access_flags |= ClassAccessFlags::ABSTRACT;
        let (app, interner) = builder.build();

        let policy = OnlyConcreteClasses;
        assert!(policy.can_merge(app.program_definition_for(plain).unwrap(), &interner));
        assert!(!policy.can_merge(app.program_definition_for(abstract_ty).unwrap(), &interner));
    }
}
