//! The keep/pinning oracle.
//!
//! Answers, for any symbol, whether it is pinned (must retain identity,
//! prototype, and presence) and which weaker constraints apply. Results are a
//! pure function of (symbol, rule set); the oracle never mutates program
//! state, and per-symbol answers are cached under identity equality.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    metadata::{DexApplication, FieldRef, MethodRef, SymbolInterner, Type},
    shaking::rules::{pattern_matches, KeepConstraints, KeepRules, RuleAction},
    Result,
};

/// Cached, pure pinning queries over the active rule set.
///
/// # Thread Safety
///
/// Shared without locks across workers; the per-symbol caches are concurrent
/// maps with compute-if-absent semantics.
#[derive(Debug)]
pub struct KeepOracle {
    rules: Arc<KeepRules>,
    class_cache: DashMap<Type, KeepConstraints>,
    method_cache: DashMap<MethodRef, KeepConstraints>,
    field_cache: DashMap<FieldRef, KeepConstraints>,
}

impl KeepOracle {
    /// Creates an oracle over a rule set.
    #[must_use]
    pub fn new(rules: Arc<KeepRules>) -> Self {
        Self {
            rules,
            class_cache: DashMap::new(),
            method_cache: DashMap::new(),
            field_cache: DashMap::new(),
        }
    }

    /// Returns the rule set this oracle answers for.
    #[must_use]
    pub fn rules(&self) -> &KeepRules {
        &self.rules
    }

    /// Detects rules demanding incompatible treatments of the same class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RuleConflict`] when a program class is matched
    /// by both a keep rule and a `CheckDiscard` rule.
    pub fn check_conflicts(&self, app: &DexApplication, interner: &SymbolInterner) -> Result<()> {
        for class in app.program_classes() {
            let descriptor = interner.type_descriptor(class.ty);
            let mut kept = false;
            let mut discarded = false;
            for rule in self.rules.rules() {
                if rule.member.is_none() && pattern_matches(&rule.class_pattern, &descriptor) {
                    match rule.action {
                        RuleAction::Keep(constraints)
                            if constraints.contains(KeepConstraints::PRESENCE) =>
                        {
                            kept = true;
                        }
                        RuleAction::Keep(_) => {}
                        RuleAction::CheckDiscard => discarded = true,
                    }
                }
            }
            if kept && discarded {
                return Err(crate::Error::RuleConflict(descriptor.to_string()));
            }
        }
        Ok(())
    }

    /// Returns the composed constraints demanded for a class.
    #[must_use]
    pub fn class_constraints(&self, ty: Type, interner: &SymbolInterner) -> KeepConstraints {
        if let Some(cached) = self.class_cache.get(&ty) {
            return *cached;
        }
        let descriptor = interner.type_descriptor(ty);
        let mut constraints = KeepConstraints::empty();
        for rule in self.rules.rules() {
            if rule.member.is_none() && pattern_matches(&rule.class_pattern, &descriptor) {
                if let RuleAction::Keep(demanded) = rule.action {
                    constraints |= demanded;
                }
            }
        }
        *self.class_cache.entry(ty).or_insert(constraints)
    }

    /// Returns the composed constraints demanded for a method.
    #[must_use]
    pub fn method_constraints(
        &self,
        method: MethodRef,
        interner: &SymbolInterner,
    ) -> KeepConstraints {
        if let Some(cached) = self.method_cache.get(&method) {
            return *cached;
        }
        let data = interner.method_data(method);
        let holder_descriptor = interner.type_descriptor(data.holder);
        let mut constraints = KeepConstraints::empty();
        for rule in self.rules.rules() {
            let Some(member) = &rule.member else { continue };
            if pattern_matches(&rule.class_pattern, &holder_descriptor)
                && member.matches(&data.name)
            {
                if let RuleAction::Keep(demanded) = rule.action {
                    constraints |= demanded;
                }
            }
        }
        *self.method_cache.entry(method).or_insert(constraints)
    }

    /// Returns the composed constraints demanded for a field.
    #[must_use]
    pub fn field_constraints(&self, field: FieldRef, interner: &SymbolInterner) -> KeepConstraints {
        if let Some(cached) = self.field_cache.get(&field) {
            return *cached;
        }
        let data = interner.field_data(field);
        let holder_descriptor = interner.type_descriptor(data.holder);
        let mut constraints = KeepConstraints::empty();
        for rule in self.rules.rules() {
            let Some(member) = &rule.member else { continue };
            if pattern_matches(&rule.class_pattern, &holder_descriptor)
                && member.matches(&data.name)
            {
                if let RuleAction::Keep(demanded) = rule.action {
                    constraints |= demanded;
                }
            }
        }
        *self.field_cache.entry(field).or_insert(constraints)
    }

    /// Returns `true` when the class must keep identity, presence, and
    /// prototype.
    #[must_use]
    pub fn is_pinned_class(&self, ty: Type, interner: &SymbolInterner) -> bool {
        self.class_constraints(ty, interner).is_pinned()
    }

    /// Returns `true` when the method is fully pinned.
    #[must_use]
    pub fn is_pinned_method(&self, method: MethodRef, interner: &SymbolInterner) -> bool {
        self.method_constraints(method, interner).is_pinned()
    }

    /// Returns `true` when the field is fully pinned.
    #[must_use]
    pub fn is_pinned_field(&self, field: FieldRef, interner: &SymbolInterner) -> bool {
        self.field_constraints(field, interner).is_pinned()
    }

    /// Returns `true` when merging may consume or retarget the class.
    #[must_use]
    pub fn can_merge_class(&self, ty: Type, interner: &SymbolInterner) -> bool {
        let constraints = self.class_constraints(ty, interner);
        !constraints.is_pinned() && !constraints.contains(KeepConstraints::NO_MERGE)
    }

    /// Returns `true` when the class inliner may eliminate instances of the
    /// class.
    #[must_use]
    pub fn can_inline_class(&self, ty: Type, interner: &SymbolInterner) -> bool {
        let constraints = self.class_constraints(ty, interner);
        !constraints.is_pinned() && !constraints.contains(KeepConstraints::NO_INLINE)
    }

    /// Returns `true` when minification may rename the class.
    #[must_use]
    pub fn can_rename_class(&self, ty: Type, interner: &SymbolInterner) -> bool {
        !self
            .class_constraints(ty, interner)
            .contains(KeepConstraints::IDENTITY)
    }

    /// Returns `true` when minification may rename the method.
    #[must_use]
    pub fn can_rename_method(&self, method: MethodRef, interner: &SymbolInterner) -> bool {
        !self
            .method_constraints(method, interner)
            .contains(KeepConstraints::IDENTITY)
    }

    /// Returns `true` when minification may rename the field.
    #[must_use]
    pub fn can_rename_field(&self, field: FieldRef, interner: &SymbolInterner) -> bool {
        !self
            .field_constraints(field, interner)
            .contains(KeepConstraints::IDENTITY)
    }

    /// Returns `true` when the class is a tree-shaking root.
    #[must_use]
    pub fn is_root_class(&self, ty: Type, interner: &SymbolInterner) -> bool {
        self.class_constraints(ty, interner)
            .contains(KeepConstraints::PRESENCE)
    }

    /// Returns `true` when the method is a tree-shaking root.
    #[must_use]
    pub fn is_root_method(&self, method: MethodRef, interner: &SymbolInterner) -> bool {
        self.method_constraints(method, interner)
            .contains(KeepConstraints::PRESENCE)
    }

    /// Returns `true` when the field is a tree-shaking root.
    #[must_use]
    pub fn is_root_field(&self, field: FieldRef, interner: &SymbolInterner) -> bool {
        self.field_constraints(field, interner)
            .contains(KeepConstraints::PRESENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        shaking::rules::{KeepRule, MemberPattern},
        testutil::TestProgramBuilder,
    };

    #[test]
    fn test_pinning_and_caching() {
        let mut rules = KeepRules::new();
        rules.pin_class_with_members("LMain;");
        let oracle = KeepOracle::new(Arc::new(rules));

        let builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let main = interner.type_of("LMain;");
        let other = interner.type_of("LOther;");

        assert!(oracle.is_pinned_class(main, &interner));
        assert!(!oracle.is_pinned_class(other, &interner));
        // Cached answer stays stable.
        assert!(oracle.is_pinned_class(main, &interner));

        let main_method = interner.method(main, "run", &[], Type::VOID);
        let other_method = interner.method(other, "run", &[], Type::VOID);
        assert!(oracle.is_pinned_method(main_method, &interner));
        assert!(!oracle.is_pinned_method(other_method, &interner));
    }

    #[test]
    fn test_no_merge_constraint() {
        let mut rules = KeepRules::new();
        rules.add_rule(KeepRule {
            class_pattern: "LFrozen;".to_string(),
            member: None,
            action: RuleAction::Keep(KeepConstraints::NO_MERGE),
        });
        let oracle = KeepOracle::new(Arc::new(rules));

        let builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let frozen = interner.type_of("LFrozen;");

        assert!(!oracle.is_pinned_class(frozen, &interner));
        assert!(!oracle.can_merge_class(frozen, &interner));
        assert!(oracle.can_rename_class(frozen, &interner));
    }

    #[test]
    fn test_conflict_detection() {
        let mut rules = KeepRules::new();
        rules.pin_class("LBoth;");
        rules.add_rule(KeepRule {
            class_pattern: "LBoth;".to_string(),
            member: None,
            action: RuleAction::CheckDiscard,
        });

        let mut builder = TestProgramBuilder::new();
        builder.simple_class("LBoth;");
        let (app, interner) = builder.build();

        let oracle = KeepOracle::new(Arc::new(rules));
        assert!(oracle.check_conflicts(&app, &interner).is_err());
    }

    #[test]
    fn test_member_pattern() {
        let pattern = MemberPattern {
            name: "*".to_string(),
        };
        assert!(pattern.matches("anything"));
        let exact = MemberPattern {
            name: "run".to_string(),
        };
        assert!(exact.matches("run"));
        assert!(!exact.matches("walk"));
    }
}
