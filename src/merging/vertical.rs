//! Conservative vertical class merging.
//!
//! Folds a superclass into its sole program subclass when doing so cannot be
//! observed: the superclass is never instantiated directly, never runtime
//! type-checked, carries no class initializer or interfaces, and none of its
//! members collide with the subclass's. Anything less conservative would need
//! bridge synthesis; ineligible candidates are simply skipped.
//!
//! The merged sources are reported so the horizontal merger's
//! `NotVerticallyMergedIntoSubtype` policy can exclude them.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::{
    graph::{disambiguate_name, GraphLens},
    metadata::{
        ClassHierarchy, DexApplication, MethodAccessFlags, SymbolInterner, Type,
    },
    shaking::{KeepOracle, LiveSet, RuntimeTypeCheckInfo},
    Result,
};

/// Superclass-into-subclass folding.
pub struct VerticalClassMerger {
    interner: Arc<SymbolInterner>,
    oracle: Arc<KeepOracle>,
}

impl VerticalClassMerger {
    /// Creates the merger.
    #[must_use]
    pub fn new(interner: Arc<SymbolInterner>, oracle: Arc<KeepOracle>) -> Self {
        Self { interner, oracle }
    }

    /// Runs the merger; returns the lens and the set of folded superclasses.
    ///
    /// # Errors
    ///
    /// Only lens construction can fail; ineligible candidates are skipped.
    pub fn run(
        &self,
        app: &mut DexApplication,
        live: &LiveSet,
        runtime_checks: &RuntimeTypeCheckInfo,
    ) -> Result<(Option<GraphLens>, FxHashSet<Type>)> {
        let hierarchy = ClassHierarchy::build(app, &self.interner);

        let mut pairs: Vec<(Type, Type)> = Vec::new();
        let mut involved: FxHashSet<Type> = FxHashSet::default();
        for class in app.classes_with_deterministic_order() {
            let source = class.ty;
            if involved.contains(&source) {
                continue;
            }
            let Some(subclass) =
                self.eligible_subclass(app, &hierarchy, live, runtime_checks, source)
            else {
                continue;
            };
            if involved.contains(&subclass) {
                continue;
            }
            involved.insert(source);
            involved.insert(subclass);
            pairs.push((source, subclass));
        }

        if pairs.is_empty() {
            return Ok((None, FxHashSet::default()));
        }

        let mut builder = GraphLens::builder("vertical class merging");
        let mut merged = FxHashSet::default();
        for (source, subclass) in pairs {
            self.fold(app, source, subclass, &mut builder);
            merged.insert(source);
        }

        Ok((Some(builder.build(&self.interner)?), merged))
    }

    /// Finds the sole subclass a candidate superclass may fold into.
    fn eligible_subclass(
        &self,
        app: &DexApplication,
        hierarchy: &ClassHierarchy,
        live: &LiveSet,
        runtime_checks: &RuntimeTypeCheckInfo,
        source: Type,
    ) -> Option<Type> {
        let class = app.program_definition_for(source)?;
        if class.is_interface()
            || class.is_enum()
            || !class.interfaces.is_empty()
            || !class.inner_classes.is_empty()
            || class.kotlin_metadata.is_some()
            || class.has_class_initializer(&self.interner)
        {
            return None;
        }
        if !self.oracle.can_merge_class(source, &self.interner) {
            return None;
        }
        if runtime_checks.is_runtime_check_type(source) {
            return None;
        }
        if live.instantiated.contains(&source) {
            return None;
        }

        let subtypes = hierarchy.subtypes_of(source);
        let [subclass] = subtypes else {
            return None;
        };
        let subclass = *subclass;
        let target = app.program_definition_for(subclass)?;
        if target.super_type != Some(source) {
            return None;
        }

        // Member collisions would need renaming of externally visible
        // members or super-dispatch preservation; both reject the candidate.
        for field in class.fields() {
            let name = self.interner.field_data(field.reference).name.clone();
            let collides = target.fields().iter().any(|existing| {
                self.interner.field_data(existing.reference).name == name
            });
            if collides {
                return None;
            }
        }
        for method in class.virtual_methods() {
            let signature = self.interner.method_data(method.reference).signature();
            if method.code.is_none() {
                return None;
            }
            if target
                .lookup_virtual_method(&signature, &self.interner)
                .is_some()
            {
                return None;
            }
        }
        for method in class.direct_methods() {
            if method.code.is_none() {
                return None;
            }
        }

        Some(subclass)
    }

    /// Folds `source` into `subclass`, recording the lens entries.
    fn fold(
        &self,
        app: &mut DexApplication,
        source: Type,
        subclass: Type,
        lens: &mut crate::graph::GraphLensBuilder,
    ) {
        let interner = &self.interner;
        let Some(mut class) = app.take_program_class(source) else {
            return;
        };
        lens.map_type(source, subclass);

        let super_of_source = class.super_type;
        let mut taken_names: FxHashSet<String> = app
            .program_definition_for(subclass)
            .map(|target| {
                target
                    .member_names(interner)
                    .into_iter()
                    .map(|name| name.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mut moved_fields = Vec::new();
        for field in class.fields() {
            let data = interner.field_data(field.reference);
            let to = interner.field(subclass, &data.name, data.field_type);
            moved_fields.push(crate::metadata::FieldDefinition::new(to, field.access_flags));
            lens.move_field(field.reference, to);
        }

        let mut relocated_counter = 0usize;
        let mut moved_methods = Vec::new();
        for mut method in std::mem::take(class.methods_mut()) {
            let data = interner.method_data(method.reference);
            if data.is_class_initializer() {
                continue;
            }
            if data.is_constructor() {
                // Super-constructor calls from the subclass retarget to the
                // relocated body, still dispatched directly.
                let name = disambiguate_name(&format!("init$v{relocated_counter}"), |candidate| {
                    taken_names.contains(candidate)
                });
                relocated_counter += 1;
                taken_names.insert(name.clone());
                let to = interner.method(subclass, &name, &data.params, Type::VOID);
                lens.move_method(method.reference, to);
                method.reference = to;
                method.access_flags = MethodAccessFlags::PRIVATE | MethodAccessFlags::SYNTHETIC;
                moved_methods.push(method);
            } else {
                let to = interner.method_with_holder(method.reference, subclass);
                method.reference = to;
                moved_methods.push(method);
            }
        }

        if let Some(target) = app.program_definition_mut(subclass) {
            target.super_type = super_of_source;
            for field in moved_fields {
                target.add_field(field);
            }
            for method in moved_methods {
                target.add_method(method);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::IrBuilder, metadata::MethodDefinition, shaking::KeepRules,
        testutil::TestProgramBuilder,
    };

    fn run_merger(
        app: &mut DexApplication,
        interner: &Arc<SymbolInterner>,
        live: &LiveSet,
    ) -> (Option<GraphLens>, FxHashSet<Type>) {
        let oracle = Arc::new(KeepOracle::new(Arc::new(KeepRules::new())));
        let merger = VerticalClassMerger::new(interner.clone(), oracle);
        merger
            .run(app, live, &RuntimeTypeCheckInfo::default())
            .unwrap()
    }

    #[test]
    fn test_uninstantiated_superclass_folds_into_sole_subclass() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let base = builder.simple_class("LBase;");
        let leaf = builder.simple_class_extending("LLeaf;", "LBase;");

        let base_run = interner.method(base, "run", &[], Type::INT);
        {
            let mut body = IrBuilder::new();
            let this = body.argument(base);
            let _ = this;
            let value = body.const_int(3);
            body.ret(Some(value));
            builder.class_mut(base).unwrap().add_method(
                MethodDefinition::new(base_run, crate::metadata::MethodAccessFlags::PUBLIC)
                    .with_code(body.finish()),
            );
        }

        let (mut app, interner2) = builder.build();
        let live = LiveSet::default();
        let (lens, merged) = run_merger(&mut app, &interner2, &live);

        assert!(merged.contains(&base));
        assert!(app.program_definition_for(base).is_none());
        let lens = lens.unwrap();
        assert_eq!(lens.map_type(base), leaf);

        // The method moved onto the subclass.
        let (mapped, _) = lens.map_method(base_run, &interner2);
        assert_eq!(interner2.method_data(mapped).holder, leaf);
        assert!(app
            .program_definition_for(leaf)
            .unwrap()
            .method(mapped)
            .is_some());
    }

    #[test]
    fn test_instantiated_superclass_is_kept() {
        let mut builder = TestProgramBuilder::new();
        let base = builder.simple_class("LBase;");
        builder.simple_class_extending("LLeaf;", "LBase;");
        let (mut app, interner) = builder.build();

        let mut live = LiveSet::default();
        live.instantiated.insert(base);
        let (lens, merged) = run_merger(&mut app, &interner, &live);

        assert!(lens.is_none());
        assert!(merged.is_empty());
        assert!(app.program_definition_for(base).is_some());
    }

    #[test]
    fn test_override_collision_is_kept() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let base = builder.simple_class("LBase;");
        let leaf = builder.simple_class_extending("LLeaf;", "LBase;");

        for (holder, value) in [(base, 1), (leaf, 2)] {
            let reference = interner.method(holder, "run", &[], Type::INT);
            let mut body = IrBuilder::new();
            let this = body.argument(holder);
            let _ = this;
            let constant = body.const_int(value);
            body.ret(Some(constant));
            builder.class_mut(holder).unwrap().add_method(
                MethodDefinition::new(reference, crate::metadata::MethodAccessFlags::PUBLIC)
                    .with_code(body.finish()),
            );
        }

        let (mut app, interner2) = builder.build();
        let (lens, merged) = run_merger(&mut app, &interner2, &LiveSet::default());

        assert!(lens.is_none());
        assert!(merged.is_empty());
    }
}
