//! Enum unboxing.
//!
//! Rewrites eligible enums to plain `int` constants: each enum constant
//! becomes its ordinal, reads of the constants become integer constants, and
//! the enum's instance methods statify onto a synthesized utility class with
//! the receiver as an explicit leading `int` parameter. The emitted lens maps
//! the enum type to `int`, carries a prototype change for every method whose
//! signature mentioned the enum, and statifies the invocation kind for calls
//! whose holder was unboxed.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::{ArgumentInfo, GraphLens, PrototypeChanges, RewrittenTypeInfo},
    ir::{ConstantValue, Op},
    metadata::{
        ClassAccessFlags, ClassDefinition, ClassHierarchy, DexApplication, FieldRef,
        MethodAccessFlags, SymbolInterner, Type,
    },
    shaking::{KeepOracle, RuntimeTypeCheckInfo},
    Result,
};

/// The enum unboxing pass.
pub struct EnumUnboxer {
    interner: Arc<SymbolInterner>,
    oracle: Arc<KeepOracle>,
}

impl EnumUnboxer {
    /// Creates the pass.
    #[must_use]
    pub fn new(interner: Arc<SymbolInterner>, oracle: Arc<KeepOracle>) -> Self {
        Self { interner, oracle }
    }

    /// Runs the pass; returns the lens, or `None` when no enum was unboxed.
    ///
    /// # Errors
    ///
    /// Only lens construction can fail; ineligible enums are kept boxed.
    pub fn run(
        &self,
        app: &mut DexApplication,
        runtime_checks: &RuntimeTypeCheckInfo,
    ) -> Result<Option<GraphLens>> {
        let hierarchy = ClassHierarchy::build(app, &self.interner);

        let mut candidates: Vec<Type> = Vec::new();
        for class in app.classes_with_deterministic_order() {
            if self.is_eligible(class, &hierarchy, runtime_checks) {
                candidates.push(class.ty);
            }
        }
        self.reject_by_usage(app, &mut candidates);

        if candidates.is_empty() {
            return Ok(None);
        }

        let mut builder = GraphLens::builder("enum unboxing");
        builder.statify_mapped_holders();

        let mut constant_ordinals: FxHashMap<FieldRef, i32> = FxHashMap::default();
        for &enum_type in &candidates {
            self.unbox(app, enum_type, &mut builder, &mut constant_ordinals)?;
        }

        // Prototype changes for every surviving program method whose
        // signature mentions an unboxed enum.
        let unboxed: FxHashSet<Type> = candidates.iter().copied().collect();
        self.record_signature_rewrites(app, &unboxed, &mut builder);

        // Reads of the former constants become integer constants before the
        // lens rewrite runs over the bodies.
        self.fold_constant_reads(app, &constant_ordinals);

        for enum_type in candidates {
            app.remove_program_class(enum_type);
        }

        Ok(Some(builder.build(&self.interner)?))
    }

    /// Structural eligibility of one enum class.
    fn is_eligible(
        &self,
        class: &ClassDefinition,
        hierarchy: &ClassHierarchy,
        runtime_checks: &RuntimeTypeCheckInfo,
    ) -> bool {
        if !class.is_enum() || class.super_type != Some(Type::ENUM) {
            return false;
        }
        if !self.oracle.can_merge_class(class.ty, &self.interner) {
            return false;
        }
        if runtime_checks.is_runtime_check_type(class.ty) {
            return false;
        }
        if !hierarchy.is_leaf(class.ty) {
            return false;
        }
        if class.instance_fields().count() > 0 {
            return false;
        }
        // Static members beyond the constants and the initializer keep the
        // enum boxed: `values()` and `valueOf` expose object identity.
        if class
            .static_fields()
            .any(|field| self.interner.field_data(field.reference).field_type != class.ty)
        {
            return false;
        }
        for method in class.methods() {
            let data = self.interner.method_data(method.reference);
            if data.is_class_initializer() || data.is_constructor() {
                continue;
            }
            if method.is_static() {
                return false;
            }
            if method.code.is_none() {
                return false;
            }
        }
        true
    }

    /// Rejects candidates whose usage cannot be rewritten: library-resolved
    /// calls (`ordinal`, `name`, ...), writes to the constants outside the
    /// enum, or instantiation outside the enum's own initializer.
    fn reject_by_usage(&self, app: &DexApplication, candidates: &mut Vec<Type>) {
        let candidate_set: FxHashSet<Type> = candidates.iter().copied().collect();
        let mut rejected: FxHashSet<Type> = FxHashSet::default();

        for class in app.program_classes() {
            for method in class.methods() {
                let Some(code) = &method.code else { continue };
                let inside_own = candidate_set.contains(&class.ty);
                for block in code.blocks() {
                    for instruction in &block.instructions {
                        match &instruction.op {
                            Op::Invoke { method: callee, .. } => {
                                let data = self.interner.method_data(*callee);
                                if candidate_set.contains(&data.holder) {
                                    let declared = app
                                        .program_definition_for(data.holder)
                                        .map(|c| c.method(*callee).is_some())
                                        .unwrap_or(false);
                                    if !declared {
                                        rejected.insert(data.holder);
                                    }
                                }
                            }
                            Op::StaticPut { field, .. } => {
                                let holder = self.interner.field_data(*field).holder;
                                if candidate_set.contains(&holder) && !(inside_own && holder == class.ty)
                                {
                                    rejected.insert(holder);
                                }
                            }
                            Op::NewInstance { class: allocated } => {
                                if candidate_set.contains(allocated)
                                    && !(inside_own && *allocated == class.ty)
                                {
                                    rejected.insert(*allocated);
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        candidates.retain(|candidate| !rejected.contains(candidate));
    }

    /// Unboxes one enum: assigns ordinals, synthesizes the utility class, and
    /// records the lens entries for the moved methods.
    fn unbox(
        &self,
        app: &mut DexApplication,
        enum_type: Type,
        builder: &mut crate::graph::GraphLensBuilder,
        constant_ordinals: &mut FxHashMap<FieldRef, i32>,
    ) -> Result<()> {
        let interner = &self.interner;
        builder.map_type(enum_type, Type::INT);

        let Some(class) = app.program_definition_for(enum_type) else {
            return Ok(());
        };

        // Ordinals follow constant declaration order.
        for (ordinal, field) in class.static_fields().enumerate() {
            constant_ordinals.insert(field.reference, ordinal as i32);
        }

        // Utility class holding the statified instance methods.
        let enum_descriptor = interner.type_descriptor(enum_type);
        let utility_descriptor = format!(
            "{}$Unboxed;",
            enum_descriptor.strip_suffix(';').unwrap_or(&enum_descriptor)
        );
        let utility_type = interner.type_of(&utility_descriptor);

        let mut moved: Vec<crate::metadata::MethodDefinition> = Vec::new();
        let mut taken: FxHashSet<(String, Vec<Type>)> = FxHashSet::default();
        for method in class.virtual_methods() {
            let data = interner.method_data(method.reference);

            let mut new_params = vec![Type::INT];
            let mut changes = PrototypeChanges::none().with_argument_info(
                0,
                ArgumentInfo::Rewritten(RewrittenTypeInfo {
                    old_type: enum_type,
                    new_type: Type::INT,
                }),
            );
            for (index, &param) in data.params.iter().enumerate() {
                if param == enum_type {
                    new_params.push(Type::INT);
                    changes = changes.with_argument_info(
                        (index + 1) as u16,
                        ArgumentInfo::Rewritten(RewrittenTypeInfo {
                            old_type: enum_type,
                            new_type: Type::INT,
                        }),
                    );
                } else {
                    new_params.push(param);
                }
            }
            let return_type = if data.return_type == enum_type {
                changes = changes.with_return_info(RewrittenTypeInfo {
                    old_type: enum_type,
                    new_type: Type::INT,
                });
                Type::INT
            } else {
                data.return_type
            };

            let mut name = data.name.to_string();
            while !taken.insert((name.clone(), new_params.clone())) {
                name = crate::graph::disambiguate_name(&name, |candidate| {
                    taken.contains(&(candidate.to_string(), new_params.clone()))
                });
            }

            let target = interner.method(utility_type, &name, &new_params, return_type);
            builder.move_method_with_prototype(method.reference, target, changes);

            let mut definition = method.clone();
            definition.reference = target;
            definition.access_flags = MethodAccessFlags::PUBLIC
                | MethodAccessFlags::STATIC
                | MethodAccessFlags::SYNTHETIC;
            moved.push(definition);
        }

        if !moved.is_empty() {
            let mut utility = ClassDefinition::new(
                utility_type,
                ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SYNTHETIC,
                Some(Type::OBJECT),
            );
            for method in moved {
                utility.add_method(method);
            }
            app.add_program_class(utility)?;
        }

        Ok(())
    }

    /// Records prototype changes for remaining program methods whose
    /// signature mentions an unboxed enum; the reference itself is rewritten
    /// by the type map.
    fn record_signature_rewrites(
        &self,
        app: &DexApplication,
        unboxed: &FxHashSet<Type>,
        builder: &mut crate::graph::GraphLensBuilder,
    ) {
        let interner = &self.interner;
        for class in app.classes_with_deterministic_order() {
            if unboxed.contains(&class.ty) {
                continue;
            }
            for method in class.methods() {
                let data = interner.method_data(method.reference);
                let mentions_enum = data.params.iter().any(|param| unboxed.contains(param))
                    || unboxed.contains(&data.return_type);
                if !mentions_enum {
                    continue;
                }

                let receiver_offset = u16::from(!method.is_static());
                let mut changes = PrototypeChanges::none();
                for (index, &param) in data.params.iter().enumerate() {
                    if unboxed.contains(&param) {
                        changes = changes.with_argument_info(
                            index as u16 + receiver_offset,
                            ArgumentInfo::Rewritten(RewrittenTypeInfo {
                                old_type: param,
                                new_type: Type::INT,
                            }),
                        );
                    }
                }
                if unboxed.contains(&data.return_type) {
                    changes = changes.with_return_info(RewrittenTypeInfo {
                        old_type: data.return_type,
                        new_type: Type::INT,
                    });
                }

                let new_params: Vec<Type> = data
                    .params
                    .iter()
                    .map(|&param| if unboxed.contains(&param) { Type::INT } else { param })
                    .collect();
                let new_return = if unboxed.contains(&data.return_type) {
                    Type::INT
                } else {
                    data.return_type
                };
                let target = interner.method(data.holder, &data.name, &new_params, new_return);
                builder.move_method_with_prototype(method.reference, target, changes);
            }
        }
    }

    /// Replaces reads of the former enum constants with their ordinals.
    fn fold_constant_reads(
        &self,
        app: &mut DexApplication,
        constant_ordinals: &FxHashMap<FieldRef, i32>,
    ) {
        for class in app.program_classes_mut() {
            for method in class.methods_mut() {
                let Some(code) = &mut method.code else { continue };
                for block in code.blocks_mut() {
                    for instruction in &mut block.instructions {
                        if let Op::StaticGet { field } = &instruction.op {
                            if let Some(&ordinal) = constant_ordinals.get(field) {
                                instruction.op = Op::Const(ConstantValue::Int(ordinal));
                            }
                        }
                    }
                }
            }
        }
    }
}
