//! The horizontal class merger.
//!
//! Detects sets of observationally interchangeable classes and fuses them into
//! one, rewriting all references through a single lens for the whole pass.
//!
//! # Pipeline
//!
//! 1. Candidates run through the fixed-order single-class battery.
//! 2. Survivors are bucketed by (superclass, interface set, access
//!    equivalence, instance-field layout).
//! 3. Multi-class policies split the buckets further.
//! 4. Each surviving group is planned; planning is pure and may reject the
//!    group (discarded wholesale, never failing the compilation).
//! 5. Planned groups are applied: instance fields relocate onto the target
//!    with renaming, constructors merge into class-id dispatchers, virtual
//!    methods unify or dispatch through synthesized trampolines keyed on the
//!    class-id field, and the sources disappear.
//!
//! The emitted lens maps every source type to the target, every relocated
//! member to its new reference, and every source constructor to its
//! dispatcher together with the appended class-id constant.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::{disambiguate_name, GraphLens, PrototypeChanges},
    ir::{IfCondition, IrBuilder, IrCode},
    merging::{
        group::MergeGroup,
        policies::{
            NoClassInitializer, NoDirectRuntimeTypeChecks, NoInnerClasses, NotPinned,
            NotVerticallyMergedIntoSubtype, OnlyConcreteClasses, SameMainDexPartition,
        },
        policy::{self, MultiClassPolicy, SingleClassPolicy},
    },
    metadata::{
        ClassDefinition, ClassHierarchy, DexApplication, FieldAccessFlags, FieldDefinition,
        FieldRef, InvokeKind, MethodAccessFlags, MethodDefinition, MethodRef, MethodSignature,
        SymbolInterner, Type,
    },
    shaking::{KeepOracle, RuntimeTypeCheckInfo},
    Result,
};

/// Policy-driven fusion of interchangeable classes.
pub struct HorizontalClassMerger {
    interner: Arc<SymbolInterner>,
    single_policies: Vec<Box<dyn SingleClassPolicy>>,
    multi_policies: Vec<Box<dyn MultiClassPolicy>>,
}

impl HorizontalClassMerger {
    /// Creates the merger with its fixed-order policy battery.
    #[must_use]
    pub fn new(
        interner: Arc<SymbolInterner>,
        oracle: Arc<KeepOracle>,
        runtime_checks: RuntimeTypeCheckInfo,
        vertically_merged: FxHashSet<Type>,
        main_dex: FxHashSet<Type>,
    ) -> Self {
        // Policy order is part of the contract: later policies assume the
        // earlier ones already filtered out ineligible cases.
        let single_policies: Vec<Box<dyn SingleClassPolicy>> = vec![
            Box::new(OnlyConcreteClasses),
            Box::new(NotPinned::new(oracle)),
            Box::new(NoInnerClasses),
            Box::new(NotVerticallyMergedIntoSubtype::new(vertically_merged)),
            Box::new(NoDirectRuntimeTypeChecks::new(runtime_checks)),
            Box::new(NoClassInitializer),
        ];
        let multi_policies: Vec<Box<dyn MultiClassPolicy>> =
            vec![Box::new(SameMainDexPartition::new(main_dex))];
        Self {
            interner,
            single_policies,
            multi_policies,
        }
    }

    /// Runs the merger over the application.
    ///
    /// Returns the lens covering every applied group, or `None` when nothing
    /// merged.
    ///
    /// # Errors
    ///
    /// Only lens construction can fail; ineligible or unplannable groups are
    /// discarded silently.
    pub fn run(&self, app: &mut DexApplication) -> Result<Option<GraphLens>> {
        let hierarchy = ClassHierarchy::build(app, &self.interner);
        let groups = self.compute_groups(app);

        let mut builder = GraphLens::builder("horizontal class merging");
        let mut merged_any = false;

        for group in groups {
            let Some(plan) = self.plan_group(app, &hierarchy, &group) else {
                continue;
            };
            self.apply_group(app, plan, &mut builder);
            merged_any = true;
        }

        if !merged_any {
            return Ok(None);
        }
        Ok(Some(builder.build(&self.interner)?))
    }

    /// Runs the policy battery and bucketing, producing candidate groups in
    /// deterministic order.
    fn compute_groups(&self, app: &DexApplication) -> Vec<MergeGroup> {
        let mut buckets: FxHashMap<BucketKey, Vec<Type>> = FxHashMap::default();

        for class in app.classes_with_deterministic_order() {
            if !policy::passes_single_policies(&self.single_policies, class, &self.interner) {
                continue;
            }
            buckets
                .entry(BucketKey::of(class, &self.interner))
                .or_default()
                .push(class.ty);
        }

        let initial: Vec<MergeGroup> = buckets
            .into_values()
            .map(|members| MergeGroup::new(members, &self.interner))
            .filter(|group| !group.is_trivial())
            .collect();

        let mut groups = policy::run_multi_policies(&self.multi_policies, initial, &self.interner);
        groups.sort_by(|a, b| self.interner.compare_types(a.target(), b.target()));
        groups
    }

    /// Plans one group. Pure; `None` discards the group wholesale.
    fn plan_group(
        &self,
        app: &DexApplication,
        hierarchy: &ClassHierarchy,
        group: &MergeGroup,
    ) -> Option<MergePlan> {
        let interner = &self.interner;
        let target_class = app.program_definition_for(group.target())?;

        // Names already taken on the target; grows as relocations are planned.
        let mut taken_names: FxHashSet<String> = target_class
            .member_names(interner)
            .into_iter()
            .map(|name| name.to_string())
            .collect();

        let class_id_field_name =
            disambiguate_name("classId", |candidate| taken_names.contains(candidate));
        taken_names.insert(class_id_field_name.clone());

        // Instance and static fields of every source relocate onto the target.
        let mut field_moves = Vec::new();
        for &source in group.sources() {
            let class = app.program_definition_for(source)?;
            for field in class.fields() {
                let data = interner.field_data(field.reference);
                let new_name =
                    disambiguate_name(&data.name, |candidate| taken_names.contains(candidate));
                taken_names.insert(new_name.clone());
                field_moves.push(FieldMove {
                    from: field.reference,
                    access_flags: field.access_flags,
                    new_name,
                });
            }
        }

        // Constructors group by parameter list; each list gets one dispatcher.
        let mut ctor_groups: FxHashMap<Vec<Type>, Vec<CtorEntry>> = FxHashMap::default();
        let mut relocated_counter = 0usize;
        for &member in group.members() {
            let class = app.program_definition_for(member)?;
            let class_id = group.class_id_of(member)?;
            for ctor in class.instance_initializers(interner) {
                ctor.code.as_ref()?;
                let data = interner.method_data(ctor.reference);
                let relocated_name = disambiguate_name(&format!("init${relocated_counter}"), |candidate| {
                    taken_names.contains(candidate)
                });
                relocated_counter += 1;
                taken_names.insert(relocated_name.clone());
                ctor_groups
                    .entry(data.params.to_vec())
                    .or_default()
                    .push(CtorEntry {
                        class_id,
                        holder: member,
                        original: ctor.reference,
                        relocated_name,
                    });
            }
        }
        let mut ctor_groups: Vec<(Vec<Type>, Vec<CtorEntry>)> = ctor_groups.into_iter().collect();
        ctor_groups.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        // Virtual methods: unify identical definitions, trampoline diverging
        // ones, move single definitions; anything else rejects the group.
        let mut signatures: Vec<MethodSignature> = Vec::new();
        let mut seen_signatures: FxHashSet<(Arc<str>, Arc<[Type]>, Type)> = FxHashSet::default();
        for &member in group.members() {
            let class = app.program_definition_for(member)?;
            for method in class.virtual_methods() {
                let signature = interner.method_data(method.reference).signature();
                let key = (
                    signature.name.clone(),
                    signature.params.clone(),
                    signature.return_type,
                );
                if seen_signatures.insert(key) {
                    signatures.push(signature);
                }
            }
        }

        let mut virtual_actions = Vec::new();
        for signature in signatures {
            let mut definitions: Vec<(i32, Type, MethodRef, &MethodDefinition)> = Vec::new();
            for &member in group.members() {
                let class = app.program_definition_for(member)?;
                if let Some(found) = class.lookup_virtual_method(&signature, interner) {
                    definitions.push((
                        group.class_id_of(member)?,
                        member,
                        found.reference,
                        found,
                    ));
                }
            }

            if definitions.len() == group.len() {
                let (_, _, first_reference, first) = definitions[0];
                let all_identical = definitions.iter().all(|(_, _, _, definition)| {
                    definition.code == first.code && definition.access_flags == first.access_flags
                });
                if all_identical {
                    virtual_actions.push(VirtualAction::Unify {
                        keep: first_reference,
                        keep_holder: definitions[0].1,
                    });
                    continue;
                }
                // Diverging bodies dispatch through a trampoline.
                if definitions.iter().any(|(_, _, _, d)| d.code.is_none()) {
                    return None;
                }
                let mut entries = Vec::new();
                for (class_id, holder, reference, _) in &definitions {
                    let new_name = disambiguate_name(
                        &format!("{}${class_id}", signature.name),
                        |candidate| taken_names.contains(candidate),
                    );
                    taken_names.insert(new_name.clone());
                    entries.push(TrampolineEntry {
                        class_id: *class_id,
                        holder: *holder,
                        original: *reference,
                        new_name,
                    });
                }
                virtual_actions.push(VirtualAction::Trampoline {
                    signature: signature.clone(),
                    entries,
                });
                continue;
            }

            // A partial definition set is only safe when exactly one member
            // defines the signature and no supertype declares it: instances
            // of the other members can then never dispatch to it.
            if definitions.len() == 1
                && !hierarchy.signature_declared_above(app, group.target(), &signature, interner)
            {
                let (_, holder, reference, _) = definitions[0];
                virtual_actions.push(VirtualAction::MoveSingle {
                    from: reference,
                    from_holder: holder,
                });
                continue;
            }

            return None;
        }

        // Remaining direct methods of sources (static and private) relocate
        // with renaming on collision.
        let mut direct_moves = Vec::new();
        for &source in group.sources() {
            let class = app.program_definition_for(source)?;
            for method in class.direct_methods() {
                let data = interner.method_data(method.reference);
                if data.is_constructor() || data.is_class_initializer() {
                    continue;
                }
                let new_name =
                    disambiguate_name(&data.name, |candidate| taken_names.contains(candidate));
                taken_names.insert(new_name.clone());
                direct_moves.push(DirectMove {
                    from: method.reference,
                    from_holder: source,
                    new_name,
                });
            }
        }

        Some(MergePlan {
            group: group.clone(),
            class_id_field_name,
            field_moves,
            ctor_groups,
            virtual_actions,
            direct_moves,
        })
    }

    /// Applies a planned merge: mutates the target, removes the sources, and
    /// records the lens entries.
    fn apply_group(
        &self,
        app: &mut DexApplication,
        plan: MergePlan,
        lens: &mut crate::graph::GraphLensBuilder,
    ) {
        let interner = &self.interner;
        let target = plan.group.target();

        // Detach the source definitions; everything still needed is moved
        // from them onto the target.
        let mut detached: FxHashMap<Type, ClassDefinition> = FxHashMap::default();
        for &source in plan.group.sources() {
            if let Some(class) = app.take_program_class(source) {
                detached.insert(source, class);
            }
            lens.map_type(source, target);
        }

        let class_id_field = interner.field(target, &plan.class_id_field_name, Type::INT);

        // Field relocation.
        let mut relocated_fields: Vec<FieldDefinition> = vec![FieldDefinition::new(
            class_id_field,
            FieldAccessFlags::SYNTHETIC,
        )];
        for field_move in &plan.field_moves {
            let data = interner.field_data(field_move.from);
            let to = interner.field(target, &field_move.new_name, data.field_type);
            relocated_fields.push(FieldDefinition::new(to, field_move.access_flags));
            lens.move_field(field_move.from, to);
        }

        // Virtual methods.
        let mut added_methods: Vec<MethodDefinition> = Vec::new();
        let mut removed_target_methods: Vec<MethodRef> = Vec::new();
        for action in &plan.virtual_actions {
            match action {
                VirtualAction::Unify { keep, keep_holder } => {
                    if *keep_holder != target {
                        if let Some(source) = detached.get_mut(keep_holder) {
                            if let Some(mut definition) = take_method(source, *keep) {
                                definition.reference =
                                    interner.method_with_holder(*keep, target);
                                added_methods.push(definition);
                            }
                        }
                    }
                }
                VirtualAction::MoveSingle { from, from_holder } => {
                    if *from_holder != target {
                        if let Some(source) = detached.get_mut(from_holder) {
                            if let Some(mut definition) = take_method(source, *from) {
                                definition.reference =
                                    interner.method_with_holder(*from, target);
                                added_methods.push(definition);
                            }
                        }
                    }
                }
                VirtualAction::Trampoline { signature, entries } => {
                    let mut dispatch = Vec::new();
                    for entry in entries {
                        let renamed = interner.method(
                            target,
                            &entry.new_name,
                            &signature.params,
                            signature.return_type,
                        );
                        let definition = if entry.holder == target {
                            removed_target_methods.push(entry.original);
                            app.program_definition_for(target)
                                .and_then(|class| class.method(entry.original))
                                .cloned()
                        } else {
                            detached
                                .get_mut(&entry.holder)
                                .and_then(|source| take_method(source, entry.original))
                        };
                        if let Some(mut definition) = definition {
                            definition.reference = renamed;
                            added_methods.push(definition);
                        }
                        dispatch.push((entry.class_id, renamed));
                    }

                    let trampoline_reference = interner.method(
                        target,
                        &signature.name,
                        &signature.params,
                        signature.return_type,
                    );
                    let body = self.build_trampoline(
                        target,
                        class_id_field,
                        &signature.params,
                        signature.return_type,
                        &dispatch,
                    );
                    added_methods.push(
                        MethodDefinition::new(
                            trampoline_reference,
                            MethodAccessFlags::PUBLIC | MethodAccessFlags::SYNTHETIC,
                        )
                        .with_code(body),
                    );
                }
            }
        }

        // Constructors: relocate bodies, synthesize dispatchers, record the
        // prototype changes carrying each class id.
        for (params, entries) in &plan.ctor_groups {
            let mut dispatcher_params = params.clone();
            dispatcher_params.push(Type::INT);
            let dispatcher_reference =
                interner.method(target, "<init>", &dispatcher_params, Type::VOID);

            let mut dispatch = Vec::new();
            for entry in entries {
                let relocated =
                    interner.method(target, &entry.relocated_name, params, Type::VOID);
                let definition = if entry.holder == target {
                    removed_target_methods.push(entry.original);
                    app.program_definition_for(target)
                        .and_then(|class| class.method(entry.original))
                        .cloned()
                } else {
                    detached
                        .get_mut(&entry.holder)
                        .and_then(|source| take_method(source, entry.original))
                };
                if let Some(mut definition) = definition {
                    definition.reference = relocated;
                    definition.access_flags = MethodAccessFlags::PRIVATE
                        | MethodAccessFlags::SYNTHETIC
                        | (definition.access_flags & MethodAccessFlags::FINAL);
                    added_methods.push(definition);
                }
                dispatch.push((entry.class_id, relocated));

                lens.move_method_with_prototype(
                    entry.original,
                    dispatcher_reference,
                    PrototypeChanges::none().with_extra_constant_argument(entry.class_id),
                );
            }

            let body =
                self.build_constructor_dispatcher(target, class_id_field, params, &dispatch);
            added_methods.push(
                MethodDefinition::new(
                    dispatcher_reference,
                    MethodAccessFlags::PUBLIC
                        | MethodAccessFlags::CONSTRUCTOR
                        | MethodAccessFlags::SYNTHETIC,
                )
                .with_code(body),
            );
        }

        // Direct (static and private) methods of sources.
        for direct_move in &plan.direct_moves {
            let data = interner.method_data(direct_move.from);
            let to = interner.method(
                target,
                &direct_move.new_name,
                &data.params,
                data.return_type,
            );
            if let Some(source) = detached.get_mut(&direct_move.from_holder) {
                if let Some(mut definition) = take_method(source, direct_move.from) {
                    definition.reference = to;
                    added_methods.push(definition);
                }
            }
            lens.move_method(direct_move.from, to);
        }

        // Commit everything onto the target.
        if let Some(target_class) = app.program_definition_mut(target) {
            for removed in removed_target_methods {
                target_class.remove_method(removed);
            }
            for field in relocated_fields {
                target_class.add_field(field);
            }
            for method in added_methods {
                target_class.add_method(method);
            }
        }
    }

    /// Builds the class-id keyed constructor dispatcher body.
    fn build_constructor_dispatcher(
        &self,
        target: Type,
        class_id_field: FieldRef,
        params: &[Type],
        dispatch: &[(i32, MethodRef)],
    ) -> IrCode {
        let mut builder = IrBuilder::new();
        let this = builder.argument(target);
        let arguments: Vec<_> = params.iter().map(|&ty| builder.argument(ty)).collect();
        let class_id = builder.argument(Type::INT);
        builder.instance_put(class_id_field, this, class_id);

        for (index, (id, relocated)) in dispatch.iter().enumerate() {
            let mut call_args = vec![this];
            call_args.extend(&arguments);

            if index + 1 == dispatch.len() {
                // Densely assigned ids make the last entry the else branch.
                builder.invoke(InvokeKind::Direct, *relocated, call_args);
                builder.ret(None);
            } else {
                let expected = builder.const_int(*id);
                let call_block = builder.new_block();
                let next_block = builder.new_block();
                builder.branch_if(IfCondition::Eq, class_id, expected, call_block, next_block);

                builder.switch_to(call_block);
                builder.invoke(InvokeKind::Direct, *relocated, call_args);
                builder.ret(None);

                builder.switch_to(next_block);
            }
        }

        builder.finish()
    }

    /// Builds a virtual-dispatch trampoline keyed on the class-id field.
    fn build_trampoline(
        &self,
        target: Type,
        class_id_field: FieldRef,
        params: &[Type],
        return_type: Type,
        dispatch: &[(i32, MethodRef)],
    ) -> IrCode {
        let mut builder = IrBuilder::new();
        let this = builder.argument(target);
        let arguments: Vec<_> = params.iter().map(|&ty| builder.argument(ty)).collect();
        let class_id = builder.instance_get(class_id_field, this, &self.interner);

        for (index, (id, renamed)) in dispatch.iter().enumerate() {
            let mut call_args = vec![this];
            call_args.extend(&arguments);

            let emit_call = |builder: &mut IrBuilder| {
                if return_type == Type::VOID {
                    builder.invoke(InvokeKind::Virtual, *renamed, call_args.clone());
                    builder.ret(None);
                } else {
                    let result = builder.invoke_value(
                        InvokeKind::Virtual,
                        *renamed,
                        call_args.clone(),
                        &self.interner,
                    );
                    builder.ret(Some(result));
                }
            };

            if index + 1 == dispatch.len() {
                emit_call(&mut builder);
            } else {
                let expected = builder.const_int(*id);
                let call_block = builder.new_block();
                let next_block = builder.new_block();
                builder.branch_if(IfCondition::Eq, class_id, expected, call_block, next_block);

                builder.switch_to(call_block);
                emit_call(&mut builder);

                builder.switch_to(next_block);
            }
        }

        builder.finish()
    }
}

/// Bucketing key: groups only classes that agree on superclass, interfaces,
/// access equivalence, and instance-field layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    super_type: Option<Type>,
    interfaces: Vec<Type>,
    public: bool,
    final_class: bool,
    instance_layout: Vec<Type>,
}

impl BucketKey {
    fn of(class: &ClassDefinition, interner: &SymbolInterner) -> Self {
        let mut interfaces = class.interfaces.clone();
        interfaces.sort_by(|a, b| interner.compare_types(*a, *b));
        Self {
            super_type: class.super_type,
            interfaces,
            public: class
                .access_flags
                .contains(crate::metadata::ClassAccessFlags::PUBLIC),
            final_class: class.is_final(),
            instance_layout: class
                .instance_fields()
                .map(|field| interner.field_data(field.reference).field_type)
                .collect(),
        }
    }
}

#[derive(Debug)]
struct MergePlan {
    group: MergeGroup,
    class_id_field_name: String,
    field_moves: Vec<FieldMove>,
    ctor_groups: Vec<(Vec<Type>, Vec<CtorEntry>)>,
    virtual_actions: Vec<VirtualAction>,
    direct_moves: Vec<DirectMove>,
}

#[derive(Debug)]
struct FieldMove {
    from: FieldRef,
    access_flags: FieldAccessFlags,
    new_name: String,
}

#[derive(Debug)]
struct CtorEntry {
    class_id: i32,
    holder: Type,
    original: MethodRef,
    relocated_name: String,
}

#[derive(Debug)]
struct DirectMove {
    from: MethodRef,
    from_holder: Type,
    new_name: String,
}

#[derive(Debug)]
enum VirtualAction {
    Unify {
        keep: MethodRef,
        keep_holder: Type,
    },
    MoveSingle {
        from: MethodRef,
        from_holder: Type,
    },
    Trampoline {
        signature: MethodSignature,
        entries: Vec<TrampolineEntry>,
    },
}

#[derive(Debug)]
struct TrampolineEntry {
    class_id: i32,
    holder: Type,
    original: MethodRef,
    new_name: String,
}

fn take_method(class: &mut ClassDefinition, reference: MethodRef) -> Option<MethodDefinition> {
    let index = class
        .methods()
        .iter()
        .position(|method| method.reference == reference)?;
    Some(class.methods_mut().remove(index))
}
