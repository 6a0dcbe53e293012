//! Per-candidate eligibility analysis and transformation.
//!
//! One [`InlineCandidateProcessor`] handles one root instruction (a
//! `new-instance` or a `static-get` of a trivially initialized singleton
//! field) inside one method. It checks, in order: the instance is eligible,
//! the class and its usage pattern are eligible, every user of the instance is
//! eligible. Only then does it transform: null out unused argument positions,
//! force-inline every call on the instance, replace field reads with reaching
//! values, and remove the writes, the root, and the superclass constructor
//! call.
//!
//! Eligibility is a pure function of the IR state, so after force inlining
//! the user analysis simply reruns; a failure at that point is a programmer
//! error, not an input condition.

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use crate::{
    ir::{ConstantValue, InstrSite, Instruction, IrCode, Op, ValueId},
    inliner::{field_value::FieldValueHelper, force},
    metadata::{
        ClassInlinerEligibility, DexApplication, FieldRef, InvokeKind, MethodDefinition, MethodRef,
        ParameterUsage, SymbolInterner, Type,
    },
    shaking::KeepOracle,
    Result,
};

/// A call on the instance approved for force inlining.
#[derive(Debug, Clone)]
struct InliningInfo {
    target: MethodRef,
    code: IrCode,
}

/// The classified users of the instance after one analysis sweep.
#[derive(Debug, Default)]
struct UserPlan {
    direct_calls: Vec<(InstrSite, InliningInfo)>,
    extra_calls: Vec<(InstrSite, InliningInfo)>,
    unused_arguments: Vec<(InstrSite, usize)>,
    estimated_size: usize,
}

impl UserPlan {
    fn next_inline(&self) -> Option<&(InstrSite, InliningInfo)> {
        self.extra_calls.first().or_else(|| self.direct_calls.first())
    }
}

/// Processes one inlining candidate root within one method.
pub struct InlineCandidateProcessor<'a> {
    interner: &'a SymbolInterner,
    app: &'a DexApplication,
    oracle: &'a KeepOracle,
    known_classes: &'a DashMap<Type, bool>,
    method_codes: &'a FxHashMap<MethodRef, IrCode>,
    method: MethodRef,
    total_size_limit: usize,

    instance: ValueId,
    root_is_new_instance: bool,
    eligible_class: Type,
}

impl<'a> InlineCandidateProcessor<'a> {
    /// Creates a processor for the root instruction at `root_site`.
    ///
    /// Returns `None` when the root defines no value (dead roots are not
    /// candidates).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        interner: &'a SymbolInterner,
        app: &'a DexApplication,
        oracle: &'a KeepOracle,
        known_classes: &'a DashMap<Type, bool>,
        method_codes: &'a FxHashMap<MethodRef, IrCode>,
        method: MethodRef,
        total_size_limit: usize,
        code: &IrCode,
        root_site: InstrSite,
    ) -> Option<Self> {
        let root = code.instruction_at(root_site)?;
        let instance = root.out?;
        let (eligible_class, root_is_new_instance) = match &root.op {
            Op::NewInstance { class } => (*class, true),
            Op::StaticGet { field } => (interner.field_data(*field).field_type, false),
            _ => return None,
        };
        Some(Self {
            interner,
            app,
            oracle,
            known_classes,
            method_codes,
            method,
            total_size_limit,
            instance,
            root_is_new_instance,
            eligible_class,
        })
    }

    /// Runs eligibility, the budget check, and the transformation.
    ///
    /// Returns `true` when the root was eliminated. All eligibility failures
    /// skip silently, leaving the method unchanged.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation when the transformation discovers a
    /// state the eligibility analysis ruled out.
    pub fn process(&self, code: &mut IrCode) -> Result<bool> {
        if self.app.program_definition_for(self.eligible_class).is_none() {
            return Ok(false);
        }
        if !self.is_class_and_usage_eligible(code) {
            return Ok(false);
        }
        let Some(plan) = self.analyze_users(code) else {
            return Ok(false);
        };
        if plan.estimated_size >= self.total_size_limit {
            // Over budget: silently skip the candidate.
            return Ok(false);
        }

        // Force-inline every call on the instance. Each inline invalidates
        // instruction positions, so the users are reclassified after every
        // step; eligibility is pure in the IR state and must keep holding.
        loop {
            let plan = self
                .analyze_users(code)
                .ok_or_else(|| invariant_error!("users became ineligible during inlining"))?;
            if !plan.unused_arguments.is_empty() {
                self.replace_unused_arguments(code, &plan.unused_arguments);
                continue;
            }
            let Some((site, info)) = plan.next_inline() else {
                break;
            };
            force::inline_call(code, *site, &info.code)?;
            code.recompute_predecessors();
        }

        self.remove_super_initializer_and_field_reads(code)?;
        self.remove_field_writes(code)?;
        self.remove_root(code)?;

        code.remove_trivial_phis();
        code.eliminate_dead_code();
        debug_assert!(code.is_consistent_ssa());
        Ok(true)
    }

    /// Class-level eligibility, cached across methods and threads.
    fn is_class_eligible(&self, class: Type) -> bool {
        if let Some(known) = self.known_classes.get(&class) {
            return *known;
        }
        let eligible = self.compute_class_eligible(class);
        *self.known_classes.entry(class).or_insert(eligible)
    }

    // Class is eligible when it is a program class, concrete, unpinned,
    // directly extends the root object type, declares no finalizer, and
    // loading it triggers no static initializer beyond its own.
    fn compute_class_eligible(&self, class: Type) -> bool {
        let Some(definition) = self.app.program_definition_for(class) else {
            return false;
        };
        if definition.is_abstract() || definition.is_interface() {
            return false;
        }
        if !self.oracle.can_inline_class(class, self.interner) {
            return false;
        }
        if definition.super_type != Some(Type::OBJECT) {
            return false;
        }
        if definition.has_finalizer(self.interner) {
            return false;
        }
        definition.interfaces.iter().all(|&interface| {
            self.app
                .definition_for(interface)
                .map(|class| !class.has_class_initializer(self.interner))
                .unwrap_or(true)
        })
    }

    fn is_class_and_usage_eligible(&self, code: &IrCode) -> bool {
        if !self.is_class_eligible(self.eligible_class) {
            return false;
        }
        let Some(definition) = self.app.program_definition_for(self.eligible_class) else {
            return false;
        };

        if self.root_is_new_instance {
            // The class itself must not run a class initializer.
            return !definition.has_class_initializer(self.interner);
        }

        // Singleton pattern: a static final field initialized by a trivial
        // class initializer. The instance is published through the field, so
        // the class must be final, must not carry instance state, and the
        // initializer must be exactly the allocate-construct-store shape.
        let root_field = self.root_field(code);
        let Some(root_field) = root_field else {
            return false;
        };
        if definition.instance_fields().count() > 0 || !definition.is_final() {
            return false;
        }
        let Some(initializer) = definition.class_initializer(self.interner) else {
            return false;
        };
        let trivially_writes = initializer.optimization_info.trivial_class_initializer;
        trivially_writes == Some(root_field)
            && !self.oracle.is_pinned_field(root_field, self.interner)
    }

    /// Classifies every user of the instance; `None` means ineligible.
    fn analyze_users(&self, code: &IrCode) -> Option<UserPlan> {
        if !code.phi_users_of(self.instance).is_empty() {
            return None;
        }

        let definition = self.app.program_definition_for(self.eligible_class)?;
        let mut plan = UserPlan::default();

        for site in code.users_of(self.instance) {
            let instruction = code.instruction_at(site)?;
            match &instruction.op {
                Op::InstanceGet { field, object } if *object == self.instance => {
                    if !self.is_own_instance_field(definition, *field) {
                        return None;
                    }
                }
                Op::InstancePut {
                    field,
                    object,
                    value,
                } if *object == self.instance && *value != self.instance => {
                    if !self.is_own_instance_field(definition, *field) {
                        return None;
                    }
                }
                Op::Invoke { kind, method, args } => {
                    match self.classify_invoke(code, *kind, *method, args, &mut plan, site) {
                        None => return None,
                        Some(Some((call_site, info))) => {
                            plan.estimated_size += self.size_for_inlining(info.target, &info.code);
                            plan.direct_calls.push((call_site, info));
                        }
                        Some(None) => {}
                    }
                }
                _ => return None,
            }
        }

        Some(plan)
    }

    /// Classifies one invoke user. Returns `None` when ineligible,
    /// `Some(None)` when handled (field-style or extra call recorded),
    /// `Some(Some(..))` for a direct call to force-inline.
    #[allow(clippy::type_complexity)]
    fn classify_invoke(
        &self,
        code: &IrCode,
        kind: InvokeKind,
        method: MethodRef,
        args: &[ValueId],
        plan: &mut UserPlan,
        site: InstrSite,
    ) -> Option<Option<(InstrSite, InliningInfo)>> {
        let occurrences = args.iter().filter(|&&a| a == self.instance).count();
        let is_receiver = args.first() == Some(&self.instance);

        // The superclass constructor call surfaces as a user once the
        // candidate's own constructor has been inlined; it is removed in the
        // final transformation step.
        if kind == InvokeKind::Direct
            && method == self.interner.object_constructor()
            && is_receiver
            && occurrences == 1
        {
            return Some(None);
        }

        // Constructor call on the instance (new-instance roots only).
        if kind == InvokeKind::Direct && self.root_is_new_instance {
            let callee = self.interner.method_data(method);
            if callee.is_constructor() && is_receiver && occurrences == 1 {
                if callee.holder != self.eligible_class {
                    return None;
                }
                let info = self.eligible_constructor_call(method)?;
                return Some(Some((site, info)));
            }
        }

        // Virtual call with the instance as the receiver only.
        if matches!(kind, InvokeKind::Virtual | InvokeKind::Interface)
            && is_receiver
            && occurrences == 1
        {
            let invoke_out_used = code
                .instruction_at(site)
                .and_then(|i| i.out)
                .map(|out| !code.users_of(out).is_empty() || !code.phi_users_of(out).is_empty())
                .unwrap_or(false);
            if let Some(info) = self.eligible_direct_method_call(method, invoke_out_used) {
                return Some(Some((site, info)));
            }
            return None;
        }

        // The instance is passed as a plain argument.
        if !is_receiver || occurrences > 1 {
            return self
                .extra_method_call_eligible(kind, method, args, plan, site)
                .then_some(None);
        }

        None
    }

    fn eligible_constructor_call(&self, method: MethodRef) -> Option<InliningInfo> {
        let callee = self.interner.method_data(method);
        debug_assert_eq!(
            callee.holder, self.eligible_class,
            "constructor call on a different class survived eligibility"
        );
        let definition = self
            .app
            .program_definition_for(self.eligible_class)?
            .method(method)?;
        if definition.optimization_info.class_inliner_eligibility.is_none() {
            return None;
        }
        self.inlinable_code(method, definition)
    }

    fn eligible_direct_method_call(
        &self,
        method: MethodRef,
        invoke_out_used: bool,
    ) -> Option<InliningInfo> {
        self.eligible_method_call(method, |eligibility| {
            !eligibility.returns_receiver || !invoke_out_used
        })
    }

    fn eligible_indirect_method_call(&self, method: MethodRef) -> Option<InliningInfo> {
        self.eligible_method_call(method, |eligibility| !eligibility.returns_receiver)
    }

    fn eligible_method_call(
        &self,
        method: MethodRef,
        accept: impl Fn(&ClassInlinerEligibility) -> bool,
    ) -> Option<InliningInfo> {
        // Single resolution target: the method as declared on the instance's
        // exact class. Methods inherited from supertypes are not considered;
        // the class directly extends the root object type.
        let signature = self.interner.method_data(method).signature();
        let definition = self.app.program_definition_for(self.eligible_class)?;
        let target = definition.lookup_virtual_method(&signature, self.interner)?;
        if target.reference == self.method {
            return None;
        }
        let eligibility = target.optimization_info.class_inliner_eligibility.as_ref()?;
        if !accept(eligibility) {
            return None;
        }
        self.inlinable_code(target.reference, target)
    }

    /// Checks a call that receives the instance as a plain argument.
    ///
    /// Eligible when the parameter is unused (the argument is replaced by
    /// null) or when the callee uses it exactly once as the receiver of one
    /// further eligibility-annotated call (the whole call is force-inlined).
    fn extra_method_call_eligible(
        &self,
        kind: InvokeKind,
        method: MethodRef,
        args: &[ValueId],
        plan: &mut UserPlan,
        site: InstrSite,
    ) -> bool {
        if args.first() == Some(&self.instance) {
            // Invocation on the receiver reaching this path means mixed
            // receiver-and-argument usage.
            return false;
        }

        let data = self.interner.method_data(method);
        let Some(holder) = self.app.program_definition_for(data.holder) else {
            return false;
        };
        let Some(target) = holder.method(method) else {
            return false;
        };

        let receiver_offset = usize::from(kind.has_receiver());
        let mut recorded_extra_call = false;
        for (index, &argument) in args.iter().enumerate().skip(receiver_offset) {
            if argument != self.instance {
                continue;
            }
            let param_index = index - receiver_offset;
            match target.optimization_info.parameter_usage(param_index) {
                ParameterUsage::NotUsed => {
                    plan.unused_arguments.push((site, index));
                }
                ParameterUsage::SingleCallOnReceiver {
                    method: inner,
                    kind: InvokeKind::Virtual | InvokeKind::Interface,
                } => {
                    if self.eligible_indirect_method_call(inner).is_none() {
                        return false;
                    }
                    let Some(info) = self.inlinable_code(method, target) else {
                        return false;
                    };
                    if !recorded_extra_call {
                        plan.estimated_size += self.size_for_inlining(method, &info.code);
                        plan.extra_calls.push((site, info));
                        recorded_extra_call = true;
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Fetches the callee body for force inlining.
    ///
    /// Bodies come from the immutable pre-phase snapshot, so concurrent
    /// processing of the callee never changes what this candidate observes.
    fn inlinable_code(&self, method: MethodRef, definition: &MethodDefinition) -> Option<InliningInfo> {
        if definition.is_abstract() || definition.access_flags.contains(crate::metadata::MethodAccessFlags::NATIVE) {
            return None;
        }
        let code = self.method_codes.get(&method)?.clone();
        Some(InliningInfo {
            target: method,
            code,
        })
    }

    fn is_own_instance_field(&self, definition: &crate::metadata::ClassDefinition, field: FieldRef) -> bool {
        self.interner.field_data(field).holder == self.eligible_class
            && definition.lookup_instance_field(field).is_some()
    }

    fn root_field(&self, code: &IrCode) -> Option<FieldRef> {
        let site = def_site(code, self.instance)?;
        match &code.instruction_at(site)?.op {
            Op::StaticGet { field } => Some(*field),
            _ => None,
        }
    }

    fn size_for_inlining(&self, method: MethodRef, code: &IrCode) -> usize {
        let holder = self.interner.method_data(method).holder;
        let exempt = self
            .app
            .program_definition_for(holder)
            .and_then(|class| class.kotlin_metadata.as_ref())
            .map(crate::metadata::KotlinMetadata::is_synthetic_lambda)
            .unwrap_or(false);
        if exempt {
            0
        } else {
            code.total_instruction_count()
        }
    }

    /// Replaces the instance with a null constant at argument positions the
    /// callee never reads.
    fn replace_unused_arguments(&self, code: &mut IrCode, unused: &[(InstrSite, usize)]) {
        // Process per block, highest instruction index first, so the null
        // constants inserted before an invoke do not shift pending sites.
        let mut ordered: Vec<(InstrSite, usize)> = unused.to_vec();
        ordered.sort_by(|a, b| (b.0.block, b.0.index).cmp(&(a.0.block, a.0.index)));

        for (site, arg_index) in ordered {
            let null_value = code.new_value();
            let Some(block) = code.block_mut(site.block) else {
                continue;
            };
            block.instructions.insert(
                site.index,
                Instruction::with_out(null_value, Op::Const(ConstantValue::Null)),
            );
            if let Some(Op::Invoke { args, .. }) = block
                .instructions
                .get_mut(site.index + 1)
                .map(|i| &mut i.op)
            {
                if let Some(slot) = args.get_mut(arg_index) {
                    *slot = null_value;
                }
            }
        }
    }

    /// Removes the superclass constructor call and replaces every field read
    /// with the value flowing from the writes.
    fn remove_super_initializer_and_field_reads(&self, code: &mut IrCode) -> Result<()> {
        let mut helpers: std::collections::BTreeMap<FieldRef, FieldValueHelper> =
            std::collections::BTreeMap::new();

        loop {
            let users = code.users_of(self.instance);
            let mut handled_any = false;

            for site in users {
                let Some(instruction) = code.instruction_at(site) else {
                    continue;
                };
                match instruction.op.clone() {
                    Op::Invoke {
                        kind: InvokeKind::Direct,
                        method,
                        ..
                    } if self.root_is_new_instance
                        && method == self.interner.object_constructor() =>
                    {
                        code.remove_instructions(&[site]);
                        handled_any = true;
                        break;
                    }
                    Op::InstanceGet { field, .. } => {
                        let out = instruction.out;
                        let helper = helpers
                            .entry(field)
                            .or_insert_with(|| FieldValueHelper::new(field, self.instance));
                        let replacement = helper.value_for_read(code, site, self.interner);
                        if let Some(out) = out {
                            code.replace_uses(out, replacement);
                            for helper in helpers.values_mut() {
                                helper.replace_value(out, replacement);
                            }
                        }
                        // The read may have shifted while the helper inserted
                        // instructions; relocate it by its out value.
                        if let Some(out) = out {
                            if let Some(read_site) = def_site(code, out) {
                                code.remove_instructions(&[read_site]);
                            }
                        } else {
                            code.remove_instructions(&[site]);
                        }
                        handled_any = true;
                        break;
                    }
                    Op::InstancePut { .. } => {
                        // Writes feed the value computation; removed later.
                        continue;
                    }
                    _ => {
                        return Err(invariant_error!(
                            "unexpected usage left after method inlining"
                        ));
                    }
                }
            }

            if !handled_any {
                return Ok(());
            }
        }
    }

    /// Removes every remaining field write on the instance.
    fn remove_field_writes(&self, code: &mut IrCode) -> Result<()> {
        let sites = code.users_of(self.instance);
        for site in &sites {
            let Some(instruction) = code.instruction_at(*site) else {
                continue;
            };
            match &instruction.op {
                Op::InstancePut { field, .. } => {
                    if self.interner.field_data(*field).holder != self.eligible_class {
                        return Err(invariant_error!(
                            "unexpected field write left after field reads removed"
                        ));
                    }
                }
                _ => {
                    return Err(invariant_error!(
                        "unexpected usage left after field reads removed"
                    ))
                }
            }
        }
        code.remove_instructions(&sites);
        Ok(())
    }

    /// Removes the root instruction itself.
    fn remove_root(&self, code: &mut IrCode) -> Result<()> {
        if !code.users_of(self.instance).is_empty() {
            return Err(invariant_error!("root still has users at removal"));
        }
        let site = def_site(code, self.instance)
            .ok_or_else(|| invariant_error!("root definition disappeared"))?;
        code.remove_instructions(&[site]);
        Ok(())
    }
}

/// Finds the instruction defining `value`.
fn def_site(code: &IrCode, value: ValueId) -> Option<InstrSite> {
    for (block_index, block) in code.blocks().iter().enumerate() {
        for (index, instruction) in block.instructions.iter().enumerate() {
            if instruction.out == Some(value) {
                return Some(InstrSite {
                    block: crate::ir::BlockId(block_index as u32),
                    index,
                });
            }
        }
    }
    None
}

