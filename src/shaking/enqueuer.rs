//! Tree shaking: worklist liveness marking from the keep-rule roots.
//!
//! The enqueuer walks every method body reachable from the rule-declared
//! entry points, marking classes, methods, and fields live and recording the
//! types targeted by runtime type checks (`instanceof`, `checkcast`, class
//! literals) for the merging policies. References that resolve to neither the
//! program nor the library are reported to the diagnostic sink unless covered
//! by a `dontWarn` rule; the walk proceeds treating them as live-but-missing.

use rustc_hash::FxHashSet;

use crate::{
    diagnostics::{DiagnosticCategory, Diagnostics},
    ir::{ConstantValue, Op},
    metadata::{
        descriptor, ClassHierarchy, DexApplication, FieldRef, InvokeKind, MethodRef,
        SymbolInterner, Type,
    },
    shaking::oracle::KeepOracle,
};

/// The marked program subset after one shaking round.
#[derive(Debug, Default)]
pub struct LiveSet {
    /// Live classes.
    pub classes: FxHashSet<Type>,
    /// Live methods.
    pub methods: FxHashSet<MethodRef>,
    /// Live fields.
    pub fields: FxHashSet<FieldRef>,
    /// Types instantiated by live code.
    pub instantiated: FxHashSet<Type>,
}

impl LiveSet {
    /// Returns `true` when the class was marked live.
    #[must_use]
    pub fn is_live_class(&self, ty: Type) -> bool {
        self.classes.contains(&ty)
    }

    /// Returns `true` when the method was marked live.
    #[must_use]
    pub fn is_live_method(&self, method: MethodRef) -> bool {
        self.methods.contains(&method)
    }

    /// Returns `true` when the field was marked live.
    #[must_use]
    pub fn is_live_field(&self, field: FieldRef) -> bool {
        self.fields.contains(&field)
    }
}

/// Types whose identity is observed at runtime by live code.
///
/// A class targeted by `instanceof`, `checkcast`, or a class literal cannot
/// be horizontally merged without changing observable behavior.
#[derive(Debug, Default, Clone)]
pub struct RuntimeTypeCheckInfo {
    checked: FxHashSet<Type>,
}

impl RuntimeTypeCheckInfo {
    /// Returns `true` when live code checks this type's identity at runtime.
    #[must_use]
    pub fn is_runtime_check_type(&self, ty: Type) -> bool {
        self.checked.contains(&ty)
    }

    /// Records a runtime type-check target.
    pub(crate) fn record(&mut self, ty: Type) {
        self.checked.insert(ty);
    }
}

/// Result of one shaking round.
#[derive(Debug, Default)]
pub struct ShakeResult {
    /// The live subset.
    pub live: LiveSet,
    /// Runtime type-check targets.
    pub runtime_checks: RuntimeTypeCheckInfo,
}

/// Worklist-driven liveness marker.
pub struct Enqueuer<'a> {
    app: &'a DexApplication,
    interner: &'a SymbolInterner,
    hierarchy: &'a ClassHierarchy,
    oracle: &'a KeepOracle,
    diagnostics: &'a Diagnostics,
}

impl<'a> Enqueuer<'a> {
    /// Creates an enqueuer over one application snapshot.
    #[must_use]
    pub fn new(
        app: &'a DexApplication,
        interner: &'a SymbolInterner,
        hierarchy: &'a ClassHierarchy,
        oracle: &'a KeepOracle,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            app,
            interner,
            hierarchy,
            oracle,
            diagnostics,
        }
    }

    /// Runs the shake: marks everything reachable from the rule roots.
    #[must_use]
    pub fn run(&self) -> ShakeResult {
        let mut state = ShakeState::default();

        // Seed from the keep-rule roots, in deterministic class order.
        for class in self.app.classes_with_deterministic_order() {
            if self.oracle.is_root_class(class.ty, self.interner) {
                self.mark_class_live(class.ty, &mut state);
            }
            for method in class.methods() {
                if self.oracle.is_root_method(method.reference, self.interner) {
                    self.mark_method_live(method.reference, &mut state);
                }
            }
            for field in class.fields() {
                if self.oracle.is_root_field(field.reference, self.interner) {
                    self.mark_field_live(field.reference, &mut state);
                }
            }
        }

        while let Some(method) = state.worklist.pop() {
            self.trace_method(method, &mut state);
        }

        ShakeResult {
            live: state.live,
            runtime_checks: state.runtime_checks,
        }
    }

    fn mark_class_live(&self, ty: Type, state: &mut ShakeState) {
        if ty.is_primitive() || !state.live.classes.insert(ty) {
            return;
        }
        let Some(class) = self.app.definition_for(ty) else {
            return;
        };
        if let Some(super_type) = class.super_type {
            self.mark_class_live(super_type, state);
        }
        for &interface in &class.interfaces {
            self.mark_class_live(interface, state);
        }
        // Class initialization runs when the class is first used.
        if let Some(initializer) = class.class_initializer(self.interner) {
            self.mark_method_live(initializer.reference, state);
        }
    }

    fn mark_method_live(&self, method: MethodRef, state: &mut ShakeState) {
        if !state.live.methods.insert(method) {
            return;
        }
        let data = self.interner.method_data(method);
        self.mark_type_reference(data.holder, state);
        for &param in data.params.iter() {
            self.mark_type_reference(param, state);
        }
        self.mark_type_reference(data.return_type, state);
        state.worklist.push(method);
    }

    fn mark_field_live(&self, field: FieldRef, state: &mut ShakeState) {
        if !state.live.fields.insert(field) {
            return;
        }
        let data = self.interner.field_data(field);
        self.mark_type_reference(data.holder, state);
        self.mark_type_reference(data.field_type, state);
    }

    fn mark_type_reference(&self, ty: Type, state: &mut ShakeState) {
        if ty.is_primitive() {
            return;
        }
        let descriptor = self.interner.type_descriptor(ty);
        if descriptor::is_array(&descriptor) {
            return;
        }
        self.mark_class_live(ty, state);
    }

    fn trace_method(&self, method: MethodRef, state: &mut ShakeState) {
        let data = self.interner.method_data(method);
        let Some(class) = self.app.program_definition_for(data.holder) else {
            return;
        };
        let Some(definition) = class.method(method) else {
            return;
        };
        let Some(code) = &definition.code else {
            return;
        };

        for block in code.blocks() {
            for instruction in &block.instructions {
                match &instruction.op {
                    Op::Invoke {
                        kind,
                        method: callee,
                        ..
                    } => self.trace_invoke(*kind, *callee, method, state),
                    Op::InstanceGet { field, .. }
                    | Op::InstancePut { field, .. }
                    | Op::StaticGet { field }
                    | Op::StaticPut { field, .. } => self.trace_field_access(*field, method, state),
                    Op::NewInstance { class } => {
                        self.require_definition(*class, method);
                        self.mark_type_reference(*class, state);
                        state.live.instantiated.insert(*class);
                    }
                    Op::CheckCast { class, .. }
                    | Op::InstanceOf { class, .. }
                    | Op::Const(ConstantValue::Class(class)) => {
                        self.require_definition(*class, method);
                        self.mark_type_reference(*class, state);
                        state.runtime_checks.checked.insert(*class);
                    }
                    _ => {}
                }
            }
        }
    }

    fn trace_invoke(
        &self,
        kind: InvokeKind,
        callee: MethodRef,
        from: MethodRef,
        state: &mut ShakeState,
    ) {
        let data = self.interner.method_data(callee);
        self.require_definition(data.holder, from);
        self.mark_type_reference(data.holder, state);

        // Resolve upwards through the superclass chain.
        let signature = data.signature();
        let mut current = Some(data.holder);
        while let Some(ty) = current {
            if let Some(class) = self.app.definition_for(ty) {
                if let Some(found) = class
                    .methods()
                    .iter()
                    .find(|m| self.interner.method_data(m.reference).signature() == signature)
                {
                    self.mark_method_live(found.reference, state);
                    break;
                }
            }
            current = self.hierarchy.super_type_of(ty);
        }

        // Virtual dispatch may land in any subtype that redefines the
        // signature; marking them all is a sound over-approximation.
        if matches!(kind, InvokeKind::Virtual | InvokeKind::Interface) {
            let mut subtypes: Vec<Type> = self.hierarchy.subtypes_of(data.holder).to_vec();
            while let Some(subtype) = subtypes.pop() {
                if let Some(class) = self.app.program_definition_for(subtype) {
                    if let Some(found) = class.lookup_virtual_method(&signature, self.interner) {
                        self.mark_method_live(found.reference, state);
                    }
                }
                subtypes.extend_from_slice(self.hierarchy.subtypes_of(subtype));
            }
        }
    }

    fn trace_field_access(&self, field: FieldRef, from: MethodRef, state: &mut ShakeState) {
        let data = self.interner.field_data(field);
        self.require_definition(data.holder, from);
        self.mark_field_live(field, state);
    }

    /// Reports a reference to a type with no definition, honoring `dontWarn`.
    fn require_definition(&self, ty: Type, from: MethodRef) {
        if ty.is_primitive() {
            return;
        }
        let descriptor = self.interner.type_descriptor(ty);
        if descriptor::is_array(&descriptor) {
            return;
        }
        if self.app.definition_for(ty).is_some() {
            return;
        }
        if self.oracle.rules().dont_warn_matches(&descriptor) {
            return;
        }
        self.diagnostics.push(
            crate::diagnostics::Diagnostic::new(
                crate::diagnostics::DiagnosticSeverity::Error,
                DiagnosticCategory::Reference,
                format!(
                    "Missing class {descriptor} (referenced from {})",
                    self.interner.format_method(from)
                ),
            )
            .with_location(descriptor.to_string()),
        );
    }
}

#[derive(Default)]
struct ShakeState {
    live: LiveSet,
    runtime_checks: RuntimeTypeCheckInfo,
    worklist: Vec<MethodRef>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        ir::IrBuilder,
        metadata::{MethodAccessFlags, MethodDefinition},
        shaking::rules::KeepRules,
        testutil::TestProgramBuilder,
    };

    fn shake(
        app: &DexApplication,
        interner: &SymbolInterner,
        rules: KeepRules,
        diagnostics: &Diagnostics,
    ) -> ShakeResult {
        let hierarchy = ClassHierarchy::build(app, interner);
        let oracle = KeepOracle::new(Arc::new(rules));
        Enqueuer::new(app, interner, &hierarchy, &oracle, diagnostics).run()
    }

    #[test]
    fn test_unreferenced_class_is_dead() {
        let mut builder = TestProgramBuilder::new();
        builder.simple_class("LMain;");
        builder.simple_class("LDead;");
        let (app, interner) = builder.build();

        let mut rules = KeepRules::new();
        rules.pin_class_with_members("LMain;");
        let diagnostics = Diagnostics::new();
        let result = shake(&app, &interner, rules, &diagnostics);

        assert!(result.live.is_live_class(interner.type_of("LMain;")));
        assert!(!result.live.is_live_class(interner.type_of("LDead;")));
        assert!(!diagnostics.has_any());
    }

    #[test]
    fn test_transitive_liveness_and_runtime_checks() {
        let mut builder = TestProgramBuilder::new();
        let main = builder.simple_class("LMain;");
        let helper = builder.simple_class("LHelper;");
        let checked = builder.simple_class("LChecked;");
        let interner = builder.interner();

        let helper_run = interner.method(helper, "run", &[], Type::VOID);
        {
            let class = builder.class_mut(helper).unwrap();
            let mut body = IrBuilder::new();
            let this = body.argument(helper);
            let _ = this;
            body.ret(None);
            class.add_method(
                MethodDefinition::new(helper_run, MethodAccessFlags::PUBLIC)
                    .with_code(body.finish()),
            );
        }

        let main_run = interner.method(main, "main", &[], Type::VOID);
        {
            let mut body = IrBuilder::new();
            let instance = body.new_instance(helper);
            body.invoke(
                InvokeKind::Direct,
                interner.method(helper, "<init>", &[], Type::VOID),
                vec![instance],
            );
            body.invoke(InvokeKind::Virtual, helper_run, vec![instance]);
            let flag = body.instance_of(checked, instance);
            let _ = flag;
            body.ret(None);
            let class = builder.class_mut(main).unwrap();
            class.add_method(
                MethodDefinition::new(
                    main_run,
                    MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                )
                .with_code(body.finish()),
            );
        }

        let (app, interner) = builder.build();
        let mut rules = KeepRules::new();
        rules.pin_class_with_members("LMain;");
        let diagnostics = Diagnostics::new();
        let result = shake(&app, &interner, rules, &diagnostics);

        assert!(result.live.is_live_class(helper));
        assert!(result.live.is_live_method(helper_run));
        assert!(result.live.instantiated.contains(&helper));
        assert!(result.runtime_checks.is_runtime_check_type(checked));
        assert!(!result.runtime_checks.is_runtime_check_type(helper));
    }

    #[test]
    fn test_missing_reference_reported() {
        let mut builder = TestProgramBuilder::new();
        let main = builder.simple_class("LMain;");
        let interner = builder.interner();
        let missing = interner.type_of("LMissing;");
        let missing_method = interner.method(missing, "m", &[], Type::VOID);

        let main_run = interner.method(main, "main", &[], Type::VOID);
        let mut body = IrBuilder::new();
        body.invoke(InvokeKind::Static, missing_method, vec![]);
        body.ret(None);
        builder.class_mut(main).unwrap().add_method(
            MethodDefinition::new(
                main_run,
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            )
            .with_code(body.finish()),
        );
        let (app, interner) = builder.build();

        // Without dontWarn the missing class is an error.
        let mut rules = KeepRules::new();
        rules.pin_class_with_members("LMain;");
        let diagnostics = Diagnostics::new();
        let _ = shake(&app, &interner, rules, &diagnostics);
        assert!(diagnostics.has_errors());

        // With dontWarn the reference is silently treated as live-but-missing.
        let mut suppressed = KeepRules::new();
        suppressed.pin_class_with_members("LMain;");
        suppressed.add_dont_warn("LMissing;");
        let quiet = Diagnostics::new();
        let _ = shake(&app, &interner, suppressed, &quiet);
        assert!(!quiet.has_any());
    }

    #[test]
    fn test_superclasses_marked_live() {
        let mut builder = TestProgramBuilder::new();
        builder.simple_class("LBase;");
        builder.simple_class_extending("LMid;", "LBase;");
        builder.simple_class_extending("LLeaf;", "LMid;");
        let (app, interner) = builder.build();

        let mut rules = KeepRules::new();
        rules.pin_class("LLeaf;");
        let diagnostics = Diagnostics::new();
        let result = shake(&app, &interner, rules, &diagnostics);

        assert!(result.live.is_live_class(interner.type_of("LBase;")));
        assert!(result.live.is_live_class(interner.type_of("LMid;")));
    }
}
