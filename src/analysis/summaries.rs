//! Per-method summary analyses.
//!
//! One parallel sweep over all program methods populates the optimization-info
//! records consumed by the class inliner:
//!
//! - **Receiver escape**: does an instance method leak its receiver anywhere
//!   but a return instruction?
//! - **Parameter usage**: is a parameter unused, or used exactly once as the
//!   receiver of a single call?
//! - **Trivial initializers**: is a constructor a plain
//!   forward-to-super-and-store-arguments body; is a class initializer a plain
//!   allocate-construct-store into one static final field?
//!
//! Each worker writes only its own class's methods, so the sweep runs one
//! work item per class with no shared mutable state.

use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::{
    ir::{IrCode, Op, ValueId},
    metadata::{
        ClassDefinition, ClassInlinerEligibility, DexApplication, FieldRef, InvokeKind,
        ParameterUsage, SymbolInterner, Type,
    },
};

/// The summary sweep.
pub struct SummaryAnalysis;

impl SummaryAnalysis {
    /// Analyzes every program method and refines its optimization info.
    pub fn run(app: &mut DexApplication, interner: &SymbolInterner) {
        app.program_classes_mut()
            .par_iter_mut()
            .for_each(|class| analyze_class(class, interner));
    }
}

fn analyze_class(class: &mut ClassDefinition, interner: &SymbolInterner) {
    let class_type = class.ty;
    let super_type = class.super_type;
    let instance_fields: FxHashSet<FieldRef> =
        class.instance_fields().map(|f| f.reference).collect();
    let static_final_fields: FxHashSet<FieldRef> = class
        .static_fields()
        .filter(|f| f.is_final())
        .map(|f| f.reference)
        .collect();

    for method in class.methods_mut() {
        let Some(code) = &method.code else { continue };
        let data = interner.method_data(method.reference);

        if !method.is_static() {
            if let Some(eligibility) =
                compute_receiver_escape(code, &instance_fields, interner)
            {
                method
                    .optimization_info
                    .refine_class_inliner_eligibility(eligibility);
            }
        }

        let usages = compute_parameter_usages(code, method.is_static(), data.params.len());
        method.optimization_info.refine_parameter_usages(usages);

        if data.is_class_initializer() {
            if let Some(field) =
                detect_trivial_class_initializer(code, class_type, &static_final_fields, interner)
            {
                method
                    .optimization_info
                    .refine_trivial_class_initializer(field);
            }
        }

        if data.is_constructor()
            && is_trivial_instance_initializer(code, class_type, super_type, &instance_fields, interner)
        {
            method
                .optimization_info
                .refine_trivial_instance_initializer();
        }
    }
}

/// Checks whether the receiver of an instance method escapes.
///
/// Allowed receiver uses: field reads and writes on fields of the declaring
/// class, forwarding to an initializer as the sole argument, and returning the
/// receiver (flagged). Anything else, including any phi use, is an escape.
fn compute_receiver_escape(
    code: &IrCode,
    instance_fields: &FxHashSet<FieldRef>,
    interner: &SymbolInterner,
) -> Option<ClassInlinerEligibility> {
    let arguments = code.argument_values();
    let receiver = *arguments.first()?;

    if !code.phi_users_of(receiver).is_empty() {
        return None;
    }

    let mut returns_receiver = false;
    for site in code.users_of(receiver) {
        let instruction = code.instruction_at(site)?;
        match &instruction.op {
            Op::InstanceGet { field, object } => {
                if *object != receiver || !instance_fields.contains(field) {
                    return None;
                }
            }
            Op::InstancePut {
                field,
                object,
                value,
            } => {
                if *object != receiver || *value == receiver || !instance_fields.contains(field) {
                    return None;
                }
            }
            Op::Invoke {
                kind: InvokeKind::Direct,
                method,
                args,
            } => {
                // Forwarding to an initializer (own or super) with the
                // receiver as the only occurrence.
                let callee = interner.method_data(*method);
                let receiver_count = args.iter().filter(|&&a| a == receiver).count();
                if !callee.is_constructor() || args.first() != Some(&receiver) || receiver_count > 1
                {
                    return None;
                }
            }
            Op::Return { value } => {
                if *value == Some(receiver) {
                    returns_receiver = true;
                }
            }
            _ => return None,
        }
    }

    Some(ClassInlinerEligibility { returns_receiver })
}

/// Computes per-parameter usage facts (receiver excluded).
fn compute_parameter_usages(code: &IrCode, is_static: bool, param_count: usize) -> Vec<ParameterUsage> {
    let arguments = code.argument_values();
    let offset = usize::from(!is_static);
    let mut usages = Vec::with_capacity(param_count);

    for index in 0..param_count {
        let Some(&value) = arguments.get(index + offset) else {
            usages.push(ParameterUsage::Unknown);
            continue;
        };
        usages.push(compute_single_usage(code, value));
    }
    usages
}

fn compute_single_usage(code: &IrCode, value: ValueId) -> ParameterUsage {
    if !code.phi_users_of(value).is_empty() {
        return ParameterUsage::Unknown;
    }
    let users = code.users_of(value);
    match users.as_slice() {
        [] => ParameterUsage::NotUsed,
        [site] => {
            let Some(instruction) = code.instruction_at(*site) else {
                return ParameterUsage::Unknown;
            };
            match &instruction.op {
                Op::Invoke {
                    kind: kind @ (InvokeKind::Virtual | InvokeKind::Interface),
                    method,
                    args,
                } if args.first() == Some(&value)
                    && args.iter().filter(|&&a| a == value).count() == 1 =>
                {
                    ParameterUsage::SingleCallOnReceiver {
                        method: *method,
                        kind: *kind,
                    }
                }
                _ => ParameterUsage::Unknown,
            }
        }
        _ => ParameterUsage::Unknown,
    }
}

/// Detects the singleton pattern class initializer: allocate one instance of
/// the enclosing class, construct it with constant arguments, store it into
/// one static final field, return.
fn detect_trivial_class_initializer(
    code: &IrCode,
    class_type: Type,
    static_final_fields: &FxHashSet<FieldRef>,
    interner: &SymbolInterner,
) -> Option<FieldRef> {
    if code.block_count() != 1 {
        return None;
    }
    let block = code.block(crate::ir::BlockId::ENTRY)?;
    if !block.phis.is_empty() {
        return None;
    }

    let mut constants: FxHashSet<ValueId> = FxHashSet::default();
    let mut instance: Option<ValueId> = None;
    let mut constructed = false;
    let mut stored_field: Option<FieldRef> = None;

    for instruction in &block.instructions {
        match &instruction.op {
            Op::Const(_) => {
                constants.insert(instruction.out?);
            }
            Op::NewInstance { class } => {
                if *class != class_type || instance.is_some() {
                    return None;
                }
                instance = Some(instruction.out?);
            }
            Op::Invoke {
                kind: InvokeKind::Direct,
                method,
                args,
            } => {
                let callee = interner.method_data(*method);
                if !callee.is_constructor()
                    || callee.holder != class_type
                    || constructed
                    || args.first() != Some(&instance?)
                    || !args[1..].iter().all(|a| constants.contains(a))
                {
                    return None;
                }
                constructed = true;
            }
            Op::StaticPut { field, value } => {
                if stored_field.is_some()
                    || Some(*value) != instance
                    || !constructed
                    || !static_final_fields.contains(field)
                {
                    return None;
                }
                stored_field = Some(*field);
            }
            Op::Return { value: None } => {}
            _ => return None,
        }
    }

    stored_field
}

/// Checks the trivial instance initializer shape: forward to the superclass
/// constructor, store arguments or constants into own instance fields, return.
fn is_trivial_instance_initializer(
    code: &IrCode,
    class_type: Type,
    super_type: Option<Type>,
    instance_fields: &FxHashSet<FieldRef>,
    interner: &SymbolInterner,
) -> bool {
    if code.block_count() != 1 {
        return false;
    }
    let Some(block) = code.block(crate::ir::BlockId::ENTRY) else {
        return false;
    };
    if !block.phis.is_empty() {
        return false;
    }

    let arguments: FxHashSet<ValueId> = code.argument_values().into_iter().collect();
    let Some(&receiver) = code.argument_values().first() else {
        return false;
    };

    let mut constants: FxHashSet<ValueId> = FxHashSet::default();
    let mut called_super = false;

    for instruction in &block.instructions {
        match &instruction.op {
            Op::Argument { .. } => {}
            Op::Const(_) => {
                if let Some(out) = instruction.out {
                    constants.insert(out);
                }
            }
            Op::Invoke {
                kind: InvokeKind::Direct,
                method,
                args,
            } => {
                let callee = interner.method_data(*method);
                let is_super_init = callee.is_constructor()
                    && (Some(callee.holder) == super_type || callee.holder == class_type);
                if !is_super_init || called_super || args.as_slice() != [receiver] {
                    return false;
                }
                called_super = true;
            }
            Op::InstancePut {
                field,
                object,
                value,
            } => {
                if *object != receiver
                    || !instance_fields.contains(field)
                    || !(arguments.contains(value) || constants.contains(value))
                    || *value == receiver
                {
                    return false;
                }
            }
            Op::Return { value: None } => {}
            _ => return false,
        }
    }

    called_super
}
