//! Application rewriting with a freshly built lens.
//!
//! After every lens-producing pass, the driver rebuilds the application view:
//! every definition reference and every instruction in every method body is
//! translated through the new lens, so later passes observe a consistent,
//! already-rewritten program. Definitions a pass created itself use
//! post-rename references, which the lens maps to themselves.
//!
//! Call-site rewriting applies the prototype change attached to a mapped
//! method: permute arguments, drop removed slots, append the class-id
//! constants, append unused null parameters, and translate the invocation
//! kind.

use crate::{
    graph::GraphLens,
    ir::{BlockId, ConstantValue, Instruction, IrCode, Op},
    metadata::{DexApplication, SymbolInterner, Type},
};

/// Rewrites the whole application through one lens.
pub fn apply_lens(app: &mut DexApplication, lens: &GraphLens, interner: &SymbolInterner) {
    for class in app.program_classes_mut() {
        class.ty = lens.map_type(class.ty);
        class.super_type = class.super_type.map(|ty| lens.map_type(ty));
        for interface in &mut class.interfaces {
            *interface = lens.map_type(*interface);
        }
        for attribute in &mut class.inner_classes {
            attribute.inner = lens.map_type(attribute.inner);
            attribute.outer = attribute.outer.map(|ty| lens.map_type(ty));
        }

        for field in class.fields_mut() {
            field.reference = lens.map_field(field.reference, interner);
        }

        for method in class.methods_mut() {
            let (mapped, changes) = lens.map_method(method.reference, interner);
            if mapped != method.reference {
                method.reference = mapped;
                // A permuted proto reorders the definition's own arguments.
                if let (Some(permutation), Some(code)) =
                    (changes.argument_permutation(), method.code.as_mut())
                {
                    permute_definition_arguments(code, permutation);
                }
            }
            if let Some(code) = method.code.as_mut() {
                rewrite_body(code, lens, interner);
            }
        }
    }
    app.rebuild_index();
}

/// Remaps `Argument` indices after a parameter permutation.
///
/// `permutation[i]` names the old slot now at position `i`; each argument
/// instruction moves to the position its old slot was assigned.
fn permute_definition_arguments(code: &mut IrCode, permutation: &[u16]) {
    let Some(entry) = code.block_mut(BlockId::ENTRY) else {
        return;
    };
    for instruction in &mut entry.instructions {
        if let Op::Argument { index } = &mut instruction.op {
            if let Some(new_index) = permutation.iter().position(|&old| old == *index) {
                *index = new_index as u16;
            }
        } else {
            break;
        }
    }
}

/// Rewrites every instruction of one body through the lens.
fn rewrite_body(code: &mut IrCode, lens: &GraphLens, interner: &SymbolInterner) {
    for block_index in 0..code.block_count() {
        let block_id = BlockId(block_index as u32);
        let instructions = match code.block_mut(block_id) {
            Some(block) => std::mem::take(&mut block.instructions),
            None => continue,
        };
        let mut rebuilt = Vec::with_capacity(instructions.len());

        for mut instruction in instructions {
            match &mut instruction.op {
                Op::Invoke { kind, method, args } => {
                    let (mapped, changes) = lens.map_method(*method, interner);
                    if mapped != *method || !changes.is_empty() {
                        let new_kind = lens.map_invoke_kind(*method, mapped, *kind, interner);

                        let mut new_args = args.clone();
                        if let Some(permutation) = changes.argument_permutation() {
                            new_args = permutation
                                .iter()
                                .filter_map(|&old| args.get(old as usize).copied())
                                .collect();
                        }
                        for removed in changes.removed_arguments().into_iter().rev() {
                            if (removed as usize) < new_args.len() {
                                new_args.remove(removed as usize);
                            }
                        }
                        for &constant in changes.extra_constant_arguments() {
                            let value = code.new_typed_value(Type::INT);
                            rebuilt.push(Instruction::with_out(
                                value,
                                Op::Const(ConstantValue::Int(constant)),
                            ));
                            new_args.push(value);
                        }
                        for _ in 0..changes.extra_unused_null_parameters() {
                            let value = code.new_value();
                            rebuilt.push(Instruction::with_out(
                                value,
                                Op::Const(ConstantValue::Null),
                            ));
                            new_args.push(value);
                        }

                        instruction.op = Op::Invoke {
                            kind: new_kind,
                            method: mapped,
                            args: new_args,
                        };
                    }
                }
                Op::InstanceGet { field, .. }
                | Op::InstancePut { field, .. }
                | Op::StaticGet { field }
                | Op::StaticPut { field, .. } => {
                    *field = lens.map_field(*field, interner);
                }
                Op::NewInstance { class }
                | Op::CheckCast { class, .. }
                | Op::InstanceOf { class, .. }
                | Op::Const(ConstantValue::Class(class)) => {
                    *class = lens.map_type(*class);
                }
                _ => {}
            }
            rebuilt.push(instruction);
        }

        if let Some(block) = code.block_mut(block_id) {
            block.instructions = rebuilt;
        }
    }
}
