//! Force inlining of a single call site.
//!
//! The class inliner does not ask whether inlining is profitable; once a
//! candidate passes eligibility, every method call on the instance is inlined
//! unconditionally so the remaining uses collapse to field reads and writes.
//! This module implements the mechanical part: splitting the caller block at
//! the call, importing the callee body with fresh value and block ids, routing
//! returns into the continuation, and merging multiple returns through a phi.

use rustc_hash::FxHashMap;

use crate::{
    ir::{BlockId, InstrSite, Instruction, IrCode, Op, Phi, ValueId},
    Result,
};

/// Inlines the invoke at `site` with the given callee body.
///
/// The invoke's arguments substitute for the callee's `Argument` instructions;
/// the callee's return values flow into the invoke's out value (through a phi
/// when the callee has several returns).
///
/// # Errors
///
/// Returns an error when `site` does not hold an invoke instruction or when
/// the invoke's result is used but the callee body never returns a value.
pub fn inline_call(code: &mut IrCode, site: InstrSite, callee: &IrCode) -> Result<()> {
    let invoke = code
        .instruction_at(site)
        .cloned()
        .ok_or_else(|| invariant_error!("no instruction at inline site"))?;
    let Op::Invoke { args, .. } = &invoke.op else {
        return Err(invariant_error!("inline site does not hold an invoke"));
    };
    let args = args.clone();

    // Split the caller block: everything after the invoke moves into the
    // continuation block, including the terminator.
    let caller_block = site.block;
    let continuation = code.add_block();
    let moved: Vec<Instruction> = {
        let block = code
            .block_mut(caller_block)
            .ok_or_else(|| invariant_error!("inline site in missing block"))?;
        let tail = block.instructions.split_off(site.index + 1);
        block.instructions.pop(); // the invoke itself
        tail
    };
    let moved_successors: Vec<BlockId> = moved
        .last()
        .map(Instruction::successor_targets)
        .unwrap_or_default();
    if let Some(block) = code.block_mut(continuation) {
        block.instructions = moved;
    }
    for successor in moved_successors {
        if let Some(block) = code.block_mut(successor) {
            block.replace_predecessor(caller_block, continuation);
        }
    }

    // Import the callee blocks under fresh ids.
    let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    for index in 0..callee.block_count() {
        let imported = code.add_block();
        block_map.insert(BlockId(index as u32), imported);
    }

    // Map callee values: arguments bind to the invoke's arguments, everything
    // else gets a fresh caller value of the same type.
    let mut value_map: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    for (argument, &incoming) in callee.argument_values().iter().zip(args.iter()) {
        value_map.insert(*argument, incoming);
    }
    for raw in 0..callee.value_count() {
        let callee_value = ValueId(raw as u32);
        if value_map.contains_key(&callee_value) {
            continue;
        }
        let imported = match callee.value_type(callee_value) {
            Some(ty) => code.new_typed_value(ty),
            None => code.new_value(),
        };
        value_map.insert(callee_value, imported);
    }

    let map_value = |value_map: &FxHashMap<ValueId, ValueId>, value: ValueId| -> ValueId {
        value_map.get(&value).copied().unwrap_or(value)
    };

    // Copy the callee body, rerouting returns into the continuation.
    let mut returns: Vec<(BlockId, Option<ValueId>)> = Vec::new();
    for (index, source) in callee.blocks().iter().enumerate() {
        let target_id = block_map[&BlockId(index as u32)];

        let mut phis = Vec::with_capacity(source.phis.len());
        for phi in &source.phis {
            let mut imported = Phi::new(map_value(&value_map, phi.out));
            for (pred, value) in &phi.operands {
                imported.add_operand(block_map[pred], map_value(&value_map, *value));
            }
            phis.push(imported);
        }

        let mut instructions = Vec::with_capacity(source.instructions.len());
        for instruction in &source.instructions {
            match &instruction.op {
                Op::Argument { .. } => {} // bound through the value map
                Op::Return { value } => {
                    returns.push((target_id, value.map(|v| map_value(&value_map, v))));
                    instructions.push(Instruction::without_out(Op::Goto {
                        target: continuation,
                    }));
                }
                _ => {
                    let mut imported = instruction.clone();
                    imported.out = imported.out.map(|out| map_value(&value_map, out));
                    imported.for_each_operand_mut(|operand| *operand = map_value(&value_map, *operand));
                    imported.retarget(|target| block_map[&target]);
                    instructions.push(imported);
                }
            }
        }

        let predecessors = source
            .predecessors
            .iter()
            .map(|pred| block_map[pred])
            .collect();

        if let Some(block) = code.block_mut(target_id) {
            block.phis = phis;
            block.instructions = instructions;
            block.predecessors = predecessors;
        }
    }

    // Wire the caller into the imported entry and the returns into the
    // continuation.
    let imported_entry = block_map[&BlockId::ENTRY];
    if let Some(block) = code.block_mut(caller_block) {
        block.push(Instruction::without_out(Op::Goto {
            target: imported_entry,
        }));
    }
    if let Some(block) = code.block_mut(imported_entry) {
        block.predecessors.push(caller_block);
    }
    if let Some(block) = code.block_mut(continuation) {
        block.predecessors = returns.iter().map(|(from, _)| *from).collect();
    }

    // Route the returned value into the invoke's out value.
    if let Some(out) = invoke.out {
        let returned: Vec<(BlockId, ValueId)> = returns
            .iter()
            .filter_map(|(from, value)| value.map(|v| (*from, v)))
            .collect();
        match returned.as_slice() {
            [] => {
                if !code.users_of(out).is_empty() || !code.phi_users_of(out).is_empty() {
                    return Err(invariant_error!(
                        "inlined callee never returns a value but the result is used"
                    ));
                }
            }
            [(_, value)] => {
                code.replace_uses(out, *value);
            }
            _ => {
                let merged = code.new_value();
                let mut phi = Phi::new(merged);
                for (from, value) in returned {
                    phi.add_operand(from, value);
                }
                if let Some(block) = code.block_mut(continuation) {
                    block.phis.insert(0, phi);
                }
                code.replace_uses(out, merged);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinopKind, IfCondition, IrBuilder},
        metadata::{InvokeKind, SymbolInterner, Type},
    };

    fn find_invoke(code: &IrCode) -> InstrSite {
        for (block_index, block) in code.blocks().iter().enumerate() {
            for (index, instruction) in block.instructions.iter().enumerate() {
                if matches!(instruction.op, Op::Invoke { .. }) {
                    return InstrSite {
                        block: BlockId(block_index as u32),
                        index,
                    };
                }
            }
        }
        panic!("no invoke in body");
    }

    #[test]
    fn test_inline_single_return() {
        let interner = SymbolInterner::new();
        let holder = interner.type_of("LC;");
        let callee_ref = interner.method(holder, "add", &[Type::INT, Type::INT], Type::INT);

        // Callee: return a + b.
        let mut callee = IrBuilder::new();
        let a = callee.argument(Type::INT);
        let b = callee.argument(Type::INT);
        let sum = callee.binop(BinopKind::Add, a, b);
        callee.ret(Some(sum));
        let callee = callee.finish();

        // Caller: return add(1, 2).
        let mut caller = IrBuilder::new();
        let one = caller.const_int(1);
        let two = caller.const_int(2);
        let result = caller.invoke_value(InvokeKind::Static, callee_ref, vec![one, two], &interner);
        caller.ret(Some(result));
        let mut caller = caller.finish();

        let invoke_site = find_invoke(&caller);
        inline_call(&mut caller, invoke_site, &callee).unwrap();
        caller.recompute_predecessors();
        assert!(caller.is_consistent_ssa());

        // No invoke remains, and the addition now operates on the caller's
        // constants.
        assert!(caller
            .blocks()
            .iter()
            .all(|b| b.instructions.iter().all(|i| !matches!(i.op, Op::Invoke { .. }))));
        let binop = caller
            .blocks()
            .iter()
            .flat_map(|b| &b.instructions)
            .find(|i| matches!(i.op, Op::Binop { .. }))
            .unwrap();
        assert_eq!(binop.operands(), vec![one, two]);
    }

    #[test]
    fn test_inline_multiple_returns_merge_through_phi() {
        let interner = SymbolInterner::new();
        let holder = interner.type_of("LC;");
        let callee_ref = interner.method(holder, "pick", &[Type::INT], Type::INT);

        // Callee: return x == 0 ? 1 : 2.
        let mut callee = IrBuilder::new();
        let x = callee.argument(Type::INT);
        let zero = callee.const_int(0);
        let then_block = callee.new_block();
        let else_block = callee.new_block();
        callee.branch_if(IfCondition::Eq, x, zero, then_block, else_block);
        callee.switch_to(then_block);
        let one = callee.const_int(1);
        callee.ret(Some(one));
        callee.switch_to(else_block);
        let two = callee.const_int(2);
        callee.ret(Some(two));
        let callee = callee.finish();

        let mut caller = IrBuilder::new();
        let seven = caller.const_int(7);
        let result = caller.invoke_value(InvokeKind::Static, callee_ref, vec![seven], &interner);
        caller.ret(Some(result));
        let mut caller = caller.finish();

        let invoke_site = find_invoke(&caller);
        inline_call(&mut caller, invoke_site, &callee).unwrap();
        caller.recompute_predecessors();
        assert!(caller.is_consistent_ssa());
        assert_eq!(caller.total_phi_count(), 1);
    }

    #[test]
    fn test_inline_void_callee() {
        let interner = SymbolInterner::new();
        let holder = interner.type_of("LC;");
        let field = interner.field(holder, "x", Type::INT);
        let callee_ref = interner.method(holder, "setX", &[holder, Type::INT], Type::VOID);

        // Callee: this.x = v.
        let mut callee = IrBuilder::new();
        let this = callee.argument(holder);
        let v = callee.argument(Type::INT);
        callee.instance_put(field, this, v);
        callee.ret(None);
        let callee = callee.finish();

        let mut caller = IrBuilder::new();
        let obj = caller.new_instance(holder);
        let value = caller.const_int(5);
        caller.invoke(InvokeKind::Virtual, callee_ref, vec![obj, value]);
        caller.ret(None);
        let mut caller = caller.finish();

        let invoke_site = find_invoke(&caller);
        inline_call(&mut caller, invoke_site, &callee).unwrap();
        caller.recompute_predecessors();
        assert!(caller.is_consistent_ssa());

        // The field write now targets the caller's allocation.
        let put = caller
            .blocks()
            .iter()
            .flat_map(|b| &b.instructions)
            .find(|i| matches!(i.op, Op::InstancePut { .. }))
            .unwrap();
        assert_eq!(put.operands(), vec![obj, value]);
    }
}
