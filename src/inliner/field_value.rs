//! Field-value flow for the class inliner.
//!
//! After force inlining, the only remaining uses of an eliminated instance are
//! field reads and field writes. Each read must be replaced by the value the
//! matching write would have stored on that path. This helper computes, per
//! field, the reaching value at any point: the latest write earlier in the
//! same block, otherwise the merge of the predecessors' end-of-block values,
//! inserting block-level phi nodes where control flow merges incompatible
//! values. Cycles are broken by placing the phi before computing its operands.
//!
//! Reads that can observe the field before any write see the default value
//! (zero or null), materialized once at the entry block.

use rustc_hash::FxHashMap;

use crate::{
    ir::{BlockId, ConstantValue, InstrSite, Instruction, IrCode, Op, Phi, ValueId},
    metadata::{FieldRef, SymbolInterner, Type},
};

/// Reaching-value computation for one (instance, field) pair.
#[derive(Debug)]
pub struct FieldValueHelper {
    field: FieldRef,
    instance: ValueId,
    ins: FxHashMap<BlockId, ValueId>,
    outs: FxHashMap<BlockId, ValueId>,
    default_value: Option<ValueId>,
}

impl FieldValueHelper {
    /// Creates a helper for one field of the eliminated instance.
    #[must_use]
    pub fn new(field: FieldRef, instance: ValueId) -> Self {
        Self {
            field,
            instance,
            ins: FxHashMap::default(),
            outs: FxHashMap::default(),
            default_value: None,
        }
    }

    /// Returns the value a field read at `site` observes.
    ///
    /// May insert phi nodes and, when a path reads before any write, a
    /// default constant at the entry block.
    pub fn value_for_read(
        &mut self,
        code: &mut IrCode,
        site: InstrSite,
        interner: &SymbolInterner,
    ) -> ValueId {
        if let Some(value) = self.latest_write_before(code, site.block, site.index) {
            return value;
        }
        self.value_at_entry(code, site.block, interner)
    }

    /// Rewrites memoized values after a read's out value was replaced.
    pub fn replace_value(&mut self, old: ValueId, new: ValueId) {
        for value in self.ins.values_mut().chain(self.outs.values_mut()) {
            if *value == old {
                *value = new;
            }
        }
    }

    fn latest_write_before(&self, code: &IrCode, block: BlockId, end: usize) -> Option<ValueId> {
        let block = code.block(block)?;
        block.instructions[..end.min(block.instructions.len())]
            .iter()
            .rev()
            .find_map(|instruction| match &instruction.op {
                Op::InstancePut {
                    field,
                    object,
                    value,
                } if *field == self.field && *object == self.instance => Some(*value),
                _ => None,
            })
    }

    fn value_at_entry(
        &mut self,
        code: &mut IrCode,
        block: BlockId,
        interner: &SymbolInterner,
    ) -> ValueId {
        if let Some(&value) = self.ins.get(&block) {
            return value;
        }

        let predecessors = code
            .block(block)
            .map(|b| b.predecessors.clone())
            .unwrap_or_default();
        if predecessors.is_empty() {
            let value = self.default(code, interner);
            self.ins.insert(block, value);
            return value;
        }

        // Place the phi before filling its operands so loops terminate.
        let phi_out = code.new_value();
        self.ins.insert(block, phi_out);

        let operands: Vec<(BlockId, ValueId)> = predecessors
            .iter()
            .map(|&pred| (pred, self.value_at_exit(code, pred, interner)))
            .collect();

        let mut phi = Phi::new(phi_out);
        for (pred, value) in operands {
            phi.add_operand(pred, value);
        }
        if let Some(block) = code.block_mut(block) {
            block.phis.push(phi);
        }
        phi_out
    }

    fn value_at_exit(
        &mut self,
        code: &mut IrCode,
        block: BlockId,
        interner: &SymbolInterner,
    ) -> ValueId {
        if let Some(&value) = self.outs.get(&block) {
            return value;
        }
        let end = code.block(block).map_or(0, |b| b.instructions.len());
        let value = match self.latest_write_before(code, block, end) {
            Some(written) => written,
            None => self.value_at_entry(code, block, interner),
        };
        self.outs.insert(block, value);
        value
    }

    /// Materializes the field's default value at the head of the entry block,
    /// after the argument instructions.
    fn default(&mut self, code: &mut IrCode, interner: &SymbolInterner) -> ValueId {
        if let Some(value) = self.default_value {
            return value;
        }
        let field_type = interner.field_data(self.field).field_type;
        let constant = if field_type.is_primitive() {
            if field_type == Type::LONG {
                ConstantValue::Long(0)
            } else {
                ConstantValue::Int(0)
            }
        } else {
            ConstantValue::Null
        };

        let value = code.new_typed_value(field_type);
        if let Some(entry) = code.block_mut(BlockId::ENTRY) {
            let position = entry
                .instructions
                .iter()
                .take_while(|i| matches!(i.op, Op::Argument { .. }))
                .count();
            entry
                .instructions
                .insert(position, Instruction::with_out(value, Op::Const(constant)));
        }
        self.default_value = Some(value);
        value
    }
}
