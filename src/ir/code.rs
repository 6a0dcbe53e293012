//! The SSA body of one method.
//!
//! [`IrCode`] owns the basic blocks and the value table of a method. Blocks are
//! identified by their index; values by theirs. The container maintains the
//! predecessor lists and offers the transformation primitives the optimization
//! passes build on: use queries, use replacement, batched instruction removal,
//! trivial-phi canonicalization, dead-code elimination, and an SSA consistency
//! check.
//!
//! # Construction
//!
//! Bodies are assembled by the front end (or tests) through
//! [`crate::ir::IrBuilder`], and synthesized by passes (constructor
//! dispatchers, trampolines) through the same builder.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    ir::{
        block::{BasicBlock, Phi},
        instruction::{BlockId, InstrSite, Instruction, Op, ValueId},
    },
    metadata::Type,
    Result,
};

/// A method body in SSA form.
///
/// # Thread Safety
///
/// `IrCode` is `Send` and `Sync` once constructed; passes obtain exclusive
/// access to one method's body at a time through the pipeline context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrCode {
    blocks: Vec<BasicBlock>,
    value_types: Vec<Option<Type>>,
}

impl IrCode {
    /// Creates an empty body with no blocks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an empty block and returns its id.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(u32::try_from(self.blocks.len()).unwrap_or(u32::MAX));
        self.blocks.push(BasicBlock::new());
        id
    }

    /// Returns the blocks in id order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Returns mutable access to the blocks.
    pub fn blocks_mut(&mut self) -> &mut Vec<BasicBlock> {
        &mut self.blocks
    }

    /// Returns a block by id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Returns a block mutably by id.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index())
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if this body has no blocks at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Allocates a fresh untyped value.
    pub fn new_value(&mut self) -> ValueId {
        let id = ValueId(u32::try_from(self.value_types.len()).unwrap_or(u32::MAX));
        self.value_types.push(None);
        id
    }

    /// Allocates a fresh value with a static type.
    pub fn new_typed_value(&mut self, ty: Type) -> ValueId {
        let id = self.new_value();
        self.value_types[id.index()] = Some(ty);
        id
    }

    /// Returns the static type of a value, when known.
    #[must_use]
    pub fn value_type(&self, value: ValueId) -> Option<Type> {
        self.value_types.get(value.index()).copied().flatten()
    }

    /// Records the static type of a value.
    pub fn set_value_type(&mut self, value: ValueId, ty: Type) {
        if let Some(slot) = self.value_types.get_mut(value.index()) {
            *slot = Some(ty);
        }
    }

    /// Returns the number of allocated values.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.value_types.len()
    }

    /// Returns the instruction at a site.
    #[must_use]
    pub fn instruction_at(&self, site: InstrSite) -> Option<&Instruction> {
        self.blocks
            .get(site.block.index())
            .and_then(|b| b.instructions.get(site.index))
    }

    /// Returns the instruction at a site mutably.
    pub fn instruction_at_mut(&mut self, site: InstrSite) -> Option<&mut Instruction> {
        self.blocks
            .get_mut(site.block.index())
            .and_then(|b| b.instructions.get_mut(site.index))
    }

    /// Returns the argument values of the method, in argument order.
    ///
    /// Arguments are the out values of the `Argument` instructions at the head
    /// of the entry block.
    #[must_use]
    pub fn argument_values(&self) -> Vec<ValueId> {
        let Some(entry) = self.blocks.first() else {
            return Vec::new();
        };
        let mut arguments = Vec::new();
        for instruction in &entry.instructions {
            match instruction.op {
                Op::Argument { .. } => {
                    if let Some(out) = instruction.out {
                        arguments.push(out);
                    }
                }
                _ => break,
            }
        }
        arguments
    }

    /// Returns every instruction site using `value` as an operand.
    #[must_use]
    pub fn users_of(&self, value: ValueId) -> Vec<InstrSite> {
        let mut users = Vec::new();
        for (block_index, block) in self.blocks.iter().enumerate() {
            for (index, instruction) in block.instructions.iter().enumerate() {
                if instruction.operands().contains(&value) {
                    users.push(InstrSite {
                        block: BlockId(block_index as u32),
                        index,
                    });
                }
            }
        }
        users
    }

    /// Returns every phi using `value` as an operand.
    #[must_use]
    pub fn phi_users_of(&self, value: ValueId) -> Vec<(BlockId, usize)> {
        let mut users = Vec::new();
        for (block_index, block) in self.blocks.iter().enumerate() {
            for (phi_index, phi) in block.phis.iter().enumerate() {
                if phi.operands.iter().any(|(_, operand)| *operand == value) {
                    users.push((BlockId(block_index as u32), phi_index));
                }
            }
        }
        users
    }

    /// Replaces every use of `old` (instruction operands and phi operands)
    /// with `new`.
    pub fn replace_uses(&mut self, old: ValueId, new: ValueId) {
        for block in &mut self.blocks {
            for instruction in &mut block.instructions {
                instruction.for_each_operand_mut(|operand| {
                    if *operand == old {
                        *operand = new;
                    }
                });
            }
            for phi in &mut block.phis {
                for (_, operand) in &mut phi.operands {
                    if *operand == old {
                        *operand = new;
                    }
                }
            }
        }
    }

    /// Removes a batch of instructions by site.
    ///
    /// Sites are grouped per block and removed highest-index first so earlier
    /// removals do not shift later ones.
    pub fn remove_instructions(&mut self, sites: &[InstrSite]) {
        let mut per_block: FxHashMap<BlockId, Vec<usize>> = FxHashMap::default();
        for site in sites {
            per_block.entry(site.block).or_default().push(site.index);
        }
        for (block_id, mut indices) in per_block {
            indices.sort_unstable_by(|a, b| b.cmp(a));
            indices.dedup();
            if let Some(block) = self.blocks.get_mut(block_id.index()) {
                for index in indices {
                    if index < block.instructions.len() {
                        block.instructions.remove(index);
                    }
                }
            }
        }
    }

    /// Recomputes every block's predecessor list from the terminators.
    pub fn recompute_predecessors(&mut self) {
        let mut predecessors: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];
        for (block_index, block) in self.blocks.iter().enumerate() {
            for successor in block.successors() {
                if let Some(list) = predecessors.get_mut(successor.index()) {
                    list.push(BlockId(block_index as u32));
                }
            }
        }
        for (block, preds) in self.blocks.iter_mut().zip(predecessors) {
            block.predecessors = preds;
        }
    }

    /// Returns the total number of instructions across all blocks.
    #[must_use]
    pub fn total_instruction_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::instruction_count).sum()
    }

    /// Returns the total number of phi nodes across all blocks.
    #[must_use]
    pub fn total_phi_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::phi_count).sum()
    }

    /// Canonicalizes trivial phis until none remain.
    ///
    /// A phi is trivial when all operands agree on one value (ignoring
    /// self-references) or when its block has a single predecessor.
    pub fn remove_trivial_phis(&mut self) {
        loop {
            let mut replacement = None;
            'outer: for (block_index, block) in self.blocks.iter().enumerate() {
                for (phi_index, phi) in block.phis.iter().enumerate() {
                    if let Some(value) = phi.trivial_replacement() {
                        replacement = Some((BlockId(block_index as u32), phi_index, phi.out, value));
                        break 'outer;
                    }
                }
            }
            let Some((block, phi_index, out, value)) = replacement else {
                return;
            };
            if let Some(block) = self.blocks.get_mut(block.index()) {
                block.phis.remove(phi_index);
            }
            self.replace_uses(out, value);
        }
    }

    /// Removes instructions whose result is unused and whose execution has no
    /// side effects, together with unused phis. Runs to a fixpoint.
    pub fn eliminate_dead_code(&mut self) {
        loop {
            let mut use_counts: FxHashMap<ValueId, usize> = FxHashMap::default();
            for block in &self.blocks {
                for instruction in &block.instructions {
                    for operand in instruction.operands() {
                        *use_counts.entry(operand).or_default() += 1;
                    }
                }
                for phi in &block.phis {
                    for (_, operand) in &phi.operands {
                        *use_counts.entry(*operand).or_default() += 1;
                    }
                }
            }

            let mut removed = false;
            for block in &mut self.blocks {
                let before = block.instructions.len();
                block.instructions.retain(|instruction| {
                    // Argument instructions define the method's signature
                    // slots and always stay.
                    if matches!(instruction.op, Op::Argument { .. }) {
                        return true;
                    }
                    let dead = match instruction.out {
                        Some(out) => {
                            !instruction.has_side_effects()
                                && use_counts.get(&out).copied().unwrap_or(0) == 0
                        }
                        None => false,
                    };
                    !dead
                });
                removed |= block.instructions.len() != before;

                let phi_count = block.phis.len();
                block
                    .phis
                    .retain(|phi| use_counts.get(&phi.out).copied().unwrap_or(0) > 0);
                removed |= block.phis.len() != phi_count;
            }

            if !removed {
                return;
            }
        }
    }

    /// Clears blocks unreachable from the entry block.
    ///
    /// Block ids are stable; unreachable blocks are emptied in place and
    /// dropped from all predecessor lists.
    pub fn remove_unreachable_blocks(&mut self) {
        if self.blocks.is_empty() {
            return;
        }
        let mut reachable = vec![false; self.blocks.len()];
        let mut worklist = vec![BlockId::ENTRY];
        while let Some(block_id) = worklist.pop() {
            let Some(flag) = reachable.get_mut(block_id.index()) else {
                continue;
            };
            if *flag {
                continue;
            }
            *flag = true;
            if let Some(block) = self.blocks.get(block_id.index()) {
                worklist.extend(block.successors());
            }
        }
        for (index, block) in self.blocks.iter_mut().enumerate() {
            if !reachable[index] {
                block.instructions.clear();
                block.phis.clear();
                block.predecessors.clear();
            }
        }
        for block in &mut self.blocks {
            block.predecessors.retain(|pred| reachable[pred.index()]);
            for phi in &mut block.phis {
                phi.operands.retain(|(pred, _)| reachable[pred.index()]);
            }
        }
    }

    /// Checks structural SSA consistency.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::IrError`] when a value is defined more than
    /// once, an operand references an undefined value, or a phi's operand
    /// blocks do not match its block's predecessors.
    pub fn check_consistent(&self) -> Result<()> {
        let mut defined = vec![false; self.value_types.len()];

        let mut define = |value: ValueId| -> Result<()> {
            match defined.get_mut(value.index()) {
                Some(slot) if !*slot => {
                    *slot = true;
                    Ok(())
                }
                Some(_) => Err(crate::Error::IrError(format!(
                    "value v{} defined more than once",
                    value.0
                ))),
                None => Err(crate::Error::IrError(format!(
                    "value v{} not allocated",
                    value.0
                ))),
            }
        };

        for block in &self.blocks {
            for phi in &block.phis {
                define(phi.out)?;
            }
            for instruction in &block.instructions {
                if let Some(out) = instruction.out {
                    define(out)?;
                }
            }
        }

        for (block_index, block) in self.blocks.iter().enumerate() {
            for instruction in &block.instructions {
                for operand in instruction.operands() {
                    if !defined.get(operand.index()).copied().unwrap_or(false) {
                        return Err(crate::Error::IrError(format!(
                            "B{block_index} uses undefined value v{}",
                            operand.0
                        )));
                    }
                }
            }
            for phi in &block.phis {
                for (pred, operand) in &phi.operands {
                    if !block.predecessors.contains(pred) {
                        return Err(crate::Error::IrError(format!(
                            "B{block_index} phi operand from non-predecessor B{}",
                            pred.0
                        )));
                    }
                    if !defined.get(operand.index()).copied().unwrap_or(false) {
                        return Err(crate::Error::IrError(format!(
                            "B{block_index} phi uses undefined value v{}",
                            operand.0
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns `true` when [`IrCode::check_consistent`] passes.
    #[must_use]
    pub fn is_consistent_ssa(&self) -> bool {
        self.check_consistent().is_ok()
    }
}

impl fmt::Display for IrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SSA body: {} blocks, {} values",
            self.blocks.len(),
            self.value_types.len()
        )?;
        for (index, block) in self.blocks.iter().enumerate() {
            writeln!(f, "B{index}: preds {:?}", block.predecessors)?;
            for phi in &block.phis {
                writeln!(f, "  v{} = phi {:?}", phi.out.0, phi.operands)?;
            }
            for instruction in &block.instructions {
                match instruction.out {
                    Some(out) => writeln!(f, "  v{} = {:?}", out.0, instruction.op)?,
                    None => writeln!(f, "  {:?}", instruction.op)?,
                }
            }
        }
        Ok(())
    }
}
