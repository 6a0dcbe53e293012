//! SSA basic blocks.
//!
//! A block holds its phi nodes, its instruction sequence (the last instruction
//! is the terminator), and its predecessor list. Successors are derived from
//! the terminator; the predecessor list is maintained explicitly by the code
//! container and its transformations.

use crate::ir::instruction::{BlockId, Instruction, ValueId};

/// One phi node: merges values flowing in from the block's predecessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    /// The value this phi defines.
    pub out: ValueId,
    /// One operand per predecessor: (predecessor block, incoming value).
    pub operands: Vec<(BlockId, ValueId)>,
}

impl Phi {
    /// Creates a new phi node with no operands.
    #[must_use]
    pub fn new(out: ValueId) -> Self {
        Self {
            out,
            operands: Vec::new(),
        }
    }

    /// Adds an incoming operand.
    pub fn add_operand(&mut self, block: BlockId, value: ValueId) {
        self.operands.push((block, value));
    }

    /// Returns the incoming value for a predecessor, if recorded.
    #[must_use]
    pub fn operand_for(&self, block: BlockId) -> Option<ValueId> {
        self.operands
            .iter()
            .find(|(pred, _)| *pred == block)
            .map(|(_, value)| *value)
    }

    /// Returns `true` if all operands agree on a single value other than the
    /// phi itself.
    #[must_use]
    pub fn trivial_replacement(&self) -> Option<ValueId> {
        let mut unique = None;
        for (_, value) in &self.operands {
            if *value == self.out {
                continue;
            }
            match unique {
                None => unique = Some(*value),
                Some(existing) if existing == *value => {}
                Some(_) => return None,
            }
        }
        unique
    }
}

/// A basic block: phis, instructions, and predecessor bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicBlock {
    /// Phi nodes at the head of the block.
    pub phis: Vec<Phi>,
    /// Instruction sequence; the last instruction is the terminator.
    pub instructions: Vec<Instruction>,
    /// Predecessor blocks, maintained by the container.
    pub predecessors: Vec<BlockId>,
}

impl BasicBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the terminator instruction, if the block is terminated.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    /// Returns the successor blocks derived from the terminator.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator()
            .map(Instruction::successor_targets)
            .unwrap_or_default()
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Adds a phi node.
    pub fn add_phi(&mut self, phi: Phi) {
        self.phis.push(phi);
    }

    /// Number of phi nodes.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.phis.len()
    }

    /// Number of instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Replaces one predecessor entry, keeping phi operands in sync.
    pub fn replace_predecessor(&mut self, old: BlockId, new: BlockId) {
        for pred in &mut self.predecessors {
            if *pred == old {
                *pred = new;
            }
        }
        for phi in &mut self.phis {
            for (pred, _) in &mut phi.operands {
                if *pred == old {
                    *pred = new;
                }
            }
        }
    }
}
