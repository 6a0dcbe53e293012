//! SSA instructions.
//!
//! Instructions reference operand values by [`ValueId`]; each instruction that
//! produces a result names its out value explicitly. Control transfer lives in
//! the block terminator, which is just the last instruction of the block.

use std::sync::Arc;

use crate::metadata::{FieldRef, InvokeKind, MethodRef, Type};

/// Identifier of one SSA value within a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(
    /// Raw index into the method's value table.
    pub u32,
);

impl ValueId {
    /// Returns the index of this value in the method's value table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of one basic block within a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(
    /// Raw index into the method's block list.
    pub u32,
);

impl BlockId {
    /// The entry block of every method.
    pub const ENTRY: BlockId = BlockId(0);

    /// Returns the index of this block in the method's block list.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A position of one instruction: block plus index within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrSite {
    /// The containing block.
    pub block: BlockId,
    /// Index into the block's instruction list.
    pub index: usize,
}

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantValue {
    /// The null reference.
    Null,
    /// 32-bit integer (also models the smaller integral types and booleans).
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// String literal.
    String(Arc<str>),
    /// Class literal.
    Class(Type),
}

/// Integer binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinopKind {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
}

/// Branch conditions for [`Op::If`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfCondition {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

/// The operation of one SSA instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Materializes one method argument at entry. Appears only at the head of
    /// the entry block, in argument order.
    Argument {
        /// Argument slot, receiver included for instance methods.
        index: u16,
    },
    /// Materializes a constant.
    Const(ConstantValue),
    /// Allocates an uninitialized instance.
    NewInstance {
        /// The instantiated class.
        class: Type,
    },
    /// Invokes a method. For kinds with a receiver, `args[0]` is the receiver.
    Invoke {
        /// Dispatch kind.
        kind: InvokeKind,
        /// The invoked method reference.
        method: MethodRef,
        /// Call arguments, receiver first for non-static kinds.
        args: Vec<ValueId>,
    },
    /// Reads an instance field.
    InstanceGet {
        /// The accessed field.
        field: FieldRef,
        /// The receiver object.
        object: ValueId,
    },
    /// Writes an instance field.
    InstancePut {
        /// The accessed field.
        field: FieldRef,
        /// The receiver object.
        object: ValueId,
        /// The stored value.
        value: ValueId,
    },
    /// Reads a static field.
    StaticGet {
        /// The accessed field.
        field: FieldRef,
    },
    /// Writes a static field.
    StaticPut {
        /// The accessed field.
        field: FieldRef,
        /// The stored value.
        value: ValueId,
    },
    /// Downcast check.
    CheckCast {
        /// Asserted type.
        class: Type,
        /// Checked object.
        object: ValueId,
    },
    /// Runtime type test.
    InstanceOf {
        /// Tested type.
        class: Type,
        /// Tested object.
        object: ValueId,
    },
    /// Integer arithmetic.
    Binop {
        /// The operation.
        op: BinopKind,
        /// Left operand.
        lhs: ValueId,
        /// Right operand.
        rhs: ValueId,
    },
    /// Returns from the method.
    Return {
        /// Returned value; `None` for `void`.
        value: Option<ValueId>,
    },
    /// Unconditional branch.
    Goto {
        /// Branch target.
        target: BlockId,
    },
    /// Conditional branch comparing two operands.
    If {
        /// Comparison condition.
        condition: IfCondition,
        /// Left operand.
        lhs: ValueId,
        /// Right operand.
        rhs: ValueId,
        /// Target when the condition holds.
        then_target: BlockId,
        /// Target when the condition does not hold.
        else_target: BlockId,
    },
    /// Throws an exception object.
    Throw {
        /// The thrown value.
        exception: ValueId,
    },
}

/// One SSA instruction: optional out value plus operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The value this instruction defines, if any.
    pub out: Option<ValueId>,
    /// The operation.
    pub op: Op,
}

impl Instruction {
    /// Creates an instruction with an out value.
    #[must_use]
    pub fn with_out(out: ValueId, op: Op) -> Self {
        Self { out: Some(out), op }
    }

    /// Creates an instruction without an out value.
    #[must_use]
    pub fn without_out(op: Op) -> Self {
        Self { out: None, op }
    }

    /// Returns the operand values of this instruction.
    #[must_use]
    pub fn operands(&self) -> Vec<ValueId> {
        match &self.op {
            Op::Argument { .. }
            | Op::Const(_)
            | Op::NewInstance { .. }
            | Op::StaticGet { .. }
            | Op::Goto { .. } => Vec::new(),
            Op::Invoke { args, .. } => args.clone(),
            Op::InstanceGet { object, .. } => vec![*object],
            Op::InstancePut { object, value, .. } => vec![*object, *value],
            Op::StaticPut { value, .. } => vec![*value],
            Op::CheckCast { object, .. } | Op::InstanceOf { object, .. } => vec![*object],
            Op::Binop { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::Return { value } => value.iter().copied().collect(),
            Op::If { lhs, rhs, .. } => vec![*lhs, *rhs],
            Op::Throw { exception } => vec![*exception],
        }
    }

    /// Applies `f` to every operand slot.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match &mut self.op {
            Op::Argument { .. }
            | Op::Const(_)
            | Op::NewInstance { .. }
            | Op::StaticGet { .. }
            | Op::Goto { .. } => {}
            Op::Invoke { args, .. } => args.iter_mut().for_each(&mut f),
            Op::InstanceGet { object, .. } => f(object),
            Op::InstancePut { object, value, .. } => {
                f(object);
                f(value);
            }
            Op::StaticPut { value, .. } => f(value),
            Op::CheckCast { object, .. } | Op::InstanceOf { object, .. } => f(object),
            Op::Binop { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Op::Return { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            Op::If { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Op::Throw { exception } => f(exception),
        }
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.op,
            Op::Return { .. } | Op::Goto { .. } | Op::If { .. } | Op::Throw { .. }
        )
    }

    /// Returns the blocks this terminator may transfer control to.
    #[must_use]
    pub fn successor_targets(&self) -> Vec<BlockId> {
        match self.op {
            Op::Goto { target } => vec![target],
            Op::If {
                then_target,
                else_target,
                ..
            } => vec![then_target, else_target],
            _ => Vec::new(),
        }
    }

    /// Rewrites branch targets through `f`.
    pub fn retarget(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match &mut self.op {
            Op::Goto { target } => *target = f(*target),
            Op::If {
                then_target,
                else_target,
                ..
            } => {
                *then_target = f(*then_target);
                *else_target = f(*else_target);
            }
            _ => {}
        }
    }

    /// Returns `true` if removing this instruction could change behavior even
    /// when its out value is unused.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        match self.op {
            Op::Argument { .. }
            | Op::Const(_)
            | Op::InstanceOf { .. }
            | Op::Binop {
                op: BinopKind::Add
                    | BinopKind::Sub
                    | BinopKind::Mul
                    | BinopKind::And
                    | BinopKind::Or
                    | BinopKind::Xor
                    | BinopKind::Shl
                    | BinopKind::Shr,
                ..
            } => false,
            // Division and remainder can throw; everything else observably
            // interacts with the heap or control flow.
            _ => true,
        }
    }

    /// Returns the invoked method for invoke instructions.
    #[must_use]
    pub fn invoked_method(&self) -> Option<MethodRef> {
        match &self.op {
            Op::Invoke { method, .. } => Some(*method),
            _ => None,
        }
    }
}
