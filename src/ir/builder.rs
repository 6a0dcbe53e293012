//! Convenience builder for SSA bodies.
//!
//! Used by the front-end adapter and the tests to assemble method bodies, and
//! by passes that synthesize code (constructor dispatchers, trampolines).

use std::sync::Arc;

use crate::{
    ir::{
        block::Phi,
        code::IrCode,
        instruction::{BinopKind, BlockId, ConstantValue, IfCondition, Instruction, Op, ValueId},
    },
    metadata::{FieldRef, InvokeKind, MethodRef, SymbolInterner, Type},
};

/// Incremental builder over an [`IrCode`].
///
/// The builder starts in a fresh entry block. Instructions are appended to the
/// current block; [`IrBuilder::new_block`] and [`IrBuilder::switch_to`] move
/// between blocks. [`IrBuilder::finish`] recomputes predecessor lists and
/// returns the finished body.
#[derive(Debug)]
pub struct IrBuilder {
    code: IrCode,
    current: BlockId,
    next_argument: u16,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    /// Creates a builder with an empty entry block.
    #[must_use]
    pub fn new() -> Self {
        let mut code = IrCode::new();
        let entry = code.add_block();
        Self {
            code,
            current: entry,
            next_argument: 0,
        }
    }

    /// Returns the block instructions are currently appended to.
    #[must_use]
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Appends a fresh block and returns its id without switching to it.
    pub fn new_block(&mut self) -> BlockId {
        self.code.add_block()
    }

    /// Makes `block` the append target.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    fn emit(&mut self, instruction: Instruction) {
        if let Some(block) = self.code.block_mut(self.current) {
            block.push(instruction);
        }
    }

    fn emit_value(&mut self, op: Op, ty: Option<Type>) -> ValueId {
        let out = match ty {
            Some(ty) => self.code.new_typed_value(ty),
            None => self.code.new_value(),
        };
        self.emit(Instruction::with_out(out, op));
        out
    }

    /// Declares the next method argument.
    pub fn argument(&mut self, ty: Type) -> ValueId {
        let index = self.next_argument;
        self.next_argument += 1;
        self.emit_value(Op::Argument { index }, Some(ty))
    }

    /// Materializes an `int` constant.
    pub fn const_int(&mut self, value: i32) -> ValueId {
        self.emit_value(Op::Const(ConstantValue::Int(value)), Some(Type::INT))
    }

    /// Materializes the null reference.
    pub fn const_null(&mut self) -> ValueId {
        self.emit_value(Op::Const(ConstantValue::Null), None)
    }

    /// Materializes a string literal.
    pub fn const_string(&mut self, value: &str) -> ValueId {
        self.emit_value(
            Op::Const(ConstantValue::String(Arc::from(value))),
            Some(Type::STRING),
        )
    }

    /// Materializes a class literal.
    pub fn const_class(&mut self, class: Type) -> ValueId {
        self.emit_value(Op::Const(ConstantValue::Class(class)), None)
    }

    /// Allocates an uninitialized instance.
    pub fn new_instance(&mut self, class: Type) -> ValueId {
        self.emit_value(Op::NewInstance { class }, Some(class))
    }

    /// Invokes a `void` method.
    pub fn invoke(&mut self, kind: InvokeKind, method: MethodRef, args: Vec<ValueId>) {
        self.emit(Instruction::without_out(Op::Invoke { kind, method, args }));
    }

    /// Invokes a method and captures its result.
    pub fn invoke_value(
        &mut self,
        kind: InvokeKind,
        method: MethodRef,
        args: Vec<ValueId>,
        interner: &SymbolInterner,
    ) -> ValueId {
        let return_type = interner.method_data(method).return_type;
        self.emit_value(Op::Invoke { kind, method, args }, Some(return_type))
    }

    /// Reads an instance field.
    pub fn instance_get(&mut self, field: FieldRef, object: ValueId, interner: &SymbolInterner) -> ValueId {
        let ty = interner.field_data(field).field_type;
        self.emit_value(Op::InstanceGet { field, object }, Some(ty))
    }

    /// Writes an instance field.
    pub fn instance_put(&mut self, field: FieldRef, object: ValueId, value: ValueId) {
        self.emit(Instruction::without_out(Op::InstancePut {
            field,
            object,
            value,
        }));
    }

    /// Reads a static field.
    pub fn static_get(&mut self, field: FieldRef, interner: &SymbolInterner) -> ValueId {
        let ty = interner.field_data(field).field_type;
        self.emit_value(Op::StaticGet { field }, Some(ty))
    }

    /// Writes a static field.
    pub fn static_put(&mut self, field: FieldRef, value: ValueId) {
        self.emit(Instruction::without_out(Op::StaticPut { field, value }));
    }

    /// Integer arithmetic.
    pub fn binop(&mut self, op: BinopKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.emit_value(Op::Binop { op, lhs, rhs }, Some(Type::INT))
    }

    /// Runtime type test.
    pub fn instance_of(&mut self, class: Type, object: ValueId) -> ValueId {
        self.emit_value(Op::InstanceOf { class, object }, Some(Type::BOOLEAN))
    }

    /// Downcast check.
    pub fn check_cast(&mut self, class: Type, object: ValueId) -> ValueId {
        self.emit_value(Op::CheckCast { class, object }, Some(class))
    }

    /// Returns from the method.
    pub fn ret(&mut self, value: Option<ValueId>) {
        self.emit(Instruction::without_out(Op::Return { value }));
    }

    /// Unconditional branch.
    pub fn goto(&mut self, target: BlockId) {
        self.emit(Instruction::without_out(Op::Goto { target }));
    }

    /// Conditional branch.
    pub fn branch_if(
        &mut self,
        condition: IfCondition,
        lhs: ValueId,
        rhs: ValueId,
        then_target: BlockId,
        else_target: BlockId,
    ) {
        self.emit(Instruction::without_out(Op::If {
            condition,
            lhs,
            rhs,
            then_target,
            else_target,
        }));
    }

    /// Inserts a phi node in the current block.
    pub fn phi(&mut self, operands: Vec<(BlockId, ValueId)>) -> ValueId {
        let out = self.code.new_value();
        let mut phi = Phi::new(out);
        for (block, value) in operands {
            phi.add_operand(block, value);
        }
        if let Some(block) = self.code.block_mut(self.current) {
            block.add_phi(phi);
        }
        out
    }

    /// Finalizes the body: recomputes predecessors and returns the code.
    #[must_use]
    pub fn finish(mut self) -> IrCode {
        self.code.recompute_predecessors();
        self.code
    }
}
