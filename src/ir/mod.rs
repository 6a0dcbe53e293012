//! SSA intermediate representation for method bodies.
//!
//! Every program method with code carries an [`IrCode`]: a basic-block graph
//! in SSA form. The representation is deliberately small; it models exactly
//! the instruction shapes the whole-program passes reason about (allocations,
//! calls, field traffic, runtime type checks, control flow) and nothing else.
//!
//! # Key Components
//!
//! - [`IrCode`] - The body container with transformation primitives
//! - [`BasicBlock`] / [`Phi`] - Blocks with phi nodes
//! - [`Instruction`] / [`Op`] - SSA instructions
//! - [`IrBuilder`] - Incremental construction
//!
//! # Thread Safety
//!
//! Bodies are `Send + Sync`; exclusive access during parallel passes is
//! arranged by the pipeline context, which hands each worker its own method.

mod block;
mod builder;
mod code;
mod instruction;

pub use block::{BasicBlock, Phi};
pub use builder::IrBuilder;
pub use code::IrCode;
pub use instruction::{
    BinopKind, BlockId, ConstantValue, IfCondition, InstrSite, Instruction, Op, ValueId,
};
