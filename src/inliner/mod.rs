//! The class inliner.
//!
//! Per-method transformation that eliminates short-lived local objects whose
//! identity never escapes, replacing them with their flattened state. A root
//! is either a `new-instance` immediately initialized by its constructor, or a
//! `static-get` of a final field written by a trivial class initializer (the
//! singleton pattern). The candidate's class must be concrete, unpinned,
//! program-owned, directly extend the root object type, declare no finalizer,
//! and trigger no static initialization beyond its own.
//!
//! The pass emits no lens; it only consumes one, indirectly, by running after
//! the application has been rewritten to post-rename references.
//!
//! # Key Components
//!
//! - [`ClassInliner`] - The per-method pass with the shared class-eligibility
//!   cache
//! - [`InlineCandidateProcessor`] - One root's analysis and transformation

mod field_value;
mod force;
mod processor;

use dashmap::DashMap;
use rustc_hash::FxHashMap;

pub use processor::InlineCandidateProcessor;

use crate::{
    ir::{BlockId, InstrSite, IrCode, Op},
    metadata::{DexApplication, MethodRef, SymbolInterner, Type},
    shaking::KeepOracle,
    Result,
};

/// The class inliner pass.
///
/// Created once per IR phase; the class-eligibility cache is shared across
/// every worker thread, keyed under identity equality with compute-if-absent
/// semantics.
pub struct ClassInliner {
    known_classes: DashMap<Type, bool>,
    total_size_limit: usize,
}

impl ClassInliner {
    /// Creates the pass with the caller-configured total inlining ceiling.
    #[must_use]
    pub fn new(total_size_limit: usize) -> Self {
        Self {
            known_classes: DashMap::new(),
            total_size_limit,
        }
    }

    /// Processes one method: finds the roots present before any inlining and
    /// runs each through the candidate processor.
    ///
    /// Inlining mutates the code and may introduce new root instructions;
    /// those are not revisited, matching the single-sweep contract.
    ///
    /// Returns `true` when at least one candidate was eliminated.
    ///
    /// # Errors
    ///
    /// Propagates invariant violations from the transformation; eligibility
    /// failures skip silently.
    pub fn process_method(
        &self,
        method: MethodRef,
        code: &mut IrCode,
        app: &DexApplication,
        interner: &SymbolInterner,
        oracle: &KeepOracle,
        method_codes: &FxHashMap<MethodRef, IrCode>,
    ) -> Result<bool> {
        let roots = collect_roots(code);
        let mut changed = false;

        for root_value in roots {
            // Roots are tracked by their defining value: earlier inlinings
            // shift instruction positions.
            let Some(site) = find_definition(code, root_value) else {
                continue;
            };
            let Some(processor) = InlineCandidateProcessor::new(
                interner,
                app,
                oracle,
                &self.known_classes,
                method_codes,
                method,
                self.total_size_limit,
                code,
                site,
            ) else {
                continue;
            };
            changed |= processor.process(code)?;
        }

        Ok(changed)
    }
}

/// Collects the out values of every root instruction in the body.
fn collect_roots(code: &IrCode) -> Vec<crate::ir::ValueId> {
    let mut roots = Vec::new();
    for block in code.blocks() {
        for instruction in &block.instructions {
            if matches!(
                instruction.op,
                Op::NewInstance { .. } | Op::StaticGet { .. }
            ) {
                if let Some(out) = instruction.out {
                    roots.push(out);
                }
            }
        }
    }
    roots
}

fn find_definition(code: &IrCode, value: crate::ir::ValueId) -> Option<InstrSite> {
    for (block_index, block) in code.blocks().iter().enumerate() {
        for (index, instruction) in block.instructions.iter().enumerate() {
            if instruction.out == Some(value) {
                return Some(InstrSite {
                    block: BlockId(block_index as u32),
                    index,
                });
            }
        }
    }
    None
}
