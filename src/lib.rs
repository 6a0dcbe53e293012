// Copyright 2025-2026 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # dexlens
//!
//! A whole-program dex bytecode shrinker and optimizer core. Given a set of program
//! classes, library classes, and a declarative set of keep rules, `dexlens` produces
//! a smaller, renamed, and semantically equivalent program for constrained target
//! runtimes. The crate covers the rewriting engine between front-end parsing and
//! back-end serialization: the graph-lens layer that records and composes symbol
//! rewritings across optimization passes, the policy-driven horizontal class merger,
//! and the class inliner that flattens short-lived object allocations into their uses.
//!
//! # Architecture
//!
//! The crate is a bottom-up dependency stack:
//!
//! - **Metadata Layer**: Interned symbol pool, class/method/field definitions, class
//!   hierarchy, and immutable application views
//! - **Graph Lens Layer**: Immutable rewriting records, prototype-change descriptions,
//!   and the composing lens stack
//! - **Shaking Layer**: Structured keep rules, the pinning oracle, and the tree-shaking
//!   enqueuer
//! - **IR Layer**: Per-method SSA form with basic blocks, phi nodes, and consistency
//!   checking
//! - **Analysis Layer**: Method summaries feeding the optimization-info records
//! - **Optimization Layer**: Vertical and horizontal class merging, enum unboxing,
//!   proto normalization, class inlining, and minification
//! - **Driver Layer**: Fixed-order pass sequencing over a worker pool, view rebuilds
//!   after every lens-producing pass
//!
//! ## Key Components
//!
//! - [`crate::driver::Driver`] - Main entry point for whole-program compilation
//! - [`crate::metadata`] - Symbol interner, definitions, and application views
//! - [`crate::graph`] - Graph lens records and the lens stack
//! - [`crate::merging`] - Policy-driven horizontal and vertical class merging
//! - [`crate::inliner`] - The class inliner
//! - [`crate::naming`] - Minification and the residual rename mapping
//! - [`crate::prelude`] - Convenient re-exports of commonly used types
//! - [`crate::Error`] and [`crate::Result`] - Comprehensive error handling
//!
//! # Usage Examples
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dexlens::prelude::*;
//!
//! let interner = std::sync::Arc::new(SymbolInterner::new());
//! let app = DexApplication::builder(interner.clone())
//!     .add_program_class(my_class)
//!     .build()?;
//!
//! let result = Driver::new(CompilerOptions::default()).run(app, KeepRules::default())?;
//! println!("{}", result.mapping.render());
//! # Ok::<(), dexlens::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All public types are [`std::marker::Send`] and [`std::marker::Sync`] unless
//! explicitly documented otherwise. Passes fan per-method work out onto a rayon
//! worker pool; the symbol interner and all cross-thread caches are lock-free or
//! finely locked.

#[macro_use]
pub(crate) mod error;

/// Shared builders used by unit tests across the crate.
#[cfg(test)]
pub(crate) mod testutil;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used types
/// from across the dexlens library, allowing for convenient glob imports.
///
/// # Usage Examples
///
/// ```rust,ignore
/// use dexlens::prelude::*;
///
/// let interner = std::sync::Arc::new(SymbolInterner::new());
/// let object = interner.type_of("Ljava/lang/Object;");
/// ```
pub mod prelude;

/// Symbol table, definitions, and application views.
///
/// This module owns the data model of the rewriting engine: the content-addressed
/// symbol pool handing out `Copy` handles for types, fields, and methods; the
/// class and method definitions mutated by passes; the class hierarchy; and the
/// [`metadata::DexApplication`] / [`metadata::AppView`] pair that passes observe.
///
/// # Key Components
///
/// - [`metadata::SymbolInterner`] - Content-addressed pool for [`metadata::Type`],
///   [`metadata::MethodRef`] and [`metadata::FieldRef`] handles
/// - [`metadata::ClassDefinition`] / [`metadata::MethodDefinition`] - Mutable
///   program definitions
/// - [`metadata::OptimizationInfo`] - Monotonically refined per-method facts
/// - [`metadata::ClassHierarchy`] - Type-to-definition resolution and subtype queries
/// - [`metadata::DexApplication`] - The owning program/library container
/// - [`metadata::AppView`] - The per-pass snapshot with the active lens stack
pub mod metadata;

/// Graph lens records and the composing lens stack.
///
/// Every optimization pass that renames, moves, or changes the prototype of a
/// symbol communicates the rewriting to the rest of the pipeline exclusively
/// through a [`graph::GraphLens`]. Queries against the [`graph::LensStack`] fold
/// the recorded rewritings so that later passes see a consistent, already-rewritten
/// view of every reference.
///
/// # Key Components
///
/// - [`graph::GraphLens`] - One immutable rewriting record
/// - [`graph::GraphLensBuilder`] - Validating builder (injective rename maps)
/// - [`graph::PrototypeChanges`] - Structured signature edits
/// - [`graph::LensStack`] - Ordered composition of all lenses in effect
pub mod graph;

/// Keep rules, the pinning oracle, and tree shaking.
///
/// # Key Components
///
/// - [`shaking::KeepRules`] - Structured keep/retention rule set
/// - [`shaking::KeepOracle`] - Cached, pure pinning queries
/// - [`shaking::Enqueuer`] - Worklist liveness marking from the rule roots
/// - [`shaking::LiveSet`] - The marked program subset consumed by later passes
pub mod shaking;

/// Per-method SSA intermediate representation.
///
/// # Key Components
///
/// - [`ir::IrCode`] - A method body: blocks, phis, values
/// - [`ir::Instruction`] / [`ir::Op`] - SSA instructions
/// - [`ir::BasicBlock`] - Block with phi nodes and a terminator
pub mod ir;

/// Method-summary analyses populating the optimization-info records.
///
/// The facts recorded here (receiver escape, parameter usage, trivial
/// initializers) are consumed by the class inliner and never weakened between
/// lens-producing passes.
pub mod analysis;

/// Policy-driven horizontal class merging and conservative vertical merging.
///
/// # Key Components
///
/// - [`merging::SingleClassPolicy`] / [`merging::MultiClassPolicy`] - The policy
///   capabilities composed into a fixed-order battery
/// - [`merging::MergeGroup`] - A set of classes fused into one target
/// - [`merging::HorizontalClassMerger`] - Grouping and the merge action
/// - [`merging::VerticalClassMerger`] - Superclass-into-subclass folding
pub mod merging;

/// The class inliner.
///
/// Eliminates short-lived local objects whose identity never escapes by force
/// inlining the methods called on them and flattening their field state into
/// SSA values.
pub mod inliner;

/// Lens-producing whole-program optimizations: enum unboxing and proto
/// normalization.
pub mod optimize;

/// Minification and the residual rename mapping.
///
/// # Key Components
///
/// - [`naming::Minifier`] - Deterministic shortest-name renaming
/// - [`naming::RenameMapping`] - Proguard-format output and retrace queries
pub mod naming;

/// Whole-program driver: pass sequencing, view rebuilds, worker-pool dispatch.
pub mod driver;

/// Thread-safe diagnostics collection for the compilation pipeline.
pub mod diagnostics;

pub use crate::{
    diagnostics::{Diagnostic, DiagnosticCategory, DiagnosticSeverity, Diagnostics},
    driver::{CompilationResult, CompilerOptions, Driver},
    error::Error,
    graph::{GraphLens, LensStack, PrototypeChanges},
    metadata::{AppView, DexApplication, SymbolInterner},
    shaking::KeepRules,
};

/// Alias for `core::result::Result` with the error type defaulting to [`crate::Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;
