//! # dexlens Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dexlens library. Import this module to get quick access to the essential
//! types for whole-program dex optimization.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dexlens operations
pub use crate::Error;

/// The result type used throughout dexlens
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The whole-program compilation driver
pub use crate::driver::{CompilationResult, CompilerOptions, Driver};

// ================================================================================================
// Symbol Table and Application Model
// ================================================================================================

/// Interned symbol handles and the shared pool
pub use crate::metadata::{FieldRef, MethodRef, MethodSignature, SymbolInterner, Type};

/// Class and method definitions
pub use crate::metadata::{
    ClassAccessFlags, ClassDefinition, FieldAccessFlags, FieldDefinition, InvokeKind,
    MethodAccessFlags, MethodDefinition,
};

/// The application container and per-pass view
pub use crate::metadata::{AppView, DexApplication};

// ================================================================================================
// Graph Lens Layer
// ================================================================================================

/// Symbol-rewriting records and the composing stack
pub use crate::graph::{GraphLens, LensStack, PrototypeChanges};

// ================================================================================================
// Rules and Shaking
// ================================================================================================

/// Keep rules and the pinning oracle
pub use crate::shaking::{KeepConstraints, KeepOracle, KeepRules};

// ================================================================================================
// IR and Output
// ================================================================================================

/// SSA bodies and the builder
pub use crate::ir::{IrBuilder, IrCode};

/// The residual rename mapping
pub use crate::naming::RenameMapping;

/// Diagnostics collection
pub use crate::diagnostics::{DiagnosticCategory, DiagnosticSeverity, Diagnostics};
