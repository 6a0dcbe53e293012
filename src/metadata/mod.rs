//! Symbol table, definitions, and application views.
//!
//! This module owns the data model shared by every pass: the content-addressed
//! [`SymbolInterner`] handing out identity-equal handles, the mutable
//! [`ClassDefinition`] / [`MethodDefinition`] pair, the [`ClassHierarchy`]
//! resolving handles to definitions, and the [`DexApplication`] / [`AppView`]
//! containers.
//!
//! # Architecture
//!
//! Classes reference each other via interned [`Type`] handles, never pointers;
//! the application's class table owns the definitions and everything else
//! holds handles. This keeps the densely cyclic class graph free of ownership
//! cycles.

pub mod class;
pub mod descriptor;
pub mod hierarchy;
pub mod interner;
pub mod method;
pub mod view;

pub use class::{
    ClassAccessFlags, ClassDefinition, FieldAccessFlags, FieldDefinition, InnerClassAttribute,
    KotlinClassKind, KotlinMetadata,
};
pub use hierarchy::ClassHierarchy;
pub use interner::{
    FieldData, FieldRef, MethodData, MethodRef, MethodSignature, SymbolInterner, Type,
};
pub use method::{
    ClassInlinerEligibility, InvokeKind, MethodAccessFlags, MethodDefinition, OptimizationInfo,
    ParameterUsage,
};
pub use view::{AppView, DexApplication, DexApplicationBuilder};
