//! Lens-producing whole-program optimizations.
//!
//! # Key Components
//!
//! - [`EnumUnboxer`] - Rewrites eligible enums to `int` constants, statifying
//!   their methods onto a synthesized utility class (lens with prototype
//!   changes and a statified invoke-kind rule)
//! - [`ProtoNormalizer`] - Canonicalizes parameter orderings against one
//!   shared reservation state (lens with argument permutations)

pub mod enum_unboxing;
pub mod proto;

pub use enum_unboxing::EnumUnboxer;
pub use proto::ProtoNormalizer;
