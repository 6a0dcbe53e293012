//! Graph lens records and the composing lens stack.
//!
//! Every optimization pass that renames, moves, or changes the prototype of
//! any symbol pushes one [`GraphLens`] onto the [`LensStack`]. Later code
//! rewrites consult the composed stack to translate pre-pass references into
//! post-pass ones. Lens queries are total and infallible: an unknown
//! reference maps to itself.
//!
//! # Key Components
//!
//! - [`GraphLens`] / [`GraphLensBuilder`] - One immutable rewriting record
//! - [`PrototypeChanges`] - Structured signature edits carried by a lens
//! - [`LensStack`] - Left-to-right composition of every lens in effect
//! - [`disambiguate_name`] - Signature-collision avoidance

mod lens;
mod prototype;
mod stack;

pub use lens::{disambiguate_name, GraphLens, GraphLensBuilder, InvokeKindRule};
pub use prototype::{ArgumentInfo, PrototypeChanges, RewrittenTypeInfo};
pub use stack::{LensStack, MethodLookup};
