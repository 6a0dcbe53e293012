//! Minification and the residual rename mapping.
//!
//! # Key Components
//!
//! - [`Minifier`] - Deterministic shortest-name renaming, emitted as the
//!   final lens
//! - [`RenameMapping`] / [`OriginalProgram`] - The composed original-to-final
//!   map, rendered in proguard format and queried inversely for retracing

pub mod mapping;
pub mod minifier;

pub use mapping::{OriginalProgram, RenameMapping};
pub use minifier::Minifier;
