//! Policy-driven horizontal class merging and conservative vertical merging.
//!
//! # Key Components
//!
//! - [`SingleClassPolicy`] / [`MultiClassPolicy`] - The policy capabilities
//! - [`policies`] - The fixed-order battery the mergers compose
//! - [`MergeGroup`] - A set of classes fused into one target
//! - [`HorizontalClassMerger`] - Grouping and the merge action: fields
//!   relocate, constructors dispatch on a class id, virtual methods unify or
//!   trampoline
//! - [`VerticalClassMerger`] - Superclass-into-subclass folding
//!
//! Both mergers communicate exclusively through the lens they emit; a
//! discarded group leaves no trace.

pub mod group;
pub mod horizontal;
pub mod policies;
pub mod policy;
pub mod vertical;

pub use group::MergeGroup;
pub use horizontal::HorizontalClassMerger;
pub use policy::{MultiClassPolicy, SingleClassPolicy};
pub use vertical::VerticalClassMerger;
