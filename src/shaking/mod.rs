//! Keep rules, the pinning oracle, and tree shaking.
//!
//! # Key Components
//!
//! - [`KeepRules`] - Structured keep/retention rules plus `dontWarn` patterns
//! - [`KeepOracle`] - Pure, cached pinning queries
//! - [`Enqueuer`] - Worklist liveness marking from the rule roots
//! - [`LiveSet`] / [`RuntimeTypeCheckInfo`] - The marked program subset and
//!   the runtime type-check targets consumed by the merging policies

pub mod enqueuer;
pub mod oracle;
pub mod rules;

pub use enqueuer::{Enqueuer, LiveSet, RuntimeTypeCheckInfo, ShakeResult};
pub use oracle::KeepOracle;
pub use rules::{KeepConstraints, KeepRule, KeepRules, MemberPattern, RuleAction};
