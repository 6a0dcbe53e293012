//! Prototype-change descriptions.
//!
//! A lens entry that moves a method may also edit its signature: remove
//! argument slots, rewrite argument types, rewrite the return type, append
//! extra trailing parameters. [`PrototypeChanges`] is the structured record of
//! such an edit; the application rewriter consults it to fix every call site
//! of the rewritten method.
//!
//! Argument indices refer to the call-site argument vector, receiver included
//! for instance calls. A statified instance method therefore records its
//! receiver rewrite at index 0.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::metadata::Type;

/// One argument type rewrite: the slot keeps its position, its type changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewrittenTypeInfo {
    /// The pre-rewrite type.
    pub old_type: Type,
    /// The post-rewrite type.
    pub new_type: Type,
}

/// What happened to one argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentInfo {
    /// The slot was removed; call sites drop the argument.
    Removed {
        /// The type the removed slot had.
        ty: Type,
    },
    /// The slot's type was rewritten in place.
    Rewritten(RewrittenTypeInfo),
}

/// A structured edit to a method's signature.
///
/// Immutable once built. The composition contract is enforced one level up:
/// at most one lens on the stack carries a non-empty change for any method,
/// so composing two changes only ever pairs a non-empty record with empty
/// ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrototypeChanges {
    arg_infos: BTreeMap<u16, ArgumentInfo>,
    return_info: Option<RewrittenTypeInfo>,
    extra_unused_null_parameters: u16,
    extra_constant_arguments: Vec<i32>,
    arg_permutation: Option<Arc<[u16]>>,
}

impl PrototypeChanges {
    /// The empty change.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` when this record edits nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arg_infos.is_empty()
            && self.return_info.is_none()
            && self.extra_unused_null_parameters == 0
            && self.extra_constant_arguments.is_empty()
            && self.arg_permutation.is_none()
    }

    /// Records an argument-slot edit.
    #[must_use]
    pub fn with_argument_info(mut self, index: u16, info: ArgumentInfo) -> Self {
        self.arg_infos.insert(index, info);
        self
    }

    /// Records a return-type rewrite.
    #[must_use]
    pub fn with_return_info(mut self, info: RewrittenTypeInfo) -> Self {
        self.return_info = Some(info);
        self
    }

    /// Appends trailing unused null parameters, used to dodge signature
    /// collisions.
    #[must_use]
    pub fn with_extra_unused_null_parameters(mut self, count: u16) -> Self {
        self.extra_unused_null_parameters = count;
        self
    }

    /// Appends trailing constant integer arguments.
    ///
    /// Used by the horizontal merger: each source constructor's call sites
    /// gain the class id of their original class.
    #[must_use]
    pub fn with_extra_constant_argument(mut self, value: i32) -> Self {
        self.extra_constant_arguments.push(value);
        self
    }

    /// Records an argument permutation: `permutation[i]` is the old slot now
    /// sitting at position `i`.
    #[must_use]
    pub fn with_argument_permutation(mut self, permutation: Vec<u16>) -> Self {
        self.arg_permutation = Some(Arc::from(permutation));
        self
    }

    /// Iterates the argument-slot edits in slot order.
    pub fn argument_infos(&self) -> impl Iterator<Item = (u16, &ArgumentInfo)> {
        self.arg_infos.iter().map(|(index, info)| (*index, info))
    }

    /// Returns the edit recorded for one slot.
    #[must_use]
    pub fn argument_info(&self, index: u16) -> Option<&ArgumentInfo> {
        self.arg_infos.get(&index)
    }

    /// Returns the slots removed by this change, in slot order.
    #[must_use]
    pub fn removed_arguments(&self) -> Vec<u16> {
        self.arg_infos
            .iter()
            .filter(|(_, info)| matches!(info, ArgumentInfo::Removed { .. }))
            .map(|(index, _)| *index)
            .collect()
    }

    /// Returns the return-type rewrite, if any.
    #[must_use]
    pub fn return_info(&self) -> Option<&RewrittenTypeInfo> {
        self.return_info.as_ref()
    }

    /// Returns the number of appended unused null parameters.
    #[must_use]
    pub fn extra_unused_null_parameters(&self) -> u16 {
        self.extra_unused_null_parameters
    }

    /// Returns the appended constant arguments, in append order.
    #[must_use]
    pub fn extra_constant_arguments(&self) -> &[i32] {
        &self.extra_constant_arguments
    }

    /// Returns the argument permutation, if any.
    #[must_use]
    pub fn argument_permutation(&self) -> Option<&[u16]> {
        self.arg_permutation.as_deref()
    }

    /// Composes this change with one applied after it.
    ///
    /// Prototype changes are not mergeable in general; the stack guarantees
    /// that at least one side is empty.
    #[must_use]
    pub fn compose(&self, later: &PrototypeChanges) -> PrototypeChanges {
        if self.is_empty() {
            return later.clone();
        }
        debug_assert!(
            later.is_empty(),
            "two non-empty prototype changes reached composition"
        );
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_change() {
        let changes = PrototypeChanges::none();
        assert!(changes.is_empty());
        assert!(changes.removed_arguments().is_empty());
        assert_eq!(changes.extra_unused_null_parameters(), 0);
    }

    #[test]
    fn test_argument_edits() {
        let changes = PrototypeChanges::none()
            .with_argument_info(
                1,
                ArgumentInfo::Rewritten(RewrittenTypeInfo {
                    old_type: Type::OBJECT,
                    new_type: Type::INT,
                }),
            )
            .with_argument_info(2, ArgumentInfo::Removed { ty: Type::LONG });

        assert!(!changes.is_empty());
        assert_eq!(changes.removed_arguments(), vec![2]);
        assert!(matches!(
            changes.argument_info(1),
            Some(ArgumentInfo::Rewritten(_))
        ));
    }

    #[test]
    fn test_compose_with_empty() {
        let change = PrototypeChanges::none().with_extra_constant_argument(1);
        let empty = PrototypeChanges::none();

        assert_eq!(empty.compose(&change), change);
        assert_eq!(change.compose(&empty), change);
    }
}
