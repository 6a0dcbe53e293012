//! The lens stack.
//!
//! An ordered list of lens records. The bottom of the stack holds the earliest
//! rewriting; queries fold successive rewritings onto the result, so a
//! reference from before the first pass translates to its final post-rename
//! form in one call. Composition is associative and the composed map is a
//! function: injectivity per lens plus the single prototype-change carrier
//! rule keep the fold lossless.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::{
    graph::{lens::GraphLens, prototype::PrototypeChanges},
    metadata::{FieldRef, InvokeKind, MethodRef, SymbolInterner, Type},
    Result,
};

/// Result of a composed method lookup: the final reference plus the composed
/// prototype change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodLookup {
    /// The post-composition method reference.
    pub reference: MethodRef,
    /// The composed prototype change (at most one lens contributes).
    pub prototype_changes: PrototypeChanges,
}

/// Ordered composition of every lens currently in effect.
#[derive(Debug, Default)]
pub struct LensStack {
    lenses: Vec<Arc<GraphLens>>,
    // Methods (tracked under their current, top-of-stack names) that already
    // carry a non-empty prototype change from some lens below.
    prototype_carriers: FxHashSet<MethodRef>,
}

impl LensStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of lenses in effect.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    /// Returns `true` when no lens is in effect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }

    /// Returns the lenses from earliest to latest.
    #[must_use]
    pub fn lenses(&self) -> &[Arc<GraphLens>] {
        &self.lenses
    }

    /// Appends a lens built against the current (pre-push) view.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LensError`] when the pushed lens carries a
    /// non-empty prototype change for a method that already has one in effect.
    /// Passes that would violate this must rewrite the earlier lens's targets
    /// instead of stacking.
    pub fn push(&mut self, lens: GraphLens, interner: &SymbolInterner) -> Result<()> {
        // Keep carrier tracking current: previously carried methods may be
        // renamed by the lens being pushed.
        let prior: FxHashSet<MethodRef> = self
            .prototype_carriers
            .iter()
            .map(|&carrier| lens.map_method(carrier, interner).0)
            .collect();

        let mut carriers = prior.clone();
        for method in lens.methods_with_prototype_changes() {
            let mapped = lens.map_method(method, interner).0;
            if prior.contains(&mapped) {
                return Err(crate::Error::LensError(format!(
                    "{}: second prototype change for a method already carrying one",
                    lens.name()
                )));
            }
            carriers.insert(mapped);
        }

        self.prototype_carriers = carriers;
        self.lenses.push(Arc::new(lens));
        Ok(())
    }

    /// Maps a type through the whole stack.
    #[must_use]
    pub fn map_type(&self, ty: Type) -> Type {
        self.lenses
            .iter()
            .fold(ty, |current, lens| lens.map_type(current))
    }

    /// Maps a field reference through the whole stack.
    #[must_use]
    pub fn map_field(&self, field: FieldRef, interner: &SymbolInterner) -> FieldRef {
        self.lenses
            .iter()
            .fold(field, |current, lens| lens.map_field(current, interner))
    }

    /// Maps a method reference through the whole stack, composing prototype
    /// changes along the way.
    #[must_use]
    pub fn map_method(&self, method: MethodRef, interner: &SymbolInterner) -> MethodLookup {
        let mut current = method;
        let mut changes = PrototypeChanges::none();
        for lens in &self.lenses {
            let (mapped, lens_changes) = lens.map_method(current, interner);
            changes = changes.compose(&lens_changes);
            current = mapped;
        }
        MethodLookup {
            reference: current,
            prototype_changes: changes,
        }
    }

    /// Translates an invocation kind across the whole stack.
    ///
    /// Folds the per-lens invoke-kind rules along the rename chain from
    /// `pre`; `post` is the expected end of that chain.
    #[must_use]
    pub fn invoke_kind(
        &self,
        pre: MethodRef,
        post: MethodRef,
        kind: InvokeKind,
        interner: &SymbolInterner,
    ) -> InvokeKind {
        let mut current = pre;
        let mut current_kind = kind;
        for lens in &self.lenses {
            let (mapped, _) = lens.map_method(current, interner);
            current_kind = lens.map_invoke_kind(current, mapped, current_kind, interner);
            current = mapped;
        }
        debug_assert_eq!(current, post, "invoke_kind chain does not reach post");
        current_kind
    }
}
