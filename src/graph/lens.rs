//! Graph lens records.
//!
//! A [`GraphLens`] is the immutable record of all symbol rewritings produced by
//! one optimization pass: three partial maps (type, field, method), optional
//! per-method prototype changes, and an invoke-kind translation rule. The lens
//! is the only mechanism by which a pass communicates renames to the rest of
//! the pipeline.
//!
//! # Architecture
//!
//! A lens query first rewrites the structural pieces of a reference through
//! the type map (holder, parameter types, return type), then consults the
//! explicit per-member map for moves and renames. Unknown references map to
//! themselves; queries are total and infallible. Build-time validation
//! rejects rename maps that are not injective per symbol kind.
//!
//! # Key Components
//!
//! - [`GraphLens`] - One immutable rewriting record
//! - [`GraphLensBuilder`] - Validating builder
//! - [`disambiguate_name`] - Collision avoidance (`name$1`, `name$2`, ...)

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::prototype::PrototypeChanges,
    metadata::{FieldRef, InvokeKind, MethodRef, SymbolInterner, Type},
    Result,
};

/// Per-lens translation of invocation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvokeKindRule {
    /// Invocation kinds pass through unchanged.
    #[default]
    Preserve,
    /// Calls whose original holder was rewritten by the type map become
    /// static: the pass moved those instance methods to a utility class and
    /// statified them.
    StatifyMappedHolders,
}

/// One immutable symbol-rewriting record.
///
/// Built against the view current at construction time and never mutated
/// afterwards. The stack composes lenses; an individual lens only knows the
/// single-pass rewriting it recorded.
#[derive(Debug, Default)]
pub struct GraphLens {
    name: &'static str,
    type_map: FxHashMap<Type, Type>,
    field_map: FxHashMap<FieldRef, FieldRef>,
    method_map: FxHashMap<MethodRef, MethodRef>,
    // Keyed by the PRE-rename method: several sources may share one target
    // (constructor dispatch) while carrying distinct changes.
    prototype_changes: FxHashMap<MethodRef, PrototypeChanges>,
    invoke_kind_rule: InvokeKindRule,
}

impl GraphLens {
    /// Starts building a lens for the named pass.
    #[must_use]
    pub fn builder(name: &'static str) -> GraphLensBuilder {
        GraphLensBuilder {
            lens: GraphLens {
                name,
                ..GraphLens::default()
            },
        }
    }

    /// Name of the pass that produced this lens.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` when the lens records no rewriting at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_map.is_empty() && self.field_map.is_empty() && self.method_map.is_empty()
    }

    /// Maps a type through this lens only.
    #[must_use]
    pub fn map_type(&self, ty: Type) -> Type {
        self.type_map.get(&ty).copied().unwrap_or(ty)
    }

    /// Returns `true` when the type map rewrites `ty`.
    #[must_use]
    pub fn rewrites_type(&self, ty: Type) -> bool {
        self.type_map.contains_key(&ty)
    }

    /// Maps a field reference through this lens only.
    ///
    /// The explicit field map wins; otherwise the holder and field type are
    /// rewritten through the type map.
    #[must_use]
    pub fn map_field(&self, field: FieldRef, interner: &SymbolInterner) -> FieldRef {
        if let Some(&mapped) = self.field_map.get(&field) {
            return mapped;
        }
        if self.type_map.is_empty() {
            return field;
        }
        let data = interner.field_data(field);
        let holder = self.map_type(data.holder);
        let field_type = self.map_type(data.field_type);
        if holder == data.holder && field_type == data.field_type {
            field
        } else {
            interner.field(holder, &data.name, field_type)
        }
    }

    /// Maps a method reference through this lens only, returning the mapped
    /// reference and the prototype change this lens recorded for it.
    #[must_use]
    pub fn map_method(
        &self,
        method: MethodRef,
        interner: &SymbolInterner,
    ) -> (MethodRef, PrototypeChanges) {
        let changes = self
            .prototype_changes
            .get(&method)
            .cloned()
            .unwrap_or_default();
        let mapped = if let Some(&explicit) = self.method_map.get(&method) {
            explicit
        } else if self.type_map.is_empty() {
            method
        } else {
            let data = interner.method_data(method);
            let holder = self.map_type(data.holder);
            let params: Vec<Type> = data.params.iter().map(|&p| self.map_type(p)).collect();
            let return_type = self.map_type(data.return_type);
            if holder == data.holder
                && return_type == data.return_type
                && params.iter().zip(data.params.iter()).all(|(a, b)| a == b)
            {
                method
            } else {
                interner.method(holder, &data.name, &params, return_type)
            }
        };
        (mapped, changes)
    }

    /// Translates an invocation kind for a call rewritten by this lens.
    #[must_use]
    pub fn map_invoke_kind(
        &self,
        original: MethodRef,
        mapped: MethodRef,
        kind: InvokeKind,
        interner: &SymbolInterner,
    ) -> InvokeKind {
        match self.invoke_kind_rule {
            InvokeKindRule::Preserve => kind,
            InvokeKindRule::StatifyMappedHolders => {
                let holder = interner.method_data(original).holder;
                if self.type_map.contains_key(&holder) {
                    debug_assert_ne!(original, mapped);
                    InvokeKind::Static
                } else {
                    kind
                }
            }
        }
    }

    /// Returns the prototype change recorded for a pre-rename method.
    #[must_use]
    pub fn prototype_changes_for(&self, original: MethodRef) -> Option<&PrototypeChanges> {
        self.prototype_changes.get(&original)
    }

    /// Iterates the pre-rename methods that carry a non-empty prototype
    /// change.
    pub fn methods_with_prototype_changes(&self) -> impl Iterator<Item = MethodRef> + '_ {
        self.prototype_changes
            .iter()
            .filter(|(_, changes)| !changes.is_empty())
            .map(|(&method, _)| method)
    }

    /// Iterates the type-map entries.
    pub fn type_entries(&self) -> impl Iterator<Item = (Type, Type)> + '_ {
        self.type_map.iter().map(|(&from, &to)| (from, to))
    }
}

/// Builder for [`GraphLens`], validating injectivity at build time.
#[derive(Debug)]
pub struct GraphLensBuilder {
    lens: GraphLens,
}

impl GraphLensBuilder {
    /// Records a type rename. Identity entries are dropped.
    pub fn map_type(&mut self, from: Type, to: Type) -> &mut Self {
        if from != to {
            self.lens.type_map.insert(from, to);
        }
        self
    }

    /// Records a field move or rename.
    pub fn move_field(&mut self, from: FieldRef, to: FieldRef) -> &mut Self {
        if from != to {
            self.lens.field_map.insert(from, to);
        }
        self
    }

    /// Records a method move or rename without a prototype change.
    pub fn move_method(&mut self, from: MethodRef, to: MethodRef) -> &mut Self {
        if from != to {
            self.lens.method_map.insert(from, to);
        }
        self
    }

    /// Records a method move together with its prototype change.
    pub fn move_method_with_prototype(
        &mut self,
        from: MethodRef,
        to: MethodRef,
        changes: PrototypeChanges,
    ) -> &mut Self {
        self.lens.method_map.insert(from, to);
        if !changes.is_empty() {
            self.lens.prototype_changes.insert(from, changes);
        }
        self
    }

    /// Makes the lens statify calls whose holders were rewritten.
    pub fn statify_mapped_holders(&mut self) -> &mut Self {
        self.lens.invoke_kind_rule = InvokeKindRule::StatifyMappedHolders;
        self
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lens.is_empty()
    }

    /// Validates and finishes the lens.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LensError`] when a rename map is not injective
    /// for one symbol kind: two distinct sources mapping to the same target
    /// would make the composed mapping lose information.
    pub fn build(self, interner: &SymbolInterner) -> Result<GraphLens> {
        let mut seen_types = FxHashSet::default();
        for to in self.lens.type_map.values() {
            if !seen_types.insert(*to) {
                return Err(crate::Error::LensError(format!(
                    "{}: type rename map is not injective at {}",
                    self.lens.name,
                    interner.type_descriptor(*to)
                )));
            }
        }
        let mut seen_fields = FxHashSet::default();
        for to in self.lens.field_map.values() {
            if !seen_fields.insert(*to) {
                return Err(crate::Error::LensError(format!(
                    "{}: field rename map is not injective at {}",
                    self.lens.name,
                    interner.format_field(*to)
                )));
            }
        }
        // Method targets must be distinct, with one exception: entries whose
        // prototype changes differ may share a target. Constructor dispatch
        // maps every source initializer onto one dispatcher, distinguished by
        // the appended class-id constant, so no information is lost.
        let mut seen_methods: FxHashMap<MethodRef, MethodRef> = FxHashMap::default();
        for (from, to) in &self.lens.method_map {
            if let Some(&previous) = seen_methods.get(to) {
                let previous_changes = self.lens.prototype_changes.get(&previous);
                let current_changes = self.lens.prototype_changes.get(from);
                let distinguished = match (previous_changes, current_changes) {
                    (Some(a), Some(b)) => a != b,
                    _ => false,
                };
                if !distinguished {
                    return Err(crate::Error::LensError(format!(
                        "{}: method rename map is not injective at {}",
                        self.lens.name,
                        interner.format_method(*to)
                    )));
                }
            } else {
                seen_methods.insert(*to, *from);
            }
        }
        Ok(self.lens)
    }
}

/// Finds a collision-free variant of `base` by appending `$k` for the
/// smallest `k >= 1`, or returns `base` unchanged when it is free.
#[must_use]
pub fn disambiguate_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    let mut k = 1usize;
    loop {
        let candidate = format!("{base}${k}");
        if !is_taken(&candidate) {
            return candidate;
        }
        k += 1;
    }
}
