//! Class hierarchy queries.
//!
//! Classes reference each other through interned [`Type`] handles, never
//! through pointers; the hierarchy resolves handle-level questions (subtyping,
//! subtype enumeration, virtual resolution) against a snapshot of the
//! application. It is rebuilt whenever the application view is rebuilt.

use rustc_hash::FxHashMap;

use crate::metadata::{
    class::ClassDefinition,
    interner::{MethodSignature, SymbolInterner, Type},
    view::DexApplication,
};

/// An immutable snapshot of the supertype/subtype relation.
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    super_types: FxHashMap<Type, Type>,
    sub_types: FxHashMap<Type, Vec<Type>>,
    interfaces: FxHashMap<Type, Vec<Type>>,
}

impl ClassHierarchy {
    /// Builds a hierarchy snapshot over program and library classes.
    ///
    /// Subtype lists are sorted by descriptor so iteration order is
    /// deterministic.
    #[must_use]
    pub fn build(app: &DexApplication, interner: &SymbolInterner) -> Self {
        let mut hierarchy = ClassHierarchy::default();

        let mut record = |class: &ClassDefinition| {
            if let Some(super_type) = class.super_type {
                hierarchy.super_types.insert(class.ty, super_type);
                hierarchy
                    .sub_types
                    .entry(super_type)
                    .or_default()
                    .push(class.ty);
            }
            if !class.interfaces.is_empty() {
                hierarchy.interfaces.insert(class.ty, class.interfaces.clone());
            }
        };

        for class in app.program_classes() {
            record(class);
        }
        for class in app.library_classes() {
            record(class);
        }

        for subtypes in hierarchy.sub_types.values_mut() {
            subtypes.sort_by(|a, b| interner.compare_types(*a, *b));
        }

        hierarchy
    }

    /// Returns the direct superclass of a type.
    #[must_use]
    pub fn super_type_of(&self, ty: Type) -> Option<Type> {
        self.super_types.get(&ty).copied()
    }

    /// Returns the direct subtypes of a type, in descriptor order.
    #[must_use]
    pub fn subtypes_of(&self, ty: Type) -> &[Type] {
        self.sub_types.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` when `ty` has no recorded subtypes.
    #[must_use]
    pub fn is_leaf(&self, ty: Type) -> bool {
        self.subtypes_of(ty).is_empty()
    }

    /// Returns `true` when `sub` equals `sup` or transitively extends it.
    #[must_use]
    pub fn is_subtype(&self, sub: Type, sup: Type) -> bool {
        let mut current = Some(sub);
        while let Some(ty) = current {
            if ty == sup {
                return true;
            }
            current = self.super_type_of(ty);
        }
        false
    }

    /// Walks the superclass chain of `ty`, excluding `ty` itself.
    pub fn super_chain(&self, ty: Type) -> impl Iterator<Item = Type> + '_ {
        let mut current = self.super_type_of(ty);
        std::iter::from_fn(move || {
            let next = current?;
            current = self.super_type_of(next);
            Some(next)
        })
    }

    /// Resolves a virtual method signature starting at `holder` and walking
    /// up the superclass chain.
    #[must_use]
    pub fn resolve_virtual<'a>(
        &self,
        app: &'a DexApplication,
        holder: Type,
        signature: &MethodSignature,
        interner: &SymbolInterner,
    ) -> Option<(Type, &'a crate::metadata::method::MethodDefinition)> {
        let mut current = Some(holder);
        while let Some(ty) = current {
            if let Some(class) = app.definition_for(ty) {
                if let Some(method) = class.lookup_virtual_method(signature, interner) {
                    return Some((ty, method));
                }
            }
            current = self.super_type_of(ty);
        }
        None
    }

    /// Returns `true` when any supertype (class or interface) of `ty`
    /// declares a virtual method with this signature.
    #[must_use]
    pub fn signature_declared_above(
        &self,
        app: &DexApplication,
        ty: Type,
        signature: &MethodSignature,
        interner: &SymbolInterner,
    ) -> bool {
        for ancestor in self.super_chain(ty) {
            if let Some(class) = app.definition_for(ancestor) {
                if class.lookup_virtual_method(signature, interner).is_some() {
                    return true;
                }
            }
        }
        let mut interfaces: Vec<Type> = self
            .interfaces
            .get(&ty)
            .map(Vec::clone)
            .unwrap_or_default();
        while let Some(interface) = interfaces.pop() {
            if let Some(class) = app.definition_for(interface) {
                if class.lookup_virtual_method(signature, interner).is_some() {
                    return true;
                }
                interfaces.extend(class.interfaces.iter().copied());
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestProgramBuilder;

    #[test]
    fn test_subtype_relation() {
        let mut builder = TestProgramBuilder::new();
        let animal = builder.simple_class("LAnimal;");
        builder.simple_class_extending("LCat;", "LAnimal;");
        builder.simple_class_extending("LDog;", "LAnimal;");
        let (app, interner) = builder.build();

        let hierarchy = ClassHierarchy::build(&app, &interner);
        let cat = interner.type_of("LCat;");

        assert!(hierarchy.is_subtype(cat, animal));
        assert!(hierarchy.is_subtype(cat, Type::OBJECT));
        assert!(!hierarchy.is_subtype(animal, cat));
        assert_eq!(hierarchy.subtypes_of(animal).len(), 2);
        assert!(hierarchy.is_leaf(cat));
        // Subtypes are sorted by descriptor.
        assert_eq!(
            hierarchy.subtypes_of(animal),
            &[cat, interner.type_of("LDog;")]
        );
    }

    #[test]
    fn test_super_chain() {
        let mut builder = TestProgramBuilder::new();
        builder.simple_class("LA;");
        builder.simple_class_extending("LB;", "LA;");
        builder.simple_class_extending("LC;", "LB;");
        let (app, interner) = builder.build();

        let hierarchy = ClassHierarchy::build(&app, &interner);
        let chain: Vec<Type> = hierarchy.super_chain(interner.type_of("LC;")).collect();
        assert_eq!(
            chain,
            vec![
                interner.type_of("LB;"),
                interner.type_of("LA;"),
                Type::OBJECT
            ]
        );
    }
}
