//! The application container and the per-pass view.
//!
//! [`DexApplication`] owns every class definition: the mutable program
//! partition and the immutable library partition. The two are disjoint by
//! construction. [`AppView`] is the snapshot a pass observes: the application,
//! the shared interner, and the stack of every lens currently in effect.
//!
//! # Invariants
//!
//! - Every reference transitively reachable from a program method resolves,
//!   via the current lens stack, to an existing definition (checked by the
//!   tree shaker and again when finalizing for the writer).
//! - `program` and `library` never contain the same type.
//! - For every pinned symbol, no lens in effect renames or removes it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    graph::{GraphLens, LensStack},
    metadata::{class::ClassDefinition, interner::SymbolInterner, interner::Type},
    Result,
};

/// The owning container for program and library classes.
///
/// Created by the reader collaborator (or the test builders), mutated by
/// passes, finalized for the writer. Program classes are stored in a vector
/// with a type index kept on the side; library classes are immutable and only
/// consulted for resolution.
#[derive(Debug, Default)]
pub struct DexApplication {
    interner: Arc<SymbolInterner>,
    program: Vec<ClassDefinition>,
    program_index: FxHashMap<Type, usize>,
    library: FxHashMap<Type, ClassDefinition>,
}

impl DexApplication {
    /// Starts building an application over the given interner.
    #[must_use]
    pub fn builder(interner: Arc<SymbolInterner>) -> DexApplicationBuilder {
        DexApplicationBuilder {
            interner,
            program: Vec::new(),
            library: FxHashMap::default(),
        }
    }

    /// Returns the shared symbol interner.
    #[must_use]
    pub fn interner(&self) -> Arc<SymbolInterner> {
        self.interner.clone()
    }

    /// Returns the program classes in insertion order.
    #[must_use]
    pub fn program_classes(&self) -> &[ClassDefinition] {
        &self.program
    }

    /// Returns mutable access to the program classes.
    ///
    /// The slice may be mutated in parallel over disjoint elements; the type
    /// index stays valid as long as no class changes its defining type. Passes
    /// that rename types go through [`DexApplication::rebuild_index`].
    pub fn program_classes_mut(&mut self) -> &mut [ClassDefinition] {
        &mut self.program
    }

    /// Iterates library classes.
    pub fn library_classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.library.values()
    }

    /// Returns program classes sorted by descriptor.
    ///
    /// This is the deterministic iteration order used by every pass whose
    /// output depends on class order.
    #[must_use]
    pub fn classes_with_deterministic_order(&self) -> Vec<&ClassDefinition> {
        let mut classes: Vec<&ClassDefinition> = self.program.iter().collect();
        classes.sort_by(|a, b| self.interner.compare_types(a.ty, b.ty));
        classes
    }

    /// Resolves a type to its definition, program first, then library.
    #[must_use]
    pub fn definition_for(&self, ty: Type) -> Option<&ClassDefinition> {
        self.program_definition_for(ty)
            .or_else(|| self.library.get(&ty))
    }

    /// Resolves a type to its program definition.
    #[must_use]
    pub fn program_definition_for(&self, ty: Type) -> Option<&ClassDefinition> {
        self.program_index.get(&ty).map(|&index| &self.program[index])
    }

    /// Resolves a type to its program definition, mutably.
    pub fn program_definition_mut(&mut self, ty: Type) -> Option<&mut ClassDefinition> {
        let index = *self.program_index.get(&ty)?;
        self.program.get_mut(index)
    }

    /// Returns `true` if the type is a program class.
    #[must_use]
    pub fn is_program(&self, ty: Type) -> bool {
        self.program_index.contains_key(&ty)
    }

    /// Returns `true` if the type is a library class.
    #[must_use]
    pub fn is_library(&self, ty: Type) -> bool {
        self.library.contains_key(&ty)
    }

    /// Adds a program class.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is already defined in either partition.
    pub fn add_program_class(&mut self, class: ClassDefinition) -> Result<()> {
        if self.program_index.contains_key(&class.ty) || self.library.contains_key(&class.ty) {
            return Err(invariant_error!(
                "duplicate definition of {}",
                self.interner.type_descriptor(class.ty)
            ));
        }
        self.program_index.insert(class.ty, self.program.len());
        self.program.push(class);
        Ok(())
    }

    /// Removes a program class by type.
    pub fn remove_program_class(&mut self, ty: Type) {
        self.program.retain(|class| class.ty != ty);
        self.rebuild_index();
    }

    /// Removes and returns a program class by type.
    pub fn take_program_class(&mut self, ty: Type) -> Option<ClassDefinition> {
        let index = *self.program_index.get(&ty)?;
        let class = self.program.remove(index);
        self.rebuild_index();
        Some(class)
    }

    /// Keeps only the program classes satisfying `keep`.
    pub fn retain_program_classes(&mut self, keep: impl FnMut(&ClassDefinition) -> bool) {
        self.program.retain(keep);
        self.rebuild_index();
    }

    /// Rebuilds the type index after structural mutation.
    pub fn rebuild_index(&mut self) {
        self.program_index = self
            .program
            .iter()
            .enumerate()
            .map(|(index, class)| (class.ty, index))
            .collect();
    }

    /// Total number of program method definitions.
    #[must_use]
    pub fn program_method_count(&self) -> usize {
        self.program.iter().map(|class| class.methods().len()).sum()
    }
}

/// Builder for [`DexApplication`], enforcing partition disjointness.
#[derive(Debug)]
pub struct DexApplicationBuilder {
    interner: Arc<SymbolInterner>,
    program: Vec<ClassDefinition>,
    library: FxHashMap<Type, ClassDefinition>,
}

impl DexApplicationBuilder {
    /// Adds a program class.
    #[must_use]
    pub fn add_program_class(mut self, class: ClassDefinition) -> Self {
        self.program.push(class);
        self
    }

    /// Adds a library class.
    #[must_use]
    pub fn add_library_class(mut self, class: ClassDefinition) -> Self {
        self.library.insert(class.ty, class);
        self
    }

    /// Finalizes the application.
    ///
    /// # Errors
    ///
    /// Returns an error when a type is defined twice or appears in both the
    /// program and the library partition.
    pub fn build(self) -> Result<DexApplication> {
        let mut app = DexApplication {
            interner: self.interner,
            program: Vec::new(),
            program_index: FxHashMap::default(),
            library: FxHashMap::default(),
        };
        app.library = self.library;
        for class in self.program {
            if app.library.contains_key(&class.ty) {
                return Err(invariant_error!(
                    "{} defined in both program and library",
                    app.interner.type_descriptor(class.ty)
                ));
            }
            app.add_program_class(class)?;
        }
        Ok(app)
    }
}

/// The snapshot visible to a pass: application, interner, lens stack.
///
/// The view is shared read-only within a pass; between passes the driver
/// mutates the application, pushes the pass's lens, and hands out a fresh
/// borrow. Lens queries against [`AppView::lens`] translate pre-pass
/// references into post-pass ones.
#[derive(Debug)]
pub struct AppView {
    /// The application.
    pub app: DexApplication,
    /// The shared symbol interner.
    pub interner: Arc<SymbolInterner>,
    lens: LensStack,
}

impl AppView {
    /// Wraps an application into a view with an empty lens stack.
    #[must_use]
    pub fn new(app: DexApplication) -> Self {
        let interner = app.interner();
        Self {
            app,
            interner,
            lens: LensStack::new(),
        }
    }

    /// Returns the lens stack currently in effect.
    #[must_use]
    pub fn lens(&self) -> &LensStack {
        &self.lens
    }

    /// Pushes a freshly built lens onto the stack.
    ///
    /// The lens must be built against the current (pre-push) view; pushed
    /// lenses are never recursively rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error when the lens would put a second prototype change in
    /// effect for a method that already carries one.
    pub fn push_lens(&mut self, lens: GraphLens) -> Result<()> {
        self.lens.push(lens, &self.interner)
    }

    /// Consumes the view, returning the finalized application and lens stack.
    #[must_use]
    pub fn into_parts(self) -> (DexApplication, LensStack) {
        (self.app, self.lens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::class::ClassAccessFlags,
        testutil::{minimal_library, TestProgramBuilder},
    };

    #[test]
    fn test_partition_disjointness() {
        let interner = Arc::new(SymbolInterner::new());
        let object = ClassDefinition::new(Type::OBJECT, ClassAccessFlags::PUBLIC, None);
        let duplicate = ClassDefinition::new(Type::OBJECT, ClassAccessFlags::PUBLIC, None);

        let result = DexApplication::builder(interner)
            .add_library_class(object)
            .add_program_class(duplicate)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_lookup_and_removal() {
        let mut builder = TestProgramBuilder::new();
        let foo = builder.simple_class("LFoo;");
        builder.simple_class("LBar;");
        let (mut app, interner) = builder.build();

        assert!(app.is_program(foo));
        assert!(app.is_library(Type::OBJECT));
        assert!(app.definition_for(Type::OBJECT).is_some());

        app.remove_program_class(foo);
        assert!(!app.is_program(foo));
        assert!(app.program_definition_for(interner.type_of("LBar;")).is_some());
    }

    #[test]
    fn test_deterministic_order() {
        let interner = Arc::new(SymbolInterner::new());
        let b = interner.type_of("LB;");
        let a = interner.type_of("LA;");
        let mut app = DexApplication::builder(interner.clone()).build().unwrap();
        for class in minimal_library(&interner) {
            app.library.insert(class.ty, class);
        }
        app.add_program_class(ClassDefinition::new(
            b,
            ClassAccessFlags::PUBLIC,
            Some(Type::OBJECT),
        ))
        .unwrap();
        app.add_program_class(ClassDefinition::new(
            a,
            ClassAccessFlags::PUBLIC,
            Some(Type::OBJECT),
        ))
        .unwrap();

        let ordered = app.classes_with_deterministic_order();
        assert_eq!(ordered[0].ty, a);
        assert_eq!(ordered[1].ty, b);
    }
}
