//! Shared test factories.
//!
//! Builders that assemble small synthetic applications without a class-file
//! reader: a minimal library (the root object type, `String`, `Enum`) plus
//! helpers for empty program classes. Tests add members through the regular
//! definition APIs.

use std::sync::Arc;

use crate::metadata::{
    ClassAccessFlags, ClassDefinition, DexApplication, MethodAccessFlags, MethodDefinition,
    SymbolInterner, Type,
};

/// Creates the minimal library partition: `Object` (with its constructor),
/// `String`, and `Enum`.
pub fn minimal_library(interner: &SymbolInterner) -> Vec<ClassDefinition> {
    let mut object = ClassDefinition::new(Type::OBJECT, ClassAccessFlags::PUBLIC, None);
    object.add_method(MethodDefinition::new(
        interner.object_constructor(),
        MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR,
    ));

    let string = ClassDefinition::new(
        Type::STRING,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
        Some(Type::OBJECT),
    );

    let mut enum_class = ClassDefinition::new(
        Type::ENUM,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
        Some(Type::OBJECT),
    );
    enum_class.add_method(MethodDefinition::new(
        interner.method(Type::ENUM, "<init>", &[Type::STRING, Type::INT], Type::VOID),
        MethodAccessFlags::PROTECTED | MethodAccessFlags::CONSTRUCTOR,
    ));

    vec![object, string, enum_class]
}

/// Incrementally assembles a program over a fresh interner and the minimal
/// library.
pub struct TestProgramBuilder {
    interner: Arc<SymbolInterner>,
    classes: Vec<ClassDefinition>,
}

impl Default for TestProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProgramBuilder {
    /// Creates an empty program builder.
    pub fn new() -> Self {
        Self {
            interner: Arc::new(SymbolInterner::new()),
            classes: Vec::new(),
        }
    }

    /// Returns the shared interner.
    pub fn interner(&self) -> Arc<SymbolInterner> {
        self.interner.clone()
    }

    /// Adds a public, memberless class extending the root object type.
    pub fn simple_class(&mut self, descriptor: &str) -> Type {
        self.simple_class_extending(descriptor, "Ljava/lang/Object;")
    }

    /// Adds a public, memberless class with the given superclass.
    pub fn simple_class_extending(&mut self, descriptor: &str, super_descriptor: &str) -> Type {
        let ty = self.interner.type_of(descriptor);
        let super_type = self.interner.type_of(super_descriptor);
        self.classes.push(ClassDefinition::new(
            ty,
            ClassAccessFlags::PUBLIC,
            Some(super_type),
        ));
        ty
    }

    /// Adds a fully formed class definition.
    pub fn add_class(&mut self, class: ClassDefinition) {
        self.classes.push(class);
    }

    /// Returns mutable access to a previously added class.
    pub fn class_mut(&mut self, ty: Type) -> Option<&mut ClassDefinition> {
        self.classes.iter_mut().find(|class| class.ty == ty)
    }

    /// Finalizes the application.
    pub fn build(self) -> (DexApplication, Arc<SymbolInterner>) {
        let interner = self.interner.clone();
        let mut builder = DexApplication::builder(self.interner.clone());
        for class in minimal_library(&self.interner) {
            builder = builder.add_library_class(class);
        }
        for class in self.classes {
            builder = builder.add_program_class(class);
        }
        let app = builder.build().expect("test program must be well-formed");
        (app, interner)
    }
}
