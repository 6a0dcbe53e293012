//! Class and field definitions.
//!
//! A [`ClassDefinition`] owns everything the pipeline may mutate about a class:
//! access flags, superclass and interface types, the ordered field and method
//! collections, the inner-class attribute list, and an optional Kotlin metadata
//! blob. Definitions are created by the reader collaborator, mutated by passes,
//! and destroyed only when the application is finalized for writing.

use std::sync::Arc;

use bitflags::bitflags;

use crate::metadata::{
    interner::{FieldRef, MethodRef, MethodSignature, SymbolInterner, Type},
    method::MethodDefinition,
};

bitflags! {
    /// Class access and property flags, dex encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassAccessFlags: u32 {
        /// Publicly accessible.
        const PUBLIC = 0x0001;
        /// Not subclassable.
        const FINAL = 0x0010;
        /// Interface definition.
        const INTERFACE = 0x0200;
        /// Abstract, not instantiable.
        const ABSTRACT = 0x0400;
        /// Compiler-synthesized.
        const SYNTHETIC = 0x1000;
        /// Annotation type.
        const ANNOTATION = 0x2000;
        /// Enum type.
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// Field access and property flags, dex encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAccessFlags: u32 {
        /// Publicly accessible.
        const PUBLIC = 0x0001;
        /// Accessible only within the declaring class.
        const PRIVATE = 0x0002;
        /// Accessible within the package and subclasses.
        const PROTECTED = 0x0004;
        /// Class-level field.
        const STATIC = 0x0008;
        /// Write-once field.
        const FINAL = 0x0010;
        /// Volatile memory semantics.
        const VOLATILE = 0x0040;
        /// Excluded from default serialization.
        const TRANSIENT = 0x0080;
        /// Compiler-synthesized.
        const SYNTHETIC = 0x1000;
        /// Enum constant.
        const ENUM = 0x4000;
    }
}

/// One field definition owned by a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// The interned reference identifying this field.
    pub reference: FieldRef,
    /// Access flags.
    pub access_flags: FieldAccessFlags,
}

impl FieldDefinition {
    /// Creates a new field definition.
    #[must_use]
    pub fn new(reference: FieldRef, access_flags: FieldAccessFlags) -> Self {
        Self {
            reference,
            access_flags,
        }
    }

    /// Returns `true` for class-level fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }

    /// Returns `true` for write-once fields.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::FINAL)
    }
}

/// One entry of a class's inner-classes attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassAttribute {
    /// The inner class.
    pub inner: Type,
    /// The enclosing class, if recorded.
    pub outer: Option<Type>,
    /// The simple source name, absent for anonymous classes.
    pub simple_name: Option<String>,
}

/// Kind of a Kotlin class, as recorded in its metadata annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KotlinClassKind {
    /// Ordinary Kotlin class.
    Class,
    /// File facade.
    FileFacade,
    /// Compiler-synthesized class, e.g. a lambda.
    SyntheticClass,
}

/// Kotlin metadata carried by a class.
///
/// The pipeline does not interpret the raw payload; it only needs to know
/// whether a class is a compiler-synthesized lambda, which exempts its methods
/// from the class inliner's size ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KotlinMetadata {
    /// Kind of the annotated class.
    pub kind: KotlinClassKind,
    /// Whether a synthetic class is a lambda.
    pub is_lambda: bool,
    /// Raw metadata payload, passed through to the writer.
    pub payload: Vec<u8>,
}

impl KotlinMetadata {
    /// Returns `true` if this marks a compiler-synthesized Kotlin lambda.
    #[must_use]
    pub fn is_synthetic_lambda(&self) -> bool {
        self.kind == KotlinClassKind::SyntheticClass && self.is_lambda
    }
}

/// A class definition: the unit of per-class mutation in the pipeline.
///
/// # Lifecycle
///
/// Created by the reader, mutated by passes (members added, removed, replaced,
/// renamed), destroyed when the application is finalized for writing. Within a
/// pass, at most one worker mutates a given class's member collections.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    /// The interned type this class defines.
    pub ty: Type,
    /// Access flags.
    pub access_flags: ClassAccessFlags,
    /// Superclass type; `None` only for the root object type.
    pub super_type: Option<Type>,
    /// Implemented interface types.
    pub interfaces: Vec<Type>,
    fields: Vec<FieldDefinition>,
    methods: Vec<MethodDefinition>,
    /// Inner-classes attribute entries.
    pub inner_classes: Vec<InnerClassAttribute>,
    /// Optional Kotlin metadata blob.
    pub kotlin_metadata: Option<KotlinMetadata>,
}

impl ClassDefinition {
    /// Creates a new class definition with empty member collections.
    #[must_use]
    pub fn new(ty: Type, access_flags: ClassAccessFlags, super_type: Option<Type>) -> Self {
        Self {
            ty,
            access_flags,
            super_type,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            kotlin_metadata: None,
        }
    }

    /// Returns `true` for interface definitions.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Returns `true` for abstract classes and interfaces.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    /// Returns `true` for final classes.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::FINAL)
    }

    /// Returns `true` for enum definitions.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ENUM)
    }

    /// Adds a field to the ordered field collection.
    pub fn add_field(&mut self, field: FieldDefinition) {
        self.fields.push(field);
    }

    /// Adds a method to the ordered method collection.
    pub fn add_method(&mut self, method: MethodDefinition) {
        self.methods.push(method);
    }

    /// Returns all field definitions in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Returns mutable access to the field collection.
    pub fn fields_mut(&mut self) -> &mut Vec<FieldDefinition> {
        &mut self.fields
    }

    /// Returns all method definitions in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[MethodDefinition] {
        &self.methods
    }

    /// Returns mutable access to the method collection.
    pub fn methods_mut(&mut self) -> &mut Vec<MethodDefinition> {
        &mut self.methods
    }

    /// Iterates instance fields in declaration order.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    /// Iterates static fields in declaration order.
    pub fn static_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.is_static())
    }

    /// Iterates virtual methods: non-static, non-private, non-initializer.
    pub fn virtual_methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.methods.iter().filter(|m| m.is_virtual())
    }

    /// Iterates direct methods: static, private, and initializers.
    pub fn direct_methods(&self) -> impl Iterator<Item = &MethodDefinition> {
        self.methods.iter().filter(|m| !m.is_virtual())
    }

    /// Looks up a method definition by its interned reference.
    #[must_use]
    pub fn method(&self, reference: MethodRef) -> Option<&MethodDefinition> {
        self.methods.iter().find(|m| m.reference == reference)
    }

    /// Looks up a method definition mutably by its interned reference.
    pub fn method_mut(&mut self, reference: MethodRef) -> Option<&mut MethodDefinition> {
        self.methods.iter_mut().find(|m| m.reference == reference)
    }

    /// Removes a method by its interned reference.
    pub fn remove_method(&mut self, reference: MethodRef) {
        self.methods.retain(|m| m.reference != reference);
    }

    /// Looks up a field definition by its interned reference.
    #[must_use]
    pub fn field(&self, reference: FieldRef) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.reference == reference)
    }

    /// Looks up an instance field declared by this class.
    #[must_use]
    pub fn lookup_instance_field(&self, reference: FieldRef) -> Option<&FieldDefinition> {
        self.instance_fields().find(|f| f.reference == reference)
    }

    /// Looks up a static field declared by this class.
    #[must_use]
    pub fn lookup_static_field(&self, reference: FieldRef) -> Option<&FieldDefinition> {
        self.static_fields().find(|f| f.reference == reference)
    }

    /// Looks up a virtual method declared by this class with the given signature.
    #[must_use]
    pub fn lookup_virtual_method(
        &self,
        signature: &MethodSignature,
        interner: &SymbolInterner,
    ) -> Option<&MethodDefinition> {
        self.virtual_methods()
            .find(|m| &interner.method_data(m.reference).signature() == signature)
    }

    /// Returns the class initializer, if declared.
    #[must_use]
    pub fn class_initializer(&self, interner: &SymbolInterner) -> Option<&MethodDefinition> {
        self.methods
            .iter()
            .find(|m| interner.method_data(m.reference).is_class_initializer())
    }

    /// Returns `true` if the class declares a class initializer.
    #[must_use]
    pub fn has_class_initializer(&self, interner: &SymbolInterner) -> bool {
        self.class_initializer(interner).is_some()
    }

    /// Iterates the instance initializers declared by this class.
    pub fn instance_initializers<'a>(
        &'a self,
        interner: &'a SymbolInterner,
    ) -> impl Iterator<Item = &'a MethodDefinition> {
        self.methods
            .iter()
            .filter(move |m| interner.method_data(m.reference).is_constructor())
    }

    /// Returns `true` if the class overrides `Object.finalize()`.
    #[must_use]
    pub fn has_finalizer(&self, interner: &SymbolInterner) -> bool {
        self.virtual_methods().any(|m| {
            let data = interner.method_data(m.reference);
            &*data.name == "finalize" && data.params.is_empty() && data.return_type == Type::VOID
        })
    }

    /// Returns the declared member names, used for collision-free renaming.
    #[must_use]
    pub fn member_names(&self, interner: &SymbolInterner) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self
            .fields
            .iter()
            .map(|f| interner.field_data(f.reference).name.clone())
            .collect();
        names.extend(
            self.methods
                .iter()
                .map(|m| interner.method_data(m.reference).name.clone()),
        );
        names
    }

    /// Returns `true` once every member has been removed.
    #[must_use]
    pub fn is_memberless(&self) -> bool {
        self.fields.is_empty() && self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::MethodAccessFlags;

    fn test_class(interner: &SymbolInterner) -> ClassDefinition {
        let ty = interner.type_of("LFoo;");
        let mut class = ClassDefinition::new(ty, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
        class.add_field(FieldDefinition::new(
            interner.field(ty, "x", Type::INT),
            FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
        ));
        class.add_field(FieldDefinition::new(
            interner.field(ty, "COUNT", Type::INT),
            FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        ));
        class.add_method(MethodDefinition::new(
            interner.method(ty, "getX", &[], Type::INT),
            MethodAccessFlags::PUBLIC,
        ));
        class.add_method(MethodDefinition::new(
            interner.method(ty, "<init>", &[Type::INT], Type::VOID),
            MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR,
        ));
        class
    }

    #[test]
    fn test_member_partitions() {
        let interner = SymbolInterner::new();
        let class = test_class(&interner);

        assert_eq!(class.instance_fields().count(), 1);
        assert_eq!(class.static_fields().count(), 1);
        assert_eq!(class.virtual_methods().count(), 1);
        assert_eq!(class.direct_methods().count(), 1);
    }

    #[test]
    fn test_lookups() {
        let interner = SymbolInterner::new();
        let class = test_class(&interner);
        let ty = class.ty;

        let x = interner.field(ty, "x", Type::INT);
        assert!(class.lookup_instance_field(x).is_some());
        assert!(class.lookup_static_field(x).is_none());

        let get_x = interner.method(ty, "getX", &[], Type::INT);
        let signature = interner.method_data(get_x).signature();
        assert!(class.lookup_virtual_method(&signature, &interner).is_some());
        assert!(class.class_initializer(&interner).is_none());
        assert_eq!(class.instance_initializers(&interner).count(), 1);
    }

    #[test]
    fn test_method_removal() {
        let interner = SymbolInterner::new();
        let mut class = test_class(&interner);
        let get_x = interner.method(class.ty, "getX", &[], Type::INT);

        class.remove_method(get_x);
        assert!(class.method(get_x).is_none());
        assert_eq!(class.methods().len(), 1);
        assert!(!class.is_memberless());
    }

    #[test]
    fn test_finalizer_detection() {
        let interner = SymbolInterner::new();
        let mut class = test_class(&interner);
        assert!(!class.has_finalizer(&interner));

        class.add_method(MethodDefinition::new(
            interner.method(class.ty, "finalize", &[], Type::VOID),
            MethodAccessFlags::PROTECTED,
        ));
        assert!(class.has_finalizer(&interner));
    }
}
