//! Content-addressed symbol pool.
//!
//! The [`SymbolInterner`] hands out small `Copy` handles for every type, field
//! reference, and method reference the pipeline touches. Handle equality is
//! identity equality; two independently interned references to the same symbol
//! always yield the same handle. The pool is shared across worker threads and
//! lives for the whole driver run; it is passed explicitly to every pass that
//! needs it, never held in ambient state.
//!
//! # Architecture
//!
//! Storage is split per symbol kind: a lock-free `SkipMap` from handle to data
//! for reads, plus a `DashMap` from structural key to handle for interning.
//! Handle allocation uses an atomic counter; the `DashMap` entry API makes
//! concurrent interning of the same key race-free. Once the pool is warmed,
//! lookups by handle never take a lock.
//!
//! # Key Components
//!
//! - [`Type`] - Interned reference type handle, identity equality
//! - [`MethodRef`] / [`FieldRef`] - Interned member reference handles
//! - [`MethodSignature`] - Structural (name, parameters, return) triple
//! - [`SymbolInterner`] - The pool itself

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

/// An interned reference type (class, interface, array, or primitive).
///
/// Equality is identity. Types carry no mutable state; the mapping from a
/// `Type` to its definition is carried by the application view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(u32);

impl Type {
    /// The `void` pseudo type.
    pub const VOID: Type = Type(0);
    /// Primitive `boolean`.
    pub const BOOLEAN: Type = Type(1);
    /// Primitive `byte`.
    pub const BYTE: Type = Type(2);
    /// Primitive `short`.
    pub const SHORT: Type = Type(3);
    /// Primitive `char`.
    pub const CHAR: Type = Type(4);
    /// Primitive `int`.
    pub const INT: Type = Type(5);
    /// Primitive `long`.
    pub const LONG: Type = Type(6);
    /// Primitive `float`.
    pub const FLOAT: Type = Type(7);
    /// Primitive `double`.
    pub const DOUBLE: Type = Type(8);
    /// The root object type `Ljava/lang/Object;`.
    pub const OBJECT: Type = Type(9);
    /// `Ljava/lang/String;`.
    pub const STRING: Type = Type(10);
    /// `Ljava/lang/Enum;`.
    pub const ENUM: Type = Type(11);

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is a primitive type (including `void`).
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        self.0 <= 8
    }
}

/// An interned method reference: a [`MethodSignature`] bound to a holder [`Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef(u32);

impl MethodRef {
    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// An interned field reference: (holder [`Type`], name, field [`Type`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef(u32);

impl FieldRef {
    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A method signature: name, parameter type sequence, return type.
///
/// Equality is structural, unlike the identity equality of the interned
/// reference handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Method name (`<init>` and `<clinit>` for initializers).
    pub name: Arc<str>,
    /// Parameter types, excluding any receiver.
    pub params: Arc<[Type]>,
    /// Return type (`Type::VOID` for `void`).
    pub return_type: Type,
}

/// Resolved data behind a [`MethodRef`] handle.
#[derive(Debug, Clone)]
pub struct MethodData {
    /// Holder type of the reference.
    pub holder: Type,
    /// Method name.
    pub name: Arc<str>,
    /// Parameter types, excluding any receiver.
    pub params: Arc<[Type]>,
    /// Return type.
    pub return_type: Type,
}

impl MethodData {
    /// Returns the structural signature of this reference.
    #[must_use]
    pub fn signature(&self) -> MethodSignature {
        MethodSignature {
            name: self.name.clone(),
            params: self.params.clone(),
            return_type: self.return_type,
        }
    }

    /// Returns `true` if this references an instance initializer.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        &*self.name == "<init>"
    }

    /// Returns `true` if this references a class initializer.
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        &*self.name == "<clinit>"
    }
}

/// Resolved data behind a [`FieldRef`] handle.
#[derive(Debug, Clone)]
pub struct FieldData {
    /// Holder type of the reference.
    pub holder: Type,
    /// Field name.
    pub name: Arc<str>,
    /// Declared field type.
    pub field_type: Type,
}

/// The shared, content-addressed pool of types, fields, and methods.
///
/// The interner is created once per driver run, wrapped in an `Arc`, and
/// passed to every pass. Primitive types, the root object type, `String`,
/// and `Enum` are pre-interned with fixed handles.
///
/// # Thread Safety
///
/// All operations take `&self`; interning is guarded per-shard by the lookup
/// maps, and handle reads are lock-free.
pub struct SymbolInterner {
    types: SkipMap<u32, Arc<str>>,
    type_ids: DashMap<Arc<str>, Type>,
    next_type: AtomicU32,

    methods: SkipMap<u32, Arc<MethodData>>,
    method_ids: DashMap<(Type, MethodSignature), MethodRef>,
    next_method: AtomicU32,

    fields: SkipMap<u32, Arc<FieldData>>,
    field_ids: DashMap<(Type, Arc<str>, Type), FieldRef>,
    next_field: AtomicU32,
}

impl Default for SymbolInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolInterner {
    /// Creates a new pool with the well-known types pre-interned.
    #[must_use]
    pub fn new() -> Self {
        let interner = Self {
            types: SkipMap::new(),
            type_ids: DashMap::new(),
            next_type: AtomicU32::new(0),
            methods: SkipMap::new(),
            method_ids: DashMap::new(),
            next_method: AtomicU32::new(0),
            fields: SkipMap::new(),
            field_ids: DashMap::new(),
            next_field: AtomicU32::new(0),
        };

        for descriptor in [
            "V",
            "Z",
            "B",
            "S",
            "C",
            "I",
            "J",
            "F",
            "D",
            "Ljava/lang/Object;",
            "Ljava/lang/String;",
            "Ljava/lang/Enum;",
        ] {
            interner.type_of(descriptor);
        }
        debug_assert_eq!(interner.type_of("I"), Type::INT);
        debug_assert_eq!(interner.type_of("Ljava/lang/Object;"), Type::OBJECT);

        interner
    }

    /// Interns a type by its descriptor and returns its handle.
    ///
    /// Re-interning the same descriptor always yields the same handle.
    pub fn type_of(&self, descriptor: &str) -> Type {
        if let Some(existing) = self.type_ids.get(descriptor) {
            return *existing;
        }

        let key: Arc<str> = Arc::from(descriptor);
        *self.type_ids.entry(key.clone()).or_insert_with(|| {
            let id = self.next_type.fetch_add(1, Ordering::Relaxed);
            self.types.insert(id, key);
            Type(id)
        })
    }

    /// Looks up a type handle without interning.
    #[must_use]
    pub fn try_type_of(&self, descriptor: &str) -> Option<Type> {
        self.type_ids.get(descriptor).map(|entry| *entry)
    }

    /// Returns the descriptor of an interned type.
    #[must_use]
    pub fn type_descriptor(&self, ty: Type) -> Arc<str> {
        self.types
            .get(&ty.0)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Arc::from("<invalid>"))
    }

    /// Interns a method reference and returns its handle.
    pub fn method(&self, holder: Type, name: &str, params: &[Type], return_type: Type) -> MethodRef {
        let signature = MethodSignature {
            name: Arc::from(name),
            params: Arc::from(params),
            return_type,
        };
        self.method_of(holder, signature)
    }

    /// Interns a method reference from a structural signature.
    pub fn method_of(&self, holder: Type, signature: MethodSignature) -> MethodRef {
        if let Some(existing) = self.method_ids.get(&(holder, signature.clone())) {
            return *existing;
        }

        let data = Arc::new(MethodData {
            holder,
            name: signature.name.clone(),
            params: signature.params.clone(),
            return_type: signature.return_type,
        });
        *self
            .method_ids
            .entry((holder, signature))
            .or_insert_with(|| {
                let id = self.next_method.fetch_add(1, Ordering::Relaxed);
                self.methods.insert(id, data);
                MethodRef(id)
            })
    }

    /// Returns the data behind a method reference handle.
    #[must_use]
    pub fn method_data(&self, reference: MethodRef) -> Arc<MethodData> {
        self.methods
            .get(&reference.0)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| {
                Arc::new(MethodData {
                    holder: Type::OBJECT,
                    name: Arc::from("<invalid>"),
                    params: Arc::from(Vec::new()),
                    return_type: Type::VOID,
                })
            })
    }

    /// Re-interns a method reference onto a different holder.
    pub fn method_with_holder(&self, reference: MethodRef, holder: Type) -> MethodRef {
        let data = self.method_data(reference);
        self.method_of(holder, data.signature())
    }

    /// Re-interns a method reference under a different name.
    pub fn method_with_name(&self, reference: MethodRef, name: &str) -> MethodRef {
        let data = self.method_data(reference);
        self.method(data.holder, name, &data.params, data.return_type)
    }

    /// Interns a field reference and returns its handle.
    pub fn field(&self, holder: Type, name: &str, field_type: Type) -> FieldRef {
        let name: Arc<str> = Arc::from(name);
        if let Some(existing) = self.field_ids.get(&(holder, name.clone(), field_type)) {
            return *existing;
        }

        let data = Arc::new(FieldData {
            holder,
            name: name.clone(),
            field_type,
        });
        *self
            .field_ids
            .entry((holder, name, field_type))
            .or_insert_with(|| {
                let id = self.next_field.fetch_add(1, Ordering::Relaxed);
                self.fields.insert(id, data);
                FieldRef(id)
            })
    }

    /// Returns the data behind a field reference handle.
    #[must_use]
    pub fn field_data(&self, reference: FieldRef) -> Arc<FieldData> {
        self.fields
            .get(&reference.0)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| {
                Arc::new(FieldData {
                    holder: Type::OBJECT,
                    name: Arc::from("<invalid>"),
                    field_type: Type::OBJECT,
                })
            })
    }

    /// Re-interns a field reference onto a different holder.
    pub fn field_with_holder(&self, reference: FieldRef, holder: Type) -> FieldRef {
        let data = self.field_data(reference);
        self.field(holder, &data.name, data.field_type)
    }

    /// The `Ljava/lang/Object;-><init>()V` reference.
    pub fn object_constructor(&self) -> MethodRef {
        self.method(Type::OBJECT, "<init>", &[], Type::VOID)
    }

    /// Renders a method reference for diagnostics: `Lholder;->name(params)ret`.
    #[must_use]
    pub fn format_method(&self, reference: MethodRef) -> String {
        let data = self.method_data(reference);
        let mut out = format!("{}->{}(", self.type_descriptor(data.holder), data.name);
        for param in data.params.iter() {
            out.push_str(&self.type_descriptor(*param));
        }
        out.push(')');
        out.push_str(&self.type_descriptor(data.return_type));
        out
    }

    /// Renders a field reference for diagnostics: `Lholder;->name:Ltype;`.
    #[must_use]
    pub fn format_field(&self, reference: FieldRef) -> String {
        let data = self.field_data(reference);
        format!(
            "{}->{}:{}",
            self.type_descriptor(data.holder),
            data.name,
            self.type_descriptor(data.field_type)
        )
    }

    /// Compares two types by descriptor, the fixed tie-break order of the pipeline.
    #[must_use]
    pub fn compare_types(&self, a: Type, b: Type) -> std::cmp::Ordering {
        self.type_descriptor(a).cmp(&self.type_descriptor(b))
    }
}

impl std::fmt::Debug for SymbolInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolInterner")
            .field("types", &self.next_type.load(Ordering::Relaxed))
            .field("methods", &self.next_method.load(Ordering::Relaxed))
            .field("fields", &self.next_field.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_types() {
        let interner = SymbolInterner::new();
        assert_eq!(interner.type_of("V"), Type::VOID);
        assert_eq!(interner.type_of("I"), Type::INT);
        assert_eq!(interner.type_of("Ljava/lang/Object;"), Type::OBJECT);
        assert_eq!(interner.type_of("Ljava/lang/String;"), Type::STRING);
        assert!(Type::INT.is_primitive());
        assert!(!Type::OBJECT.is_primitive());
    }

    #[test]
    fn test_type_identity() {
        let interner = SymbolInterner::new();
        let a = interner.type_of("Lcom/example/Foo;");
        let b = interner.type_of("Lcom/example/Foo;");
        let c = interner.type_of("Lcom/example/Bar;");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(&*interner.type_descriptor(a), "Lcom/example/Foo;");
    }

    #[test]
    fn test_method_identity() {
        let interner = SymbolInterner::new();
        let holder = interner.type_of("Lcom/example/Foo;");
        let a = interner.method(holder, "bar", &[Type::INT, Type::INT], Type::VOID);
        let b = interner.method(holder, "bar", &[Type::INT, Type::INT], Type::VOID);
        let c = interner.method(holder, "bar", &[Type::INT], Type::VOID);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let data = interner.method_data(a);
        assert_eq!(&*data.name, "bar");
        assert_eq!(data.params.len(), 2);
        assert_eq!(data.return_type, Type::VOID);
    }

    #[test]
    fn test_method_rehoming() {
        let interner = SymbolInterner::new();
        let foo = interner.type_of("LFoo;");
        let bar = interner.type_of("LBar;");
        let original = interner.method(foo, "m", &[], Type::INT);
        let moved = interner.method_with_holder(original, bar);
        assert_ne!(original, moved);
        assert_eq!(interner.method_data(moved).holder, bar);
        assert_eq!(interner.method_data(moved).signature(), interner.method_data(original).signature());
    }

    #[test]
    fn test_field_identity() {
        let interner = SymbolInterner::new();
        let holder = interner.type_of("LFoo;");
        let a = interner.field(holder, "x", Type::INT);
        let b = interner.field(holder, "x", Type::INT);
        let c = interner.field(holder, "x", Type::LONG);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.format_field(a), "LFoo;->x:I");
    }

    #[test]
    fn test_format_method() {
        let interner = SymbolInterner::new();
        let holder = interner.type_of("Lcom/example/Foo;");
        let method = interner.method(holder, "bar", &[Type::INT, Type::INT], Type::VOID);
        assert_eq!(interner.format_method(method), "Lcom/example/Foo;->bar(II)V");
    }

    #[test]
    fn test_concurrent_interning() {
        let interner = Arc::new(SymbolInterner::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let shared = Arc::clone(&interner);
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .map(|i| shared.type_of(&format!("Lcom/example/C{i};")))
                    .collect::<Vec<_>>()
            }));
        }
        let results: Vec<Vec<Type>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for window in results.windows(2) {
            assert_eq!(window[0], window[1]);
        }
    }
}
