//! The residual rename mapping.
//!
//! After the last lens-producing pass, the composition of every lens still in
//! effect is rendered into the standard line-oriented proguard mapping format
//! for the writer collaborator and for retracing:
//!
//! ```text
//! com.example.Original -> a.a:
//!     int value -> a
//!     void run(int,int) -> b
//! ```
//!
//! The mapping also answers inverse queries: given a post-optimization class
//! or member name, which pre-optimization symbol produced it. Frames
//! synthesized by inlining have no entry of their own and retrace to the
//! caller frame.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::{
    graph::LensStack,
    metadata::{descriptor, DexApplication, FieldRef, MethodRef, SymbolInterner, Type},
};

/// Snapshot of the program's symbols taken before any optimization pass.
#[derive(Debug, Default)]
pub struct OriginalProgram {
    /// Program class types.
    pub types: Vec<Type>,
    /// Program method references.
    pub methods: Vec<MethodRef>,
    /// Program field references.
    pub fields: Vec<FieldRef>,
}

impl OriginalProgram {
    /// Records every program symbol of the untouched application.
    #[must_use]
    pub fn snapshot(app: &DexApplication) -> Self {
        let mut snapshot = OriginalProgram::default();
        for class in app.classes_with_deterministic_order() {
            snapshot.types.push(class.ty);
            for method in class.methods() {
                snapshot.methods.push(method.reference);
            }
            for field in class.fields() {
                snapshot.fields.push(field.reference);
            }
        }
        snapshot
    }
}

#[derive(Debug, Default)]
struct ClassMapping {
    original: String,
    obfuscated: String,
    fields: Vec<(String, String, String)>,
    methods: Vec<(String, String, String, String)>,
}

/// The composed original-to-final rename map.
#[derive(Debug, Default)]
pub struct RenameMapping {
    classes: Vec<ClassMapping>,
    class_inverse: FxHashMap<String, String>,
    method_inverse: FxHashMap<(String, String), Vec<String>>,
}

impl RenameMapping {
    /// Builds the mapping by folding every original symbol through the lens
    /// stack.
    #[must_use]
    pub fn build(
        original: &OriginalProgram,
        stack: &LensStack,
        interner: &SymbolInterner,
    ) -> Self {
        let mut per_class: FxHashMap<Type, ClassMapping> = FxHashMap::default();
        let mut order: Vec<Type> = Vec::new();

        for &ty in &original.types {
            let final_type = stack.map_type(ty);
            let entry = ClassMapping {
                original: descriptor::binary_name(&interner.type_descriptor(ty)),
                obfuscated: descriptor::binary_name(&interner.type_descriptor(final_type)),
                fields: Vec::new(),
                methods: Vec::new(),
            };
            per_class.insert(ty, entry);
            order.push(ty);
        }

        for &field in &original.fields {
            let data = interner.field_data(field);
            let final_field = stack.map_field(field, interner);
            let final_data = interner.field_data(final_field);
            if let Some(class) = per_class.get_mut(&data.holder) {
                class.fields.push((
                    descriptor::java_name(&interner.type_descriptor(data.field_type)),
                    data.name.to_string(),
                    final_data.name.to_string(),
                ));
            }
        }

        for &method in &original.methods {
            let data = interner.method_data(method);
            let lookup = stack.map_method(method, interner);
            let final_data = interner.method_data(lookup.reference);
            if let Some(class) = per_class.get_mut(&data.holder) {
                let params = data
                    .params
                    .iter()
                    .map(|&p| descriptor::java_name(&interner.type_descriptor(p)))
                    .collect::<Vec<_>>()
                    .join(",");
                class.methods.push((
                    descriptor::java_name(&interner.type_descriptor(data.return_type)),
                    data.name.to_string(),
                    params,
                    final_data.name.to_string(),
                ));
            }
        }

        let mut mapping = RenameMapping::default();
        for ty in order {
            let Some(class) = per_class.remove(&ty) else {
                continue;
            };
            mapping
                .class_inverse
                .insert(class.obfuscated.clone(), class.original.clone());
            for (_, original_name, _, obfuscated_name) in &class.methods {
                mapping
                    .method_inverse
                    .entry((class.obfuscated.clone(), obfuscated_name.clone()))
                    .or_default()
                    .push(original_name.clone());
            }
            mapping.classes.push(class);
        }
        mapping
    }

    /// Renders the proguard-style mapping text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for class in &self.classes {
            let _ = writeln!(out, "{} -> {}:", class.original, class.obfuscated);
            for (field_type, original, obfuscated) in &class.fields {
                let _ = writeln!(out, "    {field_type} {original} -> {obfuscated}");
            }
            for (return_type, original, params, obfuscated) in &class.methods {
                let _ = writeln!(out, "    {return_type} {original}({params}) -> {obfuscated}");
            }
        }
        out
    }

    /// Inverse class lookup: post-optimization binary name to original.
    #[must_use]
    pub fn retrace_class(&self, obfuscated: &str) -> Option<&str> {
        self.class_inverse.get(obfuscated).map(String::as_str)
    }

    /// Inverse frame lookup: post-optimization class and method name to the
    /// original method-name candidates.
    ///
    /// An unknown method on a known class retraces to the class alone; frames
    /// synthesized by inlining map to the caller frame, which is the entry
    /// the caller's own retrace produces.
    #[must_use]
    pub fn retrace_frame(&self, obfuscated_class: &str, obfuscated_method: &str) -> Vec<&str> {
        self.method_inverse
            .get(&(obfuscated_class.to_string(), obfuscated_method.to_string()))
            .map(|candidates| candidates.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns `true` when no class changed its name.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.classes
            .iter()
            .all(|class| class.original == class.obfuscated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::GraphLens, testutil::TestProgramBuilder};

    #[test]
    fn test_identity_mapping() {
        let mut builder = TestProgramBuilder::new();
        builder.simple_class("Lcom/example/Foo;");
        let (app, interner) = builder.build();

        let original = OriginalProgram::snapshot(&app);
        let stack = LensStack::new();
        let mapping = RenameMapping::build(&original, &stack, &interner);

        assert!(mapping.is_identity());
        assert!(mapping.render().contains("com.example.Foo -> com.example.Foo:"));
    }

    #[test]
    fn test_round_trip_through_rename() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let foo = builder.simple_class("Lcom/example/Foo;");
        let run = interner.method(foo, "run", &[crate::metadata::Type::INT], crate::metadata::Type::VOID);
        builder.class_mut(foo).unwrap().add_method(
            crate::metadata::MethodDefinition::new(
                run,
                crate::metadata::MethodAccessFlags::PUBLIC,
            ),
        );
        let (app, interner) = builder.build();

        let original = OriginalProgram::snapshot(&app);
        let renamed_type = interner.type_of("Lcom/example/a;");
        let renamed_method = interner.method(
            renamed_type,
            "b",
            &[crate::metadata::Type::INT],
            crate::metadata::Type::VOID,
        );
        let mut lens = GraphLens::builder("minification");
        lens.map_type(foo, renamed_type);
        lens.move_method(run, renamed_method);
        let mut stack = LensStack::new();
        stack.push(lens.build(&interner).unwrap(), &interner).unwrap();

        let mapping = RenameMapping::build(&original, &stack, &interner);
        let rendered = mapping.render();
        assert!(rendered.contains("com.example.Foo -> com.example.a:"));
        assert!(rendered.contains("    void run(int) -> b"));

        // Rename then retrace round trips to the original symbol.
        assert_eq!(mapping.retrace_class("com.example.a"), Some("com.example.Foo"));
        assert_eq!(mapping.retrace_frame("com.example.a", "b"), vec!["run"]);
        // Frames with no entry (synthesized by inlining) yield no candidates.
        assert!(mapping.retrace_frame("com.example.a", "zz").is_empty());
    }

    #[test]
    fn test_snapshot_covers_members() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let foo = builder.simple_class("LFoo;");
        builder.class_mut(foo).unwrap().add_field(
            crate::metadata::FieldDefinition::new(
                interner.field(foo, "x", crate::metadata::Type::INT),
                crate::metadata::FieldAccessFlags::PRIVATE,
            ),
        );
        let (app, interner) = builder.build();

        let snapshot = OriginalProgram::snapshot(&app);
        assert_eq!(snapshot.types.len(), 1);
        assert_eq!(snapshot.fields.len(), 1);
    }
}
