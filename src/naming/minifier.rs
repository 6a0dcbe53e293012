//! Minification: deterministic shortest-name renaming.
//!
//! Classes keep their package and receive the shortest free simple name in
//! descriptor order (`a`, `b`, ..., `z`, `aa`, ...). Fields and direct
//! methods rename per class; virtual methods rename only when doing so cannot
//! affect dispatch (leaf class, signature declared nowhere above). Pinned
//! symbols and initializers keep their names. The pass only emits a lens; the
//! application rewriter applies it.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::GraphLens,
    metadata::{
        descriptor, ClassHierarchy, DexApplication, MethodAccessFlags, SymbolInterner, Type,
    },
    shaking::KeepOracle,
    Result,
};

/// The minification pass.
pub struct Minifier {
    interner: Arc<SymbolInterner>,
    oracle: Arc<KeepOracle>,
}

impl Minifier {
    /// Creates the pass.
    #[must_use]
    pub fn new(interner: Arc<SymbolInterner>, oracle: Arc<KeepOracle>) -> Self {
        Self { interner, oracle }
    }

    /// Runs the pass; returns the final lens, or `None` when nothing renames.
    ///
    /// # Errors
    ///
    /// Only lens construction can fail.
    pub fn run(&self, app: &DexApplication) -> Result<Option<GraphLens>> {
        let interner = &self.interner;
        let hierarchy = ClassHierarchy::build(app, interner);
        let mut builder = GraphLens::builder("minification");
        let mut changed = false;

        // Phase 1: assign class names per package, in descriptor order.
        let mut type_map: FxHashMap<Type, Type> = FxHashMap::default();
        let mut taken_per_package: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();

        // Names of classes that keep their identity are reserved up front.
        for class in app.classes_with_deterministic_order() {
            if !self.oracle.can_rename_class(class.ty, interner) {
                let desc = interner.type_descriptor(class.ty);
                taken_per_package
                    .entry(descriptor::package_prefix(&desc).to_string())
                    .or_default()
                    .insert(descriptor::simple_name(&desc).to_string());
            }
        }

        for class in app.classes_with_deterministic_order() {
            if !self.oracle.can_rename_class(class.ty, interner) {
                continue;
            }
            let desc = interner.type_descriptor(class.ty);
            let package = descriptor::package_prefix(&desc).to_string();
            let taken = taken_per_package.entry(package.clone()).or_default();

            let mut index = 0usize;
            let short = loop {
                let candidate = short_name(index);
                if !taken.contains(&candidate) {
                    break candidate;
                }
                index += 1;
            };
            taken.insert(short.clone());

            let new_descriptor = format!("{package}{short};");
            let renamed = interner.type_of(&new_descriptor);
            if renamed != class.ty {
                type_map.insert(class.ty, renamed);
                builder.map_type(class.ty, renamed);
                changed = true;
            }
        }

        let map_type = |ty: Type| type_map.get(&ty).copied().unwrap_or(ty);

        // Phase 2: member renames, holders and signature types already mapped.
        for class in app.classes_with_deterministic_order() {
            let new_holder = map_type(class.ty);

            let mut taken_fields: FxHashSet<String> = FxHashSet::default();
            let mut taken_methods: FxHashSet<String> = FxHashSet::default();
            for field in class.fields() {
                if !self.oracle.can_rename_field(field.reference, interner) {
                    taken_fields.insert(interner.field_data(field.reference).name.to_string());
                }
            }
            for method in class.methods() {
                if !self.can_rename_method(app, &hierarchy, class.ty, method, interner) {
                    taken_methods.insert(interner.method_data(method.reference).name.to_string());
                }
            }

            let mut field_counter = 0usize;
            for field in class.fields() {
                let data = interner.field_data(field.reference);
                if !self.oracle.can_rename_field(field.reference, interner) {
                    continue;
                }
                let short = next_free(&mut field_counter, &taken_fields);
                taken_fields.insert(short.clone());
                let to = interner.field(new_holder, &short, map_type(data.field_type));
                if to != field.reference {
                    builder.move_field(field.reference, to);
                    changed = true;
                }
            }

            let mut method_counter = 0usize;
            for method in class.methods() {
                let data = interner.method_data(method.reference);
                if !self.can_rename_method(app, &hierarchy, class.ty, method, interner) {
                    continue;
                }
                let short = next_free(&mut method_counter, &taken_methods);
                taken_methods.insert(short.clone());
                let params: Vec<Type> = data.params.iter().map(|&p| map_type(p)).collect();
                let to = interner.method(new_holder, &short, &params, map_type(data.return_type));
                if to != method.reference {
                    builder.move_method(method.reference, to);
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(None);
        }
        Ok(Some(builder.build(interner)?))
    }

    /// Renaming a virtual method is only safe when dispatch cannot observe
    /// it: the class is a leaf and no supertype declares the signature.
    fn can_rename_method(
        &self,
        app: &DexApplication,
        hierarchy: &ClassHierarchy,
        holder: Type,
        method: &crate::metadata::MethodDefinition,
        interner: &SymbolInterner,
    ) -> bool {
        if method.is_initializer() || method.access_flags.contains(MethodAccessFlags::NATIVE) {
            return false;
        }
        if !self.oracle.can_rename_method(method.reference, interner) {
            return false;
        }
        if method.is_virtual() {
            if !hierarchy.is_leaf(holder) {
                return false;
            }
            let signature = interner.method_data(method.reference).signature();
            if hierarchy.signature_declared_above(app, holder, &signature, interner) {
                return false;
            }
        }
        true
    }
}

/// Renders the `index`-th shortest identifier: `a`..`z`, `aa`, `ab`, ...
#[must_use]
pub fn short_name(mut index: usize) -> String {
    let mut name = String::new();
    loop {
        name.insert(0, (b'a' + (index % 26) as u8) as char);
        index /= 26;
        if index == 0 {
            break;
        }
        index -= 1;
    }
    name
}

fn next_free(counter: &mut usize, taken: &FxHashSet<String>) -> String {
    loop {
        let candidate = short_name(*counter);
        *counter += 1;
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{FieldAccessFlags, FieldDefinition},
        shaking::KeepRules,
        testutil::TestProgramBuilder,
    };

    #[test]
    fn test_short_name_sequence() {
        assert_eq!(short_name(0), "a");
        assert_eq!(short_name(25), "z");
        assert_eq!(short_name(26), "aa");
        assert_eq!(short_name(27), "ab");
        assert_eq!(short_name(26 + 26 * 26), "aaa");
    }

    #[test]
    fn test_classes_rename_in_descriptor_order() {
        let mut builder = TestProgramBuilder::new();
        builder.simple_class("Lcom/example/First;");
        builder.simple_class("Lcom/example/Second;");
        let (app, interner) = builder.build();

        let oracle = Arc::new(KeepOracle::new(Arc::new(KeepRules::new())));
        let minifier = Minifier::new(interner.clone(), oracle);
        let lens = minifier.run(&app).unwrap().unwrap();

        let first = interner.type_of("Lcom/example/First;");
        let second = interner.type_of("Lcom/example/Second;");
        assert_eq!(&*interner.type_descriptor(lens.map_type(first)), "Lcom/example/a;");
        assert_eq!(&*interner.type_descriptor(lens.map_type(second)), "Lcom/example/b;");
    }

    #[test]
    fn test_pinned_class_keeps_name_and_reserves_it() {
        let mut builder = TestProgramBuilder::new();
        builder.simple_class("Lcom/example/a;");
        builder.simple_class("Lcom/example/Work;");
        let (app, interner) = builder.build();

        let mut rules = KeepRules::new();
        rules.pin_class_with_members("Lcom/example/a;");
        let oracle = Arc::new(KeepOracle::new(Arc::new(rules)));
        let minifier = Minifier::new(interner.clone(), oracle);
        let lens = minifier.run(&app).unwrap().unwrap();

        let pinned = interner.type_of("Lcom/example/a;");
        let work = interner.type_of("Lcom/example/Work;");
        assert_eq!(lens.map_type(pinned), pinned);
        // `a` is reserved by the pinned class; the next free name is `b`.
        assert_eq!(&*interner.type_descriptor(lens.map_type(work)), "Lcom/example/b;");
    }

    #[test]
    fn test_field_rename_lands_on_renamed_holder() {
        let mut builder = TestProgramBuilder::new();
        let interner = builder.interner();
        let c = builder.simple_class("LHolder;");
        let field = interner.field(c, "value", Type::INT);
        builder.class_mut(c).unwrap().add_field(FieldDefinition::new(
            field,
            FieldAccessFlags::PRIVATE,
        ));
        let (app, interner) = builder.build();

        let oracle = Arc::new(KeepOracle::new(Arc::new(KeepRules::new())));
        let minifier = Minifier::new(interner.clone(), oracle);
        let lens = minifier.run(&app).unwrap().unwrap();

        let mapped = lens.map_field(field, &interner);
        let data = interner.field_data(mapped);
        assert_eq!(&*interner.type_descriptor(data.holder), "La;");
        assert_eq!(&*data.name, "a");
    }
}
