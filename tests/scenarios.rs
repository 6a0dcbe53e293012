//! End-to-end pipeline scenarios.
//!
//! Each test assembles a small synthetic application through the public API,
//! runs the full driver, and asserts on the structure of the result: the
//! class inliner flattening wrappers and singletons, the horizontal merger
//! fusing value holders with class-id dispatch, pinning blocking merges,
//! `dontWarn` suppressing missing references, and the rename mapping
//! round-tripping through retrace.

use std::sync::Arc;

use dexlens::prelude::*;
use dexlens::ir::{ConstantValue, Op};

/// Object (with its constructor), String, and Enum as library classes.
fn library(interner: &SymbolInterner) -> Vec<ClassDefinition> {
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
    let enum_class = ClassDefinition::new(
        Type::ENUM,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
        Some(Type::OBJECT),
    );
    vec![object, string, enum_class]
}

fn build_app(
    interner: &Arc<SymbolInterner>,
    classes: Vec<ClassDefinition>,
) -> DexApplication {
    let mut builder = DexApplication::builder(interner.clone());
    for class in library(interner) {
        builder = builder.add_library_class(class);
    }
    for class in classes {
        builder = builder.add_program_class(class);
    }
    builder.build().expect("well-formed test application")
}

/// `class L { final int x; L(int x){this.x=x;} }`
fn wrapper_class(interner: &SymbolInterner, descriptor: &str) -> ClassDefinition {
    let l = interner.type_of(descriptor);
    let mut class = ClassDefinition::new(
        l,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
        Some(Type::OBJECT),
    );
    let x = interner.field(l, "x", Type::INT);
    class.add_field(FieldDefinition::new(
        x,
        FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
    ));

    let mut body = IrBuilder::new();
    let this = body.argument(l);
    let value = body.argument(Type::INT);
    body.invoke(InvokeKind::Direct, interner.object_constructor(), vec![this]);
    body.instance_put(x, this, value);
    body.ret(None);
    class.add_method(
        MethodDefinition::new(
            interner.method(l, "<init>", &[Type::INT], Type::VOID),
            MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR,
        )
        .with_code(body.finish()),
    );
    class
}

/// A value-holder class `class A { int <field>; A(int v){<field>=v;} }`.
fn holder_class(interner: &SymbolInterner, descriptor: &str, field_name: &str) -> ClassDefinition {
    let ty = interner.type_of(descriptor);
    let mut class = ClassDefinition::new(
        ty,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
        Some(Type::OBJECT),
    );
    let field = interner.field(ty, field_name, Type::INT);
    class.add_field(FieldDefinition::new(field, FieldAccessFlags::PUBLIC));

    let mut body = IrBuilder::new();
    let this = body.argument(ty);
    let value = body.argument(Type::INT);
    body.invoke(InvokeKind::Direct, interner.object_constructor(), vec![this]);
    body.instance_put(field, this, value);
    body.ret(None);
    class.add_method(
        MethodDefinition::new(
            interner.method(ty, "<init>", &[Type::INT], Type::VOID),
            MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR,
        )
        .with_code(body.finish()),
    );
    class
}

fn returned_constant(code: &dexlens::ir::IrCode) -> Option<ConstantValue> {
    let returned = code
        .blocks()
        .iter()
        .flat_map(|block| &block.instructions)
        .find_map(|instruction| match &instruction.op {
            Op::Return { value } => *value,
            _ => None,
        })?;
    code.blocks()
        .iter()
        .flat_map(|block| &block.instructions)
        .find(|instruction| instruction.out == Some(returned))
        .and_then(|instruction| match &instruction.op {
            Op::Const(constant) => Some(constant.clone()),
            _ => None,
        })
}

fn no_heap_traffic(code: &dexlens::ir::IrCode) -> bool {
    code.blocks().iter().flat_map(|b| &b.instructions).all(|i| {
        !matches!(
            i.op,
            Op::NewInstance { .. }
                | Op::Invoke { .. }
                | Op::InstanceGet { .. }
                | Op::InstancePut { .. }
                | Op::StaticGet { .. }
                | Op::StaticPut { .. }
        )
    })
}

fn options_without_minification() -> CompilerOptions {
    CompilerOptions {
        minification: false,
        ..CompilerOptions::default()
    }
}

// Scenario A: class inlining of a wrapper. `C.m()` returns `new L(42).x`;
// after optimization the body is `return 42` and L is gone.
#[test]
fn scenario_a_wrapper_is_class_inlined() {
    let interner = Arc::new(SymbolInterner::new());
    let l = wrapper_class(&interner, "LL;");
    let l_type = l.ty;

    let c = interner.type_of("LC;");
    let mut c_class = ClassDefinition::new(c, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let m = interner.method(c, "m", &[], Type::INT);
    {
        let mut body = IrBuilder::new();
        let forty_two = body.const_int(42);
        let instance = body.new_instance(l_type);
        body.invoke(
            InvokeKind::Direct,
            interner.method(l_type, "<init>", &[Type::INT], Type::VOID),
            vec![instance, forty_two],
        );
        let x = interner.field(l_type, "x", Type::INT);
        let read = body.instance_get(x, instance, &interner);
        body.ret(Some(read));
        c_class.add_method(
            MethodDefinition::new(m, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
                .with_code(body.finish()),
        );
    }

    let app = build_app(&interner, vec![l, c_class]);
    let mut rules = KeepRules::new();
    rules.pin_class_with_members("LC;");

    let result = Driver::new(options_without_minification())
        .run(app, rules)
        .expect("compilation succeeds");

    // C.m collapsed to `return 42`.
    let c_def = result.application.program_definition_for(c).unwrap();
    let code = c_def.method(m).unwrap().code.as_ref().unwrap();
    assert_eq!(returned_constant(code), Some(ConstantValue::Int(42)));
    assert!(no_heap_traffic(code));

    // L was removed outright.
    assert!(result.application.program_definition_for(l_type).is_none());
}

// Scenario B: singleton via static final. `C.m()` returns `F.I.g()`; after
// optimization the body is `return 7` and F is gone.
#[test]
fn scenario_b_singleton_is_class_inlined() {
    let interner = Arc::new(SymbolInterner::new());

    let f = interner.type_of("LF;");
    let mut f_class = ClassDefinition::new(
        f,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
        Some(Type::OBJECT),
    );
    let instance_field = interner.field(f, "I", f);
    f_class.add_field(FieldDefinition::new(
        instance_field,
        FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
    ));
    let ctor = interner.method(f, "<init>", &[], Type::VOID);
    {
        let mut body = IrBuilder::new();
        let this = body.argument(f);
        body.invoke(InvokeKind::Direct, interner.object_constructor(), vec![this]);
        body.ret(None);
        f_class.add_method(
            MethodDefinition::new(
                ctor,
                MethodAccessFlags::PUBLIC | MethodAccessFlags::CONSTRUCTOR,
            )
            .with_code(body.finish()),
        );
    }
    {
        let clinit = interner.method(f, "<clinit>", &[], Type::VOID);
        let mut body = IrBuilder::new();
        let instance = body.new_instance(f);
        body.invoke(InvokeKind::Direct, ctor, vec![instance]);
        body.static_put(instance_field, instance);
        body.ret(None);
        f_class.add_method(
            MethodDefinition::new(
                clinit,
                MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR,
            )
            .with_code(body.finish()),
        );
    }
    let g = interner.method(f, "g", &[], Type::INT);
    {
        let mut body = IrBuilder::new();
        let _this = body.argument(f);
        let seven = body.const_int(7);
        body.ret(Some(seven));
        f_class
            .add_method(MethodDefinition::new(g, MethodAccessFlags::PUBLIC).with_code(body.finish()));
    }

    let c = interner.type_of("LC;");
    let mut c_class = ClassDefinition::new(c, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let m = interner.method(c, "m", &[], Type::INT);
    {
        let mut body = IrBuilder::new();
        let singleton = body.static_get(instance_field, &interner);
        let result = body.invoke_value(InvokeKind::Virtual, g, vec![singleton], &interner);
        body.ret(Some(result));
        c_class.add_method(
            MethodDefinition::new(m, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
                .with_code(body.finish()),
        );
    }

    let app = build_app(&interner, vec![f_class, c_class]);
    let mut rules = KeepRules::new();
    rules.pin_class_with_members("LC;");

    let result = Driver::new(options_without_minification())
        .run(app, rules)
        .expect("compilation succeeds");

    let c_def = result.application.program_definition_for(c).unwrap();
    let code = c_def.method(m).unwrap().code.as_ref().unwrap();
    assert_eq!(returned_constant(code), Some(ConstantValue::Int(7)));
    assert!(no_heap_traffic(code));
    assert!(result.application.program_definition_for(f).is_none());
}

fn merge_scenario_input(interner: &Arc<SymbolInterner>) -> (DexApplication, KeepRules) {
    let a = holder_class(interner, "LA;", "x");
    let b = holder_class(interner, "LB;", "y");
    let a_type = a.ty;
    let b_type = b.ty;

    let main = interner.type_of("LMain;");
    let mut main_class = ClassDefinition::new(main, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let entry = interner.method(main, "main", &[], Type::VOID);
    {
        let mut body = IrBuilder::new();
        let one = body.const_int(1);
        let first = body.new_instance(a_type);
        body.invoke(
            InvokeKind::Direct,
            interner.method(a_type, "<init>", &[Type::INT], Type::VOID),
            vec![first, one],
        );
        let two = body.const_int(2);
        let second = body.new_instance(b_type);
        body.invoke(
            InvokeKind::Direct,
            interner.method(b_type, "<init>", &[Type::INT], Type::VOID),
            vec![second, two],
        );
        body.ret(None);
        main_class.add_method(
            MethodDefinition::new(entry, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
                .with_code(body.finish()),
        );
    }

    let app = build_app(interner, vec![a, b, main_class]);
    let mut rules = KeepRules::new();
    rules.pin_class_with_members("LMain;");
    (app, rules)
}

/// Collects, per constructor invoke in `code`, the trailing constant argument.
fn trailing_class_ids(code: &dexlens::ir::IrCode, interner: &SymbolInterner) -> Vec<i32> {
    let mut ids = Vec::new();
    for block in code.blocks() {
        for instruction in &block.instructions {
            let Op::Invoke { method, args, .. } = &instruction.op else {
                continue;
            };
            if !interner.method_data(*method).is_constructor() {
                continue;
            }
            let last = args.last().copied().unwrap();
            let constant = code
                .blocks()
                .iter()
                .flat_map(|b| &b.instructions)
                .find(|i| i.out == Some(last))
                .unwrap();
            if let Op::Const(ConstantValue::Int(id)) = constant.op {
                ids.push(id);
            }
        }
    }
    ids
}

// Scenario C: horizontal merge of two value holders. A and B fuse into one
// class holding both fields, with constructors dispatched by class id.
#[test]
fn scenario_c_value_holders_merge_horizontally() {
    let interner = Arc::new(SymbolInterner::new());
    let (app, rules) = merge_scenario_input(&interner);

    let options = CompilerOptions {
        minification: false,
        enable_class_inlining: false,
        ..CompilerOptions::default()
    };
    let result = Driver::new(options).run(app, rules).expect("compilation succeeds");

    let a = interner.type_of("LA;");
    let b = interner.type_of("LB;");

    // The target (lexicographically smallest) absorbed the source.
    let target = result.application.program_definition_for(a).unwrap();
    assert!(result.application.program_definition_for(b).is_none());

    // Union of instance fields plus the class-id slot.
    let field_names: Vec<String> = target
        .instance_fields()
        .map(|field| interner.field_data(field.reference).name.to_string())
        .collect();
    assert!(field_names.contains(&"x".to_string()));
    assert!(field_names.contains(&"y".to_string()));
    assert_eq!(field_names.len(), 3, "expected x, y, and the class-id slot");

    // Main instantiates the target twice, passing class ids 0 and 1.
    let main = interner.type_of("LMain;");
    let entry = interner.method(main, "main", &[], Type::VOID);
    let code = result
        .application
        .program_definition_for(main)
        .unwrap()
        .method(entry)
        .unwrap()
        .code
        .as_ref()
        .unwrap();
    for block in code.blocks() {
        for instruction in &block.instructions {
            if let Op::NewInstance { class } = instruction.op {
                assert_eq!(class, a, "all allocations use the merge target");
            }
        }
    }
    assert_eq!(trailing_class_ids(code, &interner), vec![0, 1]);
    assert!(code.is_consistent_ssa());
}

// Scenario E: a pinned class blocks merging. Same input as scenario C with A
// pinned; nothing merges and nothing renames.
#[test]
fn scenario_e_pinned_class_blocks_merging() {
    let interner = Arc::new(SymbolInterner::new());
    let (app, mut rules) = merge_scenario_input(&interner);
    rules.pin_class_with_members("LA;");

    let options = CompilerOptions {
        minification: false,
        enable_class_inlining: false,
        ..CompilerOptions::default()
    };
    let result = Driver::new(options).run(app, rules).expect("compilation succeeds");

    let a = interner.type_of("LA;");
    let b = interner.type_of("LB;");
    let a_def = result.application.program_definition_for(a).unwrap();
    let b_def = result.application.program_definition_for(b).unwrap();
    assert_eq!(a_def.instance_fields().count(), 1);
    assert_eq!(b_def.instance_fields().count(), 1);
    assert!(result.mapping.is_identity());
}

// Scenario D: lens composition with a prototype change. A rename lens below
// an unboxing-style lens composes into the final reference plus the single
// prototype change.
#[test]
fn scenario_d_lens_composition_with_prototype_change() {
    let interner = SymbolInterner::new();
    let e = interner.type_of("LE;");
    let x = interner.type_of("LX;");
    let foo = interner.method(x, "foo", &[e, Type::INT], Type::VOID);
    let bar = interner.method(x, "bar", &[e, Type::INT], Type::VOID);
    let bar_unboxed = interner.method(x, "bar", &[Type::INT, Type::INT], Type::VOID);

    let mut rename = GraphLens::builder("minification");
    rename.move_method(foo, bar);

    let changes = PrototypeChanges::none().with_argument_info(
        1,
        dexlens::graph::ArgumentInfo::Rewritten(dexlens::graph::RewrittenTypeInfo {
            old_type: e,
            new_type: Type::INT,
        }),
    );
    let mut unboxing = GraphLens::builder("enum unboxing");
    unboxing.move_method_with_prototype(bar, bar_unboxed, changes.clone());

    let mut stack = LensStack::new();
    stack
        .push(rename.build(&interner).unwrap(), &interner)
        .unwrap();
    stack
        .push(unboxing.build(&interner).unwrap(), &interner)
        .unwrap();

    let lookup = stack.map_method(foo, &interner);
    assert_eq!(lookup.reference, bar_unboxed);
    assert_eq!(lookup.prototype_changes, changes);
}

// Scenario F: unresolved reference with dontWarn. The reference stays in the
// output and the diagnostic sink receives nothing.
#[test]
fn scenario_f_dont_warn_suppresses_missing_reference() {
    let interner = Arc::new(SymbolInterner::new());
    let missing = interner.type_of("LMissing;");
    let missing_method = interner.method(missing, "m", &[], Type::VOID);

    let main = interner.type_of("LMain;");
    let mut main_class = ClassDefinition::new(main, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let entry = interner.method(main, "main", &[], Type::VOID);
    {
        let mut body = IrBuilder::new();
        body.invoke(InvokeKind::Static, missing_method, vec![]);
        body.ret(None);
        main_class.add_method(
            MethodDefinition::new(entry, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
                .with_code(body.finish()),
        );
    }

    let app = build_app(&interner, vec![main_class]);
    let mut rules = KeepRules::new();
    rules.pin_class_with_members("LMain;");
    rules.add_dont_warn("LMissing;");

    let result = Driver::new(options_without_minification())
        .run(app, rules)
        .expect("compilation succeeds with dontWarn");

    assert_eq!(result.diagnostics.count(), 0);

    // The dangling reference is still present in the output.
    let code = result
        .application
        .program_definition_for(main)
        .unwrap()
        .method(entry)
        .unwrap()
        .code
        .as_ref()
        .unwrap();
    let dangling = code
        .blocks()
        .iter()
        .flat_map(|b| &b.instructions)
        .any(|i| i.invoked_method() == Some(missing_method));
    assert!(dangling);
}

// Without dontWarn the same input aborts with an error diagnostic.
#[test]
fn missing_reference_without_dont_warn_fails() {
    let interner = Arc::new(SymbolInterner::new());
    let missing = interner.type_of("LMissing;");
    let missing_method = interner.method(missing, "m", &[], Type::VOID);

    let main = interner.type_of("LMain;");
    let mut main_class = ClassDefinition::new(main, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let entry = interner.method(main, "main", &[], Type::VOID);
    let mut body = IrBuilder::new();
    body.invoke(InvokeKind::Static, missing_method, vec![]);
    body.ret(None);
    main_class.add_method(
        MethodDefinition::new(entry, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
            .with_code(body.finish()),
    );

    let app = build_app(&interner, vec![main_class]);
    let mut rules = KeepRules::new();
    rules.pin_class_with_members("LMain;");

    assert!(Driver::new(options_without_minification())
        .run(app, rules)
        .is_err());
}

// Zero-rule compilation idempotence: with everything pinned the output is
// structurally identical to the input.
#[test]
fn keep_all_compilation_is_idempotent() {
    let interner = Arc::new(SymbolInterner::new());
    let l = wrapper_class(&interner, "LL;");
    let a = holder_class(&interner, "LA;", "x");
    let b = holder_class(&interner, "LB;", "y");

    let input_summary: Vec<(Type, usize, usize)> = [&l, &a, &b]
        .iter()
        .map(|class| (class.ty, class.fields().len(), class.methods().len()))
        .collect();

    let app = build_app(&interner, vec![l, a, b]);
    let result = Driver::new(CompilerOptions::default())
        .run(app, KeepRules::keep_all())
        .expect("compilation succeeds");

    assert!(result.mapping.is_identity());
    for (ty, field_count, method_count) in input_summary {
        let class = result.application.program_definition_for(ty).unwrap();
        assert_eq!(class.fields().len(), field_count);
        assert_eq!(class.methods().len(), method_count);
    }
}

// Rename then retrace round trips to the original symbols.
#[test]
fn minified_names_retrace_to_originals() {
    let interner = Arc::new(SymbolInterner::new());
    let worker = interner.type_of("Lcom/example/Worker;");
    let mut worker_class =
        ClassDefinition::new(worker, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let step = interner.method(worker, "step", &[Type::INT], Type::INT);
    {
        let mut body = IrBuilder::new();
        let value = body.argument(Type::INT);
        body.ret(Some(value));
        worker_class.add_method(
            MethodDefinition::new(step, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
                .with_code(body.finish()),
        );
    }

    let main = interner.type_of("Lcom/example/Main;");
    let mut main_class = ClassDefinition::new(main, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let entry = interner.method(main, "main", &[], Type::VOID);
    {
        let mut body = IrBuilder::new();
        let five = body.const_int(5);
        let result = body.invoke_value(InvokeKind::Static, step, vec![five], &interner);
        let _ = result;
        body.ret(None);
        main_class.add_method(
            MethodDefinition::new(entry, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
                .with_code(body.finish()),
        );
    }

    let app = build_app(&interner, vec![worker_class, main_class]);
    let mut rules = KeepRules::new();
    rules.pin_class_with_members("Lcom/example/Main;");

    let options = CompilerOptions {
        enable_proto_normalization: false,
        ..CompilerOptions::default()
    };
    let result = Driver::new(options).run(app, rules).expect("compilation succeeds");

    // The worker class was renamed and the mapping inverts the rename.
    let rendered = result.mapping.render();
    assert!(rendered.contains("com.example.Worker -> com.example.a:"));
    assert_eq!(
        result.mapping.retrace_class("com.example.a"),
        Some("com.example.Worker")
    );
    let candidates = result.mapping.retrace_frame("com.example.a", "a");
    assert_eq!(candidates, vec!["step"]);

    // The pinned entry point kept its name.
    assert_eq!(
        result.mapping.retrace_class("com.example.Main"),
        Some("com.example.Main")
    );
}

// A merge group of size one produces no lens entries and no changes.
#[test]
fn single_candidate_does_not_merge() {
    let interner = Arc::new(SymbolInterner::new());
    let a = holder_class(&interner, "LA;", "x");

    let main = interner.type_of("LMain;");
    let mut main_class = ClassDefinition::new(main, ClassAccessFlags::PUBLIC, Some(Type::OBJECT));
    let entry = interner.method(main, "main", &[], Type::VOID);
    let mut body = IrBuilder::new();
    let one = body.const_int(1);
    let instance = body.new_instance(interner.type_of("LA;"));
    body.invoke(
        InvokeKind::Direct,
        interner.method(interner.type_of("LA;"), "<init>", &[Type::INT], Type::VOID),
        vec![instance, one],
    );
    body.ret(None);
    main_class.add_method(
        MethodDefinition::new(entry, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
            .with_code(body.finish()),
    );

    let app = build_app(&interner, vec![a, main_class]);
    let mut rules = KeepRules::new();
    rules.pin_class_with_members("LMain;");

    let options = CompilerOptions {
        minification: false,
        enable_class_inlining: false,
        ..CompilerOptions::default()
    };
    let result = Driver::new(options).run(app, rules).expect("compilation succeeds");

    let a_type = interner.type_of("LA;");
    let a_def = result.application.program_definition_for(a_type).unwrap();
    // No class-id slot was added; the single candidate stayed untouched.
    assert_eq!(a_def.instance_fields().count(), 1);
    assert!(result.mapping.is_identity());
}
