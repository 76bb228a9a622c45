//! End-to-end extraction test: parse the geo fixture binding source and
//! verify the extracted model.
//!
//! libclang can only be initialized once per process, so every test reads
//! from the shared lazily-extracted context.

use std::path::Path;
use std::sync::LazyLock;

use cxxscrape::Context;
use cxxscrape::model::*;

static CTX: LazyLock<Context> = LazyLock::new(|| {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let args = vec![
        fixtures.join("bind_geo.cpp").display().to_string(),
        format!("-I{}", fixtures.display()),
        "-std=c++17".to_string(),
    ];
    Context::compile_and_extract(&args).expect("extraction over the geo fixture succeeds")
});

fn class_by_spelling<'c>(ctx: &'c Context, spelling: &str) -> &'c Class {
    ctx.classes()
        .map(|(_, c)| c)
        .find(|c| c.spelling == spelling)
        .unwrap_or_else(|| panic!("class `{spelling}` not bound"))
}

fn method_of<'c>(ctx: &'c Context, class: &Class, name: &str) -> &'c Method {
    class
        .methods
        .iter()
        .filter_map(|id| ctx.get_method(id))
        .find(|m| m.function.name == name)
        .unwrap_or_else(|| panic!("method `{name}` not bound on `{}`", class.spelling))
}

fn function_by_name<'c>(ctx: &'c Context, name: &str) -> &'c Function {
    ctx.functions()
        .map(|(_, f)| f)
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("function `{name}` not bound"))
}

// ---------------------------------------------------------------------------
// Module contents and ordering
// ---------------------------------------------------------------------------

#[test]
fn module_lists_binding_sites_in_source_order() {
    let ctx = &*CTX;
    assert_eq!(ctx.num_modules(), 1);
    let module = ctx.get_module("points").expect("module `points` declared");

    let class_spellings: Vec<&str> = module
        .classes
        .iter()
        .map(|id| ctx.get_class(id).expect("class id resolves").spelling.as_str())
        .collect();
    assert_eq!(
        class_spellings,
        ["geo::Point3", "geo::Vec<float, 3>", "geo::Counter", "geo::Widget"]
    );

    let function_names: Vec<&str> = module
        .functions
        .iter()
        .map(|id| ctx.get_function(id).expect("function id resolves").name.as_str())
        .collect();
    assert_eq!(function_names, ["add", "lerp", "square", "on_event"]);

    assert_eq!(module.stdfunctions.len(), 1);

    let enum_spellings: Vec<&str> = module
        .enums
        .iter()
        .map(|id| ctx.get_enum(id).expect("enum id resolves").spelling.as_str())
        .collect();
    assert_eq!(enum_spellings, ["geo::Color", "geo::Flags"]);
}

#[test]
fn module_records_namespace_rewrite_pair() {
    let module = CTX.get_module("points").unwrap();
    assert_eq!(module.namespace_from, "geo");
    assert_eq!(module.namespace_to, "Geo");
}

#[test]
fn source_file_records_module_and_local_inclusions() {
    let ctx = &*CTX;
    let (_, source_file) = ctx
        .source_files()
        .next()
        .expect("binding source file recorded");
    assert!(source_file.filename.ends_with("bind_geo.cpp"));
    assert_eq!(source_file.modules, ["points"]);

    let local: Vec<&str> = source_file
        .inclusions
        .iter()
        .filter(|i| i.is_local)
        .map(|i| i.filename.as_str())
        .collect();
    assert!(local.contains(&"scrape.hpp"), "inclusions: {local:?}");
    assert!(local.contains(&"geo.hpp"), "inclusions: {local:?}");
    let scrape = source_file
        .inclusions
        .iter()
        .find(|i| i.filename == "scrape.hpp")
        .unwrap();
    assert_eq!(scrape.directive, "#include \"scrape.hpp\"");
}

// ---------------------------------------------------------------------------
// Classes, methods, constructors, fields
// ---------------------------------------------------------------------------

#[test]
fn point3_method_bindings_have_full_signatures() {
    let ctx = &*CTX;
    let point3 = class_by_spelling(ctx, "geo::Point3");
    assert_eq!(point3.methods.len(), 4);

    let length = method_of(ctx, point3, "length");
    assert_eq!(length.function.return_type, QType::builtin(Builtin::Float));
    assert!(length.function.params.is_empty());
    assert!(length.is_const);
    assert!(length.function.is_noexcept);
    assert!(!length.is_static);

    let scale = method_of(ctx, point3, "scale");
    assert_eq!(scale.function.params.len(), 1);
    assert_eq!(scale.function.params[0].name, "s");
    assert_eq!(scale.function.params[0].ty, QType::builtin(Builtin::Float));
    assert!(!scale.function.is_noexcept);

    let origin = method_of(ctx, point3, "origin");
    assert!(origin.is_static);
    assert_eq!(
        origin.function.return_type,
        QType::unqualified(TypeVariant::Type(TypeRef::Class(ClassId(point3.id.clone()))))
    );
}

#[test]
fn evaluated_noexcept_counts_as_noexcept() {
    let ctx = &*CTX;
    let point3 = class_by_spelling(ctx, "geo::Point3");
    // `reset` is declared `noexcept(true)`, not plain `noexcept`.
    assert!(method_of(ctx, point3, "reset").function.is_noexcept);
}

#[test]
fn point3_fields_keep_selector_order() {
    let point3 = class_by_spelling(&CTX, "geo::Point3");
    let names: Vec<&str> = point3.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["x", "y", "z"]);
    for field in &point3.fields {
        assert_eq!(field.ty, QType::builtin(Builtin::Float));
    }
    assert_eq!(point3.layout.size_bytes, 12);
    assert_eq!(point3.layout.align_bytes, 4);
}

#[test]
fn point3_constructor_resolves_the_declared_overload() {
    let ctx = &*CTX;
    let point3 = class_by_spelling(ctx, "geo::Point3");
    assert_eq!(point3.constructors.len(), 1);
    let ctor = ctx
        .get_constructor(&point3.constructors[0])
        .expect("constructor id resolves");
    assert_eq!(ctor.rename, "from_xyz");
    let names: Vec<&str> = ctor.params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["x", "y", "z"]);
    for param in &ctor.params {
        assert_eq!(param.ty, QType::builtin(Builtin::Float));
    }
}

#[test]
fn point3_rule_of_seven_reports_a_plain_aggregate() {
    let point3 = class_by_spelling(&CTX, "geo::Point3");
    let r7 = &point3.rule_of_seven;
    assert!(r7.is_copy_constructible);
    assert!(r7.is_move_constructible);
    assert!(r7.is_destructible);
    assert!(!r7.has_virtual_destructor);
    assert!(!point3.is_abstract);
    assert_eq!(point3.bind_kind, BindKind::ValueType);
}

#[test]
fn template_specialization_keeps_argument_precision() {
    let vec3 = class_by_spelling(&CTX, "geo::Vec<float, 3>");
    assert_eq!(
        vec3.template_args,
        vec![
            TemplateArg::Type(QType::builtin(Builtin::Float)),
            TemplateArg::Integral("3".to_string()),
        ]
    );
    assert_eq!(vec3.rename, "Vec3f");
    // data is a T[N] — a constant-sized array after instantiation.
    assert_eq!(vec3.fields.len(), 1);
    assert_eq!(
        vec3.fields[0].ty,
        QType::unqualified(TypeVariant::Array {
            element: Box::new(QType::builtin(Builtin::Float)),
            size: 3,
        })
    );
    assert_eq!(vec3.layout.size_bytes, 12);
}

#[test]
fn last_bind_kind_selector_wins() {
    // The site chains .opaque_ptr().value_type().opaque_bytes().
    let vec3 = class_by_spelling(&CTX, "geo::Vec<float, 3>");
    assert_eq!(vec3.bind_kind, BindKind::OpaqueBytes);
}

#[test]
fn noncopyable_value_type_is_recorded_not_rejected() {
    let counter = class_by_spelling(&CTX, "geo::Counter");
    assert_eq!(counter.bind_kind, BindKind::ValueType);
    assert!(!counter.rule_of_seven.is_copy_constructible);
    assert!(counter.rule_of_seven.is_move_constructible);
    assert!(counter.rule_of_seven.is_nothrow_move_constructible);
}

#[test]
fn abstract_class_with_pure_virtual_method() {
    let ctx = &*CTX;
    let widget = class_by_spelling(ctx, "geo::Widget");
    assert!(widget.is_abstract);
    assert!(widget.rule_of_seven.has_virtual_destructor);
    assert_eq!(widget.bind_kind, BindKind::OpaquePtr);

    let draw = method_of(ctx, widget, "draw");
    assert!(draw.is_virtual);
    assert!(draw.is_pure);
    assert_eq!(draw.function.return_type, QType::builtin(Builtin::Void));
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[test]
fn enum_variants_keep_declaration_order_and_values() {
    let ctx = &*CTX;
    let color = ctx
        .enums()
        .map(|(_, e)| e)
        .find(|e| e.spelling == "geo::Color")
        .unwrap();
    let variants: Vec<(&str, &str)> = color
        .variants
        .iter()
        .map(|v| (v.name.as_str(), v.value.as_str()))
        .collect();
    assert_eq!(variants, [("Red", "0"), ("Green", "1"), ("Blue", "2")]);
    assert_eq!(color.integer_type, QType::builtin(Builtin::Int));
    assert!(color.rename.is_empty());
}

#[test]
fn unsigned_enum_values_render_unsigned() {
    let ctx = &*CTX;
    let flags = ctx
        .enums()
        .map(|(_, e)| e)
        .find(|e| e.spelling == "geo::Flags")
        .unwrap();
    assert_eq!(flags.rename, "FlagBits");
    let all = flags.variants.iter().find(|v| v.name == "All").unwrap();
    assert_eq!(all.value, "4294967295");
}

// ---------------------------------------------------------------------------
// Free functions and std::function
// ---------------------------------------------------------------------------

#[test]
fn free_function_binding_has_signature_and_noexcept() {
    let add = function_by_name(&CTX, "add");
    assert_eq!(add.qualified_name, "geo::add");
    assert_eq!(add.return_type, QType::builtin(Builtin::Int));
    assert_eq!(add.params.len(), 2);
    assert_eq!(add.params[0].name, "a");
    assert!(add.is_noexcept);
    assert!(add.rename.is_empty());
    assert!(add.template_call.is_empty());
}

#[test]
fn function_template_records_its_template_call() {
    let square = function_by_name(&CTX, "square");
    assert_eq!(square.rename, "square_int");
    assert_eq!(square.template_call, "geo::square<int>");
    assert_eq!(square.return_type, QType::builtin(Builtin::Int));
}

#[test]
fn function_params_reference_bound_classes_by_id() {
    let ctx = &*CTX;
    let point3 = class_by_spelling(ctx, "geo::Point3");
    let lerp = function_by_name(ctx, "lerp");
    assert_eq!(lerp.rename, "point_lerp");

    // lerp(Point3 const& a, ...) — a reference to a const pointee that
    // resolves to the bound class id.
    let TypeVariant::LValueReference(pointee) = &lerp.params[0].ty.kind else {
        panic!("expected an lvalue reference parameter");
    };
    assert!(pointee.is_const);
    assert_eq!(
        pointee.kind,
        TypeVariant::Type(TypeRef::Class(ClassId(point3.id.clone())))
    );
}

#[test]
fn stdfunction_specialization_is_its_own_binding_kind() {
    let ctx = &*CTX;
    let (stdfunction_id, stdfunction) = ctx.stdfunctions().next().expect("stdfunction bound");
    assert_eq!(stdfunction.return_type, QType::builtin(Builtin::Int));
    assert_eq!(
        stdfunction.params,
        vec![QType::builtin(Builtin::Float), QType::builtin(Builtin::Bool)]
    );

    // on_event's parameter desugars through the Callback alias to the same
    // specialization, and references it as a StdFunction, not a class.
    let on_event = function_by_name(ctx, "on_event");
    let TypeVariant::LValueReference(pointee) = &on_event.params[0].ty.kind else {
        panic!("expected an lvalue reference parameter");
    };
    assert_eq!(
        pointee.kind,
        TypeVariant::Type(TypeRef::StdFunction(StdFunctionId(
            stdfunction_id.to_string()
        )))
    );
}

// ---------------------------------------------------------------------------
// Id closure and rendering
// ---------------------------------------------------------------------------

#[test]
fn every_module_listed_id_resolves() {
    let ctx = &*CTX;
    let module = ctx.get_module("points").unwrap();
    for id in &module.classes {
        assert!(ctx.get_class(id).is_some(), "unresolved class `{id}`");
        assert_eq!(ctx.module_of(id), Some("points"));
    }
    for id in &module.functions {
        assert!(ctx.get_function(id).is_some(), "unresolved function `{id}`");
    }
    for id in &module.stdfunctions {
        assert!(ctx.get_stdfunction(id).is_some(), "unresolved stdfunction `{id}`");
    }
    for id in &module.enums {
        assert!(ctx.get_enum(id).is_some(), "unresolved enum `{id}`");
    }
}

#[test]
fn dump_renders_every_binding_without_unresolved_ids() {
    let dump = CTX.dump();
    assert!(dump.starts_with("module points\n"), "dump: {dump}");
    assert!(dump.contains("namespace_rewrite: \"geo\" -> \"Geo\""));
    assert!(dump.contains("class geo::Point3"));
    assert!(dump.contains("template_args: <float, 3>"));
    assert!(dump.contains("bind_kind: opaque_bytes"));
    assert!(dump.contains("field: float x"));
    assert!(dump.contains("ctor: constructor(float x, float y, float z) [rename=from_xyz]"));
    assert!(dump.contains("method: float length() const noexcept"));
    assert!(dump.contains("method: static geo::Point3 origin()"));
    assert!(dump.contains("method: virtual void draw() = 0"));
    assert!(dump.contains("function int geo::add(int a, int b) noexcept"));
    assert!(dump.contains("[template_call=geo::square<int>]"));
    assert!(dump.contains("enum geo::Color: int"));
    assert!(dump.contains("  Red = 0"));
    assert!(dump.contains("All = 4294967295"));
    assert!(dump.contains("stdfunction"));
    assert!(!dump.contains("<unresolved:"), "dump: {dump}");
}
