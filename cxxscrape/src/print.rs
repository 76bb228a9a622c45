//! Deterministic debug rendering for the extracted model.
//!
//! These strings anchor the golden-file tests: two runs against identical
//! inputs must produce byte-identical output, so every renderer walks its
//! containers in insertion order and resolves ids through the context.

use crate::context::Context;
use crate::model::*;

fn builtin_spelling(builtin: Builtin) -> &'static str {
    match builtin {
        Builtin::Void => "void",
        Builtin::Bool => "bool",
        Builtin::CharS | Builtin::CharU => "char",
        Builtin::SChar => "signed char",
        Builtin::UChar => "unsigned char",
        Builtin::Short => "short",
        Builtin::UShort => "unsigned short",
        Builtin::Int => "int",
        Builtin::UInt => "unsigned int",
        Builtin::LongLong => "long long",
        Builtin::ULongLong => "unsigned long long",
        Builtin::Int8 => "int8_t",
        Builtin::Int16 => "int16_t",
        Builtin::Int32 => "int32_t",
        Builtin::Int64 => "int64_t",
        Builtin::UInt8 => "uint8_t",
        Builtin::UInt16 => "uint16_t",
        Builtin::UInt32 => "uint32_t",
        Builtin::UInt64 => "uint64_t",
        Builtin::Size => "size_t",
        Builtin::Float => "float",
        Builtin::Double => "double",
        Builtin::LongDouble => "long double",
    }
}

fn bind_kind_spelling(kind: BindKind) -> &'static str {
    match kind {
        BindKind::OpaquePtr => "opaque_ptr",
        BindKind::OpaqueBytes => "opaque_bytes",
        BindKind::ValueType => "value_type",
    }
}

impl Context {
    fn type_ref_name(&self, type_ref: &TypeRef) -> String {
        let resolve = |id: &str, bound: Option<&str>| {
            bound
                .or_else(|| self.typename(id))
                .map(str::to_string)
                .unwrap_or_else(|| format!("<unresolved:{id}>"))
        };
        match type_ref {
            TypeRef::Builtin(builtin) => builtin_spelling(*builtin).to_string(),
            TypeRef::Class(id) => {
                resolve(&id.0, self.get_class(&id.0).map(|c| c.spelling.as_str()))
            }
            TypeRef::ClassTemplateSpecialization(id) => {
                resolve(&id.0, self.get_class(&id.0).map(|c| c.spelling.as_str()))
            }
            TypeRef::Enum(id) => resolve(&id.0, self.get_enum(&id.0).map(|e| e.spelling.as_str())),
            TypeRef::StdFunction(id) => {
                resolve(&id.0, self.get_stdfunction(&id.0).map(|f| f.spelling.as_str()))
            }
        }
    }

    /// Render a qualified type in C++ spelling. `const T*` and `T* const`
    /// stay distinguishable.
    pub fn qtype_to_string(&self, qt: &QType) -> String {
        match &qt.kind {
            TypeVariant::Type(type_ref) => {
                let name = self.type_ref_name(type_ref);
                if qt.is_const {
                    format!("const {name}")
                } else {
                    name
                }
            }
            TypeVariant::Pointer(pointee) => format!(
                "{}*{}",
                self.qtype_to_string(pointee),
                if qt.is_const { " const" } else { "" }
            ),
            TypeVariant::LValueReference(pointee) => {
                format!("{}&", self.qtype_to_string(pointee))
            }
            TypeVariant::RValueReference(pointee) => {
                format!("{}&&", self.qtype_to_string(pointee))
            }
            TypeVariant::Array { element, size } => {
                format!("{}[{size}]", self.qtype_to_string(element))
            }
        }
    }

    fn params_to_string(&self, params: &[Param]) -> String {
        params
            .iter()
            .map(|p| {
                let ty = self.qtype_to_string(&p.ty);
                if p.name.is_empty() {
                    ty
                } else {
                    format!("{ty} {}", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn template_args_to_string(&self, args: &[TemplateArg]) -> String {
        let rendered: Vec<String> = args
            .iter()
            .map(|arg| match arg {
                TemplateArg::Type(qt) => self.qtype_to_string(qt),
                TemplateArg::Integral(value) => value.clone(),
            })
            .collect();
        format!("<{}>", rendered.join(", "))
    }

    pub fn function_to_string(&self, function: &Function) -> String {
        let mut out = format!(
            "{} {}({})",
            self.qtype_to_string(&function.return_type),
            function.qualified_name,
            self.params_to_string(&function.params)
        );
        if function.is_noexcept {
            out.push_str(" noexcept");
        }
        if !function.template_call.is_empty() {
            out.push_str(&format!(" [template_call={}]", function.template_call));
        }
        if !function.rename.is_empty() {
            out.push_str(&format!(" [rename={}]", function.rename));
        }
        out
    }

    pub fn method_to_string(&self, method: &Method) -> String {
        let function = &method.function;
        let mut out = String::new();
        if method.is_static {
            out.push_str("static ");
        }
        if method.is_virtual {
            out.push_str("virtual ");
        }
        out.push_str(&format!(
            "{} {}({})",
            self.qtype_to_string(&function.return_type),
            function.name,
            self.params_to_string(&function.params)
        ));
        if method.is_const {
            out.push_str(" const");
        }
        if function.is_noexcept {
            out.push_str(" noexcept");
        }
        if method.is_pure {
            out.push_str(" = 0");
        }
        if !function.template_call.is_empty() {
            out.push_str(&format!(" [template_call={}]", function.template_call));
        }
        if !function.rename.is_empty() {
            out.push_str(&format!(" [rename={}]", function.rename));
        }
        out
    }

    pub fn constructor_to_string(&self, constructor: &Constructor) -> String {
        let mut out = format!("constructor({})", self.params_to_string(&constructor.params));
        if constructor.is_noexcept {
            out.push_str(" noexcept");
        }
        if !constructor.rename.is_empty() {
            out.push_str(&format!(" [rename={}]", constructor.rename));
        }
        out
    }

    pub fn stdfunction_to_string(&self, stdfunction: &StdFunction) -> String {
        let params: Vec<String> = stdfunction
            .params
            .iter()
            .map(|p| self.qtype_to_string(p))
            .collect();
        format!(
            "{}: {}({})",
            stdfunction.spelling,
            self.qtype_to_string(&stdfunction.return_type),
            params.join(", ")
        )
    }

    pub fn enum_to_string(&self, enm: &Enum) -> String {
        let mut out = format!(
            "enum {}: {}",
            enm.spelling,
            self.qtype_to_string(&enm.integer_type)
        );
        if !enm.rename.is_empty() {
            out.push_str(&format!(" [rename={}]", enm.rename));
        }
        for variant in &enm.variants {
            out.push_str(&format!("\n  {} = {}", variant.name, variant.value));
        }
        out
    }

    pub fn class_to_string(&self, class: &Class) -> String {
        let mut out = format!("class {}", class.qualified_name);
        if !class.rename.is_empty() {
            out.push_str(&format!(" [rename={}]", class.rename));
        }
        if !class.template_args.is_empty() {
            out.push_str(&format!(
                "\n  template_args: {}",
                self.template_args_to_string(&class.template_args)
            ));
        }
        out.push_str(&format!(
            "\n  bind_kind: {}",
            bind_kind_spelling(class.bind_kind)
        ));
        out.push_str(&format!(
            "\n  layout: size {} align {}",
            class.layout.size_bytes, class.layout.align_bytes
        ));
        if class.is_abstract {
            out.push_str("\n  abstract");
        }
        out.push_str(&format!("\n  traits: [{}]", traits_list(&class.rule_of_seven)));
        for field in &class.fields {
            out.push_str(&format!(
                "\n  field: {} {}",
                self.qtype_to_string(&field.ty),
                field.name
            ));
        }
        for id in &class.constructors {
            match self.get_constructor(id) {
                Some(constructor) => {
                    out.push_str(&format!("\n  ctor: {}", self.constructor_to_string(constructor)));
                }
                None => out.push_str(&format!("\n  ctor: <unresolved:{id}>")),
            }
        }
        for id in &class.methods {
            match self.get_method(id) {
                Some(method) => {
                    out.push_str(&format!("\n  method: {}", self.method_to_string(method)));
                }
                None => out.push_str(&format!("\n  method: <unresolved:{id}>")),
            }
        }
        out
    }

    pub fn module_to_string(&self, module: &Module) -> String {
        let mut out = format!("module {}", module.name);
        if !module.namespace_from.is_empty() || !module.namespace_to.is_empty() {
            out.push_str(&format!(
                "\n  namespace_rewrite: \"{}\" -> \"{}\"",
                module.namespace_from, module.namespace_to
            ));
        }
        for file in &module.source_files {
            out.push_str(&format!("\n  source_file: {file}"));
        }
        let mut push_block = |block: String| {
            for line in block.lines() {
                out.push_str("\n  ");
                out.push_str(line);
            }
        };
        for id in &module.classes {
            match self.get_class(id) {
                Some(class) => push_block(self.class_to_string(class)),
                None => push_block(format!("class <unresolved:{id}>")),
            }
        }
        for id in &module.functions {
            match self.get_function(id) {
                Some(function) => push_block(format!("function {}", self.function_to_string(function))),
                None => push_block(format!("function <unresolved:{id}>")),
            }
        }
        for id in &module.stdfunctions {
            match self.get_stdfunction(id) {
                Some(stdfunction) => {
                    push_block(format!("stdfunction {}", self.stdfunction_to_string(stdfunction)));
                }
                None => push_block(format!("stdfunction <unresolved:{id}>")),
            }
        }
        for id in &module.enums {
            match self.get_enum(id) {
                Some(enm) => push_block(self.enum_to_string(enm)),
                None => push_block(format!("enum <unresolved:{id}>")),
            }
        }
        out
    }

    /// Render the whole context, module by module in insertion order.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (_, module) in self.modules() {
            out.push_str(&self.module_to_string(module));
            out.push('\n');
        }
        out
    }
}

fn traits_list(r7: &RuleOfSeven) -> String {
    let flags = [
        (r7.is_copy_constructible, "copy"),
        (r7.is_nothrow_copy_constructible, "copy_nothrow"),
        (r7.is_move_constructible, "move"),
        (r7.is_nothrow_move_constructible, "move_nothrow"),
        (r7.is_copy_assignable, "copy_assign"),
        (r7.is_nothrow_copy_assignable, "copy_assign_nothrow"),
        (r7.is_move_assignable, "move_assign"),
        (r7.is_nothrow_move_assignable, "move_assign_nothrow"),
        (r7.is_destructible, "dtor"),
        (r7.has_virtual_destructor, "virtual_dtor"),
    ];
    flags
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_context() -> Context {
        Context::new()
    }

    fn ptr(pointee: QType) -> QType {
        QType::unqualified(TypeVariant::Pointer(Box::new(pointee)))
    }

    #[test]
    fn const_pointee_and_const_pointer_render_differently() {
        let ctx = empty_context();
        // const int*
        let const_pointee = ptr(QType {
            is_const: true,
            kind: TypeVariant::Type(TypeRef::Builtin(Builtin::Int)),
        });
        // int* const
        let const_pointer = QType {
            is_const: true,
            kind: TypeVariant::Pointer(Box::new(QType::builtin(Builtin::Int))),
        };
        assert_eq!(ctx.qtype_to_string(&const_pointee), "const int*");
        assert_eq!(ctx.qtype_to_string(&const_pointer), "int* const");
    }

    #[test]
    fn references_and_arrays_render_in_cxx_spelling() {
        let ctx = empty_context();
        let lref = QType::unqualified(TypeVariant::LValueReference(Box::new(QType {
            is_const: true,
            kind: TypeVariant::Type(TypeRef::Builtin(Builtin::Float)),
        })));
        assert_eq!(ctx.qtype_to_string(&lref), "const float&");

        let rref = QType::unqualified(TypeVariant::RValueReference(Box::new(QType::builtin(
            Builtin::Double,
        ))));
        assert_eq!(ctx.qtype_to_string(&rref), "double&&");

        let array = QType::unqualified(TypeVariant::Array {
            element: Box::new(QType::builtin(Builtin::Float)),
            size: 3,
        });
        assert_eq!(ctx.qtype_to_string(&array), "float[3]");
    }

    #[test]
    fn unresolved_ids_render_with_their_id() {
        let ctx = empty_context();
        let qt = QType::unqualified(TypeVariant::Type(TypeRef::Class(ClassId(
            "c:@S@Bar".to_string(),
        ))));
        assert_eq!(ctx.qtype_to_string(&qt), "<unresolved:c:@S@Bar>");
    }

    #[test]
    fn template_args_preserve_integral_precision_and_order() {
        let ctx = empty_context();
        let args = vec![
            TemplateArg::Type(QType::builtin(Builtin::Float)),
            TemplateArg::Integral("9223372036854775807".to_string()),
            TemplateArg::Integral("-9223372036854775808".to_string()),
        ];
        assert_eq!(
            ctx.template_args_to_string(&args),
            "<float, 9223372036854775807, -9223372036854775808>"
        );
    }

    #[test]
    fn flattened_pack_renders_three_args_in_order() {
        let ctx = empty_context();
        let args = vec![
            TemplateArg::Type(QType::builtin(Builtin::Int)),
            TemplateArg::Type(QType::builtin(Builtin::Float)),
            TemplateArg::Type(QType::builtin(Builtin::Bool)),
        ];
        assert_eq!(args.len(), 3);
        assert_eq!(ctx.template_args_to_string(&args), "<int, float, bool>");
    }

    #[test]
    fn method_rendering_orders_qualifiers() {
        let ctx = empty_context();
        let method = Method {
            function: Function {
                qualified_name: "geo::Point3::length".to_string(),
                name: "length".to_string(),
                rename: String::new(),
                spelling: "geo::Point3::length".to_string(),
                template_call: String::new(),
                return_type: QType::builtin(Builtin::Float),
                params: vec![],
                is_noexcept: true,
            },
            is_const: true,
            is_static: false,
            is_virtual: false,
            is_pure: false,
        };
        assert_eq!(ctx.method_to_string(&method), "float length() const noexcept");
    }

    #[test]
    fn enum_rendering_preserves_variant_order() {
        let ctx = empty_context();
        let enm = Enum {
            spelling: "geo::Color".to_string(),
            rename: String::new(),
            variants: vec![
                EnumVariant { name: "R".to_string(), value: "0".to_string() },
                EnumVariant { name: "G".to_string(), value: "1".to_string() },
                EnumVariant { name: "B".to_string(), value: "2".to_string() },
            ],
            integer_type: QType::builtin(Builtin::Int),
        };
        assert_eq!(
            ctx.enum_to_string(&enm),
            "enum geo::Color: int\n  R = 0\n  G = 1\n  B = 2"
        );
    }

    #[test]
    fn dump_is_stable_across_calls() {
        let mut ctx = Context::new();
        ctx.get_or_insert_module("test", "bind.cpp").unwrap();
        ctx.insert_enum_binding(
            "test",
            "c:@E@Color",
            Enum {
                spelling: "Color".to_string(),
                rename: String::new(),
                variants: vec![EnumVariant { name: "R".to_string(), value: "0".to_string() }],
                integer_type: QType::builtin(Builtin::Int),
            },
        )
        .unwrap();
        assert_eq!(ctx.dump(), ctx.dump());
        assert!(ctx.dump().starts_with("module test\n"));
    }
}
