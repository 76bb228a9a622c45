//! Extraction — clang `Entity`/`Type` → model types.
//!
//! Each `extract_*` method builds and returns a fresh binding; the matcher is
//! responsible for inserting it, so insertion stays atomic with error
//! handling and id allocation.

use clang::{Entity, EntityKind, ExceptionSpecification, TemplateArgument, Type, TypeKind};
use tracing::trace;

use crate::context::Context;
use crate::error::{ExtractError, Result};
use crate::model::*;

impl Context {
    // -----------------------------------------------------------------------
    // Type extraction
    // -----------------------------------------------------------------------

    /// Convert a qualified C++ type into a [`QType`].
    ///
    /// The outer `const` is stripped onto `is_const`, sugar is desugared down
    /// to a canonical type (fixed-width and `size_t` typedefs are caught by
    /// name on the way), and the canonical kind dispatches into the variant.
    /// Record and enum leaves are referenced by USR; whether those ids are
    /// actually bound is checked by the link phase, not here, so binding
    /// sites may appear in any order.
    pub fn extract_qtype(&mut self, ty: &Type) -> Result<QType> {
        let mut t = *ty;
        let mut is_const = t.is_const_qualified();

        // Desugar elaborated/typedef sugar until a canonical type is reached.
        loop {
            match t.get_kind() {
                TypeKind::Elaborated => {
                    let Some(inner) = t.get_elaborated_type() else { break };
                    t = inner;
                }
                TypeKind::Typedef => {
                    let name = t
                        .get_declaration()
                        .and_then(|d| d.get_name())
                        .unwrap_or_default();
                    if let Some(builtin) = fixed_width_typedef(&name) {
                        return Ok(QType {
                            is_const,
                            kind: TypeVariant::Type(TypeRef::Builtin(builtin)),
                        });
                    }
                    t = t.get_canonical_type();
                }
                _ => break,
            }
            is_const |= t.is_const_qualified();
        }

        let unsupported = |reason: &str| ExtractError::UnsupportedType {
            spelling: ty.get_display_name(),
            reason: reason.to_string(),
        };

        let kind = match t.get_kind() {
            TypeKind::Pointer => {
                let pointee = t.get_pointee_type().ok_or_else(|| unsupported("pointer without pointee"))?;
                TypeVariant::Pointer(Box::new(self.extract_qtype(&pointee)?))
            }
            TypeKind::LValueReference => {
                let pointee = t.get_pointee_type().ok_or_else(|| unsupported("reference without pointee"))?;
                TypeVariant::LValueReference(Box::new(self.extract_qtype(&pointee)?))
            }
            TypeKind::RValueReference => {
                let pointee = t.get_pointee_type().ok_or_else(|| unsupported("reference without pointee"))?;
                TypeVariant::RValueReference(Box::new(self.extract_qtype(&pointee)?))
            }
            TypeKind::ConstantArray => {
                let element = t.get_element_type().ok_or_else(|| unsupported("array without element type"))?;
                let size = t.get_size().ok_or_else(|| unsupported("array without constant size"))? as u64;
                TypeVariant::Array {
                    element: Box::new(self.extract_qtype(&element)?),
                    size,
                }
            }
            TypeKind::VariableArray | TypeKind::DependentSizedArray | TypeKind::IncompleteArray => {
                return Err(unsupported("array size is not a compile-time constant"));
            }
            TypeKind::Enum => {
                let decl = t.get_declaration().ok_or_else(|| unsupported("enum without declaration"))?;
                let id = usr_of(&decl)?;
                self.record_typename(&id, &qualified_display_name(&decl));
                TypeVariant::Type(TypeRef::Enum(EnumId(id)))
            }
            TypeKind::Record => {
                let decl = t.get_declaration().ok_or_else(|| unsupported("record without declaration"))?;
                let id = usr_of(&decl)?;
                self.record_typename(&id, &qualified_display_name(&decl));
                if is_std_function(&decl) {
                    TypeVariant::Type(TypeRef::StdFunction(StdFunctionId(id)))
                } else if decl.get_template().is_some() {
                    TypeVariant::Type(TypeRef::ClassTemplateSpecialization(
                        ClassTemplateSpecializationId(id),
                    ))
                } else {
                    TypeVariant::Type(TypeRef::Class(ClassId(id)))
                }
            }
            TypeKind::MemberPointer => return Err(unsupported("member pointers cannot cross the C ABI")),
            TypeKind::FunctionPrototype | TypeKind::FunctionNoPrototype => {
                return Err(unsupported("function types cannot be passed by value"));
            }
            TypeKind::Dependent | TypeKind::Unexposed => {
                return Err(unsupported("dependent type survived instantiation"));
            }
            other => match map_builtin(other, &t) {
                Some(builtin) => TypeVariant::Type(TypeRef::Builtin(builtin)),
                None => return Err(unsupported(&format!("unhandled type kind {other:?}"))),
            },
        };

        Ok(QType { is_const, kind })
    }

    // -----------------------------------------------------------------------
    // Template arguments
    // -----------------------------------------------------------------------

    /// Extract the template arguments of the specialization `decl`, flattening
    /// parameter packs in source order.
    ///
    /// `written` is the specialization type as spelt at the binding site; it
    /// is the fallback for pack expansion, since the declaration-level
    /// argument list reports a pack as a single opaque entry.
    pub fn extract_template_arguments(
        &mut self,
        decl: &Entity,
        written: Option<&Type>,
    ) -> Result<Vec<TemplateArg>> {
        let args = decl.get_template_arguments().ok_or_else(|| {
            ExtractError::Provider(format!(
                "no template arguments on `{}`",
                qualified_display_name(decl)
            ))
        })?;
        let mut out = Vec::new();
        for (position, arg) in args.iter().enumerate() {
            self.extract_single_template_arg(arg, position, written, &mut out)?;
        }
        Ok(out)
    }

    /// Extract one template argument, pushing one or more values onto `out`.
    pub fn extract_single_template_arg(
        &mut self,
        arg: &TemplateArgument,
        position: usize,
        written: Option<&Type>,
        out: &mut Vec<TemplateArg>,
    ) -> Result<()> {
        match arg {
            TemplateArgument::Type(ty) => {
                out.push(TemplateArg::Type(self.extract_qtype(ty)?));
            }
            TemplateArgument::Integral(signed, unsigned) => {
                out.push(TemplateArg::Integral(format_integral(*signed, *unsigned)));
            }
            TemplateArgument::Pack => {
                // The declaration-level list collapses a pack into one opaque
                // entry; the written specialization type still carries the
                // flattened arguments in source order.
                let types = written
                    .and_then(|w| w.get_template_argument_types())
                    .ok_or_else(|| ExtractError::UnsupportedType {
                        spelling: written.map(|w| w.get_display_name()).unwrap_or_default(),
                        reason: "cannot recover parameter pack contents".to_string(),
                    })?;
                for ty in types.into_iter().skip(position) {
                    let ty = ty.ok_or_else(|| ExtractError::UnsupportedType {
                        spelling: written.map(|w| w.get_display_name()).unwrap_or_default(),
                        reason: "non-type argument inside a parameter pack".to_string(),
                    })?;
                    out.push(TemplateArg::Type(self.extract_qtype(&ty)?));
                }
            }
            // Instantiated specializations have already folded foldable
            // expressions to integrals; anything left here is not
            // representable.
            other => {
                return Err(ExtractError::UnsupportedType {
                    spelling: format!("{other:?}"),
                    reason: "unsupported template argument kind".to_string(),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Declaration extraction
    // -----------------------------------------------------------------------

    /// Extract a class or class template specialization.
    ///
    /// Member and field lists start empty; the matcher grows them as it
    /// processes the selectors chained on the binding site.
    #[must_use = "returned binding must be inserted"]
    pub fn extract_class_binding(
        &mut self,
        decl: &Entity,
        written_ty: &Type,
        spelling: &str,
        rename: &str,
        layout: Layout,
        bind_kind: BindKind,
        rule_of_seven: RuleOfSeven,
        is_abstract: bool,
    ) -> Result<Class> {
        let id = usr_of(decl)?;
        let template_args = if decl.get_template().is_some() {
            self.extract_template_arguments(decl, Some(written_ty))?
        } else {
            Vec::new()
        };
        trace!(id = %id, spelling = %spelling, "extracted class");
        Ok(Class {
            qualified_name: qualified_display_name(decl),
            spelling: spelling.to_string(),
            name: decl.get_name().unwrap_or_default(),
            rename: rename.to_string(),
            template_args,
            methods: Vec::new(),
            constructors: Vec::new(),
            fields: Vec::new(),
            layout,
            bind_kind,
            rule_of_seven,
            is_abstract,
            id,
        })
    }

    fn extract_callable(
        &mut self,
        decl: &Entity,
        rename: &str,
        spelling: &str,
        template_call: &str,
    ) -> Result<Function> {
        let return_type = decl
            .get_result_type()
            .ok_or_else(|| ExtractError::Provider(format!("`{spelling}` has no result type")))?;
        let return_type = self.extract_qtype(&return_type)?;
        let params = self.extract_params(decl)?;
        Ok(Function {
            qualified_name: qualified_name(decl),
            name: decl.get_name().unwrap_or_default(),
            rename: rename.to_string(),
            spelling: spelling.to_string(),
            template_call: template_call.to_string(),
            return_type,
            params,
            is_noexcept: evaluated_noexcept(decl),
        })
    }

    fn extract_params(&mut self, decl: &Entity) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        for arg in decl.get_arguments().unwrap_or_default() {
            let ty = arg
                .get_type()
                .ok_or_else(|| ExtractError::Provider("parameter has no type".to_string()))?;
            params.push(Param {
                name: arg.get_name().unwrap_or_default(),
                ty: self.extract_qtype(&ty)?,
            });
        }
        Ok(params)
    }

    /// Extract a free function bound by `cxs::fn()`.
    #[must_use = "returned binding must be inserted"]
    pub fn extract_function_binding(
        &mut self,
        decl: &Entity,
        rename: &str,
        spelling: &str,
        template_call: &str,
    ) -> Result<Function> {
        let function = self.extract_callable(decl, rename, spelling, template_call)?;
        trace!(name = %function.qualified_name, "extracted function");
        Ok(function)
    }

    /// Extract a method bound by the `.m()` selector.
    #[must_use = "returned binding must be inserted"]
    pub fn extract_method_binding(
        &mut self,
        decl: &Entity,
        rename: &str,
        template_call: &str,
    ) -> Result<Method> {
        let spelling = qualified_name(decl);
        let function = self.extract_callable(decl, rename, &spelling, template_call)?;
        trace!(name = %function.qualified_name, "extracted method");
        Ok(Method {
            function,
            is_const: decl.is_const_method(),
            is_static: decl.is_static_method(),
            is_virtual: decl.is_virtual_method(),
            is_pure: decl.is_pure_virtual_method(),
        })
    }

    /// Extract a constructor from its declaration. `param_names` are the
    /// names given at the binding site and win over declaration names.
    #[must_use = "returned binding must be inserted"]
    pub fn extract_constructor_binding(
        &mut self,
        decl: &Entity,
        param_names: &[String],
        rename: &str,
    ) -> Result<Constructor> {
        let mut params = self.extract_params(decl)?;
        for (index, param) in params.iter_mut().enumerate() {
            if let Some(name) = param_names.get(index)
                && !name.is_empty()
            {
                param.name = name.clone();
            }
        }
        Ok(Constructor {
            rename: rename.to_string(),
            params,
            is_noexcept: evaluated_noexcept(decl),
        })
    }

    /// Extract an enum bound by `cxs::Enum<X>()`. Variants keep declaration
    /// order; values render through the underlying type's signedness.
    #[must_use = "returned binding must be inserted"]
    pub fn extract_enum_binding(
        &mut self,
        decl: &Entity,
        spelling: &str,
        rename: &str,
    ) -> Result<Enum> {
        let underlying = decl.get_enum_underlying_type().ok_or_else(|| {
            ExtractError::Provider(format!("enum `{spelling}` has no underlying type"))
        })?;
        let unsigned = is_unsigned_integer(&underlying.get_canonical_type());
        let integer_type = self.extract_qtype(&underlying)?;

        let mut variants = Vec::new();
        for child in decl.get_children() {
            if child.get_kind() != EntityKind::EnumConstantDecl {
                continue;
            }
            let (signed_value, unsigned_value) = child.get_enum_constant_value().unwrap_or((0, 0));
            variants.push(EnumVariant {
                name: child.get_name().unwrap_or_default(),
                value: if unsigned {
                    unsigned_value.to_string()
                } else {
                    signed_value.to_string()
                },
            });
        }
        trace!(spelling = %spelling, variants = variants.len(), "extracted enum");
        Ok(Enum {
            spelling: spelling.to_string(),
            rename: rename.to_string(),
            variants,
            integer_type,
        })
    }

    /// Extract a `std::function` specialization: unwrap its single template
    /// argument (a function type) into a return type and parameter types.
    #[must_use = "returned binding must be inserted"]
    pub fn extract_stdfunction_binding(
        &mut self,
        decl: &Entity,
        spelling: &str,
    ) -> Result<StdFunction> {
        let args = decl.get_template_arguments().unwrap_or_default();
        let Some(TemplateArgument::Type(signature)) = args.first() else {
            return Err(ExtractError::UnsupportedType {
                spelling: spelling.to_string(),
                reason: "callable wrapper without a function-type argument".to_string(),
            });
        };
        let signature = signature.get_canonical_type();
        if signature.get_kind() != TypeKind::FunctionPrototype {
            return Err(ExtractError::UnsupportedType {
                spelling: spelling.to_string(),
                reason: "callable wrapper argument is not a function type".to_string(),
            });
        }
        let return_type = signature.get_result_type().ok_or_else(|| {
            ExtractError::Provider(format!("`{spelling}` signature has no result type"))
        })?;
        let return_type = self.extract_qtype(&return_type)?;
        let mut params = Vec::new();
        for ty in signature.get_argument_types().unwrap_or_default() {
            params.push(self.extract_qtype(&ty)?);
        }
        trace!(spelling = %spelling, params = params.len(), "extracted stdfunction");
        Ok(StdFunction {
            spelling: spelling.to_string(),
            return_type,
            params,
        })
    }
}

/// Build a constructor binding with no backing declaration (implicit
/// default/copy/move constructors never appear in the AST).
pub(crate) fn synthesize_constructor(
    param_types: Vec<QType>,
    param_names: &[String],
    rename: &str,
) -> Constructor {
    let params = param_types
        .into_iter()
        .enumerate()
        .map(|(index, ty)| Param {
            name: param_names.get(index).cloned().unwrap_or_default(),
            ty,
        })
        .collect();
    Constructor {
        rename: rename.to_string(),
        params,
        is_noexcept: false,
    }
}

// ---------------------------------------------------------------------------
// Builtin mapping
// ---------------------------------------------------------------------------

fn map_builtin(kind: TypeKind, ty: &Type) -> Option<Builtin> {
    let builtin = match kind {
        TypeKind::Void => Builtin::Void,
        TypeKind::Bool => Builtin::Bool,
        TypeKind::CharS => Builtin::CharS,
        TypeKind::CharU => Builtin::CharU,
        TypeKind::SChar => Builtin::SChar,
        TypeKind::UChar => Builtin::UChar,
        TypeKind::Short => Builtin::Short,
        TypeKind::UShort => Builtin::UShort,
        TypeKind::Int => Builtin::Int,
        TypeKind::UInt => Builtin::UInt,
        TypeKind::LongLong => Builtin::LongLong,
        TypeKind::ULongLong => Builtin::ULongLong,
        TypeKind::Float => Builtin::Float,
        TypeKind::Double => Builtin::Double,
        TypeKind::LongDouble => Builtin::LongDouble,
        // Platform-width long is pinned to the fixed-width equivalent for the
        // platform the binding is generated on.
        TypeKind::Long => match ty.get_sizeof() {
            Ok(8) => Builtin::Int64,
            _ => Builtin::Int32,
        },
        TypeKind::ULong => match ty.get_sizeof() {
            Ok(8) => Builtin::UInt64,
            _ => Builtin::UInt32,
        },
        _ => return None,
    };
    Some(builtin)
}

fn fixed_width_typedef(name: &str) -> Option<Builtin> {
    let builtin = match name {
        "size_t" => Builtin::Size,
        "int8_t" => Builtin::Int8,
        "int16_t" => Builtin::Int16,
        "int32_t" => Builtin::Int32,
        "int64_t" => Builtin::Int64,
        "uint8_t" => Builtin::UInt8,
        "uint16_t" => Builtin::UInt16,
        "uint32_t" => Builtin::UInt32,
        "uint64_t" => Builtin::UInt64,
        _ => return None,
    };
    Some(builtin)
}

fn is_unsigned_integer(ty: &Type) -> bool {
    matches!(
        ty.get_kind(),
        TypeKind::Bool
            | TypeKind::CharU
            | TypeKind::UChar
            | TypeKind::UShort
            | TypeKind::UInt
            | TypeKind::ULong
            | TypeKind::ULongLong
    )
}

// ---------------------------------------------------------------------------
// AST helpers shared with the matcher
// ---------------------------------------------------------------------------

/// Render a non-type template argument as a decimal string without losing
/// 64-bit precision. libclang reports both interpretations; the unsigned one
/// wins while it is unambiguous, so `9223372036854775807` and
/// `-9223372036854775808` both survive exactly.
pub(crate) fn format_integral(signed: i64, unsigned: u64) -> String {
    if unsigned <= i64::MAX as u64 {
        unsigned.to_string()
    } else {
        signed.to_string()
    }
}

/// USR of a declaration — the stable id for classes, enums and callable
/// wrappers.
pub(crate) fn usr_of(entity: &Entity) -> Result<String> {
    entity.get_usr().map(|usr| usr.0).ok_or_else(|| {
        ExtractError::Provider(format!(
            "no USR for `{}`",
            entity.get_display_name().unwrap_or_default()
        ))
    })
}

/// Fully qualified name with the plain leaf name (`geo::add`).
pub(crate) fn qualified_name(entity: &Entity) -> String {
    qualify(entity, entity.get_name().unwrap_or_default())
}

/// Fully qualified name keeping the display leaf, so specializations render
/// with their arguments (`geo::Vec<float, 3>`).
pub(crate) fn qualified_display_name(entity: &Entity) -> String {
    let leaf = entity
        .get_display_name()
        .or_else(|| entity.get_name())
        .unwrap_or_default();
    qualify(entity, leaf)
}

fn qualify(entity: &Entity, leaf: String) -> String {
    let mut parts = vec![leaf];
    let mut cursor = entity.get_semantic_parent();
    while let Some(parent) = cursor {
        if parent.get_kind() == EntityKind::TranslationUnit {
            break;
        }
        if let Some(name) = parent.get_name() {
            parts.push(name);
        }
        cursor = parent.get_semantic_parent();
    }
    parts.reverse();
    parts.join("::")
}

/// The effective exception specification, evaluated rather than merely
/// declared: a computed `noexcept(expr)` that instantiated to true counts.
pub(crate) fn evaluated_noexcept(entity: &Entity) -> bool {
    match entity.get_exception_specification() {
        Some(
            ExceptionSpecification::BasicNoexcept
            | ExceptionSpecification::NoThrow
            | ExceptionSpecification::DynamicNone,
        ) => true,
        Some(ExceptionSpecification::ComputedNoexcept) => {
            // The canonical function type resolves `noexcept(expr)` to
            // `noexcept` or `noexcept(false)`.
            let display = entity
                .get_type()
                .map(|t| t.get_canonical_type().get_display_name())
                .unwrap_or_default();
            display.contains("noexcept") && !display.contains("noexcept(false)")
        }
        _ => false,
    }
}

/// The text to re-invoke a function template at emit time
/// (`geo::square<int>`). Empty for non-templates.
pub(crate) fn template_call_spelling(entity: &Entity) -> String {
    if entity.get_template().is_none() {
        return String::new();
    }
    let mut rendered = Vec::new();
    for arg in entity.get_template_arguments().unwrap_or_default() {
        match arg {
            TemplateArgument::Type(ty) => rendered.push(ty.get_display_name()),
            TemplateArgument::Integral(signed, unsigned) => {
                rendered.push(format_integral(signed, unsigned));
            }
            _ => return String::new(),
        }
    }
    format!("{}<{}>", qualified_name(entity), rendered.join(", "))
}

/// True if `decl` is a specialization of the standard callable wrapper.
pub(crate) fn is_std_function(decl: &Entity) -> bool {
    let Some(template) = decl.get_template() else {
        return false;
    };
    if template.get_name().as_deref() != Some("function") {
        return false;
    }
    let mut cursor = template.get_semantic_parent();
    while let Some(parent) = cursor {
        if parent.get_kind() == EntityKind::Namespace
            && parent.get_name().as_deref() == Some("std")
        {
            return true;
        }
        cursor = parent.get_semantic_parent();
    }
    false
}

/// `file:line` of an entity, for marker diagnostics.
pub(crate) fn site_location(entity: &Entity) -> String {
    match entity.get_location() {
        Some(location) => {
            let fl = location.get_file_location();
            let file = fl
                .file
                .map(|f| f.get_path().display().to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            format!("{file}:{}", fl.line)
        }
        None => "<unknown>".to_string(),
    }
}
