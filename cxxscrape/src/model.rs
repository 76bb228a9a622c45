//! Intermediate model types — the bridge between clang extraction and C-API emission.
//!
//! These types are clang-independent: every cross-binding link is a textual id
//! (a USR for types, a mangled symbol for callables), never a direct reference,
//! so the model can outlive the translation units it was extracted from and a
//! class may freely contain a pointer to a class that contains a pointer back.

/// Id of a bound class or struct. The value is the declaration's USR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassId(pub String);

/// Id of a bound class template specialization. The value is the USR of the
/// specialization declaration, so two spellings that canonicalize to the same
/// specialization collapse to one binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassTemplateSpecializationId(pub String);

/// Id of a bound enum. The value is the declaration's USR.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumId(pub String);

/// Id of a bound `std::function` specialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StdFunctionId(pub String);

/// Fundamental C++ types that cross the ABI directly.
///
/// Platform-width `long`/`unsigned long` never appear here: the extractor
/// normalizes them to the fixed-width builtin matching their size on the
/// platform the binding is generated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Void,
    Bool,
    /// Plain `char` where the target treats it as signed.
    CharS,
    /// Plain `char` where the target treats it as unsigned.
    CharU,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    LongLong,
    ULongLong,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Size,
    Float,
    Double,
    LongDouble,
}

/// An unqualified type: either a builtin or a reference-by-id to a bound type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Builtin(Builtin),
    Class(ClassId),
    ClassTemplateSpecialization(ClassTemplateSpecializationId),
    Enum(EnumId),
    StdFunction(StdFunctionId),
}

/// The shape of a qualified type. Recursion always travels through a box, so
/// ownership stays tree-shaped within a single `QType` value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeVariant {
    Type(TypeRef),
    Pointer(Box<QType>),
    LValueReference(Box<QType>),
    RValueReference(Box<QType>),
    /// Constant-sized array. Variable-length arrays are rejected during
    /// extraction, so `size` is always a concrete value.
    Array { element: Box<QType>, size: u64 },
}

/// A (const) qualified type.
///
/// The `const` qualifier lives outside the variant so that `const T*` and
/// `T* const` stay distinguishable: the former is a `Pointer` whose pointee
/// has `is_const`, the latter a `Pointer` that is itself `is_const`.
#[derive(Debug, Clone, PartialEq)]
pub struct QType {
    pub is_const: bool,
    pub kind: TypeVariant,
}

impl QType {
    pub fn unqualified(kind: TypeVariant) -> Self {
        QType { is_const: false, kind }
    }

    pub fn builtin(builtin: Builtin) -> Self {
        QType::unqualified(TypeVariant::Type(TypeRef::Builtin(builtin)))
    }
}

/// A template argument: a type, or an integral value kept as a decimal string
/// so the full signed/unsigned 64-bit range survives round-tripping.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateArg {
    Type(QType),
    Integral(String),
}

/// A function parameter. `name` is empty when the declaration omitted it; the
/// emitter synthesizes `arg0`, `arg1`, … at that point.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: QType,
}

/// A free function, or the function half of a bound method.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub qualified_name: String,
    pub name: String,
    /// The name the user chose for the C API. Empty means "derive one".
    pub rename: String,
    /// How the function was spelt at the binding site.
    pub spelling: String,
    /// The text to re-invoke a function template at emit time. Empty for
    /// non-templates.
    pub template_call: String,
    pub return_type: QType,
    pub params: Vec<Param>,
    /// Explicitly declared (or evaluated) not to throw.
    pub is_noexcept: bool,
}

/// A class method, as bound by the `.m()` selector.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub function: Function,
    pub is_const: bool,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_pure: bool,
}

/// A constructor, as bound by the `.ctor()` selector. Default, copy and move
/// constructors are not special here; the emitter decides how to name them
/// when `rename` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Constructor {
    pub rename: String,
    pub params: Vec<Param>,
    pub is_noexcept: bool,
}

/// Size and alignment of a record, in bytes, computed on the platform the
/// binding is generated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size_bytes: usize,
    pub align_bytes: usize,
}

/// The desired representation of a class in the C API.
///
/// * `OpaquePtr` (the default) passes pointers back and forth.
/// * `OpaqueBytes` represents the type as an opaque bag of bytes with known
///   size and alignment, passed on the stack.
/// * `ValueType` mirrors the type field-for-field in C.
///
/// The last bind-kind selector called at a binding site wins. Types that are
/// neither copyable nor moveable can only cross the ABI as `OpaquePtr`; the
/// IR still records what the user asked for, and the emitted bindings carry a
/// static assertion that fails at user-code compile time otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindKind {
    #[default]
    OpaquePtr,
    OpaqueBytes,
    ValueType,
}

/// The ten traits that determine what the emitter may safely generate for a
/// class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleOfSeven {
    pub is_copy_constructible: bool,
    pub is_nothrow_copy_constructible: bool,
    pub is_move_constructible: bool,
    pub is_nothrow_move_constructible: bool,
    pub is_copy_assignable: bool,
    pub is_nothrow_copy_assignable: bool,
    pub is_move_assignable: bool,
    pub is_nothrow_move_assignable: bool,
    pub is_destructible: bool,
    pub has_virtual_destructor: bool,
}

/// A single bound field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: QType,
}

/// A struct, class or class template specialization, bound by a
/// `cxs::Class<X>()` site.
///
/// `methods` and `constructors` hold ids into the method/constructor maps, in
/// selector order. `fields` holds only the fields the user bound with `.f()`,
/// in selector order.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub qualified_name: String,
    pub spelling: String,
    pub name: String,
    pub rename: String,
    pub template_args: Vec<TemplateArg>,
    pub methods: Vec<String>,
    pub constructors: Vec<String>,
    pub fields: Vec<Field>,
    pub layout: Layout,
    pub bind_kind: BindKind,
    pub rule_of_seven: RuleOfSeven,
    pub is_abstract: bool,
    pub id: String,
}

/// A `std::function` specialization.
///
/// Kept separate from `Class` because emission generates a function-pointer
/// typedef plus a trampoline rather than a record.
#[derive(Debug, Clone, PartialEq)]
pub struct StdFunction {
    pub spelling: String,
    pub return_type: QType,
    pub params: Vec<QType>,
}

/// A single enum variant; the value is a decimal string rendered through the
/// underlying type's signedness.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub value: String,
}

/// A bound enum type, as bound by `cxs::Enum<X>()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Enum {
    /// How the enum was spelt at the binding site.
    pub spelling: String,
    /// The name to give the enum in the C API. Empty means "derive one".
    pub rename: String,
    /// Variants in declaration order.
    pub variants: Vec<EnumVariant>,
    /// The underlying integer type (`int` in most cases).
    pub integer_type: QType,
}

/// A single module, as declared by `CXS_MODULE(name)` in the binding source.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    /// The binding source files this module was authored in.
    pub source_files: Vec<String>,
    /// Ids of the classes bound in this module, in site order.
    pub classes: Vec<String>,
    /// Ids of the free functions bound in this module, in site order.
    pub functions: Vec<String>,
    /// Ids of the `std::function` specializations bound in this module.
    pub stdfunctions: Vec<String>,
    /// Ids of the enums bound in this module, in site order.
    pub enums: Vec<String>,
    /// Namespace prefix to replace when deriving C names.
    pub namespace_from: String,
    /// Replacement for `namespace_from`.
    pub namespace_to: String,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            source_files: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            stdfunctions: Vec::new(),
            enums: Vec::new(),
            namespace_from: String::new(),
            namespace_to: String::new(),
        }
    }
}

/// A `#include` directive seen in a binding source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Inclusion {
    /// The full directive as written, e.g. `#include "points.hpp"`.
    pub directive: String,
    /// The filename as spelt inside the quotes or angle brackets.
    pub filename: String,
    /// True if the directive used `"` instead of `<`.
    pub is_local: bool,
}

/// A binding source file: the inclusions seen in it and the modules declared
/// in it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub filename: String,
    pub inclusions: Vec<Inclusion>,
    pub modules: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_lives_outside_the_variant() {
        // const T* — pointee is const
        let pointee_const = QType::unqualified(TypeVariant::Pointer(Box::new(QType {
            is_const: true,
            kind: TypeVariant::Type(TypeRef::Builtin(Builtin::Int)),
        })));
        // T* const — the pointer itself is const
        let pointer_const = QType {
            is_const: true,
            kind: TypeVariant::Pointer(Box::new(QType::builtin(Builtin::Int))),
        };
        assert_ne!(pointee_const, pointer_const);
    }

    #[test]
    fn qtype_equality_is_structural() {
        let a = QType::unqualified(TypeVariant::Array {
            element: Box::new(QType::builtin(Builtin::Float)),
            size: 3,
        });
        let b = QType::unqualified(TypeVariant::Array {
            element: Box::new(QType::builtin(Builtin::Float)),
            size: 3,
        });
        assert_eq!(a, b);
    }
}
