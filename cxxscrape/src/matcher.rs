//! Marker recognition — walks the binding source AST, recognizes the marker
//! constructs, and routes each hit into the extractors.
//!
//! The marker surface lives in the header the binding author includes:
//! `CXS_MODULE(name)` expands to a function named `cxs_module_<name>`, and
//! binding sites are expressions over the `cxs` namespace — `cxs::Class<T>`
//! with chained selectors, `cxs::Enum<E>`, `cxs::fn(&f)`, and
//! `cxs::rewrite_namespace("from", "to")`. Sites are processed in source
//! order; selector order within a site is preserved.

use std::collections::HashMap;

use clang::{Entity, EntityKind, EvaluationResult, TemplateArgument, TranslationUnit, TypeKind};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{ExtractError, Result};
use crate::extract::{
    is_std_function, qualified_name, site_location, synthesize_constructor,
    template_call_spelling, usr_of,
};
use crate::model::*;

const MODULE_PREFIX: &str = "cxs_module_";
const MARKER_NAMESPACE: &str = "cxs";

/// Process one parsed binding source translation unit.
pub(crate) fn extract_translation_unit(ctx: &mut Context, tu: &TranslationUnit) -> Result<()> {
    let root = tu.get_entity();
    let inclusions = collect_inclusions(&root);
    walk_decls(ctx, &root, &inclusions)
}

// ---------------------------------------------------------------------------
// Module discovery
// ---------------------------------------------------------------------------

fn walk_decls(
    ctx: &mut Context,
    entity: &Entity,
    inclusions: &HashMap<String, Vec<Inclusion>>,
) -> Result<()> {
    for child in entity.get_children() {
        match child.get_kind() {
            EntityKind::FunctionDecl => {
                if let Some(name) = child.get_name()
                    && let Some(module_name) = name.strip_prefix(MODULE_PREFIX)
                    && child.is_definition()
                {
                    process_module(ctx, &child, module_name, inclusions)?;
                }
            }
            EntityKind::Namespace | EntityKind::UnexposedDecl => {
                walk_decls(ctx, &child, inclusions)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn process_module(
    ctx: &mut Context,
    func: &Entity,
    module_name: &str,
    inclusions: &HashMap<String, Vec<Inclusion>>,
) -> Result<()> {
    let filename = file_of(func);
    ctx.get_or_insert_module(module_name, &filename)?;
    if ctx.get_source_file(&filename).is_none() {
        ctx.insert_source_file(
            &filename,
            SourceFile {
                filename: filename.clone(),
                inclusions: inclusions.get(&filename).cloned().unwrap_or_default(),
                modules: Vec::new(),
            },
        )?;
    }
    if let Some(source_file) = ctx.get_source_file_mut(&filename)
        && !source_file.modules.iter().any(|m| m == module_name)
    {
        source_file.modules.push(module_name.to_string());
    }
    debug!(module = %module_name, file = %filename, "found module declaration");

    let Some(body) = func
        .get_children()
        .into_iter()
        .find(|c| c.get_kind() == EntityKind::CompoundStmt)
    else {
        return Ok(());
    };
    for stmt in body.get_children() {
        walk_region(ctx, module_name, &stmt)?;
    }
    Ok(())
}

/// Find binding sites in source order. A recognized chain is consumed whole;
/// anything else is descended into.
fn walk_region(ctx: &mut Context, module: &str, entity: &Entity) -> Result<()> {
    if let Some((anchor, selectors)) = unwind_chain(entity) {
        return dispatch_site(ctx, module, anchor, &selectors);
    }
    for child in entity.get_children() {
        walk_region(ctx, module, &child)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Chain unwinding
// ---------------------------------------------------------------------------

/// One selector call chained onto a class binding site, e.g. `.m(&Foo::bar)`.
struct SelectorCall<'tu> {
    name: String,
    args: Vec<Entity<'tu>>,
    site: Entity<'tu>,
}

/// The innermost expression a selector chain hangs off.
enum Anchor<'tu> {
    Class { record: Entity<'tu>, site: Entity<'tu>, args: Vec<Entity<'tu>> },
    Enum { record: Entity<'tu>, site: Entity<'tu>, args: Vec<Entity<'tu>> },
    Fn { site: Entity<'tu>, args: Vec<Entity<'tu>> },
    Rewrite { site: Entity<'tu>, args: Vec<Entity<'tu>> },
}

/// Walk a call chain from the outermost call down to its anchor, collecting
/// selector calls on the way. Returns selectors in source order.
fn unwind_chain<'tu>(entity: &Entity<'tu>) -> Option<(Anchor<'tu>, Vec<SelectorCall<'tu>>)> {
    let mut selectors = Vec::new();
    let mut cur = peel(*entity);
    loop {
        if cur.get_kind() != EntityKind::CallExpr {
            return None;
        }
        let callee = cur.get_reference()?;
        let args = cur.get_arguments().unwrap_or_default();
        match callee.get_kind() {
            EntityKind::Method => {
                let record = callee.get_semantic_parent()?;
                if marker_template(&record) != Some("Class") {
                    return None;
                }
                selectors.push(SelectorCall {
                    name: callee.get_name().unwrap_or_default(),
                    args,
                    site: cur,
                });
                // The callee member-ref's first child is the object expression.
                let member_ref = cur
                    .get_children()
                    .into_iter()
                    .find(|c| c.get_kind() == EntityKind::MemberRefExpr)?;
                let base = member_ref.get_children().into_iter().next()?;
                cur = peel(base);
            }
            EntityKind::Constructor => {
                let record = callee.get_semantic_parent()?;
                return anchor_for(record, cur, args, selectors);
            }
            EntityKind::StructDecl | EntityKind::ClassDecl => {
                return anchor_for(callee, cur, args, selectors);
            }
            EntityKind::FunctionDecl => {
                if !in_marker_namespace(&callee) {
                    return None;
                }
                selectors.reverse();
                return match callee.get_name().as_deref() {
                    Some("fn") => Some((Anchor::Fn { site: cur, args }, selectors)),
                    Some("rewrite_namespace") => {
                        Some((Anchor::Rewrite { site: cur, args }, selectors))
                    }
                    _ => None,
                };
            }
            _ => return None,
        }
    }
}

fn anchor_for<'tu>(
    record: Entity<'tu>,
    site: Entity<'tu>,
    args: Vec<Entity<'tu>>,
    mut selectors: Vec<SelectorCall<'tu>>,
) -> Option<(Anchor<'tu>, Vec<SelectorCall<'tu>>)> {
    selectors.reverse();
    match marker_template(&record)? {
        "Class" => Some((Anchor::Class { record, site, args }, selectors)),
        "Enum" => Some((Anchor::Enum { record, site, args }, selectors)),
        _ => None,
    }
}

fn peel(entity: Entity) -> Entity {
    let mut cur = entity;
    loop {
        match cur.get_kind() {
            EntityKind::UnexposedExpr | EntityKind::ParenExpr => {
                let children = cur.get_children();
                if children.len() == 1 {
                    cur = children[0];
                } else {
                    return cur;
                }
            }
            _ => return cur,
        }
    }
}

/// Name of the marker template this record specializes, if any.
fn marker_template(record: &Entity) -> Option<&'static str> {
    let template = record.get_template()?;
    if !in_marker_namespace(&template) {
        return None;
    }
    match template.get_name()?.as_str() {
        "Class" => Some("Class"),
        "Enum" => Some("Enum"),
        "Ctor" => Some("Ctor"),
        _ => None,
    }
}

fn in_marker_namespace(entity: &Entity) -> bool {
    matches!(entity.get_semantic_parent(), Some(parent)
        if parent.get_kind() == EntityKind::Namespace
            && parent.get_name().as_deref() == Some(MARKER_NAMESPACE))
}

// ---------------------------------------------------------------------------
// Site dispatch
// ---------------------------------------------------------------------------

fn dispatch_site(
    ctx: &mut Context,
    module: &str,
    anchor: Anchor,
    selectors: &[SelectorCall],
) -> Result<()> {
    match anchor {
        Anchor::Class { record, site, args } => {
            process_class_site(ctx, module, &record, &site, &args, selectors)
        }
        Anchor::Enum { record, site, args } => {
            process_enum_site(ctx, module, &record, &site, &args)
        }
        Anchor::Fn { site, args } => process_fn_site(ctx, module, &site, &args),
        Anchor::Rewrite { site, args } => process_rewrite_site(ctx, module, &site, &args),
    }
}

fn process_class_site(
    ctx: &mut Context,
    module: &str,
    record: &Entity,
    site: &Entity,
    anchor_args: &[Entity],
    selectors: &[SelectorCall],
) -> Result<()> {
    let marker_args = record
        .get_template_arguments()
        .ok_or_else(|| malformed(site, "marker carries no template arguments"))?;
    let written = match marker_args.first() {
        Some(TemplateArgument::Type(ty)) => *ty,
        _ => return Err(malformed(site, "first marker argument must be the bound type")),
    };
    let (rule_of_seven, is_abstract) = trait_probes(&marker_args)
        .ok_or_else(|| malformed(site, "trait probes missing from marker arguments"))?;

    let rename = eval_string_arg(anchor_args.first()).unwrap_or_default();
    let spelling = written.get_display_name();
    let canonical = written.get_canonical_type();
    let decl = canonical
        .get_declaration()
        .ok_or_else(|| malformed(site, "bound type is not a class or struct"))?;

    if is_std_function(&decl) {
        let id = usr_of(&decl)?;
        if !selectors.is_empty() {
            warn!(spelling = %spelling, "selectors on a callable wrapper binding are ignored");
        }
        let stdfunction = ctx.extract_stdfunction_binding(&decl, &spelling)?;
        ctx.insert_stdfunction_binding(module, &id, stdfunction)?;
        return Ok(());
    }

    let layout = Layout {
        size_bytes: canonical
            .get_sizeof()
            .map_err(|e| ExtractError::Provider(format!("sizeof `{spelling}`: {e:?}")))?,
        align_bytes: canonical
            .get_alignof()
            .map_err(|e| ExtractError::Provider(format!("alignof `{spelling}`: {e:?}")))?,
    };
    let bind_kind = fold_bind_kind(selectors.iter().map(|s| s.name.as_str()));

    let mut class = ctx.extract_class_binding(
        &decl,
        &written,
        &spelling,
        &rename,
        layout,
        bind_kind,
        rule_of_seven,
        is_abstract,
    )?;
    let class_id = class.id.clone();

    // Build members before inserting anything, so a failing selector leaves
    // the context untouched.
    let mut methods: Vec<(String, Method)> = Vec::new();
    let mut constructors: Vec<(String, Constructor)> = Vec::new();
    for selector in selectors {
        match selector.name.as_str() {
            "m" => {
                let (id, method) = process_method_selector(ctx, selector)?;
                class.methods.push(id.clone());
                methods.push((id, method));
            }
            "ctor" => {
                let (id, constructor) = process_ctor_selector(ctx, &decl, &class_id, selector)?;
                class.constructors.push(id.clone());
                constructors.push((id, constructor));
            }
            "f" => {
                let field = process_field_selector(ctx, selector)?;
                class.fields.push(field);
            }
            "opaque_ptr" | "opaque_bytes" | "value_type" => {}
            other => {
                return Err(malformed(&selector.site, &format!("unknown selector `{other}`")));
            }
        }
    }

    for (id, method) in methods {
        ctx.insert_method_binding(&id, method)?;
    }
    for (id, constructor) in constructors {
        ctx.insert_constructor_binding(&id, constructor)?;
    }
    ctx.insert_class_binding(module, &class_id, class)
}

fn process_method_selector(
    ctx: &mut Context,
    selector: &SelectorCall,
) -> Result<(String, Method)> {
    let target = resolve_decl_ref(selector.args.first(), &selector.site)?;
    if target.get_kind() != EntityKind::Method {
        return Err(malformed(
            &selector.site,
            "`.m()` expects a pointer to a member function",
        ));
    }
    let rename = eval_string_arg(selector.args.get(1)).unwrap_or_default();
    let template_call = template_call_spelling(&target);
    let method = ctx.extract_method_binding(&target, &rename, &template_call)?;
    Ok((callable_id(&target)?, method))
}

fn process_ctor_selector(
    ctx: &mut Context,
    class_decl: &Entity,
    class_id: &str,
    selector: &SelectorCall,
) -> Result<(String, Constructor)> {
    let tag = selector
        .args
        .first()
        .map(|a| peel(*a))
        .ok_or_else(|| malformed(&selector.site, "`.ctor()` expects a cxs::Ctor<...> signature"))?;
    let tag_record = tag
        .get_reference()
        .and_then(|r| r.get_semantic_parent())
        .filter(|record| marker_template(record) == Some("Ctor"));
    if tag_record.is_none() {
        return Err(malformed(&selector.site, "`.ctor()` expects a cxs::Ctor<...> signature"));
    }
    let tag_ty = tag
        .get_type()
        .ok_or_else(|| malformed(&selector.site, "constructor signature has no type"))?;
    let arg_types: Vec<clang::Type> = tag_ty
        .get_template_argument_types()
        .unwrap_or_default()
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| {
            malformed(&selector.site, "constructor signature must be a list of types")
        })?;

    let mut param_names = Vec::new();
    for arg in tag.get_arguments().unwrap_or_default() {
        if let Some(name) = eval_string(&arg) {
            param_names.push(name);
        }
    }
    let rename = eval_string_arg(selector.args.get(1)).unwrap_or_default();

    // Prefer a declared constructor with a matching parameter list; its
    // mangled symbol is the id and its noexcept carries over.
    let declared = class_decl.get_children().into_iter().find(|child| {
        child.get_kind() == EntityKind::Constructor && {
            let params = child.get_arguments().unwrap_or_default();
            params.len() == arg_types.len()
                && params.iter().zip(&arg_types).all(|(param, ty)| {
                    param
                        .get_type()
                        .map(|pt| pt.get_canonical_type() == ty.get_canonical_type())
                        .unwrap_or(false)
                })
        }
    });

    match declared {
        Some(decl) => {
            let constructor = ctx.extract_constructor_binding(&decl, &param_names, &rename)?;
            Ok((callable_id(&decl)?, constructor))
        }
        None => {
            // Implicit default/copy/move constructor: no declaration exists,
            // so derive a deterministic id from the class id and signature.
            let mut types = Vec::new();
            let mut spellings = Vec::new();
            for ty in &arg_types {
                types.push(ctx.extract_qtype(ty)?);
                spellings.push(ty.get_display_name());
            }
            let id = format!("{class_id}#ctor({})", spellings.join(", "));
            Ok((id, synthesize_constructor(types, &param_names, &rename)))
        }
    }
}

fn process_field_selector(ctx: &mut Context, selector: &SelectorCall) -> Result<Field> {
    let target = resolve_decl_ref(selector.args.first(), &selector.site)?;
    if target.get_kind() != EntityKind::FieldDecl {
        return Err(malformed(
            &selector.site,
            "`.f()` expects a pointer to a data member",
        ));
    }
    let ty = target
        .get_type()
        .ok_or_else(|| ExtractError::Provider("field has no type".to_string()))?;
    Ok(Field {
        name: target.get_name().unwrap_or_default(),
        ty: ctx.extract_qtype(&ty)?,
    })
}

fn process_enum_site(
    ctx: &mut Context,
    module: &str,
    record: &Entity,
    site: &Entity,
    anchor_args: &[Entity],
) -> Result<()> {
    let marker_args = record
        .get_template_arguments()
        .ok_or_else(|| malformed(site, "marker carries no template arguments"))?;
    let written = match marker_args.first() {
        Some(TemplateArgument::Type(ty)) => *ty,
        _ => return Err(malformed(site, "first marker argument must be the bound enum")),
    };
    let rename = eval_string_arg(anchor_args.first()).unwrap_or_default();
    let spelling = written.get_display_name();
    let canonical = written.get_canonical_type();
    if canonical.get_kind() != TypeKind::Enum {
        return Err(malformed(site, "bound type is not an enum"));
    }
    let decl = canonical
        .get_declaration()
        .ok_or_else(|| malformed(site, "enum has no declaration"))?;
    let id = usr_of(&decl)?;
    let enm = ctx.extract_enum_binding(&decl, &spelling, &rename)?;
    ctx.insert_enum_binding(module, &id, enm)
}

fn process_fn_site(
    ctx: &mut Context,
    module: &str,
    site: &Entity,
    args: &[Entity],
) -> Result<()> {
    let target = resolve_decl_ref(args.first(), site)?;
    if target.get_kind() == EntityKind::Method {
        return Err(malformed(site, "bind member functions with `.m()`, not `cxs::fn()`"));
    }
    if target.get_kind() != EntityKind::FunctionDecl {
        return Err(malformed(site, "`cxs::fn()` expects a pointer to a free function"));
    }
    let rename = eval_string_arg(args.get(1)).unwrap_or_default();
    let template_call = template_call_spelling(&target);
    let spelling = if template_call.is_empty() {
        qualified_name(&target)
    } else {
        template_call.clone()
    };
    let function = ctx.extract_function_binding(&target, &rename, &spelling, &template_call)?;
    ctx.insert_function_binding(module, &callable_id(&target)?, function)
}

fn process_rewrite_site(
    ctx: &mut Context,
    module: &str,
    site: &Entity,
    args: &[Entity],
) -> Result<()> {
    let from = eval_string_arg(args.first())
        .ok_or_else(|| malformed(site, "rewrite_namespace expects two string literals"))?;
    let to = eval_string_arg(args.get(1))
        .ok_or_else(|| malformed(site, "rewrite_namespace expects two string literals"))?;
    let module = ctx
        .get_module_mut(module)
        .ok_or_else(|| ExtractError::Provider(format!("unknown module `{module}`")))?;
    module.namespace_from = from;
    module.namespace_to = to;
    Ok(())
}

// ---------------------------------------------------------------------------
// Expression helpers
// ---------------------------------------------------------------------------

/// The last bind-kind selector in source order wins; the default is
/// an opaque pointer.
fn fold_bind_kind<'a>(names: impl Iterator<Item = &'a str>) -> BindKind {
    let mut kind = BindKind::OpaquePtr;
    for name in names {
        match name {
            "opaque_ptr" => kind = BindKind::OpaquePtr,
            "opaque_bytes" => kind = BindKind::OpaqueBytes,
            "value_type" => kind = BindKind::ValueType,
            _ => {}
        }
    }
    kind
}

/// Read the rule-of-seven probes and `is_abstract` from the trailing
/// integral marker arguments.
fn trait_probes(args: &[TemplateArgument]) -> Option<(RuleOfSeven, bool)> {
    if args.len() < 12 {
        return None;
    }
    let mut probes = [false; 11];
    for (slot, arg) in probes.iter_mut().zip(&args[1..12]) {
        match arg {
            TemplateArgument::Integral(signed, _) => *slot = *signed != 0,
            _ => return None,
        }
    }
    let [cc, ncc, mc, nmc, ca, nca, ma, nma, dtor, vdtor, is_abstract] = probes;
    Some((
        RuleOfSeven {
            is_copy_constructible: cc,
            is_nothrow_copy_constructible: ncc,
            is_move_constructible: mc,
            is_nothrow_move_constructible: nmc,
            is_copy_assignable: ca,
            is_nothrow_copy_assignable: nca,
            is_move_assignable: ma,
            is_nothrow_move_assignable: nma,
            is_destructible: dtor,
            has_virtual_destructor: vdtor,
        },
        is_abstract,
    ))
}

/// Resolve a `&name` argument to the declaration it refers to. A cast picks
/// one overload; an unresolved overload set is a marker error.
fn resolve_decl_ref<'tu>(arg: Option<&Entity<'tu>>, site: &Entity<'tu>) -> Result<Entity<'tu>> {
    let arg = arg.ok_or_else(|| malformed(site, "missing declaration reference argument"))?;
    let reference = find_decl_ref(peel(*arg))
        .ok_or_else(|| malformed(site, "expected a pointer to a declaration"))?;
    match reference.get_kind() {
        EntityKind::DeclRefExpr | EntityKind::MemberRefExpr => reference
            .get_reference()
            .ok_or_else(|| malformed(site, "unresolved declaration reference")),
        EntityKind::OverloadedDeclRef => {
            let candidates = reference.get_overloaded_declarations().unwrap_or_default();
            match candidates.as_slice() {
                [single] => Ok(*single),
                _ => Err(malformed(
                    site,
                    "ambiguous overload — cast the pointer to select one",
                )),
            }
        }
        _ => Err(malformed(site, "expected a pointer to a declaration")),
    }
}

fn find_decl_ref(entity: Entity) -> Option<Entity> {
    if matches!(
        entity.get_kind(),
        EntityKind::DeclRefExpr | EntityKind::MemberRefExpr | EntityKind::OverloadedDeclRef
    ) {
        return Some(entity);
    }
    for child in entity.get_children() {
        if let Some(found) = find_decl_ref(child) {
            return Some(found);
        }
    }
    None
}

fn eval_string_arg(arg: Option<&Entity>) -> Option<String> {
    arg.and_then(eval_string)
}

fn eval_string(entity: &Entity) -> Option<String> {
    let literal = find_string_literal(peel(*entity))?;
    match literal.evaluate()? {
        EvaluationResult::String(s) | EvaluationResult::Other(s) => {
            Some(s.to_string_lossy().into_owned())
        }
        _ => None,
    }
}

fn find_string_literal(entity: Entity) -> Option<Entity> {
    if entity.get_kind() == EntityKind::StringLiteral {
        return Some(entity);
    }
    for child in entity.get_children() {
        if let Some(found) = find_string_literal(child) {
            return Some(found);
        }
    }
    None
}

/// Id of a bound callable: the mangled symbol of the specific overload.
fn callable_id(entity: &Entity) -> Result<String> {
    match entity.get_mangled_name() {
        Some(mangled) => Ok(mangled),
        None => usr_of(entity),
    }
}

fn file_of(entity: &Entity) -> String {
    entity
        .get_location()
        .and_then(|l| l.get_file_location().file)
        .map(|f| f.get_path().display().to_string())
        .unwrap_or_default()
}

fn malformed(site: &Entity, reason: &str) -> ExtractError {
    ExtractError::MalformedMarker {
        location: site_location(site),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Inclusion directives
// ---------------------------------------------------------------------------

/// Gather `#include` directives per including file. Requires the parser's
/// detailed preprocessing record.
fn collect_inclusions(root: &Entity) -> HashMap<String, Vec<Inclusion>> {
    let mut map: HashMap<String, Vec<Inclusion>> = HashMap::new();
    for child in root.get_children() {
        if child.get_kind() != EntityKind::InclusionDirective {
            continue;
        }
        let Some(file) = child.get_location().and_then(|l| l.get_file_location().file) else {
            continue;
        };
        let includer = file.get_path().display().to_string();
        let filename = child.get_name().unwrap_or_default();
        let is_local = child
            .get_range()
            .map(|range| {
                range
                    .tokenize()
                    .iter()
                    .any(|token| token.get_spelling().starts_with('"'))
            })
            .unwrap_or(false);
        let directive = if is_local {
            format!("#include \"{filename}\"")
        } else {
            format!("#include <{filename}>")
        };
        map.entry(includer).or_default().push(Inclusion {
            directive,
            filename,
            is_local,
        });
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_kind_last_selector_wins() {
        let chain = ["opaque_ptr", "value_type", "opaque_bytes"];
        assert_eq!(fold_bind_kind(chain.into_iter()), BindKind::OpaqueBytes);
    }

    #[test]
    fn bind_kind_defaults_to_opaque_ptr() {
        assert_eq!(fold_bind_kind(std::iter::empty()), BindKind::OpaquePtr);
        assert_eq!(
            fold_bind_kind(["m", "ctor", "f"].into_iter()),
            BindKind::OpaquePtr
        );
    }
}
