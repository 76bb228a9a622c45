//! The extraction context: owns every binding map, links bindings to modules,
//! and enforces the cross-reference invariants after extraction completes.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::matcher;
use crate::model::*;

/// A map that preserves insertion order on iteration while keeping O(1)
/// lookup. Emission and the debug dumps must be byte-stable across runs, so
/// every container the dump walks iterates in insertion order.
#[derive(Debug)]
pub struct OrderedMap<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T> Default for OrderedMap<T> {
    fn default() -> Self {
        OrderedMap { entries: Vec::new(), index: HashMap::new() }
    }
}

impl<T: PartialEq> OrderedMap<T> {
    pub fn new() -> Self {
        OrderedMap { entries: Vec::new(), index: HashMap::new() }
    }

    /// Insert `value` under `id`. Re-inserting identical content is a no-op;
    /// divergent content is a [`ExtractError::DuplicateBinding`]. Returns
    /// true if the value was newly inserted.
    pub fn insert(&mut self, id: &str, value: T) -> Result<bool> {
        if let Some(&slot) = self.index.get(id) {
            if self.entries[slot].1 == value {
                return Ok(false);
            }
            return Err(ExtractError::DuplicateBinding { id: id.to_string() });
        }
        self.index.insert(id.to_string(), self.entries.len());
        self.entries.push((id.to_string(), value));
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&slot| &self.entries[slot].1)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.index.get(id).map(|&slot| &mut self.entries[slot].1)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(id, value)| (id.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Non-fatal findings from the link phase.
#[derive(Debug, Default)]
pub struct LinkReport {
    pub warnings: Vec<ExtractError>,
}

/// Owns every binding produced by extraction.
///
/// Bindings are created during extraction and immutable afterwards; the only
/// mutation surface is inserting. Lookups hand out borrowed read-only views
/// that never outlive the context.
#[derive(Debug, Default)]
pub struct Context {
    classes: OrderedMap<Class>,
    methods: OrderedMap<Method>,
    constructors: OrderedMap<Constructor>,
    functions: OrderedMap<Function>,
    stdfunctions: OrderedMap<StdFunction>,
    enums: OrderedMap<Enum>,
    /// id → spelled name for every class/enum/stdfunction id seen in any
    /// extracted `QType`, bound or not. Lets the link phase name the type a
    /// missing-binding diagnostic is about.
    typenames: OrderedMap<String>,
    modules: OrderedMap<Module>,
    type_to_module: HashMap<String, String>,
    source_files: OrderedMap<SourceFile>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    /// Compile the sources named in the compiler-style command line, run the
    /// marker extraction over each translation unit in order, then run the
    /// link phase.
    ///
    /// Arguments that name a C++ source file become translation units; every
    /// other argument is handed to the AST provider verbatim. No partial
    /// context survives failure.
    pub fn compile_and_extract(arguments: &[String]) -> Result<Context> {
        let (sources, flags) = split_arguments(arguments);
        if sources.is_empty() {
            return Err(ExtractError::Provider(
                "no C++ source files in command line".to_string(),
            ));
        }

        let clang = clang::Clang::new()
            .map_err(|e| ExtractError::Provider(format!("failed to initialize libclang: {e}")))?;
        let index = clang::Index::new(&clang, false, false);

        let mut ctx = Context::new();
        for source in &sources {
            debug!(source = %source, "parsing binding source");
            let tu = index
                .parser(source.as_str())
                .arguments(&flags.iter().map(|s| s.as_str()).collect::<Vec<_>>())
                .detailed_preprocessing_record(true)
                .parse()
                .map_err(|e| ExtractError::Provider(format!("failed to parse {source}: {e:?}")))?;

            let fatal: Vec<String> = tu
                .get_diagnostics()
                .iter()
                .filter(|d| {
                    matches!(
                        d.get_severity(),
                        clang::diagnostic::Severity::Error | clang::diagnostic::Severity::Fatal
                    )
                })
                .map(|d| d.get_text())
                .collect();
            if !fatal.is_empty() {
                return Err(ExtractError::Provider(format!(
                    "{source}: {}",
                    fatal.join("; ")
                )));
            }

            matcher::extract_translation_unit(&mut ctx, &tu)?;
        }

        let report = ctx.link()?;
        for warning in &report.warnings {
            warn!(diagnostic = %warning, "link warning");
        }
        info!(
            modules = ctx.modules.len(),
            classes = ctx.classes.len(),
            functions = ctx.functions.len(),
            enums = ctx.enums.len(),
            stdfunctions = ctx.stdfunctions.len(),
            "extraction complete"
        );
        Ok(ctx)
    }

    // -----------------------------------------------------------------------
    // Modules and source files
    // -----------------------------------------------------------------------

    /// Fetch the module named `name`, creating it on first sight. A module
    /// declared in several source files accumulates all of them.
    pub fn get_or_insert_module(&mut self, name: &str, source_file: &str) -> Result<()> {
        if !self.modules.contains(name) {
            self.modules.insert(name, Module::new(name))?;
        }
        let module = self.modules.get_mut(name).expect("just inserted");
        if !module.source_files.iter().any(|f| f == source_file) {
            module.source_files.push(source_file.to_string());
        }
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub(crate) fn get_module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &Module)> {
        self.modules.iter()
    }

    pub fn num_modules(&self) -> usize {
        self.modules.len()
    }

    pub fn insert_source_file(&mut self, filename: &str, source_file: SourceFile) -> Result<()> {
        if self.source_files.contains(filename) {
            return Ok(());
        }
        self.source_files.insert(filename, source_file)?;
        Ok(())
    }

    pub fn get_source_file(&self, filename: &str) -> Option<&SourceFile> {
        self.source_files.get(filename)
    }

    pub(crate) fn get_source_file_mut(&mut self, filename: &str) -> Option<&mut SourceFile> {
        self.source_files.get_mut(filename)
    }

    pub fn source_files(&self) -> impl Iterator<Item = (&str, &SourceFile)> {
        self.source_files.iter()
    }

    // -----------------------------------------------------------------------
    // Binding insertion — monotonic, linked into a module as it lands
    // -----------------------------------------------------------------------

    fn link_into_module(&mut self, mod_id: &str, id: &str) -> Result<()> {
        if !self.modules.contains(mod_id) {
            return Err(ExtractError::Provider(format!(
                "binding `{id}` targets unknown module `{mod_id}`"
            )));
        }
        self.type_to_module
            .entry(id.to_string())
            .or_insert_with(|| mod_id.to_string());
        Ok(())
    }

    pub fn insert_class_binding(&mut self, mod_id: &str, id: &str, class: Class) -> Result<()> {
        self.record_typename(id, &class.spelling);
        let inserted = self.classes.insert(id, class)?;
        self.link_into_module(mod_id, id)?;
        let module = self.modules.get_mut(mod_id).expect("module exists");
        if inserted || !module.classes.iter().any(|c| c == id) {
            module.classes.push(id.to_string());
        }
        debug!(id = %id, module = %mod_id, "inserted class binding");
        Ok(())
    }

    pub fn insert_function_binding(
        &mut self,
        mod_id: &str,
        id: &str,
        function: Function,
    ) -> Result<()> {
        let inserted = self.functions.insert(id, function)?;
        self.link_into_module(mod_id, id)?;
        let module = self.modules.get_mut(mod_id).expect("module exists");
        if inserted || !module.functions.iter().any(|f| f == id) {
            module.functions.push(id.to_string());
        }
        debug!(id = %id, module = %mod_id, "inserted function binding");
        Ok(())
    }

    pub fn insert_stdfunction_binding(
        &mut self,
        mod_id: &str,
        id: &str,
        stdfunction: StdFunction,
    ) -> Result<()> {
        self.record_typename(id, &stdfunction.spelling);
        let inserted = self.stdfunctions.insert(id, stdfunction)?;
        self.link_into_module(mod_id, id)?;
        let module = self.modules.get_mut(mod_id).expect("module exists");
        if inserted || !module.stdfunctions.iter().any(|f| f == id) {
            module.stdfunctions.push(id.to_string());
        }
        debug!(id = %id, module = %mod_id, "inserted stdfunction binding");
        Ok(())
    }

    pub fn insert_enum_binding(&mut self, mod_id: &str, id: &str, enm: Enum) -> Result<()> {
        self.record_typename(id, &enm.spelling);
        let inserted = self.enums.insert(id, enm)?;
        self.link_into_module(mod_id, id)?;
        let module = self.modules.get_mut(mod_id).expect("module exists");
        if inserted || !module.enums.iter().any(|e| e == id) {
            module.enums.push(id.to_string());
        }
        debug!(id = %id, module = %mod_id, "inserted enum binding");
        Ok(())
    }

    /// Methods and constructors belong to a class, not a module; the owning
    /// class's id-list is appended by the matcher in selector order.
    pub fn insert_method_binding(&mut self, id: &str, method: Method) -> Result<()> {
        self.methods.insert(id, method)?;
        Ok(())
    }

    pub fn insert_constructor_binding(&mut self, id: &str, constructor: Constructor) -> Result<()> {
        self.constructors.insert(id, constructor)?;
        Ok(())
    }

    /// Remember the spelled name behind a type id for diagnostics.
    pub fn record_typename(&mut self, id: &str, spelling: &str) {
        if !self.typenames.contains(id) {
            let _ = self.typenames.insert(id, spelling.to_string());
        }
    }

    pub fn typename(&self, id: &str) -> Option<&str> {
        self.typenames.get(id).map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn has_class(&self, id: &str) -> bool {
        self.classes.contains(id)
    }

    pub fn get_class(&self, id: &str) -> Option<&Class> {
        self.classes.get(id)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &Class)> {
        self.classes.iter()
    }

    pub fn has_method(&self, id: &str) -> bool {
        self.methods.contains(id)
    }

    pub fn get_method(&self, id: &str) -> Option<&Method> {
        self.methods.get(id)
    }

    pub fn has_constructor(&self, id: &str) -> bool {
        self.constructors.contains(id)
    }

    pub fn get_constructor(&self, id: &str) -> Option<&Constructor> {
        self.constructors.get(id)
    }

    pub fn get_function(&self, id: &str) -> Option<&Function> {
        self.functions.get(id)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, &Function)> {
        self.functions.iter()
    }

    pub fn has_stdfunction(&self, id: &str) -> bool {
        self.stdfunctions.contains(id)
    }

    pub fn get_stdfunction(&self, id: &str) -> Option<&StdFunction> {
        self.stdfunctions.get(id)
    }

    pub fn stdfunctions(&self) -> impl Iterator<Item = (&str, &StdFunction)> {
        self.stdfunctions.iter()
    }

    pub fn has_enum(&self, id: &str) -> bool {
        self.enums.contains(id)
    }

    pub fn get_enum(&self, id: &str) -> Option<&Enum> {
        self.enums.get(id)
    }

    pub fn enums(&self) -> impl Iterator<Item = (&str, &Enum)> {
        self.enums.iter()
    }

    /// The module a binding id landed in, if any.
    pub fn module_of(&self, id: &str) -> Option<&str> {
        self.type_to_module.get(id).map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Link phase
    // -----------------------------------------------------------------------

    /// Verify every cross-reference invariant after extraction completes:
    /// every id referenced from a `QType` leaf, a module id-list, or a class
    /// member list resolves in the matching map, and no binding id is listed
    /// by two modules. Fatal findings aggregate into one
    /// [`ExtractError::Link`]; bind-kind policy violations come back as
    /// warnings.
    pub fn link(&self) -> std::result::Result<LinkReport, ExtractError> {
        let mut errors: Vec<ExtractError> = Vec::new();
        let mut missing_ids: Vec<String> = Vec::new();

        {
            let mut check = |qt: &QType| self.check_qtype(qt, &mut missing_ids);
            for (_, class) in self.classes.iter() {
                for arg in &class.template_args {
                    if let TemplateArg::Type(qt) = arg {
                        check(qt);
                    }
                }
                for field in &class.fields {
                    check(&field.ty);
                }
            }
            for (_, method) in self.methods.iter() {
                check(&method.function.return_type);
                for param in &method.function.params {
                    check(&param.ty);
                }
            }
            for (_, constructor) in self.constructors.iter() {
                for param in &constructor.params {
                    check(&param.ty);
                }
            }
            for (_, function) in self.functions.iter() {
                check(&function.return_type);
                for param in &function.params {
                    check(&param.ty);
                }
            }
            for (_, stdfunction) in self.stdfunctions.iter() {
                check(&stdfunction.return_type);
                for param in &stdfunction.params {
                    check(param);
                }
            }
            for (_, enm) in self.enums.iter() {
                check(&enm.integer_type);
            }
        }
        for id in missing_ids {
            let spelling = self
                .typename(&id)
                .map(str::to_string)
                .unwrap_or_else(|| id.clone());
            errors.push(ExtractError::MissingTypeBinding { spelling, id });
        }

        // Module id-lists must resolve, and an id may appear in one module only.
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for (mod_id, module) in self.modules.iter() {
            let listed = module
                .classes
                .iter()
                .map(|id| (id, self.classes.contains(id)))
                .chain(module.functions.iter().map(|id| (id, self.functions.contains(id))))
                .chain(
                    module
                        .stdfunctions
                        .iter()
                        .map(|id| (id, self.stdfunctions.contains(id))),
                )
                .chain(module.enums.iter().map(|id| (id, self.enums.contains(id))));
            for (id, resolves) in listed {
                if !resolves {
                    errors.push(ExtractError::Provider(format!(
                        "module `{mod_id}` lists unknown binding `{id}`"
                    )));
                }
                match owner.get(id.as_str()) {
                    Some(&first) if first != mod_id => {
                        errors.push(ExtractError::DuplicateBinding { id: id.clone() });
                    }
                    Some(_) => {}
                    None => {
                        owner.insert(id.as_str(), mod_id);
                    }
                }
            }
        }

        // Class member lists must resolve.
        for (id, class) in self.classes.iter() {
            for method_id in &class.methods {
                if !self.methods.contains(method_id) {
                    errors.push(ExtractError::Provider(format!(
                        "class `{id}` lists unknown method `{method_id}`"
                    )));
                }
            }
            for ctor_id in &class.constructors {
                if !self.constructors.contains(ctor_id) {
                    errors.push(ExtractError::Provider(format!(
                        "class `{id}` lists unknown constructor `{ctor_id}`"
                    )));
                }
            }
        }

        let mut report = LinkReport::default();
        for (_, class) in self.classes.iter() {
            let r7 = &class.rule_of_seven;
            if class.bind_kind != BindKind::OpaquePtr
                && !(r7.is_copy_constructible && r7.is_move_constructible)
            {
                report.warnings.push(ExtractError::InvalidBindKind {
                    class: class.spelling.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(report)
        } else {
            Err(ExtractError::Link(errors))
        }
    }

    fn check_qtype(&self, qt: &QType, missing: &mut Vec<String>) {
        let mut push_missing = |id: &str| {
            if !missing.iter().any(|m| m == id) {
                missing.push(id.to_string());
            }
        };
        match &qt.kind {
            TypeVariant::Type(TypeRef::Builtin(_)) => {}
            TypeVariant::Type(TypeRef::Class(id)) => {
                if !self.classes.contains(&id.0) {
                    push_missing(&id.0);
                }
            }
            TypeVariant::Type(TypeRef::ClassTemplateSpecialization(id)) => {
                if !self.classes.contains(&id.0) {
                    push_missing(&id.0);
                }
            }
            TypeVariant::Type(TypeRef::Enum(id)) => {
                if !self.enums.contains(&id.0) {
                    push_missing(&id.0);
                }
            }
            TypeVariant::Type(TypeRef::StdFunction(id)) => {
                if !self.stdfunctions.contains(&id.0) {
                    push_missing(&id.0);
                }
            }
            TypeVariant::Pointer(pointee)
            | TypeVariant::LValueReference(pointee)
            | TypeVariant::RValueReference(pointee) => self.check_qtype(pointee, missing),
            TypeVariant::Array { element, .. } => self.check_qtype(element, missing),
        }
    }
}

/// Split a compiler-style command line into source files and provider flags.
fn split_arguments(arguments: &[String]) -> (Vec<String>, Vec<String>) {
    const SOURCE_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c++", "C"];
    let mut sources = Vec::new();
    let mut flags = Vec::new();
    for arg in arguments {
        let is_source = !arg.starts_with('-')
            && std::path::Path::new(arg)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e));
        if is_source {
            sources.push(arg.clone());
        } else {
            flags.push(arg.clone());
        }
    }
    (sources, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_class(id: &str, spelling: &str) -> Class {
        Class {
            qualified_name: spelling.to_string(),
            spelling: spelling.to_string(),
            name: spelling.rsplit("::").next().unwrap_or(spelling).to_string(),
            rename: String::new(),
            template_args: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            fields: Vec::new(),
            layout: Layout { size_bytes: 4, align_bytes: 4 },
            bind_kind: BindKind::OpaquePtr,
            rule_of_seven: RuleOfSeven {
                is_copy_constructible: true,
                is_move_constructible: true,
                is_destructible: true,
                ..Default::default()
            },
            is_abstract: false,
            id: id.to_string(),
        }
    }

    fn context_with_module(name: &str) -> Context {
        let mut ctx = Context::new();
        ctx.get_or_insert_module(name, "bind.cpp").unwrap();
        ctx
    }

    #[test]
    fn ordered_map_iterates_in_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("zebra", 1).unwrap();
        map.insert("apple", 2).unwrap();
        map.insert("mango", 3).unwrap();
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["zebra", "apple", "mango"]);
    }

    #[test]
    fn identical_reinsert_is_a_noop() {
        let mut ctx = context_with_module("test");
        ctx.insert_class_binding("test", "c:@S@Foo", test_class("c:@S@Foo", "Foo"))
            .unwrap();
        ctx.insert_class_binding("test", "c:@S@Foo", test_class("c:@S@Foo", "Foo"))
            .unwrap();
        let module = ctx.get_module("test").unwrap();
        assert_eq!(module.classes, ["c:@S@Foo"]);
    }

    #[test]
    fn divergent_reinsert_is_a_duplicate() {
        let mut ctx = context_with_module("test");
        ctx.insert_class_binding("test", "c:@S@Foo", test_class("c:@S@Foo", "Foo"))
            .unwrap();
        let mut divergent = test_class("c:@S@Foo", "Foo");
        divergent.rename = "Renamed".to_string();
        let err = ctx
            .insert_class_binding("test", "c:@S@Foo", divergent)
            .unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateBinding { id } if id == "c:@S@Foo"));
    }

    #[test]
    fn link_reports_missing_type_binding_by_spelling() {
        let mut ctx = context_with_module("test");
        let mut holder = test_class("c:@S@Holder", "Holder");
        holder.fields.push(Field {
            name: "b".to_string(),
            ty: QType::unqualified(TypeVariant::Type(TypeRef::Class(ClassId(
                "c:@S@Bar".to_string(),
            )))),
        });
        ctx.record_typename("c:@S@Bar", "Bar");
        ctx.insert_class_binding("test", "c:@S@Holder", holder).unwrap();

        let err = ctx.link().unwrap_err();
        let ExtractError::Link(errors) = err else {
            panic!("expected aggregate link error");
        };
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ExtractError::MissingTypeBinding { spelling, id }
                if spelling == "Bar" && id == "c:@S@Bar"
        ));
    }

    #[test]
    fn link_resolves_types_reachable_through_indirection() {
        let mut ctx = context_with_module("test");
        let mut a = test_class("c:@S@A", "A");
        // A holds a B*, B holds an A* — cycles travel through ids.
        a.fields.push(Field {
            name: "b".to_string(),
            ty: QType::unqualified(TypeVariant::Pointer(Box::new(QType::unqualified(
                TypeVariant::Type(TypeRef::Class(ClassId("c:@S@B".to_string()))),
            )))),
        });
        let mut b = test_class("c:@S@B", "B");
        b.fields.push(Field {
            name: "a".to_string(),
            ty: QType::unqualified(TypeVariant::Pointer(Box::new(QType::unqualified(
                TypeVariant::Type(TypeRef::Class(ClassId("c:@S@A".to_string()))),
            )))),
        });
        ctx.insert_class_binding("test", "c:@S@A", a).unwrap();
        ctx.insert_class_binding("test", "c:@S@B", b).unwrap();
        assert!(ctx.link().is_ok());
    }

    #[test]
    fn link_rejects_an_id_listed_by_two_modules() {
        let mut ctx = context_with_module("one");
        ctx.get_or_insert_module("two", "bind.cpp").unwrap();
        ctx.insert_class_binding("one", "c:@S@Foo", test_class("c:@S@Foo", "Foo"))
            .unwrap();
        // Same content, second module: the map insert is a no-op but the
        // second module still lists the id.
        ctx.insert_class_binding("two", "c:@S@Foo", test_class("c:@S@Foo", "Foo"))
            .unwrap();
        let err = ctx.link().unwrap_err();
        let ExtractError::Link(errors) = err else {
            panic!("expected aggregate link error");
        };
        assert!(errors
            .iter()
            .any(|e| matches!(e, ExtractError::DuplicateBinding { id } if id == "c:@S@Foo")));
    }

    #[test]
    fn value_type_without_copy_and_move_is_a_warning_not_an_error() {
        let mut ctx = context_with_module("test");
        let mut counter = test_class("c:@S@Counter", "Counter");
        counter.bind_kind = BindKind::ValueType;
        counter.rule_of_seven.is_copy_constructible = false;
        ctx.insert_class_binding("test", "c:@S@Counter", counter).unwrap();

        let report = ctx.link().expect("invalid bind kind must not fail the link");
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            ExtractError::InvalidBindKind { class } if class == "Counter"
        ));
    }

    #[test]
    fn split_arguments_separates_sources_from_flags() {
        let args: Vec<String> = ["bind.cpp", "-I", "include", "-std=c++17", "extra.cc"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (sources, flags) = split_arguments(&args);
        assert_eq!(sources, ["bind.cpp", "extra.cc"]);
        assert_eq!(flags, ["-I", "include", "-std=c++17"]);
    }
}
