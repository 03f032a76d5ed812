use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use crate::ast::ImportPath;
use crate::environment::ContextId;
use crate::error::{type_error, ErrorKind, RuntimeError};
use crate::object::Value;

pub const EXTENSION: &str = "crv";

/// Name under which a module may restrict what it exports.
pub const EXPORTS: &str = "exports";

/// A piece of source code, kept around so stack traces can quote it.
#[derive(Debug)]
pub struct SourceUnit {
    pub name: String,
    pub source: Option<Rc<str>>,
}

impl SourceUnit {
    pub fn new(name: &str, source: Option<&str>) -> Self {
        Self { name: name.to_owned(), source: source.map(Rc::from) }
    }

    /// The 1-based `line` without surrounding whitespace.
    pub fn line(&self, line: u32) -> Option<&str> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.source.as_deref()?.lines().nth(index).map(str::trim)
    }
}

pub struct Module {
    pub name: String,
    pub path: PathBuf,
    /// The importing module. Root modules have none.
    pub parent: Option<Rc<Module>>,
    /// Owns the module's top-level scope.
    pub context: ContextId,
    pub unit: Rc<SourceUnit>,
    exports: RefCell<HashMap<String, Value>>,
}

impl Module {
    pub fn new(path: PathBuf, parent: Option<Rc<Module>>, context: ContextId, unit: Rc<SourceUnit>) -> Self {
        let mut name = binding_name(&path);
        if name.is_empty() {
            name = unit.name.clone();
        }
        Self { name, path, parent, context, unit, exports: RefCell::new(HashMap::new()) }
    }

    /// Directory relative imports of this module resolve against.
    pub fn directory(&self) -> PathBuf {
        self.path.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    /// Whether `path` is this module or one of the modules that (transitively) imported it.
    pub fn in_import_chain(&self, path: &Path) -> bool {
        let mut current = Some(self);
        while let Some(module) = current {
            if module.path == path {
                return true;
            }
            current = module.parent.as_deref();
        }
        false
    }

    pub fn get_export(&self, name: &str) -> Option<Value> {
        self.exports.borrow().get(name).cloned()
    }

    pub fn export_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.exports.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn set_exports(&self, exports: HashMap<String, Value>) {
        *self.exports.borrow_mut() = exports;
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("parent", &self.parent.as_ref().map(|p| p.path.clone()))
            .finish()
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<module {}>", self.name)
    }
}

/// Where module source comes from.
pub trait SourceLoader {
    fn load(&self, path: &Path) -> std::io::Result<String>;
}

#[derive(Debug, Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn load(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory sources, recording every load.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
    loads: Rc<RefCell<Vec<PathBuf>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, source: &str) -> Self {
        self.files.insert(normalize_path(&path.into()), source.to_owned());
        self
    }

    /// Shared log of the paths loaded so far, usable after the loader moved into an interpreter.
    pub fn load_log(&self) -> Rc<RefCell<Vec<PathBuf>>> {
        self.loads.clone()
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, path: &Path) -> std::io::Result<String> {
        self.loads.borrow_mut().push(path.to_path_buf());
        self.files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no such module: {}", path.display()))
        })
    }
}

/// Lexical normalization: drops `.` and folds `..` without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            _ => result.push(component),
        }
    }
    result
}

fn with_extension(mut path: PathBuf) -> PathBuf {
    if path.extension().map_or(true, |ext| ext != EXTENSION) {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".");
        name.push(EXTENSION);
        path.set_file_name(name);
    }
    path
}

/// Canonical form of a module path: the `.crv` extension rule, then lexical normalization.
/// Root modules go through it too, so imports that lead back to them are recognised.
pub fn canonical_path(path: &Path) -> PathBuf {
    normalize_path(&with_extension(path.to_path_buf()))
}

/// Canonical path of an import seen from `importer`.
pub fn resolve(path: &ImportPath, importer: Option<&Module>, stdlib_root: &Path) -> PathBuf {
    let full = match path {
        ImportPath::Relative(relative) => {
            let base = importer.map(Module::directory).unwrap_or_default();
            base.join(relative)
        }
        ImportPath::Standard(parts) => {
            let mut full = stdlib_root.to_path_buf();
            full.extend(parts);
            full
        }
    };
    canonical_path(&full)
}

/// Name an import is bound to when it has no `as` alias.
pub fn binding_name(resolved: &Path) -> String {
    resolved.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
}

pub fn cyclic_import(path: &Path) -> RuntimeError {
    RuntimeError::new(ErrorKind::Import, format!("cyclic import of '{}'", path.display()))
}

/// Exports of a module given its top-level bindings. An `exports` list restricts them.
pub fn compute_exports(mut bindings: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
    let names = match bindings.get(EXPORTS) {
        None => return Ok(bindings),
        Some(Value::List(names)) => names.borrow().clone(),
        Some(Value::Tuple(names)) => names.to_vec(),
        Some(other) => {
            return Err(type_error(format!("exports must be a list of str, not {}", other.type_name())))
        }
    };

    let mut exports = HashMap::new();
    for entry in &names {
        let Value::Str(name) = entry else {
            return Err(type_error(format!("exports must be a list of str, found {}", entry.type_name())));
        };
        match bindings.remove(&**name) {
            Some(value) => {
                exports.insert(name.to_string(), value);
            }
            None => {
                return Err(RuntimeError::new(
                    ErrorKind::Import,
                    format!("cannot export undefined name '{name}'"),
                ))
            }
        }
    }
    Ok(exports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    #[test]
    fn normalizes_lexically() {
        assert_eq!(normalize_path(Path::new("a/./b/../c.crv")), PathBuf::from("a/c.crv"));
        assert_eq!(normalize_path(Path::new("../lib/x.crv")), PathBuf::from("../lib/x.crv"));
        assert_eq!(normalize_path(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn resolves_relative_to_the_importer() {
        let mut env = Environment::new();
        let unit = Rc::new(SourceUnit::new("main", None));
        let main = Module::new(PathBuf::from("app/main.crv"), None, env.new_context(None), unit);

        let path = ImportPath::Relative("../shared/util".to_owned());
        assert_eq!(resolve(&path, Some(&main), Path::new("std")), PathBuf::from("shared/util.crv"));

        let path = ImportPath::Relative("./util.crv".to_owned());
        assert_eq!(resolve(&path, None, Path::new("std")), PathBuf::from("util.crv"));
    }

    #[test]
    fn resolves_standard_imports_against_the_root() {
        let path = ImportPath::Standard(vec!["math".to_owned(), "vector".to_owned()]);
        let resolved = resolve(&path, None, Path::new("/usr/lib/corvid"));
        assert_eq!(resolved, PathBuf::from("/usr/lib/corvid/math/vector.crv"));
        assert_eq!(binding_name(&resolved), "vector");
    }

    #[test]
    fn import_chain_includes_ancestors() {
        let mut env = Environment::new();
        let unit = Rc::new(SourceUnit::new("a", None));
        let a = Rc::new(Module::new(PathBuf::from("a.crv"), None, env.new_context(None), unit.clone()));
        let b = Module::new(PathBuf::from("b.crv"), Some(a), env.new_context(None), unit);

        assert!(b.in_import_chain(Path::new("a.crv")));
        assert!(b.in_import_chain(Path::new("b.crv")));
        assert!(!b.in_import_chain(Path::new("c.crv")));
    }

    #[test]
    fn exports_list_restricts_bindings() {
        let bindings = HashMap::from([
            ("visible".to_owned(), Value::Int(1)),
            ("hidden".to_owned(), Value::Int(2)),
            (EXPORTS.to_owned(), Value::list(vec![Value::str("visible")])),
        ]);
        let exports = compute_exports(bindings).unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports["visible"], Value::Int(1));

        let bindings = HashMap::from([(EXPORTS.to_owned(), Value::tuple(vec![Value::str("nope")]))]);
        let err = compute_exports(bindings).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Import));
    }

    #[test]
    fn quotes_source_lines() {
        let unit = SourceUnit::new("main", Some("x = 1;\n    y = x / 0;\n"));
        assert_eq!(unit.line(2), Some("y = x / 0;"));
        assert_eq!(unit.line(0), None);
        assert_eq!(unit.line(9), None);
    }

    #[test]
    fn memory_loader_records_loads() {
        let loader = MemoryLoader::new().with_file("lib/./a.crv", "x = 1;");
        let log = loader.load_log();
        assert!(loader.load(Path::new("lib/a.crv")).is_ok());
        assert!(loader.load(Path::new("missing.crv")).is_err());
        assert_eq!(log.borrow().len(), 2);
    }
}
