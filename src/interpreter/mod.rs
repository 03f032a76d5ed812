use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::ast::{ImportPath, Stmt};
use crate::class::ClassRegistry;
use crate::config::Config;
use crate::environment::{ContextId, Environment};
use crate::error::{ErrorKind, RuntimeError, SyntaxError, TraceFrame};
use crate::module::{self, FsLoader, Module, SourceLoader, SourceUnit};
use crate::native;
use crate::object::Value;
use crate::parser;

/// Turn an `Err` into a `StmtResult::Throw` and return it.
macro_rules! throw_on_err {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => return $crate::interpreter::StmtResult::Throw(error),
        }
    };
}

mod call;
mod expr;
mod stmt;

pub const MODULE_SCOPE: &str = "<module>";

/// Outcome of executing a statement.
#[derive(Debug)]
pub enum StmtResult {
    None,
    Return(Value),
    Break,
    Throw(RuntimeError),
}

impl StmtResult {
    /// Anything that stops the enclosing statement list.
    pub fn is_interrupt(&self) -> bool {
        !matches!(self, StmtResult::None)
    }
}

/// The code currently running: a module top level or a function body.
#[derive(Debug, Clone)]
struct Activation {
    context: ContextId,
    unit: Rc<SourceUnit>,
    scope: String,
    module: Option<Rc<Module>>,
}

pub struct Interpreter {
    registry: ClassRegistry,
    env: Environment,
    root: ContextId,
    config: Config,
    loader: Box<dyn SourceLoader>,
    modules: HashMap<PathBuf, Rc<Module>>,
    frame: Activation,
    call_depth: usize,
    last_trace: Vec<TraceFrame>,
    output: Box<dyn Write>,
}

impl Interpreter {
    pub fn new() -> Self {
        let registry = ClassRegistry::new();
        let mut env = Environment::new();
        let root = env.new_context(None);

        let mut globals: Vec<(String, Value)> = registry
            .global_classes()
            .map(|class| (class.name.clone(), Value::Class(class.clone())))
            .collect();
        globals.extend(
            native::prelude().into_iter().map(|f| (f.name.to_owned(), Value::Native(Rc::new(f)))),
        );
        for (name, value) in globals {
            // Built-in names are never keywords.
            let _ = env.define(root, &name, value);
        }

        let frame = Activation {
            context: root,
            unit: Rc::new(SourceUnit::new("<prelude>", None)),
            scope: MODULE_SCOPE.to_owned(),
            module: None,
        };

        Self {
            registry,
            env,
            root,
            config: Config::default(),
            loader: Box::new(FsLoader),
            modules: HashMap::new(),
            frame,
            call_depth: 0,
            last_trace: vec![],
            output: Box::new(std::io::stdout()),
        }
    }

    pub fn with_config(self, config: Config) -> Self {
        Self { config, ..self }
    }

    pub fn with_loader(self, loader: impl SourceLoader + 'static) -> Self {
        Self { loader: Box::new(loader), ..self }
    }

    pub fn with_output(self, output: impl Write + 'static) -> Self {
        Self { output: Box::new(output), ..self }
    }
}

impl Interpreter {
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output(&mut self) -> &mut dyn Write {
        self.output.as_mut()
    }

    /// Trace of the last error that escaped a module, innermost frame first.
    pub fn stack_trace(&self) -> &[TraceFrame] {
        &self.last_trace
    }

    /// Look up a name as seen from the top level of `module`.
    pub fn lookup(&self, module: &Module, name: &str) -> Result<Value, RuntimeError> {
        self.env.get(module.context, name)
    }

    /// Parse and run `source` as a module named `module_name`.
    pub fn evaluate(
        &mut self,
        module_name: &str,
        source: &str,
        parent: Option<Rc<Module>>,
    ) -> Result<Rc<Module>, RuntimeError> {
        let path = PathBuf::from(module_name);
        let statements = parser::parse(source).map_err(|errors| syntax_error(&path, &errors))?;
        self.evaluate_parsed(path, Some(source), &statements, parent)
    }

    /// Run already parsed statements as the module at `path`, taken through the same
    /// canonicalization as import targets.
    pub fn evaluate_parsed(
        &mut self,
        path: PathBuf,
        source: Option<&str>,
        statements: &[Stmt],
        parent: Option<Rc<Module>>,
    ) -> Result<Rc<Module>, RuntimeError> {
        let path = module::canonical_path(&path);
        let module = self.run_module(path.clone(), source, statements, parent)?;
        self.modules.insert(path, module.clone());
        Ok(module)
    }

    /// Resolve, load and run an imported module, or return it from the cache.
    pub fn import(&mut self, path: &ImportPath, parent: Option<Rc<Module>>) -> Result<Rc<Module>, RuntimeError> {
        let resolved = module::resolve(path, parent.as_deref(), &self.config.stdlib_root);

        if let Some(module) = self.modules.get(&resolved) {
            debug!(path = %resolved.display(), "module cache hit");
            return Ok(module.clone());
        }
        if parent.as_deref().is_some_and(|p| p.in_import_chain(&resolved)) {
            return Err(module::cyclic_import(&resolved));
        }

        debug!(path = %resolved.display(), "loading module");
        let source = self.loader.load(&resolved).map_err(|e| {
            RuntimeError::new(ErrorKind::Import, format!("cannot import '{}': {e}", resolved.display()))
        })?;
        let statements = parser::parse(&source).map_err(|errors| syntax_error(&resolved, &errors))?;

        self.evaluate_parsed(resolved, Some(&source), &statements, parent)
    }

    fn run_module(
        &mut self,
        path: PathBuf,
        source: Option<&str>,
        statements: &[Stmt],
        parent: Option<Rc<Module>>,
    ) -> Result<Rc<Module>, RuntimeError> {
        let context = self.env.new_context(Some(self.root));
        let unit = Rc::new(SourceUnit::new(&path.display().to_string(), source));
        let is_root = parent.is_none();
        let module = Rc::new(Module::new(path, parent, context, unit.clone()));

        let activation =
            Activation { context, unit, scope: MODULE_SCOPE.to_owned(), module: Some(module.clone()) };
        let result = self.with_activation(activation, |interpreter| interpreter.execute_statements(statements));

        if let StmtResult::Throw(error) = result {
            if is_root {
                warn!(module = %module.name, "uncaught {}", error.raised);
            }
            self.last_trace = error.trace.clone();
            return Err(error);
        }

        let exports = module::compute_exports(self.env.base_bindings(context))?;
        debug!(module = %module.name, exports = exports.len(), "module evaluated");
        module.set_exports(exports);
        Ok(module)
    }

    /// Run `body` as a new activation one call level deeper.
    fn with_activation<T>(&mut self, activation: Activation, body: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.frame, activation);
        self.call_depth += 1;
        let result = body(self);
        self.call_depth -= 1;
        self.frame = saved;
        result
    }

    fn context(&self) -> ContextId {
        self.frame.context
    }

    fn trace_frame(&self, stmt: &Stmt) -> TraceFrame {
        let source = match self.frame.unit.line(stmt.line) {
            Some(line) => line.to_owned(),
            None => stmt.to_string(),
        };
        TraceFrame {
            file: self.frame.unit.name.clone(),
            line: stmt.line,
            source,
            scope: self.frame.scope.clone(),
        }
    }
}

fn syntax_error(path: &Path, errors: &[SyntaxError]) -> RuntimeError {
    let details: Vec<String> = errors.iter().map(|e| format!("line {}: {}", e.line, e.message)).collect();
    RuntimeError::new(ErrorKind::Syntax, format!("in '{}': {}", path.display(), details.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_is_bound_in_the_root_context() {
        let interpreter = Interpreter::new();
        for name in ["print", "len", "int", "str", "Error", "ZeroDivisionError"] {
            assert!(interpreter.env.get(interpreter.root, name).is_ok(), "{name} is not bound");
        }
    }

    #[test]
    fn module_level_bindings_are_exported() {
        let mut interpreter = Interpreter::new();
        let module = interpreter.evaluate("main", "x = 40 + 2;", None).unwrap();
        assert_eq!(module.get_export("x"), Some(Value::Int(42)));
        assert_eq!(module.name, "main");
    }

    #[test]
    fn syntax_errors_become_runtime_errors() {
        let mut interpreter = Interpreter::new();
        let err = interpreter.evaluate("broken", "x = ;", None).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Syntax));
    }

    #[test]
    fn stmt_result_interrupts() {
        assert!(!StmtResult::None.is_interrupt());
        assert!(StmtResult::Break.is_interrupt());
        assert!(StmtResult::Return(Value::Nil).is_interrupt());
    }
}
