#![allow(clippy::new_without_default)]

mod ast;
mod class;
mod config;
mod environment;
mod error;
mod func;
mod interpreter;
mod module;
mod native;
mod object;
pub mod ops;
mod parser;
mod printer;
mod scanner;
mod token;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::class::*;
    pub use crate::config::*;
    pub use crate::environment::{Closure, ContextId, Environment, ScopeId};
    pub use crate::error::*;
    pub use crate::func::*;
    pub use crate::interpreter::*;
    pub use crate::module::*;
    pub use crate::native::{Arity, NativeFn, NativeFunction};
    pub use crate::object::*;
    pub use crate::ops;
    pub use crate::parser::*;
    pub use crate::printer::AstPrinter;
    pub use crate::scanner::*;
    pub use crate::token::*;
}

use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use prelude::{Config, Interpreter, Module, RuntimeError, SyntaxError};

/// Why a script failed to run. Runtime errors are rendered eagerly: the raised value is not
/// `Send`, and `anyhow` needs it to be.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{}", render_syntax_errors(.0))]
    Syntax(Vec<SyntaxError>),
    #[error("{traceback}")]
    Runtime { class: String, traceback: String },
}

impl From<RuntimeError> for RunError {
    fn from(error: RuntimeError) -> Self {
        RunError::Runtime { class: error.raised.class_name(), traceback: error.render_traceback() }
    }
}

impl RunError {
    /// Exit status the command line reports, following the sysexits convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Syntax(_) => 65,
            RunError::Runtime { .. } => 70,
        }
    }
}

fn render_syntax_errors(errors: &[SyntaxError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

pub struct Corvid {
    interpreter: Interpreter,
}

impl Corvid {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self { interpreter: Interpreter::new().with_config(config) }
    }

    /// Send `print` output somewhere other than stdout.
    pub fn with_output(self, output: impl Write + 'static) -> Self {
        Self { interpreter: self.interpreter.with_output(output) }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }
}

impl Corvid {
    /// Run a script file as the root module. I/O failures are reported through `anyhow`,
    /// script failures as a [`RunError`] inside it.
    pub fn run_file(&mut self, filename: impl AsRef<Path>) -> Result<Rc<Module>, anyhow::Error> {
        let path = filename.as_ref();
        let content = std::fs::read_to_string(path)?;
        Ok(self.run_named(path.to_path_buf(), &content)?)
    }

    /// Run `source` as a root module at `<script>.crv`.
    pub fn run(&mut self, source: &str) -> Result<Rc<Module>, anyhow::Error> {
        Ok(self.run_named(PathBuf::from("<script>"), source)?)
    }

    fn run_named(&mut self, path: PathBuf, source: &str) -> Result<Rc<Module>, RunError> {
        let statements = parser::parse(source).map_err(RunError::Syntax)?;
        let result = self.interpreter.evaluate_parsed(path, Some(source), &statements, None);
        // Nothing useful can be done if the output is already gone.
        let _ = self.interpreter.output().flush();
        result.map_err(RunError::from)
    }
}
