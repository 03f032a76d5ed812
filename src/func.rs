use std::cell::OnceCell;
use std::fmt::Display;
use std::rc::{Rc, Weak};

use crate::ast::FunctionDecl;
use crate::class::Class;
use crate::environment::Closure;
use crate::module::SourceUnit;
use crate::object::Value;

/// A resolved parameter annotation or return type.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    /// No annotation, or `nil`.
    Any,
    Class(Rc<Class>),
    /// The class whose body declares the function. It does not exist yet while its members are
    /// being defined, so it is resolved through [`Function::owner`] at call time.
    Owner(String),
}

impl TypeSpec {
    pub fn accepts(&self, class: &Class, owner: Option<&Rc<Class>>) -> bool {
        match self {
            TypeSpec::Any => true,
            TypeSpec::Class(expected) => class.is_a(expected),
            TypeSpec::Owner(_) => owner.is_some_and(|owner| class.is_a(owner)),
        }
    }
}

impl Display for TypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeSpec::Any => write!(f, "nil"),
            TypeSpec::Class(class) => write!(f, "{}", class.name),
            TypeSpec::Owner(name) => write!(f, "{name}"),
        }
    }
}

/// A parameter after its annotation has been resolved at definition time.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub class: TypeSpec,
    pub variadic: bool,
}

/// A user function, lambda, method or operator.
#[derive(Debug)]
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub params: Vec<ParamSpec>,
    /// Declared result classes; `[Any]` when nothing was declared.
    pub returns: Vec<TypeSpec>,
    /// Frozen snapshot of the defining context.
    pub closure: Closure,
    /// Where the function was defined, for stack traces.
    pub unit: Rc<SourceUnit>,
    owner: OnceCell<Weak<Class>>,
}

impl Function {
    pub fn new(
        decl: Rc<FunctionDecl>,
        params: Vec<ParamSpec>,
        returns: Vec<TypeSpec>,
        closure: Closure,
        unit: Rc<SourceUnit>,
    ) -> Self {
        Self { decl, params, returns, closure, unit, owner: OnceCell::new() }
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn is_variadic(&self) -> bool {
        self.params.last().is_some_and(|p| p.variadic)
    }

    /// The class this function is a member of, once that class exists.
    pub fn owner(&self) -> Option<Rc<Class>> {
        self.owner.get().and_then(Weak::upgrade)
    }

    pub fn set_owner(&self, class: &Rc<Class>) {
        // A function belongs to exactly one class body.
        let _ = self.owner.set(Rc::downgrade(class));
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn {}>", self.decl.name)
    }
}

/// A function looked up through an instance; the receiver becomes the first argument.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Value,
}

impl Display for BoundMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.method {
            Value::Function(function) => {
                write!(f, "<bound method {}.{}>", self.receiver.type_name(), function.name())
            }
            method => write!(f, "<bound method {}.{method}>", self.receiver.type_name()),
        }
    }
}
