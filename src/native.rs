use std::fmt::Display;
use std::rc::Rc;

use crate::class::{Class, Instance};
use crate::error::{type_error, value_error, ErrorKind, RuntimeError};
use crate::interpreter::Interpreter;
use crate::object::{Kwargs, Value};
use crate::ops;

/// Calling convention shared by every native function.
pub type NativeFn = fn(&mut Interpreter, Vec<Value>, Kwargs) -> Result<Value, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(1) => write!(f, "exactly 1 argument"),
            Arity::Exact(n) => write!(f, "exactly {n} arguments"),
            Arity::Range(min, max) => write!(f, "from {min} to {max} arguments"),
            Arity::AtLeast(min) => write!(f, "at least {min} arguments"),
        }
    }
}

#[derive(Debug)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: Arity,
    /// Keyword arguments the function understands.
    pub keywords: &'static [&'static str],
    func: NativeFn,
}

impl NativeFunction {
    pub fn new(name: &'static str, arity: Arity, func: NativeFn) -> Self {
        Self { name, arity, keywords: &[], func }
    }

    pub fn with_keywords(self, keywords: &'static [&'static str]) -> Self {
        Self { keywords, ..self }
    }

    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, RuntimeError> {
        if !self.arity.accepts(arguments.len()) {
            return Err(type_error(format!(
                "{}() takes {} ({} given)",
                self.name,
                self.arity,
                arguments.len()
            )));
        }
        if let Some((name, _)) = kwargs.iter().find(|(name, _)| !self.keywords.contains(&name.as_str())) {
            return Err(type_error(format!(
                "{}() got an unexpected keyword argument '{name}'",
                self.name
            )));
        }

        (self.func)(interpreter, arguments, kwargs)
    }
}

impl Display for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// The functions bound in the root context next to the built-in classes.
pub fn prelude() -> Vec<NativeFunction> {
    vec![
        NativeFunction::new("print", Arity::AtLeast(0), print).with_keywords(&["sep", "end"]),
        NativeFunction::new("len", Arity::Exact(1), len),
        NativeFunction::new("repr", Arity::Exact(1), repr),
        NativeFunction::new("type", Arity::Exact(1), type_of),
        NativeFunction::new("isinstance", Arity::Exact(2), isinstance),
        NativeFunction::new("assert", Arity::Range(1, 2), assert),
        NativeFunction::new("append", Arity::Exact(2), append),
    ]
}

fn keyword(kwargs: &Kwargs, name: &str) -> Option<Value> {
    kwargs.iter().find(|(key, _)| key == name).map(|(_, value)| value.clone())
}

fn keyword_str(kwargs: &Kwargs, name: &str, default: &str) -> Result<String, RuntimeError> {
    match keyword(kwargs, name) {
        None | Some(Value::Nil) => Ok(default.to_owned()),
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(type_error(format!("{name} must be str, not {}", other.type_name()))),
    }
}

fn print(interpreter: &mut Interpreter, arguments: Vec<Value>, kwargs: Kwargs) -> Result<Value, RuntimeError> {
    let sep = keyword_str(&kwargs, "sep", " ")?;
    let end = keyword_str(&kwargs, "end", "\n")?;

    let mut parts = Vec::with_capacity(arguments.len());
    for value in &arguments {
        parts.push(ops::to_str(interpreter, value)?);
    }

    let line = format!("{}{end}", parts.join(&sep));
    interpreter
        .output()
        .write_all(line.as_bytes())
        .map_err(|e| RuntimeError::new(ErrorKind::Error, format!("print failed: {e}")))?;
    Ok(Value::Nil)
}

fn len(interpreter: &mut Interpreter, arguments: Vec<Value>, _: Kwargs) -> Result<Value, RuntimeError> {
    ops::length(interpreter, &arguments[0]).map(Value::Int)
}

fn repr(interpreter: &mut Interpreter, arguments: Vec<Value>, _: Kwargs) -> Result<Value, RuntimeError> {
    ops::repr(interpreter, &arguments[0]).map(|s| Value::str(&s))
}

fn type_of(interpreter: &mut Interpreter, arguments: Vec<Value>, _: Kwargs) -> Result<Value, RuntimeError> {
    Ok(Value::Class(arguments[0].class(interpreter.registry())))
}

fn isinstance(interpreter: &mut Interpreter, arguments: Vec<Value>, _: Kwargs) -> Result<Value, RuntimeError> {
    let Value::Class(class) = &arguments[1] else {
        return Err(type_error("isinstance() arg 2 must be a class"));
    };
    let actual = arguments[0].class(interpreter.registry());
    Ok(Value::Bool(actual.is_a(class)))
}

fn assert(interpreter: &mut Interpreter, arguments: Vec<Value>, _: Kwargs) -> Result<Value, RuntimeError> {
    if ops::truthy(interpreter, &arguments[0])? {
        return Ok(Value::Nil);
    }

    let message = match arguments.get(1) {
        Some(message) => ops::to_str(interpreter, message)?,
        None => "assertion failed".to_owned(),
    };
    Err(RuntimeError::new(ErrorKind::Assertion, message))
}

fn append(_: &mut Interpreter, arguments: Vec<Value>, _: Kwargs) -> Result<Value, RuntimeError> {
    match &arguments[0] {
        Value::List(values) => {
            values.borrow_mut().push(arguments[1].copy_for_binding());
            Ok(Value::Nil)
        }
        other => Err(type_error(format!("append() arg 1 must be list, not {}", other.type_name()))),
    }
}

// Constructors of the built-in classes. Calling a class with a single argument converts it.

fn single_argument(class: &Class, arguments: Vec<Value>, kwargs: &Kwargs) -> Result<Option<Value>, RuntimeError> {
    if let Some((name, _)) = kwargs.first() {
        return Err(type_error(format!("{}() got an unexpected keyword argument '{name}'", class.name)));
    }
    if arguments.len() > 1 {
        return Err(type_error(format!(
            "{}() takes at most 1 argument ({} given)",
            class.name,
            arguments.len()
        )));
    }
    Ok(arguments.into_iter().next())
}

pub fn construct_bool(
    interpreter: &mut Interpreter,
    class: &Rc<Class>,
    arguments: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, RuntimeError> {
    match single_argument(class, arguments, &kwargs)? {
        None => Ok(Value::Bool(false)),
        Some(value) => ops::truthy(interpreter, &value).map(Value::Bool),
    }
}

pub fn construct_int(
    interpreter: &mut Interpreter,
    class: &Rc<Class>,
    arguments: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, RuntimeError> {
    let Some(value) = single_argument(class, arguments, &kwargs)? else {
        return Ok(Value::Int(0));
    };

    match value {
        Value::Int(n) => Ok(Value::Int(n)),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Real(n) if n.is_finite() && n.abs() < 9.2e18 => Ok(Value::Int(n.trunc() as i64)),
        Value::Real(n) => Err(value_error(format!("cannot convert {n} to int"))),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| value_error(format!("invalid literal for int(): {:?}", s.as_ref()))),
        Value::Instance(_) => ops::convert(interpreter, &value, ops::Conversion::Int),
        other => Err(type_error(format!(
            "int() argument must be a str or a number, not '{}'",
            other.type_name()
        ))),
    }
}

pub fn construct_real(
    _: &mut Interpreter,
    class: &Rc<Class>,
    arguments: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, RuntimeError> {
    let Some(value) = single_argument(class, arguments, &kwargs)? else {
        return Ok(Value::Real(0.0));
    };

    match value {
        Value::Real(n) => Ok(Value::Real(n)),
        Value::Int(n) => Ok(Value::Real(n as f64)),
        Value::Bool(b) => Ok(Value::Real(if b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| value_error(format!("could not convert string to real: {:?}", s.as_ref()))),
        other => Err(type_error(format!(
            "real() argument must be a str or a number, not '{}'",
            other.type_name()
        ))),
    }
}

pub fn construct_str(
    interpreter: &mut Interpreter,
    class: &Rc<Class>,
    arguments: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, RuntimeError> {
    match single_argument(class, arguments, &kwargs)? {
        None => Ok(Value::str("")),
        Some(value) => ops::to_str(interpreter, &value).map(|s| Value::str(&s)),
    }
}

pub fn construct_list(
    interpreter: &mut Interpreter,
    class: &Rc<Class>,
    arguments: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, RuntimeError> {
    match single_argument(class, arguments, &kwargs)? {
        None => Ok(Value::list(vec![])),
        Some(value) => ops::elements(interpreter, &value).map(Value::list),
    }
}

pub fn construct_tuple(
    interpreter: &mut Interpreter,
    class: &Rc<Class>,
    arguments: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, RuntimeError> {
    match single_argument(class, arguments, &kwargs)? {
        None => Ok(Value::tuple(vec![])),
        Some(value) => ops::elements(interpreter, &value).map(Value::tuple),
    }
}

/// `Error(message)` and every class derived from it that has no `init` of its own.
pub fn construct_error(
    interpreter: &mut Interpreter,
    class: &Rc<Class>,
    arguments: Vec<Value>,
    mut kwargs: Kwargs,
) -> Result<Value, RuntimeError> {
    let message = match kwargs.iter().position(|(name, _)| name == "message") {
        Some(position) if arguments.is_empty() => Some(kwargs.remove(position).1),
        Some(_) => return Err(type_error(format!("{}() got multiple values for 'message'", class.name))),
        None => None,
    };
    let message = match message {
        Some(message) => Some(message),
        None => single_argument(class, arguments, &kwargs)?,
    };
    if let Some((name, _)) = kwargs.first() {
        return Err(type_error(format!("{}() got an unexpected keyword argument '{name}'", class.name)));
    }

    let message = match message {
        None => String::new(),
        Some(value) => ops::to_str(interpreter, &value)?,
    };
    let instance = Instance::new(class.clone());
    instance.set_field("message", Value::str(&message));
    Ok(Value::Instance(Rc::new(instance)))
}
