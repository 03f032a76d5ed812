use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use crate::class::{Class, ClassRegistry, Instance};
use crate::func::{BoundMethod, Function};
use crate::module::Module;
use crate::native::NativeFunction;

/// Keyword arguments of a call, in source order.
pub type Kwargs = Vec<(String, Value)>;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Function(Rc<Function>),
    BoundMethod(Rc<BoundMethod>),
    Native(Rc<NativeFunction>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Module(Rc<Module>),
}

/// Structural equality, used by tests and by the native helpers. The language level `==`
/// goes through the operator dispatcher instead.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Real(left), Self::Real(right)) => left == right,
            (Self::Str(left), Self::Str(right)) => left == right,
            (Self::List(left), Self::List(right)) => *left.borrow() == *right.borrow(),
            (Self::Tuple(left), Self::Tuple(right)) => left == right,
            (Self::Function(left), Self::Function(right)) => Rc::ptr_eq(left, right),
            (Self::BoundMethod(left), Self::BoundMethod(right)) => Rc::ptr_eq(left, right),
            (Self::Native(left), Self::Native(right)) => Rc::ptr_eq(left, right),
            (Self::Class(left), Self::Class(right)) => Rc::ptr_eq(left, right),
            (Self::Instance(left), Self::Instance(right)) => Rc::ptr_eq(left, right),
            (Self::Module(left), Self::Module(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(values)))
    }

    pub fn tuple(values: Vec<Value>) -> Self {
        Self::Tuple(Rc::from(values))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// The class this value reports. Every value has exactly one.
    pub fn class(&self, registry: &ClassRegistry) -> Rc<Class> {
        let builtins = registry.builtins();
        let class = match self {
            Self::Nil => &builtins.nil,
            Self::Bool(_) => &builtins.bool,
            Self::Int(_) => &builtins.int,
            Self::Real(_) => &builtins.real,
            Self::Str(_) => &builtins.str,
            Self::List(_) => &builtins.list,
            Self::Tuple(_) => &builtins.tuple,
            Self::Function(_) | Self::BoundMethod(_) | Self::Native(_) => &builtins.function,
            Self::Class(_) => &builtins.class,
            Self::Module(_) => &builtins.module,
            Self::Instance(instance) => return instance.class.clone(),
        };
        class.clone()
    }

    /// Name of the value's class, available without a registry.
    pub fn type_name(&self) -> String {
        match self {
            Self::Nil => "nil".to_owned(),
            Self::Bool(_) => "bool".to_owned(),
            Self::Int(_) => "int".to_owned(),
            Self::Real(_) => "real".to_owned(),
            Self::Str(_) => "str".to_owned(),
            Self::List(_) => "list".to_owned(),
            Self::Tuple(_) => "tuple".to_owned(),
            Self::Function(_) | Self::BoundMethod(_) | Self::Native(_) => "function".to_owned(),
            Self::Class(_) => "class".to_owned(),
            Self::Module(_) => "module".to_owned(),
            Self::Instance(instance) => instance.class.name.clone(),
        }
    }

    /// Whether both values report the same class.
    pub fn same_class(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Instance(left), Self::Instance(right)) => Rc::ptr_eq(&left.class, &right.class),
            (Self::Instance(_), _) | (_, Self::Instance(_)) => false,
            (
                Self::Function(_) | Self::BoundMethod(_) | Self::Native(_),
                Self::Function(_) | Self::BoundMethod(_) | Self::Native(_),
            ) => true,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self, Self::Instance(instance) if instance.class.value_type)
    }

    /// Instances of value-type classes are copied whenever they are bound to a name.
    pub fn copy_for_binding(&self) -> Value {
        match self {
            Self::Instance(instance) if instance.class.value_type => {
                Self::Instance(Rc::new(instance.copy()))
            }
            _ => self.clone(),
        }
    }

    /// Quoted representation, used for strings nested inside containers.
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => format!("{s:?}"),
            _ => self.to_string(),
        }
    }
}

pub fn format_real(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e16 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

fn join_repr(values: &[Value]) -> String {
    values.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Real(n) => write!(f, "{}", format_real(*n)),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(values) => write!(f, "[{}]", join_repr(&values.borrow())),
            Self::Tuple(values) if values.len() == 1 => write!(f, "({},)", values[0].repr()),
            Self::Tuple(values) => write!(f, "({})", join_repr(values)),
            Self::Function(function) => write!(f, "{function}"),
            Self::BoundMethod(method) => write!(f, "{method}"),
            Self::Native(native) => write!(f, "{native}"),
            Self::Class(class) => write!(f, "{class}"),
            Self::Instance(instance) => write!(f, "{instance}"),
            Self::Module(module) => write!(f, "{module}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_values() {
        assert_eq!(Value::Real(2.0).to_string(), "2.0");
        assert_eq!(Value::Real(0.5).to_string(), "0.5");
        assert_eq!(Value::list(vec![Value::Int(1), Value::str("a")]).to_string(), "[1, \"a\"]");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).to_string(), "(1,)");
        assert_eq!(Value::tuple(vec![Value::Int(1), Value::Nil]).to_string(), "(1, nil)");
    }

    #[test]
    fn same_class_compares_kinds() {
        assert!(Value::Int(1).same_class(&Value::Int(2)));
        assert!(!Value::Int(1).same_class(&Value::Real(1.0)));
        assert!(Value::list(vec![]).same_class(&Value::list(vec![Value::Nil])));
    }

    #[test]
    fn lists_are_shared() {
        let list = Value::list(vec![]);
        let alias = list.copy_for_binding();
        if let Value::List(values) = &alias {
            values.borrow_mut().push(Value::Int(1));
        }
        assert_eq!(list, Value::list(vec![Value::Int(1)]));
    }
}
