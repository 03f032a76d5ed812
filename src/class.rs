use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

use crate::error::{type_error, ErrorKind, RuntimeError};
use crate::interpreter::Interpreter;
use crate::native;
use crate::object::{Kwargs, Value};

/// Native constructor of a class. Receives the class actually being instantiated, which may
/// derive from the class that registered the constructor.
pub type Constructor =
    fn(&mut Interpreter, &Rc<Class>, Vec<Value>, Kwargs) -> Result<Value, RuntimeError>;

pub struct Class {
    pub name: String,
    pub attributes: HashMap<String, Value>,
    pub base: Option<Rc<Class>>,
    pub constructor: Option<Constructor>,
    /// Instances are copied on binding (`struct`) instead of shared (`class`).
    pub value_type: bool,
    builtin: bool,
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.name.clone()))
            .field("value_type", &self.value_type)
            .finish()
    }
}

impl Class {
    /// Whether `self` appears strictly above `other` in `other`'s base chain.
    pub fn is_base_of(&self, other: &Class) -> bool {
        let mut current = other.base.as_ref();
        while let Some(base) = current {
            if std::ptr::eq(self, base.as_ref()) {
                return true;
            }
            current = base.base.as_ref();
        }
        false
    }

    /// `self` is `other` or derives from it.
    pub fn is_a(&self, other: &Class) -> bool {
        std::ptr::eq(self, other) || other.is_base_of(self)
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    /// Attribute lookup through the base chain.
    pub fn find_attribute(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attributes.get(name) {
            return Some(value.clone());
        }

        self.base.as_ref().and_then(|base| base.find_attribute(name))
    }

    pub fn find_constructor(&self) -> Option<Constructor> {
        self.constructor.or_else(|| self.base.as_ref().and_then(|base| base.find_constructor()))
    }
}

impl Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

/// Whether a catch clause declared for `to_catch` accepts an exception of class `generated`.
pub fn should_catch(generated: &Class, to_catch: &Class) -> bool {
    std::ptr::eq(generated, to_catch) || to_catch.is_base_of(generated)
}

#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self { class, fields: RefCell::new(HashMap::new()) }
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_owned(), value);
    }

    /// A copy with its own field table. Nested value-type fields are copied as well.
    pub fn copy(&self) -> Self {
        let fields =
            self.fields.borrow().iter().map(|(k, v)| (k.clone(), v.copy_for_binding())).collect();
        Self { class: self.class.clone(), fields: RefCell::new(fields) }
    }

    /// The `message` field of an exception instance.
    pub fn message(&self) -> String {
        match self.get_field("message") {
            Some(Value::Nil) | None => String::new(),
            Some(message) => message.to_string(),
        }
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} instance>", self.class.name)
    }
}

#[derive(Debug)]
pub struct BuiltinClasses {
    pub nil: Rc<Class>,
    pub bool: Rc<Class>,
    pub int: Rc<Class>,
    pub real: Rc<Class>,
    pub str: Rc<Class>,
    pub list: Rc<Class>,
    pub tuple: Rc<Class>,
    pub function: Rc<Class>,
    pub class: Rc<Class>,
    pub module: Rc<Class>,
    errors: HashMap<ErrorKind, Rc<Class>>,
}

/// Owns every class created during a run, built-in or user defined.
#[derive(Debug)]
pub struct ClassRegistry {
    classes: Vec<Rc<Class>>,
    builtins: BuiltinClasses,
}

impl ClassRegistry {
    pub fn new() -> Self {
        let mut classes = vec![];
        let mut builtin = |name: &str, value_type: bool, constructor: Option<Constructor>, base| {
            let class = Rc::new(Class {
                name: name.to_owned(),
                attributes: HashMap::new(),
                base,
                constructor,
                value_type,
                builtin: true,
            });
            classes.push(class.clone());
            class
        };

        let nil = builtin("nil", true, None, None);
        let bool = builtin("bool", true, Some(native::construct_bool), None);
        let int = builtin("int", true, Some(native::construct_int), None);
        let real = builtin("real", true, Some(native::construct_real), None);
        let str = builtin("str", true, Some(native::construct_str), None);
        let list = builtin("list", false, Some(native::construct_list), None);
        let tuple = builtin("tuple", true, Some(native::construct_tuple), None);
        let function = builtin("function", false, None, None);
        let class = builtin("class", false, None, None);
        let module = builtin("module", false, None, None);

        let root = builtin("Error", false, Some(native::construct_error), None);
        let mut errors = HashMap::new();
        for kind in ErrorKind::ALL {
            let class = match kind {
                ErrorKind::Error => root.clone(),
                _ => builtin(&kind.to_string(), false, None, Some(root.clone())),
            };
            errors.insert(kind, class);
        }

        let builtins =
            BuiltinClasses { nil, bool, int, real, str, list, tuple, function, class, module, errors };
        Self { classes, builtins }
    }

    /// Create and register a new class.
    pub fn class_new(
        &mut self,
        name: &str,
        attributes: HashMap<String, Value>,
        is_value_type: bool,
        constructor: Option<Constructor>,
        base: Option<Rc<Class>>,
    ) -> Result<Rc<Class>, RuntimeError> {
        if let Some(base) = &base {
            if base.is_builtin() && !base.is_a(self.error_class(ErrorKind::Error).as_ref()) {
                return Err(type_error(format!("cannot derive from built-in class '{}'", base.name)));
            }
        }

        let class = Rc::new(Class {
            name: name.to_owned(),
            attributes,
            base,
            constructor,
            value_type: is_value_type,
            builtin: false,
        });
        self.classes.push(class.clone());
        Ok(class)
    }

    pub fn builtins(&self) -> &BuiltinClasses {
        &self.builtins
    }

    pub fn error_class(&self, kind: ErrorKind) -> Rc<Class> {
        // Every kind is registered in `new`.
        self.builtins.errors[&kind].clone()
    }

    pub fn is_error_class(&self, class: &Class) -> bool {
        class.is_a(&self.error_class(ErrorKind::Error))
    }

    /// The classes bound as globals in the root scope.
    pub fn global_classes(&self) -> impl Iterator<Item = &Rc<Class>> {
        self.classes.iter().filter(|c| c.is_builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_class(registry: &mut ClassRegistry, name: &str, base: Option<Rc<Class>>) -> Rc<Class> {
        registry.class_new(name, HashMap::new(), false, None, base).expect("class_new failed")
    }

    #[test]
    fn catch_matching_follows_the_hierarchy() {
        let mut registry = ClassRegistry::new();
        let error_base = registry.error_class(ErrorKind::Error);
        let a = user_class(&mut registry, "A", Some(error_base));
        let derived = user_class(&mut registry, "DerivedOfA", Some(a.clone()));

        assert!(should_catch(&a, &a));
        assert!(should_catch(&derived, &a));
        assert!(!should_catch(&a, &derived));
    }

    #[test]
    fn is_base_of_is_strict() {
        let mut registry = ClassRegistry::new();
        let a = user_class(&mut registry, "A", None);
        let b = user_class(&mut registry, "B", Some(a.clone()));
        let c = user_class(&mut registry, "C", Some(b.clone()));

        assert!(a.is_base_of(&c));
        assert!(b.is_base_of(&c));
        assert!(!a.is_base_of(&a));
        assert!(!c.is_base_of(&a));
    }

    #[test]
    fn builtin_errors_derive_from_error() {
        let registry = ClassRegistry::new();
        let root = registry.error_class(ErrorKind::Error);
        for kind in ErrorKind::ALL {
            let class = registry.error_class(kind);
            assert_eq!(class.name, kind.to_string());
            assert!(registry.is_error_class(&class));
            assert!(should_catch(&class, &root));
        }
    }

    #[test]
    fn attributes_resolve_through_the_base_chain() {
        let mut registry = ClassRegistry::new();
        let attributes = HashMap::from([("answer".to_owned(), Value::Int(42))]);
        let base = registry.class_new("Base", attributes, false, None, None).expect("class_new failed");
        let derived = user_class(&mut registry, "Derived", Some(base));

        assert_eq!(derived.find_attribute("answer"), Some(Value::Int(42)));
        assert_eq!(derived.find_attribute("missing"), None);
    }

    #[test]
    fn cannot_derive_from_primitive_classes() {
        let mut registry = ClassRegistry::new();
        let int = registry.builtins().int.clone();
        assert!(registry.class_new("MyInt", HashMap::new(), true, None, Some(int)).is_err());
    }
}
