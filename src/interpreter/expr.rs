use std::rc::Rc;

use super::Interpreter;
use crate::ast::{Expr, Literal, LogicalOp};
use crate::error::{attribute_error, type_error, ErrorKind, RuntimeError};
use crate::func::BoundMethod;
use crate::object::{Kwargs, Value};
use crate::ops;

impl Interpreter {
    pub fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal { value } => Ok(match value {
                Literal::Nil => Value::Nil,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(n) => Value::Int(*n),
                Literal::Real(n) => Value::Real(*n),
                Literal::Str(s) => Value::str(s),
            }),
            Expr::Variable { name } => self.env.get(self.context(), name),
            Expr::Tuple { elements } => Ok(Value::tuple(self.evaluate_elements(elements)?)),
            Expr::List { elements } => Ok(Value::list(self.evaluate_elements(elements)?)),
            Expr::Unary { op, right } => {
                let right = self.evaluate_expr(right)?;
                ops::unary(self, *op, &right)
            }
            Expr::Not { right } => {
                let right = self.evaluate_expr(right)?;
                Ok(Value::Bool(!ops::truthy(self, &right)?))
            }
            Expr::Binary { left, op, right } => {
                let left = self.evaluate_expr(left)?;
                let right = self.evaluate_expr(right)?;
                ops::binary(self, *op, &left, &right)
            }
            Expr::Logical { left, op, right } => {
                let left = self.evaluate_expr(left)?;
                let truthy = ops::truthy(self, &left)?;
                match (op, truthy) {
                    (LogicalOp::Or, true) | (LogicalOp::And, false) => Ok(left),
                    _ => self.evaluate_expr(right),
                }
            }
            Expr::Call { callee, arguments, keywords } => {
                let callee = self.evaluate_expr(callee)?;

                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate_expr(argument)?);
                }
                let mut kwargs: Kwargs = Vec::with_capacity(keywords.len());
                for (name, argument) in keywords {
                    if kwargs.iter().any(|(seen, _)| seen == name) {
                        return Err(type_error(format!("keyword argument repeated: '{name}'")));
                    }
                    let value = self.evaluate_expr(argument)?;
                    kwargs.push((name.clone(), value));
                }

                self.call_value(&callee, values, kwargs)
            }
            Expr::Attribute { object, name } => {
                let object = self.evaluate_expr(object)?;
                self.get_attribute(&object, name)
            }
            Expr::Index { object, index } => {
                let object = self.evaluate_expr(object)?;
                let index = self.evaluate_expr(index)?;
                ops::index(self, &object, &index)
            }
            Expr::Slice { object, start, end } => {
                let object = self.evaluate_expr(object)?;
                let start = self.evaluate_optional(start.as_deref())?;
                let end = self.evaluate_optional(end.as_deref())?;
                ops::slice(&object, &start, &end)
            }
            Expr::Lambda { decl } => Ok(Value::Function(self.make_function(decl, None)?)),
        }
    }

    /// Elements of a list or tuple literal. Value-type instances are copied in.
    fn evaluate_elements(&mut self, elements: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.evaluate_expr(element)?.copy_for_binding());
        }
        Ok(values)
    }

    fn evaluate_optional(&mut self, expr: Option<&Expr>) -> Result<Value, RuntimeError> {
        match expr {
            Some(expr) => self.evaluate_expr(expr),
            None => Ok(Value::Nil),
        }
    }

    /// Fields first, then the class chain. Functions found on the class come back bound.
    pub fn get_attribute(&self, object: &Value, name: &str) -> Result<Value, RuntimeError> {
        match object {
            Value::Instance(instance) => {
                if let Some(value) = instance.get_field(name) {
                    return Ok(value);
                }
                match instance.class.find_attribute(name) {
                    Some(method @ (Value::Function(_) | Value::Native(_))) => {
                        Ok(Value::BoundMethod(Rc::new(BoundMethod { receiver: object.clone(), method })))
                    }
                    Some(value) => Ok(value),
                    None => Err(attribute_error(&instance.class.name, name)),
                }
            }
            Value::Class(class) if name == "name" => Ok(Value::str(&class.name)),
            Value::Class(class) => {
                class.find_attribute(name).ok_or_else(|| attribute_error(&class.name, name))
            }
            Value::Module(module) => module.get_export(name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::Attribute,
                    format!("module '{}' has no attribute '{name}'", module.name),
                )
            }),
            other => Err(attribute_error(&other.type_name(), name)),
        }
    }

    pub(super) fn set_attribute(&self, object: &Value, name: &str, value: Value) -> Result<(), RuntimeError> {
        match object {
            Value::Instance(instance) => {
                instance.set_field(name, value.copy_for_binding());
                Ok(())
            }
            Value::Class(class) => {
                Err(type_error(format!("cannot set attribute '{name}' of class '{}'", class.name)))
            }
            Value::Module(module) => {
                Err(type_error(format!("cannot set attribute '{name}' of module '{}'", module.name)))
            }
            other => Err(attribute_error(&other.type_name(), name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interpreter;
    use crate::object::Value;

    fn run(source: &str) -> Interpreter {
        let mut interpreter = Interpreter::new();
        interpreter.evaluate("test", source, None).expect("evaluation failed");
        interpreter
    }

    fn global(source: &str, name: &str) -> Value {
        let mut interpreter = Interpreter::new();
        let module = interpreter.evaluate("test", source, None).expect("evaluation failed");
        interpreter.lookup(&module, name).expect("name not bound")
    }

    #[test]
    fn logical_operators_yield_operands() {
        assert_eq!(global("x = 0 or \"fallback\";", "x"), Value::str("fallback"));
        assert_eq!(global("x = 3 and 4;", "x"), Value::Int(4));
        assert_eq!(global("x = nil and 1 / 0;", "x"), Value::Nil);
        assert_eq!(global("x = not 0;", "x"), Value::Bool(true));
    }

    #[test]
    fn methods_are_bound_to_their_receiver() {
        let source = "
            class Counter {
                fun init(self) { self.count = 0; }
                fun bump(self) { self.count = self.count + 1; }
            }
            c = Counter();
            bump = c.bump;
            bump();
            bump();
            x = c.count;
        ";
        assert_eq!(global(source, "x"), Value::Int(2));
    }

    #[test]
    fn classes_expose_name_and_attributes() {
        let source = "
            class Point { origin = 0; }
            n = Point.name;
            o = Point.origin;
        ";
        assert_eq!(global(source, "n"), Value::str("Point"));
        assert_eq!(global(source, "o"), Value::Int(0));
    }

    #[test]
    fn repeated_keyword_arguments_are_rejected() {
        let mut interpreter = Interpreter::new();
        let source = "fun f(a) { return a; } f(a = 1, a = 2);";
        assert!(interpreter.evaluate("test", source, None).is_err());
    }

    #[test]
    fn struct_elements_are_copied_into_literals() {
        let source = "
            struct P { fun init(self, v) { self.v = v; } }
            p = P(1);
            items = [p];
            p.v = 2;
            x = items[0].v;
        ";
        assert_eq!(global(source, "x"), Value::Int(1));
        run("struct Q {} q = Q(); r = q;");
    }
}
