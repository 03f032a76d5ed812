use std::collections::HashSet;
use std::rc::Rc;

use super::{Activation, Interpreter, StmtResult};
use crate::ast::{Expr, FunctionDecl};
use crate::class::{Class, Instance};
use crate::environment::ContextId;
use crate::error::{type_error, ErrorKind, RuntimeError};
use crate::func::{Function, ParamSpec, TypeSpec};
use crate::object::{Kwargs, Value};

impl Interpreter {
    /// Create a function value from its declaration, resolving annotations now. Inside a class
    /// body `owner` names the class being defined.
    pub(super) fn make_function(
        &mut self,
        decl: &Rc<FunctionDecl>,
        owner: Option<&str>,
    ) -> Result<Rc<Function>, RuntimeError> {
        let mut seen = HashSet::new();
        for (i, param) in decl.params.iter().enumerate() {
            if !seen.insert(param.name.as_str()) {
                return Err(RuntimeError::new(
                    ErrorKind::Syntax,
                    format!("duplicate parameter '{}' in '{}'", param.name, decl.name),
                ));
            }
            if param.variadic && i + 1 != decl.params.len() {
                return Err(RuntimeError::new(
                    ErrorKind::Syntax,
                    format!("only the last parameter of '{}' may be variadic", decl.name),
                ));
            }
        }

        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let class = match &param.annotation {
                Some(annotation) => self.resolve_type(annotation, owner)?,
                None => TypeSpec::Any,
            };
            params.push(ParamSpec { name: param.name.clone(), class, variadic: param.variadic });
        }

        let mut returns = Vec::with_capacity(decl.returns.len().max(1));
        for expr in &decl.returns {
            returns.push(self.resolve_type(expr, owner)?);
        }
        if returns.is_empty() {
            returns.push(TypeSpec::Any);
        }

        let closure = self.env.capture(self.context());
        Ok(Rc::new(Function::new(decl.clone(), params, returns, closure, self.frame.unit.clone())))
    }

    fn resolve_type(&mut self, expr: &Expr, owner: Option<&str>) -> Result<TypeSpec, RuntimeError> {
        if let (Expr::Variable { name }, Some(owner)) = (expr, owner) {
            if name == owner {
                return Ok(TypeSpec::Owner(name.clone()));
            }
        }

        match self.evaluate_expr(expr)? {
            Value::Class(class) if Rc::ptr_eq(&class, &self.registry.builtins().nil) => Ok(TypeSpec::Any),
            Value::Class(class) => Ok(TypeSpec::Class(class)),
            other => Err(type_error(format!("type annotation must be a class, not {}", other.type_name()))),
        }
    }

    pub fn call_value(&mut self, callee: &Value, arguments: Vec<Value>, kwargs: Kwargs) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => self.call_function(function, arguments, kwargs, false),
            Value::BoundMethod(bound) => self.call_bound(&bound.method, bound.receiver.clone(), arguments, kwargs),
            Value::Native(native) => native.call(self, arguments, kwargs),
            Value::Class(class) => self.instantiate(class, arguments, kwargs),
            other => Err(type_error(format!("'{}' object is not callable", other.type_name()))),
        }
    }

    /// Call a class member with `receiver` as its first argument.
    pub fn call_method(&mut self, method: &Value, receiver: Value, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        self.call_bound(method, receiver, arguments, vec![])
    }

    fn call_bound(
        &mut self,
        method: &Value,
        receiver: Value,
        arguments: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, RuntimeError> {
        let mut all = Vec::with_capacity(arguments.len() + 1);
        all.push(receiver);
        all.extend(arguments);

        match method {
            Value::Function(function) => self.call_function(function, all, kwargs, true),
            other => self.call_value(other, all, kwargs),
        }
    }

    fn instantiate(&mut self, class: &Rc<Class>, arguments: Vec<Value>, kwargs: Kwargs) -> Result<Value, RuntimeError> {
        let init = class.find_attribute("init");
        if init.is_none() {
            if let Some(constructor) = class.find_constructor() {
                return constructor(self, class, arguments, kwargs);
            }
            if class.is_builtin() {
                return Err(type_error(format!("cannot create '{}' instances", class.name)));
            }
        }

        let instance = Value::Instance(Rc::new(Instance::new(class.clone())));
        match init {
            Some(init) => {
                self.call_bound(&init, instance.clone(), arguments, kwargs)?;
            }
            None if !arguments.is_empty() || !kwargs.is_empty() => {
                return Err(type_error(format!("{}() takes no arguments", class.name)));
            }
            None => {}
        }
        Ok(instance)
    }

    #[tracing::instrument(level = "trace", skip_all, fields(function = %function.name()))]
    fn call_function(
        &mut self,
        function: &Rc<Function>,
        arguments: Vec<Value>,
        kwargs: Kwargs,
        has_receiver: bool,
    ) -> Result<Value, RuntimeError> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::new(
                ErrorKind::Recursion,
                format!("maximum call depth of {} exceeded", self.config.max_call_depth),
            ));
        }

        let context = self.env.new_context(Some(function.closure.context()));
        if let Err(error) = self.bind_arguments(function, context, arguments, kwargs, has_receiver) {
            self.env.release_context(context);
            return Err(error);
        }

        let activation = Activation {
            context,
            unit: function.unit.clone(),
            scope: function.name().to_owned(),
            module: self.frame.module.clone(),
        };
        let result = self.with_activation(activation, |interpreter| {
            interpreter.execute_statements(&function.decl.body)
        });
        self.env.release_context(context);

        let value = match result {
            StmtResult::Return(value) => value,
            StmtResult::None | StmtResult::Break => Value::Nil,
            StmtResult::Throw(error) => return Err(error),
        };
        self.check_returns(function, value)
    }

    fn bind_arguments(
        &mut self,
        function: &Function,
        context: ContextId,
        arguments: Vec<Value>,
        kwargs: Kwargs,
        has_receiver: bool,
    ) -> Result<(), RuntimeError> {
        let name = function.name();
        let (fixed, variadic) = match function.params.split_last() {
            Some((last, fixed)) if last.variadic => (fixed, Some(last)),
            _ => (function.params.as_slice(), None),
        };

        let given = arguments.len();
        let mut arguments = arguments.into_iter();
        let mut slots: Vec<Option<Value>> = fixed.iter().map(|_| arguments.next()).collect();
        let rest: Vec<Value> = arguments.collect();
        if !rest.is_empty() && variadic.is_none() {
            return Err(type_error(format!(
                "{name}() takes {} positional arguments but {given} were given",
                fixed.len()
            )));
        }

        for (keyword, value) in kwargs {
            match fixed.iter().position(|p| p.name == keyword) {
                Some(i) if slots[i].is_some() => {
                    return Err(type_error(format!("{name}() got multiple values for argument '{keyword}'")))
                }
                Some(i) => slots[i] = Some(value),
                None => {
                    return Err(type_error(format!("{name}() got an unexpected keyword argument '{keyword}'")))
                }
            }
        }

        let owner = function.owner();
        for (i, (param, slot)) in fixed.iter().zip(slots).enumerate() {
            let Some(value) = slot else {
                return Err(type_error(format!("{name}() missing required argument '{}'", param.name)));
            };
            self.check_argument(name, param, &value, owner.as_ref())?;
            if i == 0 && has_receiver {
                self.env.define_shared(context, &param.name, value)?;
            } else {
                self.env.define(context, &param.name, value)?;
            }
        }

        if let Some(param) = variadic {
            for value in &rest {
                self.check_argument(name, param, value, owner.as_ref())?;
            }
            self.env.define(context, &param.name, Value::tuple(rest))?;
        }
        Ok(())
    }

    fn check_argument(
        &self,
        function: &str,
        param: &ParamSpec,
        value: &Value,
        owner: Option<&Rc<Class>>,
    ) -> Result<(), RuntimeError> {
        if param.class.accepts(&value.class(&self.registry), owner) {
            return Ok(());
        }
        Err(type_error(format!(
            "{function}() argument '{}' must be {}, not {}",
            param.name,
            param.class,
            value.type_name()
        )))
    }

    fn check_returns(&self, function: &Function, value: Value) -> Result<Value, RuntimeError> {
        let owner = function.owner();
        let mismatch = |expected: &TypeSpec, value: &Value| {
            type_error(format!(
                "{}() must return {expected}, not {}",
                function.name(),
                value.type_name()
            ))
        };

        match function.returns.as_slice() {
            [expected] => {
                if !expected.accepts(&value.class(&self.registry), owner.as_ref()) {
                    return Err(mismatch(expected, &value));
                }
            }
            expected => {
                let Value::Tuple(values) = &value else {
                    return Err(type_error(format!(
                        "{}() must return {} values, not {}",
                        function.name(),
                        expected.len(),
                        value.type_name()
                    )));
                };
                if values.len() != expected.len() {
                    return Err(type_error(format!(
                        "{}() must return {} values, not {}",
                        function.name(),
                        expected.len(),
                        values.len()
                    )));
                }
                for (declared, value) in expected.iter().zip(values.iter()) {
                    if !declared.accepts(&value.class(&self.registry), owner.as_ref()) {
                        return Err(mismatch(declared, value));
                    }
                }
            }
        }
        Ok(value)
    }
}
