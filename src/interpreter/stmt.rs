use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use super::{Interpreter, StmtResult};
use crate::ast::{BinaryOp, CatchClause, ClassMember, Expr, FunctionDecl, Stmt, StmtKind, UnaryOp};
use crate::class::{should_catch, Class, Instance};
use crate::error::{type_error, value_error, ErrorKind, Raised, RuntimeError};
use crate::func::{Function, TypeSpec};
use crate::object::Value;
use crate::ops::{self, Conversion};

type PlaceUpdate<'a> = Box<dyn FnOnce(&mut Interpreter, &Value) -> Result<(), RuntimeError> + 'a>;

impl Interpreter {
    /// Execute one statement. An error leaving it records this statement in the trace, unless a
    /// statement of the same activation already did.
    pub fn execute(&mut self, stmt: &Stmt) -> StmtResult {
        let mut result = self.execute_kind(stmt);
        if let StmtResult::Throw(error) = &mut result {
            error.record(self.call_depth, || self.trace_frame(stmt));
        }
        result
    }

    pub(super) fn execute_statements(&mut self, statements: &[Stmt]) -> StmtResult {
        for stmt in statements {
            let result = self.execute(stmt);
            if result.is_interrupt() {
                return result;
            }
        }
        StmtResult::None
    }

    /// Run `statements` in a fresh scope.
    fn execute_block(&mut self, statements: &[Stmt]) -> StmtResult {
        let ctx = self.context();
        let scope = self.env.push_scope(ctx);
        let result = self.execute_statements(statements);
        self.env.pop_scope(ctx, scope);
        result
    }

    fn execute_kind(&mut self, stmt: &Stmt) -> StmtResult {
        match &stmt.kind {
            StmtKind::Expression { expr } => {
                throw_on_err!(self.evaluate_expr(expr));
                StmtResult::None
            }
            StmtKind::Assign { targets, values } => {
                throw_on_err!(self.assign(targets, values));
                StmtResult::None
            }
            StmtKind::Block { statements, catches } if catches.is_empty() => {
                self.execute_block(statements)
            }
            StmtKind::Block { statements, catches } => self.execute_try(statements, catches),
            StmtKind::If { branches, else_branch } => {
                for (condition, body) in branches {
                    let value = throw_on_err!(self.evaluate_expr(condition));
                    if throw_on_err!(ops::truthy(self, &value)) {
                        return self.execute_block(body);
                    }
                }
                match else_branch {
                    Some(body) => self.execute_block(body),
                    None => StmtResult::None,
                }
            }
            StmtKind::ForRange { variable, start, end, body } => {
                let start = throw_on_err!(self.range_bound(start));
                let end = throw_on_err!(self.range_bound(end));
                for i in start..end {
                    match self.loop_iteration(body, Some((variable, Value::Int(i)))) {
                        StmtResult::None => {}
                        StmtResult::Break => break,
                        interrupt => return interrupt,
                    }
                }
                StmtResult::None
            }
            StmtKind::While { condition, body } => loop {
                let value = throw_on_err!(self.evaluate_expr(condition));
                if !throw_on_err!(ops::truthy(self, &value)) {
                    return StmtResult::None;
                }
                match self.loop_iteration(body, None) {
                    StmtResult::None => {}
                    StmtResult::Break => return StmtResult::None,
                    interrupt => return interrupt,
                }
            },
            StmtKind::Loop { body } => loop {
                match self.loop_iteration(body, None) {
                    StmtResult::None => {}
                    StmtResult::Break => return StmtResult::None,
                    interrupt => return interrupt,
                }
            },
            StmtKind::Break => StmtResult::Break,
            StmtKind::Return { values } => {
                let mut results = Vec::with_capacity(values.len());
                for value in values {
                    results.push(throw_on_err!(self.evaluate_expr(value)));
                }
                let value = match results.len() {
                    0 => Value::Nil,
                    1 => results.remove(0),
                    _ => Value::tuple(results),
                };
                StmtResult::Return(value)
            }
            StmtKind::Throw { value } => {
                let value = throw_on_err!(self.evaluate_expr(value));
                match value {
                    Value::Instance(instance) if self.registry.is_error_class(&instance.class) => {
                        StmtResult::Throw(RuntimeError::thrown(instance))
                    }
                    _ => StmtResult::Throw(type_error("thrown values must derive from the Error class")),
                }
            }
            StmtKind::Function { decl } => {
                let function = throw_on_err!(self.make_function(decl, None));
                throw_on_err!(self.env.assign(self.context(), &decl.name, Value::Function(function)));
                StmtResult::None
            }
            StmtKind::Class { name, base, members, value_type } => {
                throw_on_err!(self.define_class(name, base.as_ref(), members, *value_type));
                StmtResult::None
            }
            StmtKind::Import { path, alias } => {
                let module = throw_on_err!(self.import(path, self.frame.module.clone()));
                let name = alias.clone().unwrap_or_else(|| module.name.clone());
                throw_on_err!(self.env.assign(self.context(), &name, Value::Module(module)));
                StmtResult::None
            }
        }
    }

    fn range_bound(&mut self, expr: &Expr) -> Result<i64, RuntimeError> {
        match self.evaluate_expr(expr)? {
            Value::Int(n) => Ok(n),
            other => Err(type_error(format!("range bounds must be int, not {}", other.type_name()))),
        }
    }

    /// One pass of a loop body in its own scope, optionally binding the loop variable.
    fn loop_iteration(&mut self, body: &[Stmt], variable: Option<(&String, Value)>) -> StmtResult {
        let ctx = self.context();
        let scope = self.env.push_scope(ctx);
        let result = match variable {
            Some((name, value)) => match self.env.define(ctx, name, value) {
                Ok(()) => self.execute_statements(body),
                Err(error) => StmtResult::Throw(error),
            },
            None => self.execute_statements(body),
        };
        self.env.pop_scope(ctx, scope);
        result
    }

    fn execute_try(&mut self, statements: &[Stmt], catches: &[CatchClause]) -> StmtResult {
        // Every clause type is validated before the body runs.
        let mut types = Vec::with_capacity(catches.len());
        for clause in catches {
            types.push(throw_on_err!(self.catch_type(&clause.error_type)));
        }

        let error = match self.execute_block(statements) {
            StmtResult::Throw(error) => error,
            result => return result,
        };

        let raised = self.raised_class(&error);
        let matching = catches.iter().zip(&types).find(|(_, class)| should_catch(&raised, class));
        let Some((clause, _)) = matching else {
            return StmtResult::Throw(error);
        };

        let exception = self.materialize(error);
        let ctx = self.context();
        let scope = self.env.push_scope(ctx);
        let result = match self.env.define(ctx, &clause.name, exception) {
            Ok(()) => self.execute_statements(&clause.body),
            Err(error) => StmtResult::Throw(error),
        };
        self.env.pop_scope(ctx, scope);
        result
    }

    fn catch_type(&mut self, expr: &Expr) -> Result<Rc<Class>, RuntimeError> {
        match self.evaluate_expr(expr)? {
            Value::Class(class) if self.registry.is_error_class(&class) => Ok(class),
            Value::Class(class) => {
                Err(type_error(format!("cannot catch '{}': it does not derive from Error", class.name)))
            }
            other => Err(type_error(format!("catch type must be a class, not {}", other.type_name()))),
        }
    }

    fn raised_class(&self, error: &RuntimeError) -> Rc<Class> {
        match &error.raised {
            Raised::Native { kind, .. } => self.registry.error_class(*kind),
            Raised::Value(instance) => instance.class.clone(),
        }
    }

    /// The exception value a catch clause binds.
    fn materialize(&self, error: RuntimeError) -> Value {
        match error.raised {
            Raised::Native { kind, message } => {
                let instance = Instance::new(self.registry.error_class(kind));
                instance.set_field("message", Value::str(&message));
                Value::Instance(Rc::new(instance))
            }
            Raised::Value(instance) => Value::Instance(instance),
        }
    }

    /// `a = 1, 2;` packs, `a, b = pair;` unpacks, `a, b = 1, 2;` binds pairwise. Every value is
    /// evaluated before anything is bound.
    fn assign(&mut self, targets: &[Expr], values: &[Expr]) -> Result<(), RuntimeError> {
        let mut evaluated = Vec::with_capacity(values.len());
        for value in values {
            evaluated.push(self.evaluate_expr(value)?);
        }

        let values = match (targets.len(), evaluated.len()) {
            (1, 1) => evaluated,
            (1, _) => vec![Value::tuple(evaluated)],
            (need, 1) => {
                let elements = ops::elements(self, &evaluated[0])?;
                check_unpack(need, elements.len())?;
                elements
            }
            (need, got) => {
                check_unpack(need, got)?;
                evaluated
            }
        };

        for (target, value) in targets.iter().zip(values) {
            self.assign_to(target, value)?;
        }
        Ok(())
    }

    fn assign_to(&mut self, target: &Expr, value: Value) -> Result<(), RuntimeError> {
        match target {
            Expr::Variable { name } => self.env.assign(self.context(), name, value),
            Expr::Attribute { object, name } => self.update_place(
                object,
                Box::new(move |this: &mut Self, object: &Value| this.set_attribute(object, name, value)),
            ),
            Expr::Index { object, index } => self.update_place(
                object,
                Box::new(move |this: &mut Self, container: &Value| {
                    let index = this.evaluate_expr(index)?;
                    ops::set_index(this, container, &index, value)
                }),
            ),
            Expr::Slice { .. } => Err(type_error("slice assignment is not supported")),
            _ => Err(RuntimeError::new(ErrorKind::Syntax, format!("cannot assign to {target}"))),
        }
    }

    /// Evaluate `place` and run `update` on the result. Struct values read through an index are
    /// copies, so after the update they are stored back into their container, level by level.
    fn update_place<'a>(&mut self, place: &'a Expr, update: PlaceUpdate<'a>) -> Result<(), RuntimeError> {
        match place {
            Expr::Index { object, index } => self.update_place(
                object,
                Box::new(move |this: &mut Self, parent: &Value| -> Result<(), RuntimeError> {
                    let index = this.evaluate_expr(index)?;
                    let container = ops::index(this, parent, &index)?;
                    update(this, &container)?;
                    if container.is_value_type() {
                        ops::set_index(this, parent, &index, container)?;
                    }
                    Ok(())
                }),
            ),
            _ => {
                let container = self.evaluate_expr(place)?;
                update(self, &container)
            }
        }
    }

    fn define_class(
        &mut self,
        name: &str,
        base: Option<&Expr>,
        members: &[ClassMember],
        value_type: bool,
    ) -> Result<(), RuntimeError> {
        let base = match base {
            None => None,
            Some(expr) => match self.evaluate_expr(expr)? {
                Value::Class(class) => Some(class),
                other => {
                    return Err(type_error(format!(
                        "base of '{name}' must be a class, not {}",
                        other.type_name()
                    )))
                }
            },
        };

        let mut attributes = HashMap::new();
        let mut functions = vec![];
        for member in members {
            match member {
                ClassMember::Method(decl) => {
                    let function = self.make_function(decl, Some(name))?;
                    functions.push(function.clone());
                    attributes.insert(decl.name.clone(), Value::Function(function));
                }
                ClassMember::Operator(decl) => {
                    let function = self.make_function(decl, Some(name))?;
                    let key = operator_key(name, decl, &function)?;
                    functions.push(function.clone());
                    attributes.insert(key, Value::Function(function));
                }
                ClassMember::Attribute { name, value } => {
                    let value = self.evaluate_expr(value)?;
                    attributes.insert(name.clone(), value);
                }
            }
        }

        let class = self.registry.class_new(name, attributes, value_type, None, base)?;
        for function in functions {
            function.set_owner(&class);
        }

        debug!(class = name, value_type, "defined class");
        self.env.assign(self.context(), name, Value::Class(class))
    }
}

fn check_unpack(need: usize, got: usize) -> Result<(), RuntimeError> {
    match need.cmp(&got) {
        std::cmp::Ordering::Equal => Ok(()),
        std::cmp::Ordering::Greater => {
            Err(value_error(format!("too few values to unpack (need {need}, got {got})")))
        }
        std::cmp::Ordering::Less => {
            Err(value_error(format!("too many values to unpack (need {need}, got {got})")))
        }
    }
}

/// Validate an operator member and return the attribute key it is stored under.
fn operator_key(class: &str, decl: &FunctionDecl, function: &Function) -> Result<String, RuntimeError> {
    let symbol = decl.name.as_str();
    let arity = function.params.len();
    let invalid = |message: String| Err(type_error(format!("operator {symbol} of '{class}': {message}")));

    if function.is_variadic() {
        return invalid("operators cannot be variadic".to_owned());
    }
    if let Some(receiver) = decl.params.first() {
        if receiver.annotation.is_some() && !matches!(function.params[0].class, TypeSpec::Owner(_)) {
            return invalid(format!("receiver '{}' must be annotated with '{class}'", receiver.name));
        }
    }

    let expect_arity = |expected: usize| {
        if arity == expected {
            Ok(())
        } else {
            Err(type_error(format!(
                "operator {symbol} of '{class}' takes exactly {expected} parameters, got {arity}"
            )))
        }
    };

    if let Some(conversion) = Conversion::from_symbol(symbol) {
        expect_arity(1)?;
        let declared_ok = match function.returns.as_slice() {
            [TypeSpec::Any] => decl.returns.is_empty(),
            [TypeSpec::Class(returned)] => returned.is_builtin() && returned.name == conversion.result_class(),
            _ => false,
        };
        if !declared_ok {
            return invalid(format!("must return {}", conversion.result_class()));
        }
        return Ok(conversion.key().to_owned());
    }

    match (symbol, arity) {
        ("~", _) => expect_arity(1).map(|_| ops::unary_key(UnaryOp::Invert).to_owned()),
        ("-", 1) => Ok(ops::unary_key(UnaryOp::Neg).to_owned()),
        ("+", 1) => Ok(ops::unary_key(UnaryOp::Pos).to_owned()),
        ("[]", _) => expect_arity(2).map(|_| ops::INDEX_KEY.to_owned()),
        ("[]=", _) => expect_arity(3).map(|_| ops::SET_INDEX_KEY.to_owned()),
        _ => match BinaryOp::from_symbol(symbol) {
            Some(op) => expect_arity(2).map(|_| ops::binary_key(op)),
            None => invalid("not an overloadable operator".to_owned()),
        },
    }
}
