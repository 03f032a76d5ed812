use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{identifier_error, type_error, ErrorKind, RuntimeError};
use crate::object::Value;
use crate::token::is_keyword;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(usize);

#[derive(Debug)]
struct Frame {
    values: HashMap<String, Value>,
    /// Number of closure contexts referencing this frame.
    pins: usize,
    /// Still on the scope stack of the context that pushed it.
    live: bool,
}

impl Default for Frame {
    fn default() -> Self {
        Self { values: HashMap::new(), pins: 0, live: true }
    }
}

#[derive(Debug, Default)]
struct Context {
    scopes: Vec<ScopeId>,
    parent: Option<ContextId>,
    /// Set for contexts created by `capture`, which are freed when `refs` drops to zero.
    captured: bool,
    refs: usize,
}

/// A closure's frozen scope chain. Dropping the last function holding it queues the context
/// for release; the arena reclaims it on its next allocation.
#[derive(Debug)]
pub struct Closure {
    context: ContextId,
    released: Rc<RefCell<Vec<ContextId>>>,
}

impl Closure {
    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl Drop for Closure {
    fn drop(&mut self) {
        self.released.borrow_mut().push(self.context);
    }
}

/// Arena of scope frames and of the contexts (scope chains) built from them.
///
/// A context is a stack of frame ids, innermost last, plus an optional parent context that is
/// searched after the context's own frames. Closures capture a frozen copy of the defining
/// context, which pins the frames it references until the closure is dropped.
#[derive(Debug, Default)]
pub struct Environment {
    frames: Vec<Frame>,
    free_frames: Vec<ScopeId>,
    contexts: Vec<Context>,
    free_contexts: Vec<ContextId>,
    released: Rc<RefCell<Vec<ContextId>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new context holding a single (base) scope.
    pub fn new_context(&mut self, parent: Option<ContextId>) -> ContextId {
        self.reclaim();
        if let Some(parent) = parent {
            self.retain(parent);
        }

        let base = self.alloc_frame();
        self.alloc_context(Context { scopes: vec![base], parent, captured: false, refs: 0 })
    }

    /// Drop a context created by `new_context` once its base scope is the only one left.
    pub fn release_context(&mut self, ctx: ContextId) {
        let scopes = &self.contexts[ctx.0].scopes;
        if scopes.len() != 1 {
            panic!("unbalanced scopes in {ctx:?}: releasing with {} scopes still pushed", scopes.len());
        }

        let base = scopes[0];
        self.pop_scope(ctx, base);
        let parent = std::mem::take(&mut self.contexts[ctx.0]).parent;
        self.free_contexts.push(ctx);
        if let Some(parent) = parent {
            self.release(parent);
        }
    }

    pub fn scope_count(&self, ctx: ContextId) -> usize {
        self.contexts[ctx.0].scopes.len()
    }

    /// Contexts and frames currently in use, for tests watching the arena.
    pub fn live_counts(&self) -> (usize, usize) {
        (
            self.contexts.len() - self.free_contexts.len(),
            self.frames.len() - self.free_frames.len(),
        )
    }

    pub fn push_scope(&mut self, ctx: ContextId) -> ScopeId {
        let scope = self.alloc_frame();
        self.contexts[ctx.0].scopes.push(scope);
        scope
    }

    /// Pop the innermost scope, which must be `scope`. Anything else means the evaluator lost
    /// track of its own bookkeeping, so it aborts.
    pub fn pop_scope(&mut self, ctx: ContextId, scope: ScopeId) {
        match self.contexts[ctx.0].scopes.pop() {
            Some(top) if top == scope => {}
            Some(top) => panic!("unbalanced scopes in {ctx:?}: popping {scope:?}, innermost is {top:?}"),
            None => panic!("unbalanced scopes in {ctx:?}: scope stack underflow"),
        }

        self.frames[scope.0].live = false;
        self.collect_frame(scope);
    }

    /// Freeze the current scope chain of `ctx` for a closure.
    pub fn capture(&mut self, ctx: ContextId) -> Closure {
        self.reclaim();

        let scopes = self.contexts[ctx.0].scopes.clone();
        for scope in &scopes {
            self.frames[scope.0].pins += 1;
        }
        let parent = self.contexts[ctx.0].parent;
        if let Some(parent) = parent {
            self.retain(parent);
        }

        let context = self.alloc_context(Context { scopes, parent, captured: true, refs: 1 });
        Closure { context, released: self.released.clone() }
    }

    /// Search the scopes innermost to outermost, then the parent chain.
    pub fn get(&self, ctx: ContextId, name: &str) -> Result<Value, RuntimeError> {
        let mut current = Some(ctx);
        while let Some(id) = current {
            let context = &self.contexts[id.0];
            for scope in context.scopes.iter().rev() {
                if let Some(value) = self.frames[scope.0].values.get(name) {
                    return Ok(value.clone());
                }
            }
            current = context.parent;
        }

        Err(identifier_error(name))
    }

    /// Rebind an existing variable of the current context, or create it in the innermost scope.
    ///
    /// An existing binding keeps its class: only a `nil` binding may change class, and the
    /// first non-nil value pins it.
    pub fn assign(&mut self, ctx: ContextId, name: &str, value: Value) -> Result<(), RuntimeError> {
        check_bindable(name)?;

        let scopes = &self.contexts[ctx.0].scopes;
        let existing = scopes.iter().rev().find(|s| self.frames[s.0].values.contains_key(name));
        let scope = match existing {
            Some(&scope) => {
                let old = &self.frames[scope.0].values[name];
                if !old.is_nil() && !old.same_class(&value) {
                    return Err(type_error(format!(
                        "cannot assign {} to '{name}' of type {}",
                        value.type_name(),
                        old.type_name()
                    )));
                }
                scope
            }
            None => self.innermost(ctx),
        };

        self.frames[scope.0].values.insert(name.to_owned(), value.copy_for_binding());
        Ok(())
    }

    /// Bind in the innermost scope without the class check (parameters, loop and catch
    /// variables).
    pub fn define(&mut self, ctx: ContextId, name: &str, value: Value) -> Result<(), RuntimeError> {
        check_bindable(name)?;
        let scope = self.innermost(ctx);
        self.frames[scope.0].values.insert(name.to_owned(), value.copy_for_binding());
        Ok(())
    }

    /// Like `define`, but never copies: method receivers alias the caller's instance.
    pub fn define_shared(&mut self, ctx: ContextId, name: &str, value: Value) -> Result<(), RuntimeError> {
        check_bindable(name)?;
        let scope = self.innermost(ctx);
        self.frames[scope.0].values.insert(name.to_owned(), value);
        Ok(())
    }

    /// Bindings of the outermost scope of `ctx`, i.e. a module's top level.
    pub fn base_bindings(&self, ctx: ContextId) -> HashMap<String, Value> {
        match self.contexts[ctx.0].scopes.first() {
            Some(base) => self.frames[base.0].values.clone(),
            None => HashMap::new(),
        }
    }

    fn innermost(&self, ctx: ContextId) -> ScopeId {
        match self.contexts[ctx.0].scopes.last() {
            Some(scope) => *scope,
            None => panic!("context {ctx:?} has no scope"),
        }
    }

    /// Release the contexts of closures dropped since the last allocation.
    fn reclaim(&mut self) {
        loop {
            let next = self.released.borrow_mut().pop();
            match next {
                Some(ctx) => self.release(ctx),
                None => break,
            }
        }
    }

    fn retain(&mut self, ctx: ContextId) {
        let context = &mut self.contexts[ctx.0];
        if context.captured {
            context.refs += 1;
        }
    }

    /// Drop one reference to a captured context, freeing it (and unpinning its frames) when it
    /// was the last. Contexts from `new_context` are owned by their creator and ignored here.
    fn release(&mut self, ctx: ContextId) {
        let mut pending = vec![ctx];
        while let Some(id) = pending.pop() {
            let context = &mut self.contexts[id.0];
            if !context.captured {
                continue;
            }
            context.refs -= 1;
            if context.refs > 0 {
                continue;
            }

            let context = std::mem::take(&mut self.contexts[id.0]);
            self.free_contexts.push(id);
            for scope in context.scopes {
                self.frames[scope.0].pins -= 1;
                self.collect_frame(scope);
            }
            pending.extend(context.parent);
        }
    }

    fn alloc_context(&mut self, context: Context) -> ContextId {
        match self.free_contexts.pop() {
            Some(id) => {
                self.contexts[id.0] = context;
                id
            }
            None => {
                self.contexts.push(context);
                ContextId(self.contexts.len() - 1)
            }
        }
    }

    /// Free a popped frame once no closure needs it. A frame pinned only by closures stored in
    /// the frame itself (a local `fun`, a lambda bound in a loop body) is emptied, which drops
    /// those closures; their release then frees the frame.
    fn collect_frame(&mut self, scope: ScopeId) {
        let frame = &self.frames[scope.0];
        if frame.live {
            return;
        }
        if frame.pins == 0 {
            self.free_frame(scope);
        } else if frame.pins == self.self_pins(scope) {
            let values = std::mem::take(&mut self.frames[scope.0].values);
            drop(values);
        }
    }

    /// Pins on `scope` held by functions that nothing but the frame itself refers to.
    fn self_pins(&self, scope: ScopeId) -> usize {
        let only_here = |value: &Value| match value {
            Value::Function(function) => {
                let closure = &self.contexts[function.closure.context().0];
                Rc::strong_count(function) == 1 && closure.refs == 1 && closure.scopes.contains(&scope)
            }
            _ => false,
        };
        self.frames[scope.0].values.values().filter(|value| only_here(value)).count()
    }

    fn free_frame(&mut self, scope: ScopeId) {
        // Dropping the values may release closures; they only touch the queue.
        let values = std::mem::take(&mut self.frames[scope.0].values);
        drop(values);
        self.free_frames.push(scope);
    }

    fn alloc_frame(&mut self) -> ScopeId {
        match self.free_frames.pop() {
            Some(scope) => {
                self.frames[scope.0] = Frame::default();
                scope
            }
            None => {
                self.frames.push(Frame::default());
                ScopeId(self.frames.len() - 1)
            }
        }
    }
}

fn check_bindable(name: &str) -> Result<(), RuntimeError> {
    if is_keyword(name) {
        return Err(RuntimeError::new(ErrorKind::Syntax, format!("cannot bind keyword '{name}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_set_get_pop_round_trip() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        env.assign(ctx, "k", Value::Int(1)).unwrap();

        let scope = env.push_scope(ctx);
        env.define(ctx, "k", Value::str("inner")).unwrap();
        assert_eq!(env.get(ctx, "k").unwrap(), Value::str("inner"));
        env.pop_scope(ctx, scope);

        assert_eq!(env.get(ctx, "k").unwrap(), Value::Int(1));
    }

    #[test]
    fn new_bindings_vanish_with_their_scope() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);

        let scope = env.push_scope(ctx);
        env.assign(ctx, "k", Value::Int(1)).unwrap();
        env.pop_scope(ctx, scope);

        let err = env.get(ctx, "k").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Identifier));
    }

    #[test]
    fn assignment_updates_outer_binding() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        env.assign(ctx, "total", Value::Int(0)).unwrap();

        let scope = env.push_scope(ctx);
        env.assign(ctx, "total", Value::Int(5)).unwrap();
        env.pop_scope(ctx, scope);

        assert_eq!(env.get(ctx, "total").unwrap(), Value::Int(5));
    }

    #[test]
    fn reassignment_is_type_stable() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        env.assign(ctx, "x", Value::Int(1)).unwrap();

        let err = env.assign(ctx, "x", Value::str("one")).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Type));
        assert_eq!(env.get(ctx, "x").unwrap(), Value::Int(1));
    }

    #[test]
    fn nil_binding_is_pinned_by_first_assignment() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        env.assign(ctx, "x", Value::Nil).unwrap();
        env.assign(ctx, "x", Value::str("now a string")).unwrap();

        assert!(env.assign(ctx, "x", Value::Int(3)).is_err());
        assert!(env.assign(ctx, "x", Value::str("still fine")).is_ok());
    }

    #[test]
    fn keywords_cannot_be_bound() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        let err = env.assign(ctx, "while", Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Syntax));
    }

    #[test]
    fn lookup_falls_back_to_parent() {
        let mut env = Environment::new();
        let root = env.new_context(None);
        env.assign(root, "print", Value::Int(1)).unwrap();

        let module = env.new_context(Some(root));
        assert_eq!(env.get(module, "print").unwrap(), Value::Int(1));

        // Assignment never reaches into the parent: it shadows.
        env.assign(module, "print", Value::str("shadow")).unwrap();
        assert_eq!(env.get(root, "print").unwrap(), Value::Int(1));
    }

    #[test]
    fn captured_frames_survive_their_scope() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        let scope = env.push_scope(ctx);
        env.assign(ctx, "captured", Value::Int(7)).unwrap();
        let closure = env.capture(ctx);
        env.pop_scope(ctx, scope);

        // The recycled frame must not be the captured one.
        let other = env.push_scope(ctx);
        env.assign(ctx, "captured", Value::Int(8)).unwrap();
        assert_eq!(env.get(closure.context(), "captured").unwrap(), Value::Int(7));
        env.pop_scope(ctx, other);
    }

    #[test]
    fn dropped_closures_release_their_frames() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        let before = env.live_counts();

        let scope = env.push_scope(ctx);
        env.assign(ctx, "captured", Value::Int(7)).unwrap();
        let closure = env.capture(ctx);
        env.pop_scope(ctx, scope);
        assert_eq!(env.live_counts(), (before.0 + 1, before.1 + 1));

        drop(closure);
        let call = env.new_context(None);
        env.release_context(call);
        assert_eq!(env.live_counts(), before);
    }

    #[test]
    fn closures_keep_their_parent_alive() {
        let mut env = Environment::new();
        let module = env.new_context(None);
        let outer = env.capture(module);

        // A call of the outer closure, which defines an inner one.
        let call = env.new_context(Some(outer.context()));
        env.define(call, "n", Value::Int(3)).unwrap();
        let inner = env.capture(call);
        env.release_context(call);
        drop(outer);

        let other = env.new_context(None);
        assert_eq!(env.get(inner.context(), "n").unwrap(), Value::Int(3));
        env.release_context(other);

        drop(inner);
        let last = env.new_context(None);
        env.release_context(last);
        assert_eq!(env.live_counts(), (1, 1));
    }

    #[test]
    fn released_contexts_are_reused() {
        let mut env = Environment::new();
        let first = env.new_context(None);
        env.release_context(first);
        let second = env.new_context(None);
        assert_eq!(first, second);
        assert_eq!(env.scope_count(second), 1);
    }

    #[test]
    #[should_panic(expected = "unbalanced scopes")]
    fn popping_out_of_order_is_fatal() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        let outer = env.push_scope(ctx);
        let _inner = env.push_scope(ctx);
        env.pop_scope(ctx, outer);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn popping_an_empty_context_is_fatal() {
        let mut env = Environment::new();
        let ctx = env.new_context(None);
        env.release_context(ctx);
        env.pop_scope(ctx, ScopeId(0));
    }
}
