use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

use ark_ast::{
    AssignStmt, AssignTarget, Block, Expr, ExprKind, Ident, ImportStmt, Program, ReturnStmt, Span,
    Stmt,
};
use ark_core::{
    BoundMethod, ClassValue, FunctionValue, RuntimeContext, RuntimeError, RuntimeErrorKind, Scope,
    ScopeRef, Value,
};

use crate::ModuleLoader;
use crate::flow::Flow;
use crate::ops;

/// Evaluates a program against a scope. Convenience wrapper over
/// [`Interpreter`] for hosts that don't need imports.
pub fn evaluate(
    ctx: &RuntimeContext,
    program: &Program,
    scope: &ScopeRef,
) -> Result<Value, RuntimeError> {
    Interpreter::new(ctx).evaluate(program, scope)
}

pub struct Interpreter<'a> {
    ctx: &'a RuntimeContext,
    loader: Option<&'a dyn ModuleLoader>,
    /// Non-tail call depth; bounded by the configured recursion limit.
    depth: usize,
    /// Functions currently executing, innermost last. Tail-call detection
    /// compares against the top by reference identity.
    call_stack: Vec<Rc<FunctionValue>>,
    /// Canonical paths already imported this run; re-imports are no-ops.
    loaded: HashSet<PathBuf>,
}

impl<'a> Interpreter<'a> {
    pub fn new(ctx: &'a RuntimeContext) -> Self {
        Self {
            ctx,
            loader: None,
            depth: 0,
            call_stack: Vec::new(),
            loaded: HashSet::new(),
        }
    }

    pub fn with_loader(ctx: &'a RuntimeContext, loader: &'a dyn ModuleLoader) -> Self {
        Self {
            loader: Some(loader),
            ..Self::new(ctx)
        }
    }

    /// Runs every top-level statement; the value of the last expression
    /// statement is the program's result. A top-level `return` ends the
    /// run early with its value.
    pub fn evaluate(&mut self, program: &Program, scope: &ScopeRef) -> Result<Value, RuntimeError> {
        let mut last = Value::Unit;
        for stmt in &program.stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Value(v) => last = v,
                Flow::Return(v) => return Ok(v),
                Flow::Break => {
                    return Err(RuntimeError::at(
                        RuntimeErrorKind::StrayLoopSignal("break"),
                        stmt.span(),
                    ));
                }
                Flow::Continue => {
                    return Err(RuntimeError::at(
                        RuntimeErrorKind::StrayLoopSignal("continue"),
                        stmt.span(),
                    ));
                }
                Flow::TailCall { .. } => {
                    // Tail calls only form while a function frame is live.
                    return Err(RuntimeError::at(
                        RuntimeErrorKind::StrayLoopSignal("tail call"),
                        stmt.span(),
                    ));
                }
            }
        }
        Ok(last)
    }

    fn exec_block(&mut self, block: &Block, scope: &ScopeRef) -> Result<Flow, RuntimeError> {
        let mut last = Value::Unit;
        for stmt in &block.stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Value(v) => last = v,
                other => return Ok(other),
            }
        }
        Ok(Flow::Value(last))
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Expr(e) => Ok(Flow::Value(self.eval_expr(e, scope)?)),
            Stmt::Assign(a) => self.exec_assign(a, scope),
            Stmt::Func(decl) => {
                let func = FunctionValue {
                    name: decl.name.node.clone(),
                    params: decl.params.iter().map(|p| p.node.clone()).collect(),
                    body: decl.body.clone(),
                    closure: scope.clone(),
                };
                scope
                    .borrow_mut()
                    .set(decl.name.node.clone(), Value::Function(Rc::new(func)));
                Ok(Flow::Value(Value::Unit))
            }
            Stmt::Class(decl) => {
                let mut methods = std::collections::BTreeMap::new();
                for m in &decl.methods {
                    methods.insert(
                        m.name.node.clone(),
                        Rc::new(FunctionValue {
                            name: m.name.node.clone(),
                            params: m.params.iter().map(|p| p.node.clone()).collect(),
                            body: m.body.clone(),
                            closure: scope.clone(),
                        }),
                    );
                }
                let class = ClassValue {
                    name: decl.name.node.clone(),
                    methods,
                };
                scope
                    .borrow_mut()
                    .set(decl.name.node.clone(), Value::Class(Rc::new(class)));
                Ok(Flow::Value(Value::Unit))
            }
            Stmt::Struct(decl) => {
                // A struct declaration behaves as a method-less class; the
                // field list is surface-level and feeds the advisory checker.
                let class = ClassValue {
                    name: decl.name.node.clone(),
                    methods: std::collections::BTreeMap::new(),
                };
                scope
                    .borrow_mut()
                    .set(decl.name.node.clone(), Value::Class(Rc::new(class)));
                Ok(Flow::Value(Value::Unit))
            }
            Stmt::If(s) => {
                for arm in &s.arms {
                    if self.eval_expr(&arm.cond, scope)?.is_truthy() {
                        return self.exec_block(&arm.body, scope);
                    }
                }
                if let Some(else_body) = &s.else_body {
                    return self.exec_block(else_body, scope);
                }
                Ok(Flow::Value(Value::Unit))
            }
            Stmt::While(s) => {
                while self.eval_expr(&s.cond, scope)?.is_truthy() {
                    match self.exec_block(&s.body, scope)? {
                        Flow::Value(_) => {}
                        Flow::Break => break,
                        Flow::Continue => continue,
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Value(Value::Unit))
            }
            Stmt::Return(r) => self.exec_return(r, scope),
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
            Stmt::Import(i) => self.exec_import(i, scope),
        }
    }

    fn exec_assign(&mut self, a: &AssignStmt, scope: &ScopeRef) -> Result<Flow, RuntimeError> {
        let value = self.eval_expr(&a.value, scope)?;
        match &a.target {
            AssignTarget::Name(name) => {
                scope.borrow_mut().set(name.node.clone(), value);
            }
            AssignTarget::Attr { obj, name } => {
                let obj_val = self.eval_expr(obj, scope)?;
                match obj_val {
                    Value::Struct(s) => {
                        s.fields.borrow_mut().insert(name.node.clone(), value);
                    }
                    other => {
                        return Err(RuntimeError::at(
                            RuntimeErrorKind::UnknownAttribute {
                                ty: other.type_name(),
                                attr: name.node.clone(),
                            },
                            a.span,
                        ));
                    }
                }
            }
            AssignTarget::Index { obj, index } => {
                let obj_val = self.eval_expr(obj, scope)?;
                let idx_val = self.eval_expr(index, scope)?;
                match (&obj_val, &idx_val) {
                    (Value::List(items), Value::Integer(i)) => {
                        let mut items = items.borrow_mut();
                        let len = items.len();
                        if *i < 0 || *i as usize >= len {
                            return Err(RuntimeError::at(
                                RuntimeErrorKind::IndexOutOfRange { index: *i, len },
                                a.span,
                            ));
                        }
                        items[*i as usize] = value;
                    }
                    (l, r) => {
                        return Err(RuntimeError::at(
                            RuntimeErrorKind::TypeMismatch {
                                op: "[]=".to_string(),
                                lhs: l.type_name(),
                                rhs: r.type_name(),
                            },
                            a.span,
                        ));
                    }
                }
            }
        }
        Ok(Flow::Value(Value::Unit))
    }

    fn exec_return(&mut self, r: &ReturnStmt, scope: &ScopeRef) -> Result<Flow, RuntimeError> {
        let Some(expr) = &r.value else {
            return Ok(Flow::Return(Value::Unit));
        };

        if let ExprKind::Call { callee, args } = &expr.kind {
            let callee_val = self.eval_expr(callee, scope)?;
            // Only a callee reference-identical to the executing function
            // is a tail call; a shadowed or rebound name with the same
            // spelling recurses normally.
            let tail_target = match (&callee_val, self.call_stack.last()) {
                (Value::Function(f), Some(current)) if Rc::ptr_eq(f, current) => Some(f.clone()),
                _ => None,
            };
            if let Some(func) = tail_target {
                let mut argv = Vec::with_capacity(args.len());
                for a in args {
                    argv.push(self.eval_expr(a, scope)?);
                }
                return Ok(Flow::TailCall {
                    func,
                    this: None,
                    args: argv,
                });
            }
            let v = self.eval_call(callee_val, args, expr.span, scope)?;
            return Ok(Flow::Return(v));
        }

        let v = self.eval_expr(expr, scope)?;
        Ok(Flow::Return(v))
    }

    fn exec_import(&mut self, imp: &ImportStmt, scope: &ScopeRef) -> Result<Flow, RuntimeError> {
        let mut rel = PathBuf::new();
        for seg in &imp.path {
            rel.push(&seg.node);
        }
        rel.set_extension("ark");
        let display = imp
            .path
            .iter()
            .map(|p| p.node.as_str())
            .collect::<Vec<_>>()
            .join(".");

        let real = self
            .ctx
            .sandbox()
            .validate_path(&rel, false)
            .map_err(|v| RuntimeError::from(v).ensure_span(imp.span))?;

        // Recording before evaluation is what breaks import cycles: a
        // module re-importing its importer finds it already loaded.
        if !self.loaded.insert(real.clone()) {
            return Ok(Flow::Value(Value::Unit));
        }

        let loader = self.loader.ok_or_else(|| {
            RuntimeError::at(
                RuntimeErrorKind::ImportFailed {
                    path: display.clone(),
                    reason: "no module loader installed".to_string(),
                },
                imp.span,
            )
        })?;
        let program = loader.load(&real).map_err(|e| {
            RuntimeError::at(
                RuntimeErrorKind::ImportFailed {
                    path: display.clone(),
                    reason: e.message,
                },
                imp.span,
            )
        })?;

        // Module statements evaluate into the importing scope, not a
        // fresh module scope.
        for stmt in &program.stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Value(_) => {}
                Flow::Return(_) => break,
                Flow::Break | Flow::Continue | Flow::TailCall { .. } => {
                    return Err(RuntimeError::at(
                        RuntimeErrorKind::StrayLoopSignal("module control flow"),
                        stmt.span(),
                    ));
                }
            }
        }
        Ok(Flow::Value(Value::Unit))
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &ScopeRef) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Integer(*n)),
            ExprKind::Float(x) => Ok(Value::Float(*x)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item, scope)?);
                }
                Ok(Value::list(out))
            }
            ExprKind::Var(name) => self.resolve_var(name, expr.span, scope),
            ExprKind::Binary { op, left, right } => match op {
                ark_ast::BinOp::And => {
                    let l = self.eval_expr(left, scope)?;
                    if !l.is_truthy() {
                        Ok(Value::Bool(false))
                    } else {
                        self.eval_expr(right, scope)
                    }
                }
                ark_ast::BinOp::Or => {
                    let l = self.eval_expr(left, scope)?;
                    if l.is_truthy() {
                        Ok(Value::Bool(true))
                    } else {
                        self.eval_expr(right, scope)
                    }
                }
                _ => {
                    let l = self.eval_expr(left, scope)?;
                    let r = self.eval_expr(right, scope)?;
                    ops::binary(*op, l, r, expr.span)
                }
            },
            ExprKind::Unary { op, expr: inner } => {
                let v = self.eval_expr(inner, scope)?;
                ops::unary(*op, v, expr.span)
            }
            ExprKind::Call { callee, args } => {
                let callee_val = self.eval_expr(callee, scope)?;
                self.eval_call(callee_val, args, expr.span, scope)
            }
            ExprKind::Attr { obj, name } => self.eval_attr(obj, name, expr.span, scope),
            ExprKind::Index { obj, index } => {
                let obj_val = self.eval_expr(obj, scope)?;
                let idx_val = self.eval_expr(index, scope)?;
                self.eval_index(obj_val, idx_val, expr.span)
            }
        }
    }

    fn resolve_var(
        &mut self,
        name: &str,
        span: Span,
        scope: &ScopeRef,
    ) -> Result<Value, RuntimeError> {
        match Scope::get(scope, name) {
            Some(Value::Moved) => Err(RuntimeError::at(
                RuntimeErrorKind::LinearityViolation(name.to_string()),
                span,
            )),
            Some(v) => Ok(v),
            None if self.ctx.registry().contains(name) => Ok(Value::Intrinsic(name.to_string())),
            None => Err(RuntimeError::at(
                RuntimeErrorKind::UndefinedVariable(name.to_string()),
                span,
            )),
        }
    }

    fn eval_attr(
        &mut self,
        obj: &Expr,
        name: &Ident,
        span: Span,
        scope: &ScopeRef,
    ) -> Result<Value, RuntimeError> {
        // Dotted intrinsic names (`sys.list.append`) arrive as attribute
        // chains; when the chain's root is not a bound variable, resolve
        // the whole chain through the registry.
        if let Some(dotted) = dotted_name(obj, name) {
            let root = dotted.split('.').next().unwrap_or("");
            if Scope::get(scope, root).is_none() && self.ctx.registry().contains(&dotted) {
                return Ok(Value::Intrinsic(dotted));
            }
        }

        let obj_val = self.eval_expr(obj, scope)?;
        match &obj_val {
            Value::Struct(s) => {
                if let Some(v) = s.fields.borrow().get(&name.node) {
                    return Ok(v.clone());
                }
                if let Some(class) = &s.class {
                    if let Some(m) = class.methods.get(&name.node) {
                        return Ok(Value::BoundMethod(Rc::new(BoundMethod {
                            receiver: obj_val.clone(),
                            method: m.clone(),
                        })));
                    }
                }
                Err(RuntimeError::at(
                    RuntimeErrorKind::UnknownAttribute {
                        ty: "Struct",
                        attr: name.node.clone(),
                    },
                    span,
                ))
            }
            Value::Class(c) => c
                .methods
                .get(&name.node)
                .map(|m| Value::Function(m.clone()))
                .ok_or_else(|| {
                    RuntimeError::at(
                        RuntimeErrorKind::UnknownAttribute {
                            ty: "Class",
                            attr: name.node.clone(),
                        },
                        span,
                    )
                }),
            other => Err(RuntimeError::at(
                RuntimeErrorKind::UnknownAttribute {
                    ty: other.type_name(),
                    attr: name.node.clone(),
                },
                span,
            )),
        }
    }

    fn eval_index(
        &mut self,
        obj: Value,
        index: Value,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        match (&obj, &index) {
            (Value::List(items), Value::Integer(i)) => {
                let items = items.borrow();
                if *i < 0 || *i as usize >= items.len() {
                    return Err(RuntimeError::at(
                        RuntimeErrorKind::IndexOutOfRange {
                            index: *i,
                            len: items.len(),
                        },
                        span,
                    ));
                }
                Ok(items[*i as usize].clone())
            }
            (Value::Str(s), Value::Integer(i)) => {
                let ch = if *i >= 0 {
                    s.chars().nth(*i as usize)
                } else {
                    None
                };
                ch.map(|c| Value::Str(c.to_string())).ok_or_else(|| {
                    RuntimeError::at(
                        RuntimeErrorKind::IndexOutOfRange {
                            index: *i,
                            len: s.chars().count(),
                        },
                        span,
                    )
                })
            }
            (Value::Struct(s), Value::Str(key)) => {
                s.fields.borrow().get(key).cloned().ok_or_else(|| {
                    RuntimeError::at(
                        RuntimeErrorKind::UnknownAttribute {
                            ty: "Struct",
                            attr: key.clone(),
                        },
                        span,
                    )
                })
            }
            (l, r) => Err(RuntimeError::at(
                RuntimeErrorKind::TypeMismatch {
                    op: "[]".to_string(),
                    lhs: l.type_name(),
                    rhs: r.type_name(),
                },
                span,
            )),
        }
    }

    fn eval_call(
        &mut self,
        callee: Value,
        arg_exprs: &[Expr],
        span: Span,
        scope: &ScopeRef,
    ) -> Result<Value, RuntimeError> {
        let mut args = Vec::with_capacity(arg_exprs.len());
        for a in arg_exprs {
            args.push(self.eval_expr(a, scope)?);
        }

        match callee {
            Value::Intrinsic(name) => {
                let result = self
                    .ctx
                    .registry()
                    .invoke(self.ctx, &name, args)
                    .map_err(|e| e.ensure_span(span))?;
                // The call succeeded; now consume the declared linear
                // argument positions in their defining frames. The
                // violation surfaces on the next read, not here.
                if let Some(def) = self.ctx.registry().get(&name) {
                    for &idx in def.linear_args {
                        if let Some(ExprKind::Var(var_name)) =
                            arg_exprs.get(idx).map(|e| &e.kind)
                        {
                            Scope::mark_moved(scope, var_name);
                        }
                    }
                }
                Ok(result)
            }
            Value::Function(f) => self.call_function(f, None, args, span),
            Value::BoundMethod(m) => {
                self.call_function(m.method.clone(), Some(m.receiver.clone()), args, span)
            }
            Value::Class(c) => Ok(Value::empty_struct(Some(c))),
            other => Err(RuntimeError::at(
                RuntimeErrorKind::NotCallable(other.type_name()),
                span,
            )),
        }
    }

    /// The call driver. One native frame per non-tail call; a tail call
    /// rebinds the argument frame in place and loops, so self-recursive
    /// functions execute in constant native stack.
    fn call_function(
        &mut self,
        func: Rc<FunctionValue>,
        this: Option<Value>,
        args: Vec<Value>,
        call_span: Span,
    ) -> Result<Value, RuntimeError> {
        let limit = self.ctx.limits().max_recursion_depth;
        if self.depth >= limit {
            return Err(RuntimeError::at(
                RuntimeErrorKind::RecursionLimitExceeded(limit),
                call_span,
            ));
        }
        self.depth += 1;
        self.call_stack.push(func.clone());

        let mut func = func;
        let mut this = this;
        let mut args = args;
        let result = loop {
            let frame = Scope::child(&func.closure);
            {
                let mut f = frame.borrow_mut();
                if let Some(t) = this.take() {
                    f.set("this", t);
                }
                // Positional binding: excess arguments are ignored,
                // missing ones bind to Unit.
                for (i, param) in func.params.iter().enumerate() {
                    f.set(param.clone(), args.get(i).cloned().unwrap_or(Value::Unit));
                }
            }

            match self.exec_block(&func.body, &frame) {
                Ok(Flow::Return(v)) => break Ok(v),
                Ok(Flow::Value(_)) => break Ok(Value::Unit),
                Ok(Flow::TailCall {
                    func: next,
                    this: next_this,
                    args: next_args,
                }) => {
                    func = next;
                    this = next_this;
                    args = next_args;
                    if let Some(top) = self.call_stack.last_mut() {
                        *top = func.clone();
                    }
                }
                Ok(Flow::Break) => {
                    break Err(RuntimeError::at(
                        RuntimeErrorKind::StrayLoopSignal("break"),
                        call_span,
                    ));
                }
                Ok(Flow::Continue) => {
                    break Err(RuntimeError::at(
                        RuntimeErrorKind::StrayLoopSignal("continue"),
                        call_span,
                    ));
                }
                Err(e) => break Err(e.with_frame(func.name.clone(), call_span)),
            }
        };

        self.call_stack.pop();
        self.depth -= 1;
        result
    }
}

fn dotted_name(obj: &Expr, name: &Ident) -> Option<String> {
    fn prefix(e: &Expr) -> Option<String> {
        match &e.kind {
            ExprKind::Var(v) => Some(v.clone()),
            ExprKind::Attr { obj, name } => Some(format!("{}.{}", prefix(obj)?, name.node)),
            _ => None,
        }
    }
    Some(format!("{}.{}", prefix(obj)?, name.node))
}
