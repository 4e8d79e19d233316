#![forbid(unsafe_code)]

//! Advisory static checks.
//!
//! A best-effort pass over a parsed program that surfaces likely mistakes
//! as warnings. The language stays dynamically typed: nothing here blocks
//! execution or narrows the runtime representation, and a warning-free
//! program can still fail at runtime.

use std::collections::{HashMap, HashSet};

use ark_ast::{AssignTarget, BinOp, Block, Expr, ExprKind, Program, Span, Stmt};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum CheckWarning {
    #[error("reference to unknown name '{name}'")]
    #[diagnostic(code(ark::check::unknown_name), severity(Warning))]
    UnknownName { name: String, span: Span },

    #[error("'{name}' is declared with {expected} parameters but called with {got} arguments")]
    #[diagnostic(code(ark::check::arity), severity(Warning))]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("arithmetic operator '{op}' applied to a string literal")]
    #[diagnostic(code(ark::check::string_operand), severity(Warning))]
    StringOperand { op: String, span: Span },

    #[error("'return' outside of a function body")]
    #[diagnostic(code(ark::check::stray_return), severity(Warning))]
    StrayReturn { span: Span },
}

pub struct Checker {
    known: HashSet<String>,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker {
    pub fn new() -> Self {
        Self {
            known: HashSet::from(["print".to_string(), "this".to_string()]),
        }
    }

    /// Extends the set of names assumed bound by the host (intrinsic
    /// packs, injected globals).
    pub fn with_known_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut checker = Self::new();
        checker.known.extend(names);
        checker
    }

    pub fn check_program(&self, program: &Program) -> Vec<CheckWarning> {
        let mut pass = Pass {
            known: &self.known,
            defined: HashSet::new(),
            func_arities: HashMap::new(),
            warnings: Vec::new(),
        };
        pass.collect(&program.stmts);
        pass.check_stmts(&program.stmts, 0);
        pass.warnings
    }
}

struct Pass<'a> {
    known: &'a HashSet<String>,
    /// Every name bound anywhere in the unit. Deliberately flow-insensitive
    /// so the advisory pass stays quiet on reorderable code.
    defined: HashSet<String>,
    func_arities: HashMap<String, usize>,
    warnings: Vec<CheckWarning>,
}

impl Pass<'_> {
    fn collect(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::Assign(a) => {
                    if let AssignTarget::Name(name) = &a.target {
                        self.defined.insert(name.node.clone());
                    }
                }
                Stmt::Func(f) => {
                    self.defined.insert(f.name.node.clone());
                    self.func_arities
                        .insert(f.name.node.clone(), f.params.len());
                    for p in &f.params {
                        self.defined.insert(p.node.clone());
                    }
                    self.collect(&f.body.stmts);
                }
                Stmt::Class(c) => {
                    self.defined.insert(c.name.node.clone());
                    for m in &c.methods {
                        for p in &m.params {
                            self.defined.insert(p.node.clone());
                        }
                        self.collect(&m.body.stmts);
                    }
                }
                Stmt::Struct(s) => {
                    self.defined.insert(s.name.node.clone());
                }
                Stmt::If(s) => {
                    for arm in &s.arms {
                        self.collect(&arm.body.stmts);
                    }
                    if let Some(e) = &s.else_body {
                        self.collect(&e.stmts);
                    }
                }
                Stmt::While(s) => self.collect(&s.body.stmts),
                Stmt::Import(_)
                | Stmt::Expr(_)
                | Stmt::Return(_)
                | Stmt::Break(_)
                | Stmt::Continue(_) => {}
            }
        }
    }

    fn check_stmts(&mut self, stmts: &[Stmt], fn_depth: usize) {
        for stmt in stmts {
            self.check_stmt(stmt, fn_depth);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, fn_depth: usize) {
        match stmt {
            Stmt::Expr(e) => self.check_expr(e),
            Stmt::Assign(a) => {
                match &a.target {
                    AssignTarget::Name(_) => {}
                    AssignTarget::Attr { obj, .. } => self.check_expr(obj),
                    AssignTarget::Index { obj, index } => {
                        self.check_expr(obj);
                        self.check_expr(index);
                    }
                }
                self.check_expr(&a.value);
            }
            Stmt::Func(f) => self.check_stmts(&f.body.stmts, fn_depth + 1),
            Stmt::Class(c) => {
                for m in &c.methods {
                    self.check_stmts(&m.body.stmts, fn_depth + 1);
                }
            }
            Stmt::Struct(_) | Stmt::Import(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::If(s) => {
                for arm in &s.arms {
                    self.check_expr(&arm.cond);
                    self.check_block(&arm.body, fn_depth);
                }
                if let Some(e) = &s.else_body {
                    self.check_block(e, fn_depth);
                }
            }
            Stmt::While(s) => {
                self.check_expr(&s.cond);
                self.check_block(&s.body, fn_depth);
            }
            Stmt::Return(r) => {
                if fn_depth == 0 {
                    self.warnings.push(CheckWarning::StrayReturn { span: r.span });
                }
                if let Some(v) = &r.value {
                    self.check_expr(v);
                }
            }
        }
    }

    fn check_block(&mut self, block: &Block, fn_depth: usize) {
        self.check_stmts(&block.stmts, fn_depth);
    }

    fn check_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Bool(_) => {}
            ExprKind::List(items) => {
                for item in items {
                    self.check_expr(item);
                }
            }
            ExprKind::Var(name) => {
                if !self.is_bound(name) {
                    self.warnings.push(CheckWarning::UnknownName {
                        name: name.clone(),
                        span: expr.span,
                    });
                }
            }
            ExprKind::Binary { op, left, right } => {
                if matches!(
                    op,
                    BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
                ) {
                    for side in [left.as_ref(), right.as_ref()] {
                        if matches!(side.kind, ExprKind::Str(_)) {
                            self.warnings.push(CheckWarning::StringOperand {
                                op: op.to_string(),
                                span: side.span,
                            });
                        }
                    }
                }
                self.check_expr(left);
                self.check_expr(right);
            }
            ExprKind::Unary { expr: inner, .. } => self.check_expr(inner),
            ExprKind::Call { callee, args } => {
                if let ExprKind::Var(name) = &callee.kind {
                    if let Some(&expected) = self.func_arities.get(name) {
                        if args.len() != expected {
                            self.warnings.push(CheckWarning::ArityMismatch {
                                name: name.clone(),
                                expected,
                                got: args.len(),
                                span: expr.span,
                            });
                        }
                    }
                }
                self.check_expr(callee);
                for arg in args {
                    self.check_expr(arg);
                }
            }
            ExprKind::Attr { obj, .. } => {
                // Attribute chains rooted at an unbound name are dotted
                // intrinsic references; leave them to runtime dispatch.
                if let Some(root) = chain_root(obj) {
                    if !self.is_bound(root) {
                        return;
                    }
                }
                self.check_expr(obj);
            }
            ExprKind::Index { obj, index } => {
                self.check_expr(obj);
                self.check_expr(index);
            }
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.defined.contains(name) || self.known.contains(name)
    }
}

fn chain_root(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Var(v) => Some(v),
        ExprKind::Attr { obj, .. } => chain_root(obj),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ast::{AssignStmt, FuncDecl, Ident, ReturnStmt, Spanned};
    use std::rc::Rc;

    fn sp() -> Span {
        Span::new(1, 1)
    }

    fn ident(name: &str) -> Ident {
        Spanned::new(sp(), name.to_string())
    }

    fn int(n: i64) -> Expr {
        Expr::new(sp(), ExprKind::Int(n))
    }

    fn var(name: &str) -> Expr {
        Expr::new(sp(), ExprKind::Var(name.to_string()))
    }

    fn assign(name: &str, value: Expr) -> Stmt {
        Stmt::Assign(AssignStmt {
            span: sp(),
            target: AssignTarget::Name(ident(name)),
            value,
        })
    }

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::new(
            sp(),
            ExprKind::Call {
                callee: Box::new(var(name)),
                args,
            },
        )
    }

    fn func(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
        Stmt::Func(FuncDecl {
            span: sp(),
            name: ident(name),
            params: params.iter().map(|p| ident(p)).collect(),
            body: Rc::new(Block { stmts: body }),
        })
    }

    #[test]
    fn clean_program_yields_no_warnings() {
        let prog = Program {
            stmts: vec![
                func("double", &["n"], vec![Stmt::Return(ReturnStmt {
                    span: sp(),
                    value: Some(Expr::new(
                        sp(),
                        ExprKind::Binary {
                            op: BinOp::Mul,
                            left: Box::new(var("n")),
                            right: Box::new(int(2)),
                        },
                    )),
                })]),
                assign("x", call("double", vec![int(21)])),
                Stmt::Expr(var("x")),
            ],
        };
        assert!(Checker::new().check_program(&prog).is_empty());
    }

    #[test]
    fn unknown_name_is_flagged() {
        let prog = Program {
            stmts: vec![Stmt::Expr(var("ghost"))],
        };
        let warnings = Checker::new().check_program(&prog);
        assert_eq!(
            warnings,
            vec![CheckWarning::UnknownName {
                name: "ghost".to_string(),
                span: sp()
            }]
        );
    }

    #[test]
    fn arity_mismatch_is_flagged() {
        let prog = Program {
            stmts: vec![
                func("f", &["a", "b"], vec![]),
                Stmt::Expr(call("f", vec![int(1)])),
            ],
        };
        let warnings = Checker::new().check_program(&prog);
        assert!(matches!(
            warnings.as_slice(),
            [CheckWarning::ArityMismatch {
                expected: 2,
                got: 1,
                ..
            }]
        ));
    }

    #[test]
    fn string_literal_under_arithmetic_is_flagged() {
        let prog = Program {
            stmts: vec![Stmt::Expr(Expr::new(
                sp(),
                ExprKind::Binary {
                    op: BinOp::Mul,
                    left: Box::new(Expr::new(sp(), ExprKind::Str("x".into()))),
                    right: Box::new(int(3)),
                },
            ))],
        };
        let warnings = Checker::new().check_program(&prog);
        assert!(matches!(
            warnings.as_slice(),
            [CheckWarning::StringOperand { .. }]
        ));
    }

    #[test]
    fn top_level_return_is_flagged_but_function_return_is_not() {
        let prog = Program {
            stmts: vec![
                func("f", &[], vec![Stmt::Return(ReturnStmt {
                    span: sp(),
                    value: None,
                })]),
                Stmt::Return(ReturnStmt {
                    span: sp(),
                    value: None,
                }),
            ],
        };
        let warnings = Checker::new().check_program(&prog);
        assert_eq!(warnings, vec![CheckWarning::StrayReturn { span: sp() }]);
    }

    #[test]
    fn dotted_intrinsic_chains_are_not_unknown_names() {
        let chain = Expr::new(
            sp(),
            ExprKind::Attr {
                obj: Box::new(Expr::new(
                    sp(),
                    ExprKind::Attr {
                        obj: Box::new(var("sys")),
                        name: ident("list"),
                    },
                )),
                name: ident("append"),
            },
        );
        let prog = Program {
            stmts: vec![
                assign("l", Expr::new(sp(), ExprKind::List(vec![]))),
                Stmt::Expr(Expr::new(
                    sp(),
                    ExprKind::Call {
                        callee: Box::new(chain),
                        args: vec![var("l"), int(1)],
                    },
                )),
            ],
        };
        assert!(Checker::new().check_program(&prog).is_empty());
    }
}
