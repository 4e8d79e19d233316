use std::rc::Rc;

use ark_ast::{
    AssignStmt, AssignTarget, BinOp, Block, Expr, ExprKind, FuncDecl, Ident, IfArm, IfStmt,
    Program, ReturnStmt, Span, Spanned, Stmt, WhileStmt,
};
use ark_bytecode::{ArkbProgram, Constant, compile};
use ark_core::{RuntimeContext, RuntimeLimits, Value};
use ark_sandbox::{CapabilitySet, Sandbox};
use ark_vm::{Vm, VmErrorKind, run_vm};

fn sp() -> Span {
    Span::new(1, 1)
}

fn ident(name: &str) -> Ident {
    Spanned::new(sp(), name.to_string())
}

fn int(n: i64) -> Expr {
    Expr::new(sp(), ExprKind::Int(n))
}

fn float(x: f64) -> Expr {
    Expr::new(sp(), ExprKind::Float(x))
}

fn str_lit(s: &str) -> Expr {
    Expr::new(sp(), ExprKind::Str(s.to_string()))
}

fn var(name: &str) -> Expr {
    Expr::new(sp(), ExprKind::Var(name.to_string()))
}

fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
    Expr::new(
        sp(),
        ExprKind::Binary {
            op,
            left: Box::new(l),
            right: Box::new(r),
        },
    )
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

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Assign(AssignStmt {
        span: sp(),
        target: AssignTarget::Name(ident(name)),
        value,
    })
}

fn func(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    Stmt::Func(FuncDecl {
        span: sp(),
        name: ident(name),
        params: params.iter().map(|p| ident(p)).collect(),
        body: Rc::new(Block { stmts: body }),
    })
}

fn ret(value: Expr) -> Stmt {
    Stmt::Return(ReturnStmt {
        span: sp(),
        value: Some(value),
    })
}

fn program(stmts: Vec<Stmt>) -> Program {
    Program { stmts }
}

fn test_ctx() -> RuntimeContext {
    let cwd = std::env::current_dir().unwrap();
    RuntimeContext::new(Sandbox::with_root(CapabilitySet::empty(), &cwd).unwrap())
}

fn run(prog: Program) -> Value {
    let ctx = test_ctx();
    let bytes = compile(&prog).unwrap();
    run_vm(&ctx, &bytes).unwrap()
}

#[test]
fn compiled_arithmetic_executes() {
    let prog = program(vec![
        assign("x", bin(BinOp::Add, int(2), bin(BinOp::Mul, int(3), int(4)))),
        Stmt::Expr(var("x")),
    ]);
    assert_eq!(run(prog), Value::Integer(14));
}

#[test]
fn parameters_bind_in_declaration_order() {
    // If the reverse-order stores were wrong this would yield -6.
    let prog = program(vec![
        func("sub", &["a", "b"], vec![ret(bin(BinOp::Sub, var("a"), var("b")))]),
        Stmt::Expr(call("sub", vec![int(10), int(4)])),
    ]);
    assert_eq!(run(prog), Value::Integer(6));
}

#[test]
fn recursive_calls_keep_frames_separate() {
    // func fib(n) { if n < 2 { return n } return fib(n-1) + fib(n-2) }
    let prog = program(vec![
        func(
            "fib",
            &["n"],
            vec![
                Stmt::If(IfStmt {
                    span: sp(),
                    arms: vec![IfArm {
                        cond: bin(BinOp::Lt, var("n"), int(2)),
                        body: Block {
                            stmts: vec![ret(var("n"))],
                        },
                    }],
                    else_body: None,
                }),
                ret(bin(
                    BinOp::Add,
                    call("fib", vec![bin(BinOp::Sub, var("n"), int(1))]),
                    call("fib", vec![bin(BinOp::Sub, var("n"), int(2))]),
                )),
            ],
        ),
        Stmt::Expr(call("fib", vec![int(10)])),
    ]);
    assert_eq!(run(prog), Value::Integer(55));
}

#[test]
fn while_loop_accumulates() {
    let prog = program(vec![
        assign("i", int(0)),
        assign("total", int(0)),
        Stmt::While(WhileStmt {
            span: sp(),
            cond: bin(BinOp::Lt, var("i"), int(10)),
            body: Block {
                stmts: vec![
                    assign("total", bin(BinOp::Add, var("total"), var("i"))),
                    assign("i", bin(BinOp::Add, var("i"), int(1))),
                ],
            },
        }),
        Stmt::Expr(var("total")),
    ]);
    assert_eq!(run(prog), Value::Integer(45));
}

#[test]
fn synthesized_comparisons_behave() {
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(BinOp::Le, int(1), int(2)))])),
        Value::Bool(true)
    );
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(BinOp::Ge, int(1), int(2)))])),
        Value::Bool(false)
    );
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(BinOp::Ne, int(1), int(1)))])),
        Value::Bool(false)
    );
}

#[test]
fn short_circuit_logic_matches_the_evaluator() {
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(BinOp::And, int(0), int(7)))])),
        Value::Bool(false)
    );
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(BinOp::And, int(1), int(7)))])),
        Value::Integer(7)
    );
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(BinOp::Or, int(1), int(0)))])),
        Value::Bool(true)
    );
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(
            BinOp::Or,
            int(0),
            str_lit("x")
        ))])),
        Value::Str("x".into())
    );
}

#[test]
fn float_arithmetic_and_mixed_type_fault() {
    assert_eq!(
        run(program(vec![Stmt::Expr(bin(
            BinOp::Mul,
            float(1.5),
            float(4.0)
        ))])),
        Value::Float(6.0)
    );

    let ctx = test_ctx();
    let bytes = compile(&program(vec![Stmt::Expr(bin(
        BinOp::Add,
        int(1),
        float(2.0),
    ))]))
    .unwrap();
    let err = run_vm(&ctx, &bytes).unwrap_err();
    assert_eq!(
        err.kind,
        VmErrorKind::TypeMismatch {
            op: "ADD",
            lhs: "Integer",
            rhs: "Float"
        }
    );
}

#[test]
fn division_by_zero_faults_with_pc() {
    let ctx = test_ctx();
    let bytes = compile(&program(vec![Stmt::Expr(bin(BinOp::Div, int(1), int(0)))])).unwrap();
    let err = run_vm(&ctx, &bytes).unwrap_err();
    assert_eq!(err.kind, VmErrorKind::DivisionByZero);
    // The DIV opcode sits after two 3-byte pushes.
    assert_eq!(err.pc, 6);
}

fn raw(constants: Vec<Constant>, code: Vec<u8>) -> Vec<u8> {
    ArkbProgram { constants, code }.to_bytes()
}

#[test]
fn add_on_short_stack_is_underflow_naming_the_opcode() {
    let ctx = test_ctx();
    let err = run_vm(&ctx, &raw(vec![], vec![0x04])).unwrap_err();
    assert_eq!(err.kind, VmErrorKind::StackUnderflow("ADD"));

    // One element is still one short.
    let err = run_vm(
        &ctx,
        &raw(vec![Constant::Integer(1)], vec![0x01, 0x00, 0x00, 0x04]),
    )
    .unwrap_err();
    assert_eq!(err.kind, VmErrorKind::StackUnderflow("ADD"));
}

#[test]
fn unbounded_dup_loop_overflows_the_stack() {
    // PUSH_CONST 0; then DUP/JUMP back to the DUP forever.
    let ctx = test_ctx();
    let code = vec![
        0x01, 0x00, 0x00, // 0000 PUSH_CONST 0
        0x12, // 0003 DUP
        0x0B, 0x00, 0x03, // 0004 JUMP 0003
    ];
    let err = run_vm(&ctx, &raw(vec![Constant::Integer(1)], code)).unwrap_err();
    assert_eq!(err.kind, VmErrorKind::StackOverflow(10_000));
}

#[test]
fn runaway_loop_times_out() {
    let cwd = std::env::current_dir().unwrap();
    let ctx = RuntimeContext::with_limits(
        Sandbox::with_root(CapabilitySet::empty(), &cwd).unwrap(),
        RuntimeLimits {
            max_steps: 500,
            ..RuntimeLimits::default()
        },
    );
    let err = run_vm(&ctx, &raw(vec![], vec![0x0B, 0x00, 0x00])).unwrap_err();
    assert_eq!(err.kind, VmErrorKind::ExecutionTimeout(500));
}

#[test]
fn load_from_unset_slot_faults() {
    let ctx = test_ctx();
    let err = run_vm(&ctx, &raw(vec![], vec![0x02, 0x00, 0x05])).unwrap_err();
    assert_eq!(err.kind, VmErrorKind::UnsetVariable(5));
}

#[test]
fn print_writes_through_the_context_sink() {
    let ctx = test_ctx();
    let prog = program(vec![Stmt::Expr(Expr::new(
        sp(),
        ExprKind::Call {
            callee: Box::new(var("print")),
            args: vec![int(7)],
        },
    ))]);
    let bytes = compile(&prog).unwrap();
    let out = run_vm(&ctx, &bytes).unwrap();
    assert_eq!(out, Value::Unit);
    assert_eq!(ctx.take_output(), "7\n");
}

#[test]
fn trace_mode_logs_decoded_instructions() {
    let ctx = test_ctx();
    let bytes = compile(&program(vec![Stmt::Expr(int(1))])).unwrap();
    let value = Vm::new(&ctx, &bytes).unwrap().with_trace().run().unwrap();
    assert_eq!(value, Value::Integer(1));
    let output = ctx.take_output();
    assert!(output.contains("[vm] 0000 PUSH_CONST"));
    assert!(output.contains("HALT"));
}

#[test]
fn foreign_bytes_fault_as_malformed() {
    let ctx = test_ctx();
    let err = run_vm(&ctx, &raw(vec![], vec![0xEE])).unwrap_err();
    assert!(matches!(err.kind, VmErrorKind::Malformed(_)));
}
