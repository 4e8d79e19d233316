use std::rc::Rc;

use ark_core::{FunctionValue, Value};

/// The result of executing a statement. Ordinary returns carry control
/// transfer explicitly instead of smuggling it through an exception
/// mechanism; only the evaluator's own call machinery ever consumes the
/// non-`Value` variants.
pub(crate) enum Flow {
    Value(Value),
    Return(Value),
    Break,
    Continue,
    /// A `return f(...)` whose callee is reference-identical to the
    /// function currently executing. The call driver rebinds its frame in
    /// place instead of recursing.
    TailCall {
        func: Rc<FunctionValue>,
        this: Option<Value>,
        args: Vec<Value>,
    },
}
