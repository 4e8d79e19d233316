use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use ark_ast::Block;

use crate::scope::ScopeRef;

/// The runtime value. A closed tagged union: every evaluator and VM site
/// matches exhaustively, so adding a variant is a compile-time sweep.
///
/// Lists and structs are shared-ownership handles; mutation through one
/// holder is observed by all of them, which is what gives intrinsic
/// in-place mutation (append, pop, field set) its aliasing semantics.
#[derive(Clone, Debug)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Rc<RefCell<Vec<Value>>>),
    Struct(Rc<StructValue>),
    Function(Rc<FunctionValue>),
    Class(Rc<ClassValue>),
    BoundMethod(Rc<BoundMethod>),
    Intrinsic(String),
    Unit,
    /// Tombstone left behind when a linear intrinsic consumes a binding.
    /// Reading it is a linearity violation.
    Moved,
}

#[derive(Debug)]
pub struct StructValue {
    pub fields: RefCell<BTreeMap<String, Value>>,
    pub class: Option<Rc<ClassValue>>,
}

pub struct FunctionValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Block>,
    pub closure: ScopeRef,
}

impl fmt::Debug for FunctionValue {
    // The closure scope can reference this function again; don't chase it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ClassValue {
    pub name: String,
    pub methods: BTreeMap<String, Rc<FunctionValue>>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Rc<FunctionValue>,
}

impl Value {
    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(values)))
    }

    pub fn empty_struct(class: Option<Rc<ClassValue>>) -> Value {
        Value::Struct(Rc::new(StructValue {
            fields: RefCell::new(BTreeMap::new()),
            class,
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Bool(_) => "Boolean",
            Value::List(_) => "List",
            Value::Struct(_) => "Struct",
            Value::Function(_) => "Function",
            Value::Class(_) => "Class",
            Value::BoundMethod(_) => "BoundMethod",
            Value::Intrinsic(_) => "Intrinsic",
            Value::Unit => "Unit",
            Value::Moved => "Moved",
        }
    }

    /// Truthiness: `Unit`, zero, `false`, and empty strings/structs are
    /// false. Lists are always truthy once constructed, matching the
    /// reference semantics.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::List(_) => true,
            Value::Struct(s) => !s.fields.borrow().is_empty(),
            Value::Function(_) | Value::Class(_) | Value::BoundMethod(_) => true,
            Value::Intrinsic(_) => true,
            Value::Unit => false,
            Value::Moved => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Struct(a), Value::Struct(b)) => {
                Rc::ptr_eq(a, b) || *a.fields.borrow() == *b.fields.borrow()
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Intrinsic(a), Value::Intrinsic(b)) => a == b,
            (Value::Unit, Value::Unit) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Struct(s) => {
                f.write_str("{")?;
                for (i, (k, v)) in s.fields.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::BoundMethod(m) => write!(f, "<bound method {}>", m.method.name),
            Value::Intrinsic(name) => write!(f, "<intrinsic {name}>"),
            Value::Unit => f.write_str("unit"),
            Value::Moved => f.write_str("<moved>"),
        }
    }
}
