use std::collections::HashMap;
use std::path::Path;

use ark_sandbox::Capability;

use crate::context::RuntimeContext;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::value::Value;

pub type IntrinsicHandler = fn(&RuntimeContext, Vec<Value>) -> Result<Value, RuntimeError>;

/// One dispatch-table entry: the gate token (checked before the handler
/// runs), the expected arity, and which argument positions the call
/// consumes. Consumed positions are marked `Moved` in the caller's scope
/// by the call machinery after a successful invocation.
pub struct IntrinsicDef {
    pub name: &'static str,
    pub capability: Option<Capability>,
    pub arity: Option<usize>,
    pub linear_args: &'static [usize],
    pub handler: IntrinsicHandler,
}

/// The dotted-name dispatch table. Both execution backends resolve
/// intrinsics here, so gating behaves identically regardless of backend.
pub struct Registry {
    defs: HashMap<&'static str, IntrinsicDef>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            defs: HashMap::new(),
        }
    }

    /// The data-structure core every script can rely on, plus the gated
    /// filesystem pair. Wider effect catalogs (networking, crypto, chain
    /// mocks) register themselves through [`Registry::register`].
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        for def in [
            IntrinsicDef {
                name: "print",
                capability: None,
                arity: None,
                linear_args: &[],
                handler: intrinsic_print,
            },
            IntrinsicDef {
                name: "sys.len",
                capability: None,
                arity: Some(1),
                linear_args: &[],
                handler: intrinsic_len,
            },
            IntrinsicDef {
                name: "sys.list.get",
                capability: None,
                arity: Some(2),
                linear_args: &[],
                handler: intrinsic_list_get,
            },
            IntrinsicDef {
                name: "sys.list.append",
                capability: None,
                arity: Some(2),
                linear_args: &[0],
                handler: intrinsic_list_append,
            },
            IntrinsicDef {
                name: "sys.list.pop",
                capability: None,
                arity: Some(1),
                linear_args: &[0],
                handler: intrinsic_list_pop,
            },
            IntrinsicDef {
                name: "sys.struct.get",
                capability: None,
                arity: Some(2),
                linear_args: &[],
                handler: intrinsic_struct_get,
            },
            IntrinsicDef {
                name: "sys.struct.set",
                capability: None,
                arity: Some(3),
                linear_args: &[],
                handler: intrinsic_struct_set,
            },
            IntrinsicDef {
                name: "sys.fs.read",
                capability: Some(Capability::FsRead),
                arity: Some(1),
                linear_args: &[],
                handler: intrinsic_fs_read,
            },
            IntrinsicDef {
                name: "sys.fs.write",
                capability: Some(Capability::FsWrite),
                arity: Some(2),
                linear_args: &[],
                handler: intrinsic_fs_write,
            },
        ] {
            reg.register(def);
        }
        reg
    }

    pub fn register(&mut self, def: IntrinsicDef) {
        self.defs.insert(def.name, def);
    }

    pub fn get(&self, name: &str) -> Option<&IntrinsicDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// Dispatches a call: gate check first, then arity, then the handler.
    pub fn invoke(
        &self,
        ctx: &RuntimeContext,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let def = self
            .get(name)
            .ok_or_else(|| RuntimeErrorKind::UndefinedVariable(name.to_string()))?;
        if let Some(cap) = def.capability {
            ctx.sandbox().check(cap)?;
        }
        if let Some(expected) = def.arity {
            if args.len() != expected {
                return Err(RuntimeErrorKind::ArityMismatch {
                    name: name.to_string(),
                    expected,
                    got: args.len(),
                }
                .into());
            }
        }
        (def.handler)(ctx, args)
    }
}

fn arg_error(name: &str, expected: &str, got: &Value) -> RuntimeError {
    RuntimeErrorKind::IntrinsicFailed {
        name: name.to_string(),
        message: format!("expected {expected}, got {}", got.type_name()),
    }
    .into()
}

fn intrinsic_print(ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
    ctx.print_line(&rendered.join(" "));
    Ok(Value::Unit)
}

fn intrinsic_len(_ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let v = &args[0];
    let len = match v {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Struct(s) => s.fields.borrow().len(),
        other => return Err(arg_error("sys.len", "String, List, or Struct", other)),
    };
    Ok(Value::Integer(len as i64))
}

fn intrinsic_list_get(_ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let index = match &args[1] {
        Value::Integer(n) => *n,
        other => return Err(arg_error("sys.list.get", "Integer index", other)),
    };
    match &args[0] {
        Value::List(items) => {
            let items = items.borrow();
            if index < 0 || index as usize >= items.len() {
                return Err(RuntimeErrorKind::IndexOutOfRange {
                    index,
                    len: items.len(),
                }
                .into());
            }
            Ok(items[index as usize].clone())
        }
        Value::Str(s) => {
            let ch = if index >= 0 {
                s.chars().nth(index as usize)
            } else {
                None
            };
            match ch {
                Some(c) => Ok(Value::Str(c.to_string())),
                None => Err(RuntimeErrorKind::IndexOutOfRange {
                    index,
                    len: s.chars().count(),
                }
                .into()),
            }
        }
        other => Err(arg_error("sys.list.get", "List or String", other)),
    }
}

/// Appends in place and returns the container identity, so callers can
/// thread the consumed binding linearly: `l = sys.list.append(l, x)`.
fn intrinsic_list_append(_ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let mut args = args;
    let item = args.pop().unwrap_or(Value::Unit);
    let list = args.pop().unwrap_or(Value::Unit);
    match &list {
        Value::List(items) => {
            items.borrow_mut().push(item);
            Ok(list)
        }
        other => Err(arg_error("sys.list.append", "List", other)),
    }
}

fn intrinsic_list_pop(_ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::List(items) => {
            let popped = items.borrow_mut().pop();
            popped.ok_or_else(|| {
                RuntimeErrorKind::IntrinsicFailed {
                    name: "sys.list.pop".to_string(),
                    message: "pop from empty list".to_string(),
                }
                .into()
            })
        }
        other => Err(arg_error("sys.list.pop", "List", other)),
    }
}

fn intrinsic_struct_get(_ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let field = match &args[1] {
        Value::Str(s) => s.clone(),
        other => return Err(arg_error("sys.struct.get", "String key", other)),
    };
    match &args[0] {
        Value::Struct(s) => s.fields.borrow().get(&field).cloned().ok_or_else(|| {
            RuntimeErrorKind::UnknownAttribute {
                ty: "Struct",
                attr: field,
            }
            .into()
        }),
        other => Err(arg_error("sys.struct.get", "Struct", other)),
    }
}

fn intrinsic_struct_set(_ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let mut args = args;
    let value = args.pop().unwrap_or(Value::Unit);
    let field_val = args.pop().unwrap_or(Value::Unit);
    let target = args.pop().unwrap_or(Value::Unit);
    let field = match field_val {
        Value::Str(s) => s,
        other => return Err(arg_error("sys.struct.set", "String key", &other)),
    };
    match &target {
        Value::Struct(s) => {
            s.fields.borrow_mut().insert(field, value);
            Ok(target)
        }
        other => Err(arg_error("sys.struct.set", "Struct", other)),
    }
}

fn intrinsic_fs_read(ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let path = match &args[0] {
        Value::Str(s) => s.clone(),
        other => return Err(arg_error("sys.fs.read", "String path", other)),
    };
    let real = ctx.sandbox().validate_path(Path::new(&path), false)?;
    let content = std::fs::read_to_string(&real).map_err(|e| RuntimeErrorKind::IntrinsicFailed {
        name: "sys.fs.read".to_string(),
        message: e.to_string(),
    })?;
    Ok(Value::Str(content))
}

fn intrinsic_fs_write(ctx: &RuntimeContext, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let path = match &args[0] {
        Value::Str(s) => s.clone(),
        other => return Err(arg_error("sys.fs.write", "String path", other)),
    };
    let content = match &args[1] {
        Value::Str(s) => s.clone(),
        other => return Err(arg_error("sys.fs.write", "String content", other)),
    };
    let real = ctx.sandbox().validate_path(Path::new(&path), true)?;
    if let Some(parent) = real.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RuntimeErrorKind::IntrinsicFailed {
            name: "sys.fs.write".to_string(),
            message: e.to_string(),
        })?;
    }
    std::fs::write(&real, content).map_err(|e| RuntimeErrorKind::IntrinsicFailed {
        name: "sys.fs.write".to_string(),
        message: e.to_string(),
    })?;
    Ok(Value::Unit)
}
