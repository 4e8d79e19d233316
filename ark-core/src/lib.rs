#![forbid(unsafe_code)]

mod context;
mod error;
mod intrinsics;
mod message;
mod scope;
mod value;

pub use context::{EventQueue, PrintSink, RuntimeContext, RuntimeLimits, SocketTable, ThreadTable};
pub use error::{RuntimeError, RuntimeErrorKind, TraceFrame};
pub use intrinsics::{IntrinsicDef, IntrinsicHandler, Registry};
pub use message::Message;
pub use scope::{Scope, ScopeRef};
pub use value::{BoundMethod, ClassValue, FunctionValue, StructValue, Value};
