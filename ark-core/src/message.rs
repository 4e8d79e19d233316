use crate::value::Value;

/// The plain-data subset of [`Value`] that may cross the event queue
/// between user threads. Shared handles (lists, structs, closures) stay
/// confined to the thread that created them.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Integer(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Unit,
}

impl TryFrom<Value> for Message {
    type Error = &'static str;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(n) => Ok(Message::Integer(n)),
            Value::Float(x) => Ok(Message::Float(x)),
            Value::Str(s) => Ok(Message::Str(s)),
            Value::Bool(b) => Ok(Message::Bool(b)),
            Value::Unit => Ok(Message::Unit),
            other => Err(other.type_name()),
        }
    }
}

impl From<Message> for Value {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Integer(n) => Value::Integer(n),
            Message::Float(x) => Value::Float(x),
            Message::Str(s) => Value::Str(s),
            Message::Bool(b) => Value::Bool(b),
            Message::Unit => Value::Unit,
        }
    }
}
