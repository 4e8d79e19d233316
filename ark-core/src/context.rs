use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use ark_sandbox::Sandbox;

use crate::intrinsics::Registry;
use crate::message::Message;

/// Execution bounds for both backends. Read once from the environment (or
/// defaulted) and passed around immutably afterwards.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeLimits {
    pub max_recursion_depth: usize,
    pub max_steps: u64,
    pub max_stack_depth: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 1000,
            max_steps: 10_000_000,
            max_stack_depth: 10_000,
        }
    }
}

impl RuntimeLimits {
    /// Honors `ARK_MAX_RECURSION`, `ARK_MAX_STEPS`, and `ARK_MAX_STACK`
    /// when set to parseable values.
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        if let Some(v) = env_number("ARK_MAX_RECURSION") {
            limits.max_recursion_depth = v as usize;
        }
        if let Some(v) = env_number("ARK_MAX_STEPS") {
            limits.max_steps = v;
        }
        if let Some(v) = env_number("ARK_MAX_STACK") {
            limits.max_stack_depth = v as usize;
        }
        limits
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Buffered script output. The runtime never writes to stdout directly;
/// hosts drain this between evaluations.
#[derive(Debug, Default)]
pub struct PrintSink {
    buffer: RefCell<String>,
}

impl PrintSink {
    pub fn push_line(&self, line: &str) {
        let mut buf = self.buffer.borrow_mut();
        buf.push_str(line);
        buf.push('\n');
    }

    pub fn take(&self) -> String {
        self.buffer.take()
    }
}

/// Process-wide socket handles, one coarse lock per intrinsic call.
#[derive(Debug, Default)]
pub struct SocketTable {
    next_id: AtomicU64,
    inner: Mutex<HashMap<u64, TcpStream>>,
}

impl SocketTable {
    pub fn insert(&self, stream: TcpStream) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut table) = self.inner.lock() {
            table.insert(id, stream);
        }
        id
    }

    pub fn remove(&self, id: u64) -> Option<TcpStream> {
        self.inner.lock().ok()?.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handles for user-spawned OS threads.
#[derive(Debug, Default)]
pub struct ThreadTable {
    next_id: AtomicU64,
    inner: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl ThreadTable {
    pub fn insert(&self, handle: JoinHandle<()>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut table) = self.inner.lock() {
            table.insert(id, handle);
        }
        id
    }

    pub fn remove(&self, id: u64) -> Option<JoinHandle<()>> {
        self.inner.lock().ok()?.remove(&id)
    }
}

/// FIFO message queue shared between user threads.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<VecDeque<Message>>,
}

impl EventQueue {
    pub fn push(&self, msg: Message) {
        if let Ok(mut q) = self.inner.lock() {
            q.push_back(msg);
        }
    }

    pub fn pop(&self) -> Option<Message> {
        self.inner.lock().ok()?.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the evaluator, VM, and intrinsics need from the host,
/// constructed once at startup and passed by reference. The capability set
/// inside the sandbox has no setter, so "immutable after init" holds by
/// construction.
pub struct RuntimeContext {
    sandbox: Sandbox,
    limits: RuntimeLimits,
    print: PrintSink,
    registry: Registry,
    sockets: Arc<SocketTable>,
    threads: Arc<ThreadTable>,
    events: Arc<EventQueue>,
}

impl RuntimeContext {
    pub fn new(sandbox: Sandbox) -> Self {
        Self::with_limits(sandbox, RuntimeLimits::default())
    }

    pub fn with_limits(sandbox: Sandbox, limits: RuntimeLimits) -> Self {
        Self {
            sandbox,
            limits,
            print: PrintSink::default(),
            registry: Registry::builtin(),
            sockets: Arc::new(SocketTable::default()),
            threads: Arc::new(ThreadTable::default()),
            events: Arc::new(EventQueue::default()),
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Intrinsic packs register themselves during startup, before any
    /// evaluation borrows the context shared.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn print_line(&self, line: &str) {
        self.print.push_line(line);
    }

    pub fn take_output(&self) -> String {
        self.print.take()
    }

    pub fn sockets(&self) -> Arc<SocketTable> {
        self.sockets.clone()
    }

    pub fn threads(&self) -> Arc<ThreadTable> {
        self.threads.clone()
    }

    pub fn events(&self) -> Arc<EventQueue> {
        self.events.clone()
    }
}
