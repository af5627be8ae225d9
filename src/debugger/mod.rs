//! The abstract debugger engine.
//!
//! [`Debugger`] owns the oracle client, the thread/frame store, the
//! breakpoint registry and the variable caches. Stepping operations live in
//! [`step`]; everything here is the state the adapter reads between stops.
//!
//! The engine is a single-threaded cooperative state machine: every
//! operation plans its full move before mutating any thread, so a failed
//! request leaves the store untouched.

pub mod arg;
pub mod breakpoint;
pub mod error;
pub mod oracle;
pub mod step;
pub mod thread;
pub mod variable;

use crate::debugger::arg::{Location, NodeInfo};
use crate::debugger::breakpoint::BreakpointRegistry;
use crate::debugger::error::Error;
use crate::debugger::oracle::{ArgOracle, ExprResult};
use crate::debugger::thread::{decode_frame_id, encode_frame_id, StackFrame, ThreadStore};
use crate::debugger::variable::{ScopeEntry, VariableEntry, VariableStore};

/// Why the engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Breakpoint,
    Step,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Step => "step",
        }
    }
}

/// Engine-side event, queued by operations and drained by the adapter
/// after each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Stopped {
        reason: StopReason,
        thread_id: i64,
    },
    Terminated,
}

/// Read-only view of one frame, handed to the adapter for `stackTrace`.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub id: i64,
    pub function: Option<String>,
    pub node_id: Option<String>,
    pub location: Option<Location>,
    pub ambiguous: bool,
    pub local_thread_index: i64,
    /// The frame belongs to a spawning parent thread, not to the thread the
    /// stack is shown for.
    pub foreign: bool,
}

/// Main structure of the abstract debugger: tracked threads, breakpoints
/// and the oracle connection.
pub struct Debugger {
    oracle: Box<dyn ArgOracle>,
    threads: ThreadStore,
    breakpoints: BreakpointRegistry,
    variables: VariableStore,
    events: Vec<EngineEvent>,
}

impl Debugger {
    pub fn new(oracle: Box<dyn ArgOracle>) -> Self {
        Self {
            oracle,
            threads: ThreadStore::new(),
            breakpoints: BreakpointRegistry::new(),
            variables: VariableStore::new(),
            events: Vec::new(),
        }
    }

    /// Fresh session state: no threads, caches empty, run cursor before the
    /// first breakpoint. Registered breakpoints survive.
    pub fn reset(&mut self) {
        self.threads.reset();
        self.variables.clear();
        self.breakpoints.rewind();
    }

    /// Queued events since the last drain, oldest first.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replace the breakpoints of one source file.
    pub fn set_breakpoints(&mut self, file: &str, lines: &[(u32, u32)]) -> usize {
        self.breakpoints.set_for_source(file, lines)
    }

    /// Tracked threads, in insertion order.
    pub fn threads(&self) -> Vec<(i64, String)> {
        self.threads
            .iter()
            .map(|(id, thread)| (id, thread.name.clone()))
            .collect()
    }

    pub fn stack_trace(&self, thread_id: i64) -> Result<Vec<FrameSnapshot>, Error> {
        let thread = self
            .threads
            .get(thread_id)
            .ok_or(Error::ThreadNotFound(thread_id))?;
        let top_index = thread.top().local_thread_index;
        Ok(thread
            .frames
            .iter()
            .enumerate()
            .map(|(frame_index, frame)| FrameSnapshot {
                id: encode_frame_id(thread_id, frame_index),
                function: frame.node.as_ref().map(|n| n.function.clone()),
                node_id: frame.node.as_ref().map(|n| n.node_id.clone()),
                location: frame.node.as_ref().map(|n| n.location.clone()),
                ambiguous: frame.ambiguous,
                local_thread_index: frame.local_thread_index,
                foreign: frame.local_thread_index != top_index,
            })
            .collect())
    }

    /// The two scopes of a frame, memoized per node until the next stop.
    pub fn scopes(&mut self, frame_id: i64) -> Result<Vec<ScopeEntry>, Error> {
        let node_id = self.frame_node(frame_id)?.node_id.clone();
        if let Some(scopes) = self.variables.cached_scopes(&node_id) {
            return Ok(scopes.to_vec());
        }
        let state = self.oracle.fetch_state(&node_id)?;
        Ok(self.variables.scopes_for(&node_id, &state))
    }

    pub fn variables(&self, reference: i64) -> Result<Vec<VariableEntry>, Error> {
        self.variables
            .variables(reference)
            .map(<[VariableEntry]>::to_vec)
            .ok_or(Error::VariablesReferenceNotFound(reference))
    }

    /// Evaluate an integer expression in the abstract state of a frame.
    pub fn evaluate(
        &mut self,
        frame_id: Option<i64>,
        expression: &str,
    ) -> Result<ExprResult, Error> {
        let frame_id = frame_id.ok_or(Error::NoFrameForExpression)?;
        let node_id = self.frame_node(frame_id)?.node_id.clone();
        self.oracle.eval_int(&node_id, expression)
    }

    fn frame(&self, frame_id: i64) -> Result<&StackFrame, Error> {
        let (thread_id, frame_index) = decode_frame_id(frame_id);
        let thread = self
            .threads
            .get(thread_id)
            .ok_or(Error::ThreadNotFound(thread_id))?;
        thread
            .frames
            .get(frame_index)
            .ok_or(Error::FrameNotFound(frame_id))
    }

    fn frame_node(&self, frame_id: i64) -> Result<&NodeInfo, Error> {
        self.frame(frame_id)?
            .node
            .as_ref()
            .ok_or(Error::LocationUnavailable)
    }

    fn top_node(&self, thread_id: i64) -> Result<&NodeInfo, Error> {
        let thread = self
            .threads
            .get(thread_id)
            .ok_or(Error::ThreadNotFound(thread_id))?;
        thread.top_node().ok_or(Error::LocationUnavailable)
    }

    /// Record a stop: variable caches die with the old location.
    fn notify_stopped(&mut self, reason: StopReason, thread_id: i64) {
        self.variables.clear();
        self.events.push(EngineEvent::Stopped { reason, thread_id });
    }

    fn notify_terminated(&mut self) {
        self.events.push(EngineEvent::Terminated);
    }
}
