//! Logical DAP threads and their synthetic call stacks.
//!
//! A thread here is one abstract execution tracked through the ARG, not an
//! OS thread. Threads are re-materialized at every stop and mutated only by
//! stepping operations.

use indexmap::IndexMap;

use crate::debugger::arg::NodeInfo;

/// Part of the frame-id encoding contract with the DAP client. Bounds
/// per-thread stack depth; widen only together with the client.
pub const FRAME_ID_MULTIPLIER: i64 = 100_000;

pub fn encode_frame_id(thread_id: i64, frame_index: usize) -> i64 {
    thread_id * FRAME_ID_MULTIPLIER + frame_index as i64
}

pub fn decode_frame_id(frame_id: i64) -> (i64, usize) {
    (
        frame_id / FRAME_ID_MULTIPLIER,
        (frame_id % FRAME_ID_MULTIPLIER) as usize,
    )
}

/// One call-stack frame: an ARG node, or nothing when the location became
/// unreachable for this thread.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub node: Option<NodeInfo>,
    /// The frame was chosen from several plausible callers during stack
    /// assembly.
    pub ambiguous: bool,
    /// Synthetic index tracking spawn nesting within the stack; a frame
    /// reached through a thread-creating call gets the caller's index
    /// minus one.
    pub local_thread_index: i64,
    /// Last present node, kept so that backward motion can re-enter an
    /// unavailable thread.
    pub last_reachable: Option<NodeInfo>,
}

impl StackFrame {
    pub fn new(node: NodeInfo, ambiguous: bool, local_thread_index: i64) -> Self {
        Self {
            node: Some(node),
            ambiguous,
            local_thread_index,
            last_reachable: None,
        }
    }

    /// Replace the frame node. A present node that becomes absent is
    /// remembered in `last_reachable`; a node that becomes present again
    /// clears it.
    pub fn set_node(&mut self, node: Option<NodeInfo>) {
        match node {
            Some(node) => {
                self.node = Some(node);
                self.last_reachable = None;
            }
            None => {
                if let Some(old) = self.node.take() {
                    self.last_reachable = Some(old);
                }
            }
        }
    }
}

/// One logical thread: a name and its frames, innermost first.
#[derive(Debug, Clone)]
pub struct ThreadState {
    pub name: String,
    pub frames: Vec<StackFrame>,
}

impl ThreadState {
    pub fn top(&self) -> &StackFrame {
        &self.frames[0]
    }

    pub fn top_mut(&mut self) -> &mut StackFrame {
        &mut self.frames[0]
    }

    pub fn top_node(&self) -> Option<&NodeInfo> {
        self.frames[0].node.as_ref()
    }

    /// The frame below the top, i.e. the call site of the current function.
    pub fn previous_frame(&self) -> Option<&StackFrame> {
        self.frames.get(1)
    }
}

/// Insertion-ordered store of the tracked threads.
#[derive(Debug)]
pub struct ThreadStore {
    threads: IndexMap<i64, ThreadState>,
    next_id: i64,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self {
            threads: IndexMap::new(),
            next_id: 1,
        }
    }

    /// Drop all threads and restart id assignment. Used when the engine
    /// stops at a new location.
    pub fn reset(&mut self) {
        self.threads.clear();
        self.next_id = 1;
    }

    pub fn insert(&mut self, thread: ThreadState) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.threads.insert(id, thread);
        id
    }

    pub fn remove(&mut self, thread_id: i64) -> Option<ThreadState> {
        self.threads.shift_remove(&thread_id)
    }

    pub fn get(&self, thread_id: i64) -> Option<&ThreadState> {
        self.threads.get(&thread_id)
    }

    pub fn get_mut(&mut self, thread_id: i64) -> Option<&mut ThreadState> {
        self.threads.get_mut(&thread_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &ThreadState)> {
        self.threads.iter().map(|(id, thread)| (*id, thread))
    }

    pub fn ids(&self) -> Vec<i64> {
        self.threads.keys().copied().collect()
    }

    pub fn first_id(&self) -> Option<i64> {
        self.threads.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_round_trips() {
        for (thread_id, frame_index) in [(1, 0), (1, 1), (7, 42), (33, 99_999)] {
            let frame_id = encode_frame_id(thread_id, frame_index);
            assert_eq!(decode_frame_id(frame_id), (thread_id, frame_index));
        }
    }

    #[test]
    fn store_assigns_small_positive_ids_in_order() {
        let mut store = ThreadStore::new();
        let a = store.insert(ThreadState {
            name: "a".to_string(),
            frames: vec![],
        });
        let b = store.insert(ThreadState {
            name: "b".to_string(),
            frames: vec![],
        });
        assert_eq!((a, b), (1, 2));
        assert_eq!(store.ids(), vec![1, 2]);

        store.reset();
        let c = store.insert(ThreadState {
            name: "c".to_string(),
            frames: vec![],
        });
        assert_eq!(c, 1);
    }
}
