//! Stepping over the abstract reachability graph.
//!
//! Every operation has the same shape: the primary thread picks a desired
//! ARG motion, then the engine attempts the same motion on every other
//! tracked thread. Threads that cannot follow become unavailable; threads
//! that can follow advance in lockstep. The full move is planned, with all
//! oracle lookups done, before any thread is mutated.

use std::collections::HashSet;

use itertools::Itertools;
use log::warn;

use crate::debugger::arg::{CfgEdge, Edge, NodeInfo};
use crate::debugger::error::Error;
use crate::debugger::thread::{StackFrame, ThreadState};
use crate::debugger::{Debugger, StopReason};

/// Id bases of the `stepInTargets` encoding. An id is base + index into the
/// node's corresponding edge list; the wide gap keeps the ranges disjoint.
pub const CFG_TARGET_BASE: i64 = 1_000_000;
pub const ENTRY_TARGET_BASE: i64 = 2_000_000;

/// One entry of the `stepInTargets` answer.
#[derive(Debug, Clone)]
pub struct StepTarget {
    pub id: i64,
    pub label: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Resolved per-thread move of the step-all-along kernel.
struct PlannedMove {
    thread_id: i64,
    target: Option<NodeInfo>,
    spawns_thread: bool,
}

impl Debugger {
    /// Step over: the primary thread takes its sole outgoing CFG edge and
    /// every other tracked thread follows the same motion.
    pub fn step_over(&mut self, primary: i64) -> Result<(), Error> {
        let top = self.top_node(primary)?.clone();
        if top.outgoing_cfg.is_empty() {
            if !top.outgoing_return.is_empty() {
                return self.step_out(primary);
            }
            return Err(Error::LastStatement);
        }

        // A thread sitting on a branching call site cannot follow any
        // single CFG edge the primary picks.
        for (thread_id, thread) in self.threads.iter() {
            let Some(node) = thread.top_node() else {
                continue;
            };
            if node.outgoing_cfg.len() > 1 && !node.outgoing_entry.is_empty() {
                return Err(if thread_id == primary {
                    Error::AmbiguousPath(node.function.clone())
                } else {
                    Error::AmbiguousPathInThread(node.function.clone(), thread.name.clone())
                });
            }
        }

        if top.outgoing_cfg.len() > 1 {
            return Err(Error::BranchingControlFlow);
        }

        let target = Edge::Cfg(top.outgoing_cfg[0].clone());
        self.step_all_along(primary, &target, NodeInfo::cfg_edges, false)
    }

    /// Enumerate explicit step-in targets of a frame: function calls, or
    /// CFG branches when the node branches without calling.
    pub fn step_in_targets(&mut self, frame_id: i64) -> Result<Vec<StepTarget>, Error> {
        let node = self.frame_node(frame_id)?.clone();

        let mut targets = Vec::new();
        for (index, edge) in node.outgoing_entry.iter().enumerate() {
            let kind = if edge.creates_new_thread {
                "thread"
            } else {
                "call"
            };
            let label = format!("{kind}: {}({})", edge.function, edge.args.join(", "));
            let at = self.oracle.lookup_by_id(&edge.node_id)?;
            targets.push(StepTarget {
                id: ENTRY_TARGET_BASE + index as i64,
                label,
                line: at.location.line,
                column: at.location.column,
                end_line: at.location.end_line,
                end_column: at.location.end_column,
            });
        }
        if targets.is_empty() && node.outgoing_cfg.len() > 1 {
            for (index, edge) in node.outgoing_cfg.iter().enumerate() {
                let at = self.oracle.lookup_by_id(&edge.node_id)?;
                targets.push(StepTarget {
                    id: CFG_TARGET_BASE + index as i64,
                    label: format!("branch: {}", edge.statement),
                    line: at.location.line,
                    column: at.location.column,
                    end_line: at.location.end_line,
                    end_column: at.location.end_column,
                });
            }
        }

        Ok(targets
            .into_iter()
            .sorted_by_key(|target| (target.line, target.column))
            .collect())
    }

    /// Step in, optionally into an explicit target from
    /// [`Self::step_in_targets`]. Without a target: a unique call is
    /// entered, several are an error, none falls back to step over.
    pub fn step_in(&mut self, primary: i64, target_id: Option<i64>) -> Result<(), Error> {
        let top = self.top_node(primary)?.clone();
        match target_id {
            Some(id) if id >= ENTRY_TARGET_BASE => {
                let index = (id - ENTRY_TARGET_BASE) as usize;
                let edge = top
                    .outgoing_entry
                    .get(index)
                    .ok_or(Error::UnknownStepTarget(id))?
                    .clone();
                self.step_all_along(primary, &Edge::Entry(edge), NodeInfo::entry_edges, true)
            }
            Some(id) if id >= CFG_TARGET_BASE => {
                let index = (id - CFG_TARGET_BASE) as usize;
                let edge = top
                    .outgoing_cfg
                    .get(index)
                    .ok_or(Error::UnknownStepTarget(id))?
                    .clone();
                self.step_all_along(primary, &Edge::Cfg(edge), NodeInfo::cfg_edges, false)
            }
            Some(id) => Err(Error::UnknownStepTarget(id)),
            None => match top.outgoing_entry.len() {
                1 => {
                    let edge = top.outgoing_entry[0].clone();
                    self.step_all_along(primary, &Edge::Entry(edge), NodeInfo::entry_edges, true)
                }
                0 => self.step_over(primary),
                _ => Err(Error::AmbiguousCall),
            },
        }
    }

    /// The multi-thread matching kernel. `target` is the primary's chosen
    /// edge; `candidates` selects the edges of the same kind on every other
    /// thread. Matching prefers the exact ARG successor and falls back to a
    /// unique CFG successor: threads exploring the same control flow may
    /// sit on different ARG nodes, and the exact match preserves trace
    /// fidelity where it exists.
    fn step_all_along(
        &mut self,
        primary: i64,
        target: &Edge,
        candidates: fn(&NodeInfo) -> Vec<Edge>,
        add_frame: bool,
    ) -> Result<(), Error> {
        let tops: Vec<(i64, String, Option<NodeInfo>)> = self
            .threads
            .iter()
            .map(|(id, thread)| (id, thread.name.clone(), thread.top_node().cloned()))
            .collect();

        let mut plan: Vec<PlannedMove> = Vec::with_capacity(tops.len());
        for (thread_id, name, top) in tops {
            let Some(node) = top else {
                plan.push(PlannedMove {
                    thread_id,
                    target: None,
                    spawns_thread: false,
                });
                continue;
            };

            let options = candidates(&node);
            let chosen = match options.iter().find(|e| e.node_id() == target.node_id()) {
                Some(exact) => Some(exact),
                None => {
                    let cfg_matches: Vec<&Edge> = options
                        .iter()
                        .filter(|e| e.cfg_node_id() == target.cfg_node_id())
                        .collect();
                    match cfg_matches.len() {
                        0 => None,
                        1 => Some(cfg_matches[0]),
                        _ => return Err(Error::AmbiguousStep(name)),
                    }
                }
            };

            match chosen {
                Some(edge) => plan.push(PlannedMove {
                    thread_id,
                    target: Some(self.oracle.lookup_by_id(edge.node_id())?),
                    spawns_thread: edge.creates_new_thread(),
                }),
                None => plan.push(PlannedMove {
                    thread_id,
                    target: None,
                    spawns_thread: false,
                }),
            }
        }

        for mv in plan {
            let Some(thread) = self.threads.get_mut(mv.thread_id) else {
                continue;
            };
            if add_frame {
                if thread.top_node().is_none() {
                    // An unavailable thread keeps its single absent frame;
                    // growing its stack would leave a non-top absent frame.
                    continue;
                }
                let caller_index = thread.top().local_thread_index;
                let index = if mv.spawns_thread {
                    caller_index - 1
                } else {
                    caller_index
                };
                thread.frames.insert(
                    0,
                    StackFrame {
                        node: mv.target,
                        ambiguous: false,
                        local_thread_index: index,
                        last_reachable: None,
                    },
                );
            } else {
                thread.top_mut().set_node(mv.target);
            }
        }

        self.notify_stopped(StopReason::Step, primary);
        Ok(())
    }

    /// Step out of the current function. Threads whose call site does not
    /// match the primary's are dropped from tracking; the rest pop their
    /// top frame and land on the resolved return location.
    pub fn step_out(&mut self, primary: i64) -> Result<(), Error> {
        struct ThreadView {
            thread_id: i64,
            name: String,
            top_node: Option<NodeInfo>,
            top_index: i64,
            prev: Option<(bool, Option<NodeInfo>, i64)>,
        }

        let primary_thread = self
            .threads
            .get(primary)
            .ok_or(Error::ThreadNotFound(primary))?;
        if primary_thread.top_node().is_none() {
            return Err(Error::LocationUnavailable);
        }
        let prev = primary_thread
            .previous_frame()
            .ok_or(Error::TopOfCallStack)?;
        if prev.ambiguous {
            return Err(Error::AmbiguousCallStack);
        }
        let prev_node = prev.node.as_ref().ok_or(Error::LocationUnavailable)?;
        if prev_node.outgoing_cfg.is_empty() {
            return Err(Error::FunctionNeverReturns);
        }
        let primary_call_cfg = prev_node.cfg_node_id.clone();

        let views: Vec<ThreadView> = self
            .threads
            .iter()
            .map(|(thread_id, thread)| ThreadView {
                thread_id,
                name: thread.name.clone(),
                top_node: thread.top_node().cloned(),
                top_index: thread.top().local_thread_index,
                prev: thread
                    .previous_frame()
                    .map(|f| (f.ambiguous, f.node.clone(), f.local_thread_index)),
            })
            .collect();

        let mut dropped: Vec<i64> = Vec::new();
        let mut kept: Vec<(i64, Option<NodeInfo>)> = Vec::new();
        for view in views {
            let Some((prev_ambiguous, Some(prev_node), prev_index)) = view.prev else {
                dropped.push(view.thread_id);
                continue;
            };
            if prev_ambiguous || prev_node.cfg_node_id != primary_call_cfg {
                dropped.push(view.thread_id);
                continue;
            }

            let Some(top) = view.top_node else {
                kept.push((view.thread_id, None));
                continue;
            };

            let candidates: Vec<CfgEdge> = if view.top_index == prev_index {
                // Ordinary return: only call-site successors the current
                // function can actually return to.
                let returnable =
                    self.find_reachable(&top, |node| !node.outgoing_return.is_empty())?;
                let return_set: HashSet<String> = returnable
                    .iter()
                    .flat_map(|node| node.outgoing_return.iter().map(|e| e.node_id.clone()))
                    .collect();
                prev_node
                    .outgoing_cfg
                    .iter()
                    .filter(|e| return_set.contains(&e.node_id))
                    .cloned()
                    .collect()
            } else {
                // Thread exit: the spawning call continues on any successor.
                prev_node.outgoing_cfg.clone()
            };

            match candidates.len() {
                0 => kept.push((view.thread_id, None)),
                1 => kept.push((
                    view.thread_id,
                    Some(self.oracle.lookup_by_id(&candidates[0].node_id)?),
                )),
                _ => return Err(Error::AmbiguousReturnPath(view.name)),
            }
        }

        for thread_id in dropped {
            self.threads.remove(thread_id);
        }
        for (thread_id, target) in kept {
            let Some(thread) = self.threads.get_mut(thread_id) else {
                continue;
            };
            thread.frames.remove(0);
            thread.top_mut().set_node(target);
        }

        self.notify_stopped(StopReason::Step, primary);
        Ok(())
    }

    /// Step back along the primary's unique incoming CFG edge, moving every
    /// thread that has a matching predecessor and re-entering unavailable
    /// threads whose last reachable node matches.
    pub fn step_back(&mut self, primary: i64) -> Result<(), Error> {
        let top = self.top_node(primary)?.clone();
        let target_cfg = match top.incoming_cfg.len() {
            0 => return Err(Error::FirstStatement),
            1 => top.incoming_cfg[0].cfg_node_id.clone(),
            _ => return Err(Error::AmbiguousStepBack),
        };

        let views: Vec<(i64, String, Option<NodeInfo>, Option<NodeInfo>)> = self
            .threads
            .iter()
            .map(|(id, thread)| {
                (
                    id,
                    thread.name.clone(),
                    thread.top_node().cloned(),
                    thread.top().last_reachable.clone(),
                )
            })
            .collect();

        let mut plan: Vec<(i64, NodeInfo)> = Vec::new();
        for (thread_id, name, top, last_reachable) in views {
            if let Some(node) = top {
                let matches: Vec<&CfgEdge> = node
                    .incoming_cfg
                    .iter()
                    .filter(|e| e.cfg_node_id == target_cfg)
                    .collect();
                match matches.len() {
                    0 => return Err(Error::NoMatchingPath(name)),
                    1 => plan.push((thread_id, self.oracle.lookup_by_id(&matches[0].node_id)?)),
                    _ => return Err(Error::AmbiguousPathFrom(name)),
                }
            } else if let Some(last) = last_reachable {
                if last.cfg_node_id == target_cfg {
                    plan.push((thread_id, self.oracle.lookup_by_id(&last.node_id)?));
                }
                // A non-matching last reachable node keeps the thread put.
            }
        }

        for (thread_id, node) in plan {
            if let Some(thread) = self.threads.get_mut(thread_id) {
                thread.top_mut().set_node(Some(node));
            }
        }

        self.notify_stopped(StopReason::Step, primary);
        Ok(())
    }

    /// Run forward to the next breakpoint.
    pub fn continue_to_next(&mut self) -> Result<(), Error> {
        self.run_to_next_breakpoint(1)
    }

    /// Run backward to the previous breakpoint.
    pub fn continue_to_previous(&mut self) -> Result<(), Error> {
        self.run_to_next_breakpoint(-1)
    }

    /// The breakpoint pump. Advances the cursor until a breakpoint maps to
    /// ARG nodes or the cursor leaves the registry, in which case the
    /// session is terminated. Without breakpoints the single synthetic stop
    /// is the program entry.
    fn run_to_next_breakpoint(&mut self, direction: i64) -> Result<(), Error> {
        loop {
            let next = self.breakpoints.active() + direction;
            self.breakpoints.set_active(next);
            let count = self.breakpoints.len() as i64;
            if next < 0 || next >= count.max(1) {
                self.notify_terminated();
                return Ok(());
            }

            if self.breakpoints.is_empty() {
                let nodes = self.oracle.lookup_by_location(None)?;
                if nodes.is_empty() {
                    warn!(target: "debugger", "no entry nodes in the ARG");
                    continue;
                }
                return self.stop_at(nodes, StopReason::Entry);
            }

            let Some(bp) = self.breakpoints.get(next as usize).cloned() else {
                continue;
            };
            let hits = self.oracle.lookup_by_location(Some(&bp))?;
            let covering: Vec<NodeInfo> = hits
                .into_iter()
                .filter(|node| node.covers_line(bp.line))
                .collect();
            // All ARG nodes of the first CFG location matching the line.
            let nodes: Vec<NodeInfo> = match covering.first() {
                Some(first) => {
                    let cfg = first.cfg_node_id.clone();
                    covering
                        .into_iter()
                        .filter(|node| node.cfg_node_id == cfg)
                        .collect()
                }
                None => Vec::new(),
            };
            if nodes.is_empty() {
                warn!(target: "debugger", "unreachable breakpoint at {}:{}", bp.file, bp.line);
                continue;
            }
            return self.stop_at(nodes, StopReason::Breakpoint);
        }
    }

    /// Replace the thread store with one thread per stopped node, stacks
    /// assembled from the ARG, and announce the stop.
    fn stop_at(&mut self, nodes: Vec<NodeInfo>, reason: StopReason) -> Result<(), Error> {
        let label = match reason {
            StopReason::Entry => "entry",
            _ => "breakpoint",
        };

        // Assemble every stack before touching the store.
        let mut fresh: Vec<ThreadState> = Vec::with_capacity(nodes.len());
        for node in nodes {
            let name = format!("{label} {}", node.node_id);
            let frames = self.assemble_stack(node)?;
            fresh.push(ThreadState { name, frames });
        }

        self.threads.reset();
        let mut first = None;
        for thread in fresh {
            let id = self.threads.insert(thread);
            first.get_or_insert(id);
        }
        if let Some(first) = first {
            self.notify_stopped(reason, first);
        }
        Ok(())
    }

    /// Build the synthetic call stack of a leaf node from ARG entry edges,
    /// innermost first. Assembly walks to the entry node of each function
    /// and follows unique callers; several plausible callers produce
    /// terminal ambiguous frames.
    fn assemble_stack(&mut self, leaf: NodeInfo) -> Result<Vec<StackFrame>, Error> {
        let mut frames = vec![StackFrame::new(leaf, false, 0)];
        let mut thread_index = 0i64;
        loop {
            let Some(current) = frames.last().and_then(|frame| frame.node.clone()) else {
                break;
            };
            let entry = self.find_entry_node(&current)?;
            let callers = entry.incoming_entry.clone();
            if callers.is_empty() {
                break;
            }
            let ambiguous = callers.len() > 1;
            for edge in &callers {
                if edge.creates_new_thread {
                    thread_index += 1;
                }
                let source = self.oracle.lookup_by_id(&edge.node_id)?;
                frames.push(StackFrame {
                    node: Some(source),
                    ambiguous,
                    local_thread_index: thread_index,
                    last_reachable: None,
                });
            }
            if callers.len() != 1 {
                break;
            }
        }
        Ok(frames)
    }

    /// Innermost ancestor reachable over incoming CFG edges that has no
    /// incoming CFG edge itself, i.e. the function entry of the node.
    fn find_entry_node(&mut self, start: &NodeInfo) -> Result<NodeInfo, Error> {
        if start.incoming_cfg.is_empty() {
            return Ok(start.clone());
        }
        let mut visited: HashSet<String> = HashSet::from([start.node_id.clone()]);
        let mut stack: Vec<NodeInfo> = vec![start.clone()];
        while let Some(node) = stack.pop() {
            for edge in &node.incoming_cfg {
                if visited.insert(edge.node_id.clone()) {
                    let ancestor = self.oracle.lookup_by_id(&edge.node_id)?;
                    if ancestor.incoming_cfg.is_empty() {
                        return Ok(ancestor);
                    }
                    stack.push(ancestor);
                }
            }
        }
        Err(Error::NoEntryNode(start.node_id.clone()))
    }

    /// Cycle-safe DFS over outgoing CFG edges collecting every node that
    /// satisfies the predicate, the start node included.
    fn find_reachable(
        &mut self,
        start: &NodeInfo,
        predicate: impl Fn(&NodeInfo) -> bool,
    ) -> Result<Vec<NodeInfo>, Error> {
        let mut visited: HashSet<String> = HashSet::from([start.node_id.clone()]);
        let mut stack: Vec<NodeInfo> = vec![start.clone()];
        let mut found = Vec::new();
        while let Some(node) = stack.pop() {
            if predicate(&node) {
                found.push(node.clone());
            }
            for edge in &node.outgoing_cfg {
                if visited.insert(edge.node_id.clone()) {
                    stack.push(self.oracle.lookup_by_id(&edge.node_id)?);
                }
            }
        }
        Ok(found)
    }
}
