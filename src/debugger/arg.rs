//! Value types of the abstract reachability graph.
//!
//! An ARG node is one abstract state discovered by the analyzer. Many ARG
//! nodes may share a single control-flow node, which is why every edge
//! carries both an ARG neighbor id and a CFG neighbor id.

use serde::{Deserialize, Serialize};

/// Source range, project-relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Plain control-flow edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfgEdge {
    pub node_id: String,
    pub cfg_node_id: String,
    /// Display string of the statement on the edge.
    #[serde(default)]
    pub statement: String,
}

/// Function-call edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryEdge {
    pub node_id: String,
    pub cfg_node_id: String,
    pub function: String,
    /// Argument display strings at the call site.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub creates_new_thread: bool,
}

/// Function-return edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnEdge {
    pub node_id: String,
    pub cfg_node_id: String,
}

/// Edge sum type used by the stepping kernel, which matches candidates on
/// the shared id pair regardless of the edge kind.
#[derive(Debug, Clone)]
pub enum Edge {
    Cfg(CfgEdge),
    Entry(EntryEdge),
    Return(ReturnEdge),
}

impl Edge {
    pub fn node_id(&self) -> &str {
        match self {
            Edge::Cfg(e) => &e.node_id,
            Edge::Entry(e) => &e.node_id,
            Edge::Return(e) => &e.node_id,
        }
    }

    pub fn cfg_node_id(&self) -> &str {
        match self {
            Edge::Cfg(e) => &e.cfg_node_id,
            Edge::Entry(e) => &e.cfg_node_id,
            Edge::Return(e) => &e.cfg_node_id,
        }
    }

    /// Only entry edges may spawn a thread.
    pub fn creates_new_thread(&self) -> bool {
        match self {
            Edge::Entry(e) => e.creates_new_thread,
            _ => false,
        }
    }
}

/// Identity of one ARG node together with its edge lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_id: String,
    pub cfg_node_id: String,
    pub function: String,
    pub location: Location,
    #[serde(default)]
    pub outgoing_cfg: Vec<CfgEdge>,
    #[serde(default)]
    pub incoming_cfg: Vec<CfgEdge>,
    #[serde(default)]
    pub outgoing_entry: Vec<EntryEdge>,
    #[serde(default)]
    pub incoming_entry: Vec<EntryEdge>,
    #[serde(default)]
    pub outgoing_return: Vec<ReturnEdge>,
}

impl NodeInfo {
    /// A return node ends its function: no control flow out, only return
    /// edges back to the callers.
    pub fn is_return_node(&self) -> bool {
        self.outgoing_cfg.is_empty() && !self.outgoing_return.is_empty()
    }

    /// Collapse the display location of a return node to the end of its
    /// range. Idempotent.
    pub fn normalize_return_location(&mut self) {
        if self.is_return_node() {
            self.location.line = self.location.end_line;
            self.location.column = self.location.end_column;
        }
    }

    /// True when the node's line range covers `line`.
    pub fn covers_line(&self, line: u32) -> bool {
        self.location.line <= line && line <= self.location.end_line
    }

    pub fn cfg_edges(&self) -> Vec<Edge> {
        self.outgoing_cfg.iter().cloned().map(Edge::Cfg).collect()
    }

    pub fn entry_edges(&self) -> Vec<Edge> {
        self.outgoing_entry.iter().cloned().map(Edge::Entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn return_node() -> NodeInfo {
        NodeInfo {
            node_id: "N1".to_string(),
            cfg_node_id: "C1".to_string(),
            function: "f".to_string(),
            location: Location {
                file: "f.c".to_string(),
                line: 3,
                column: 1,
                end_line: 7,
                end_column: 2,
            },
            outgoing_cfg: vec![],
            incoming_cfg: vec![],
            outgoing_entry: vec![],
            incoming_entry: vec![],
            outgoing_return: vec![ReturnEdge {
                node_id: "N2".to_string(),
                cfg_node_id: "C2".to_string(),
            }],
        }
    }

    #[test]
    fn return_location_collapses_to_range_end() {
        let mut node = return_node();
        node.normalize_return_location();
        assert_eq!(node.location.line, 7);
        assert_eq!(node.location.column, 2);
    }

    #[test]
    fn return_location_patch_is_idempotent() {
        let mut once = return_node();
        once.normalize_return_location();
        let mut twice = once.clone();
        twice.normalize_return_location();
        assert_eq!(once.location, twice.location);
    }

    #[test]
    fn non_return_nodes_keep_their_location() {
        let mut node = return_node();
        node.outgoing_return.clear();
        node.normalize_return_location();
        assert_eq!(node.location.line, 3);
    }
}
