//! In-memory ARG oracle used by the engine and session tests.
//!
//! `ArgFixture` builds a small graph edge by edge, wiring both directions
//! of every edge the way the analyzer would report them.

use std::collections::HashMap;

use serde_json::Value;

use argdap::debugger::arg::{CfgEdge, EntryEdge, Location, NodeInfo, ReturnEdge};
use argdap::debugger::error::Error;
use argdap::debugger::oracle::{ArgOracle, ExprResult};

/// Single-line location, the common case in fixtures.
pub fn loc(file: &str, line: u32, column: u32) -> Location {
    Location {
        file: file.to_string(),
        line,
        column,
        end_line: line,
        end_column: column + 10,
    }
}

/// Multi-line location.
pub fn span(file: &str, line: u32, column: u32, end_line: u32, end_column: u32) -> Location {
    Location {
        file: file.to_string(),
        line,
        column,
        end_line,
        end_column,
    }
}

#[derive(Default, Clone)]
pub struct ArgFixture {
    nodes: HashMap<String, NodeInfo>,
    entry_nodes: Vec<String>,
    states: HashMap<String, Value>,
    eval_values: HashMap<(String, String), i64>,
    eval_errors: HashMap<(String, String), String>,
}

impl ArgFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, id: &str, cfg_id: &str, function: &str, location: Location) -> Self {
        self.nodes.insert(
            id.to_string(),
            NodeInfo {
                node_id: id.to_string(),
                cfg_node_id: cfg_id.to_string(),
                function: function.to_string(),
                location,
                outgoing_cfg: vec![],
                incoming_cfg: vec![],
                outgoing_entry: vec![],
                incoming_entry: vec![],
                outgoing_return: vec![],
            },
        );
        self
    }

    /// Mark a node as an ARG entry node, returned by empty-location lookups.
    pub fn entry_node(mut self, id: &str) -> Self {
        self.entry_nodes.push(id.to_string());
        self
    }

    pub fn cfg(mut self, from: &str, to: &str, statement: &str) -> Self {
        let from_cfg = self.cfg_id_of(from);
        let to_cfg = self.cfg_id_of(to);
        self.node_mut(from).outgoing_cfg.push(CfgEdge {
            node_id: to.to_string(),
            cfg_node_id: to_cfg,
            statement: statement.to_string(),
        });
        self.node_mut(to).incoming_cfg.push(CfgEdge {
            node_id: from.to_string(),
            cfg_node_id: from_cfg,
            statement: statement.to_string(),
        });
        self
    }

    pub fn entry(
        mut self,
        from: &str,
        to: &str,
        function: &str,
        args: &[&str],
        creates_new_thread: bool,
    ) -> Self {
        let from_cfg = self.cfg_id_of(from);
        let to_cfg = self.cfg_id_of(to);
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.node_mut(from).outgoing_entry.push(EntryEdge {
            node_id: to.to_string(),
            cfg_node_id: to_cfg,
            function: function.to_string(),
            args: args.clone(),
            creates_new_thread,
        });
        self.node_mut(to).incoming_entry.push(EntryEdge {
            node_id: from.to_string(),
            cfg_node_id: from_cfg,
            function: function.to_string(),
            args,
            creates_new_thread,
        });
        self
    }

    pub fn ret(mut self, from: &str, to: &str) -> Self {
        let to_cfg = self.cfg_id_of(to);
        self.node_mut(from).outgoing_return.push(ReturnEdge {
            node_id: to.to_string(),
            cfg_node_id: to_cfg,
        });
        self
    }

    pub fn state(mut self, node: &str, state: Value) -> Self {
        self.states.insert(node.to_string(), state);
        self
    }

    pub fn eval(mut self, node: &str, expression: &str, value: i64) -> Self {
        self.eval_values
            .insert((node.to_string(), expression.to_string()), value);
        self
    }

    pub fn eval_error(mut self, node: &str, expression: &str, message: &str) -> Self {
        self.eval_errors
            .insert((node.to_string(), expression.to_string()), message.to_string());
        self
    }

    pub fn oracle(self) -> MockOracle {
        MockOracle { fixture: self }
    }

    fn node_mut(&mut self, id: &str) -> &mut NodeInfo {
        self.nodes.get_mut(id).expect("unknown node in fixture")
    }

    fn cfg_id_of(&self, id: &str) -> String {
        self.nodes
            .get(id)
            .expect("unknown node in fixture")
            .cfg_node_id
            .clone()
    }
}

pub struct MockOracle {
    fixture: ArgFixture,
}

impl ArgOracle for MockOracle {
    fn lookup_by_location(&mut self, location: Option<&Location>) -> Result<Vec<NodeInfo>, Error> {
        let mut hits: Vec<NodeInfo> = match location {
            None => self
                .fixture
                .entry_nodes
                .iter()
                .filter_map(|id| self.fixture.nodes.get(id).cloned())
                .collect(),
            Some(at) => self
                .fixture
                .nodes
                .values()
                .filter(|node| node.location.file == at.file && node.covers_line(at.line))
                .cloned()
                .collect(),
        };
        // Deterministic order regardless of map iteration.
        hits.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        for node in &mut hits {
            node.normalize_return_location();
        }
        Ok(hits)
    }

    fn lookup_by_id(&mut self, node_id: &str) -> Result<NodeInfo, Error> {
        let mut node = self
            .fixture
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;
        node.normalize_return_location();
        Ok(node)
    }

    fn fetch_state(&mut self, node_id: &str) -> Result<Value, Error> {
        Ok(self
            .fixture
            .states
            .get(node_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    fn eval_int(&mut self, node_id: &str, expression: &str) -> Result<ExprResult, Error> {
        let key = (node_id.to_string(), expression.to_string());
        if let Some(message) = self.fixture.eval_errors.get(&key) {
            return Err(Error::UserExpression(message.clone()));
        }
        match self.fixture.eval_values.get(&key) {
            Some(&value) => Ok(ExprResult { value }),
            None => Err(Error::UserExpression(format!(
                "cannot evaluate: {expression}"
            ))),
        }
    }
}
