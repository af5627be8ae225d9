//! ARG oracle facade.
//!
//! The analyzer that produced the graph stays opaque behind three queries:
//! node lookup, node state and integer expression evaluation. The concrete
//! client speaks newline-delimited JSON-RPC 2.0 over TCP; tests substitute
//! an in-memory implementation of [`ArgOracle`].

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::debugger::arg::{Location, NodeInfo};
use crate::debugger::error::Error;

/// Parameters of `arg_lookup`. Exactly one of the fields is set for an id
/// or location query; both empty asks for the ARG entry nodes.
#[derive(Debug, Default, Serialize)]
pub struct LookupParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// Parameters of `arg_state`.
#[derive(Debug, Serialize)]
pub struct ArgNodeParams {
    pub node: String,
}

/// Parameters of `arg_eval_int`.
#[derive(Debug, Serialize)]
pub struct ArgExprQueryParams {
    pub node: String,
    pub expression: String,
}

/// Result of an integer expression evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct ExprResult {
    pub value: i64,
}

/// Remote query facade over the analyzer.
pub trait ArgOracle: Send {
    /// All ARG nodes whose source range covers the location; the ARG entry
    /// nodes when no location is given.
    fn lookup_by_location(&mut self, location: Option<&Location>) -> Result<Vec<NodeInfo>, Error>;

    /// The single node with the given id.
    fn lookup_by_id(&mut self, node_id: &str) -> Result<NodeInfo, Error>;

    /// Opaque hierarchical abstract state of the node.
    fn fetch_state(&mut self, node_id: &str) -> Result<Value, Error>;

    /// Evaluate an integer expression in the abstract state of the node.
    fn eval_int(&mut self, node_id: &str, expression: &str) -> Result<ExprResult, Error>;
}

/// JSON-RPC client for the analyzer endpoint.
pub struct JsonRpcOracle {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    next_id: i64,
}

impl JsonRpcOracle {
    pub fn connect(addr: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            stream,
            reader,
            next_id: 1,
        })
    }

    fn call<P: Serialize>(&mut self, method: &str, params: &P) -> Result<Value, Error> {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut payload = serde_json::to_vec(&request)?;
        payload.push(b'\n');
        self.stream.write_all(&payload)?;
        self.stream.flush()?;

        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                return Err(Error::OracleUnavailable(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "oracle connection closed",
                )));
            }
            if line.trim().is_empty() {
                continue;
            }
            let reply: Value = serde_json::from_str(&line)?;
            if reply.get("id").and_then(Value::as_i64) != Some(id) {
                debug!(target: "oracle", "skipping stale reply: {line}");
                continue;
            }
            if let Some(error) = reply.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified oracle error")
                    .to_string();
                return Err(Error::OracleRejected(message));
            }
            return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    fn lookup(&mut self, params: LookupParams) -> Result<Vec<NodeInfo>, Error> {
        let result = self.call("arg_lookup", &params)?;
        let mut nodes: Vec<NodeInfo> = serde_json::from_value(result)?;
        // Display-location patch for return nodes happens on every lookup,
        // before the engine sees the node.
        for node in &mut nodes {
            node.normalize_return_location();
        }
        Ok(nodes)
    }
}

impl ArgOracle for JsonRpcOracle {
    fn lookup_by_location(&mut self, location: Option<&Location>) -> Result<Vec<NodeInfo>, Error> {
        self.lookup(LookupParams {
            node: None,
            location: location.cloned(),
        })
    }

    fn lookup_by_id(&mut self, node_id: &str) -> Result<NodeInfo, Error> {
        let mut nodes = self.lookup(LookupParams {
            node: Some(node_id.to_string()),
            location: None,
        })?;
        match nodes.len() {
            0 => Err(Error::NodeNotFound(node_id.to_string())),
            1 => Ok(nodes.remove(0)),
            _ => Err(Error::AmbiguousNode(node_id.to_string())),
        }
    }

    fn fetch_state(&mut self, node_id: &str) -> Result<Value, Error> {
        self.call(
            "arg_state",
            &ArgNodeParams {
                node: node_id.to_string(),
            },
        )
    }

    fn eval_int(&mut self, node_id: &str, expression: &str) -> Result<ExprResult, Error> {
        let result = self.call(
            "arg_eval_int",
            &ArgExprQueryParams {
                node: node_id.to_string(),
                expression: expression.to_string(),
            },
        );
        match result {
            Ok(value) => Ok(serde_json::from_value(value)?),
            // The user typed the expression; the oracle's complaint is the
            // most useful thing to show them.
            Err(Error::OracleRejected(message)) => Err(Error::UserExpression(message)),
            Err(err) => Err(err),
        }
    }
}
